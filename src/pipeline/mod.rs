//! Scan processing pipeline: validate an uploaded eye photo, derive the
//! conjunctiva crop, classify it, and persist the resulting scan record.

pub mod ingest;

pub use ingest::{ingest_scan, IngestError, ScanIngestOutcome, ScanUpload};
