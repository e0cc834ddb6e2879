//! Scan ingestion. Takes an uploaded eye photo through crop, classify, and
//! persistence. Degrades rather than fails: a dead crop service means the
//! original photo is classified whole, a dead classifier means a synthetic
//! verdict marked as fallback.

use chrono::Utc;
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::inference::{synthesize_fallback, InferenceGateway};
use crate::models::{ResultSource, Scan};
use crate::storage::{extension_of, ImageStore, StorageError};

/// Retries when a freshly generated scan id collides with an existing row.
const ID_RETRIES: usize = 5;

const ALLOWED_EXTENSIONS: [&str; 3] = [".jpg", ".jpeg", ".png"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Uploaded file is empty")]
    EmptyUpload,

    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("Could not allocate a unique scan id")]
    IdExhausted,

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// An uploaded photo awaiting ingestion.
pub struct ScanUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Result of one ingestion: the persisted scan plus degradation markers.
pub struct ScanIngestOutcome {
    pub scan: Scan,
    /// True when the crop service failed and the whole photo was classified.
    pub degraded_crop: bool,
}

/// Short random scan id: a v4 uuid with hyphens stripped, first 8 chars.
pub fn generate_scan_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Run one upload through the full pipeline.
///
/// Order matters: the verdict is obtained first, then the scan row is
/// inserted (retrying the id on a unique-constraint hit), and image files
/// are written last so a failed insert leaves no orphan files behind.
pub fn ingest_scan(
    conn: &Connection,
    store: &ImageStore,
    gateway: &dyn InferenceGateway,
    upload: &ScanUpload,
) -> Result<ScanIngestOutcome, IngestError> {
    if upload.bytes.is_empty() {
        return Err(IngestError::EmptyUpload);
    }
    let extension = extension_of(&upload.filename).to_lowercase();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(IngestError::UnsupportedType(extension));
    }

    // Crop the conjunctiva region; fall back to the uncropped photo.
    let (conjunctiva, degraded_crop) = match gateway.crop(&upload.bytes, &upload.filename) {
        Ok(bytes) => (bytes, false),
        Err(e) => {
            tracing::warn!(error = %e, "Crop service failed, classifying uncropped photo");
            (upload.bytes.clone(), true)
        }
    };

    let (classification, result_source) =
        match gateway.classify(&conjunctiva, &upload.filename) {
            Ok(c) => (c, ResultSource::Model),
            Err(e) => {
                tracing::warn!(error = %e, "Classifier failed, synthesizing fallback verdict");
                (synthesize_fallback(), ResultSource::Fallback)
            }
        };

    let scan = insert_with_fresh_id(conn, |scan_id| Scan {
        photo_url: format!("/scans/scan-{scan_id}{extension}"),
        scan_id,
        scan_result: classification.anemic,
        confidence: classification.confidence,
        result_source,
        scan_date: Utc::now().naive_utc(),
    })?;

    store.save_scan(&scan.scan_id, &extension, &upload.bytes)?;
    store.save_conjunctiva(&scan.scan_id, &extension, &conjunctiva)?;

    tracing::info!(
        scan_id = %scan.scan_id,
        anemic = scan.scan_result,
        confidence = scan.confidence,
        source = scan.result_source.as_str(),
        degraded_crop,
        "Scan ingested"
    );

    Ok(ScanIngestOutcome {
        scan,
        degraded_crop,
    })
}

fn insert_with_fresh_id(
    conn: &Connection,
    build: impl Fn(String) -> Scan,
) -> Result<Scan, IngestError> {
    for _ in 0..ID_RETRIES {
        let scan = build(generate_scan_id());
        match repository::insert_scan(conn, &scan) {
            Ok(()) => return Ok(scan),
            Err(e) if e.is_unique_violation() => {
                tracing::debug!(scan_id = %scan.scan_id, "Scan id collision, regenerating");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(IngestError::IdExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::inference::{Classification, InferenceError};

    struct HealthyGateway;

    impl InferenceGateway for HealthyGateway {
        fn crop(&self, _image: &[u8], _filename: &str) -> Result<Vec<u8>, InferenceError> {
            Ok(b"cropped".to_vec())
        }

        fn classify(
            &self,
            _image: &[u8],
            _filename: &str,
        ) -> Result<Classification, InferenceError> {
            Ok(Classification {
                anemic: true,
                confidence: 0.82,
            })
        }
    }

    struct DeadGateway;

    impl InferenceGateway for DeadGateway {
        fn crop(&self, _image: &[u8], _filename: &str) -> Result<Vec<u8>, InferenceError> {
            Err(InferenceError::Timeout)
        }

        fn classify(
            &self,
            _image: &[u8],
            _filename: &str,
        ) -> Result<Classification, InferenceError> {
            Err(InferenceError::Timeout)
        }
    }

    fn upload() -> ScanUpload {
        ScanUpload {
            filename: "eye.jpg".to_string(),
            bytes: b"fake-jpeg-bytes".to_vec(),
        }
    }

    #[test]
    fn healthy_pipeline_persists_model_verdict() {
        let conn = open_memory_database().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let store = ImageStore::new(tmp.path());

        let outcome = ingest_scan(&conn, &store, &HealthyGateway, &upload()).unwrap();

        assert!(outcome.scan.scan_result);
        assert!((outcome.scan.confidence - 0.82).abs() < f64::EPSILON);
        assert_eq!(outcome.scan.result_source, ResultSource::Model);
        assert!(!outcome.degraded_crop);
        assert_eq!(outcome.scan.scan_id.len(), 8);

        let persisted = repository::get_scan(&conn, &outcome.scan.scan_id)
            .unwrap()
            .unwrap();
        assert_eq!(persisted.photo_url, outcome.scan.photo_url);

        // Both the original and the crop land on disk.
        assert!(tmp
            .path()
            .join(format!("scans/scan-{}.jpg", outcome.scan.scan_id))
            .exists());
        assert!(tmp
            .path()
            .join(format!("conjunctivas/conj-{}.jpg", outcome.scan.scan_id))
            .exists());
    }

    #[test]
    fn dead_services_degrade_to_marked_fallback() {
        let conn = open_memory_database().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let store = ImageStore::new(tmp.path());

        let outcome = ingest_scan(&conn, &store, &DeadGateway, &upload()).unwrap();

        assert!(outcome.degraded_crop);
        assert_eq!(outcome.scan.result_source, ResultSource::Fallback);
        assert!(outcome.scan.confidence >= 0.5 && outcome.scan.confidence < 0.9);

        // The fallback marker survives persistence.
        let persisted = repository::get_scan(&conn, &outcome.scan.scan_id)
            .unwrap()
            .unwrap();
        assert_eq!(persisted.result_source, ResultSource::Fallback);

        // Degraded crop stores the original photo as the conjunctiva image.
        let conj = store
            .read_by_url(&format!("/conjunctivas/conj-{}.jpg", outcome.scan.scan_id))
            .unwrap();
        assert_eq!(conj, b"fake-jpeg-bytes");
    }

    #[test]
    fn empty_upload_is_rejected() {
        let conn = open_memory_database().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let store = ImageStore::new(tmp.path());

        let empty = ScanUpload {
            filename: "eye.jpg".to_string(),
            bytes: Vec::new(),
        };
        assert!(matches!(
            ingest_scan(&conn, &store, &HealthyGateway, &empty),
            Err(IngestError::EmptyUpload)
        ));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let conn = open_memory_database().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let store = ImageStore::new(tmp.path());

        let pdf = ScanUpload {
            filename: "eye.pdf".to_string(),
            bytes: b"%PDF".to_vec(),
        };
        assert!(matches!(
            ingest_scan(&conn, &store, &HealthyGateway, &pdf),
            Err(IngestError::UnsupportedType(_))
        ));
    }

    #[test]
    fn scan_ids_are_short_hex() {
        for _ in 0..20 {
            let id = generate_scan_id();
            assert_eq!(id.len(), 8);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
