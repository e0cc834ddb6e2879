//! Anevia — anemia-screening backend.
//!
//! Eye-conjunctiva photos are uploaded, cropped and classified by an
//! external ML service, persisted as scan records, and discussed with a
//! Gemini-backed chat assistant. Accounts are verified by an external
//! identity provider and mirrored locally.

pub mod api;
pub mod assistant;
pub mod chat_service;
pub mod config;
pub mod db;
pub mod identity;
pub mod inference;
pub mod models;
pub mod pipeline;
pub mod storage;
