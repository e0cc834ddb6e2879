//! Shared types for the HTTP API layer.

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;

use crate::api::error::ApiError;
use crate::assistant::{ChatModel, ConversationCache};
use crate::config::Config;
use crate::db;
use crate::identity::IdentityVerifier;
use crate::inference::InferenceGateway;
use crate::storage::ImageStore;

// ═══════════════════════════════════════════════════════════
// API context — shared state for all routes and middleware
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware. External services sit
/// behind trait objects so tests can substitute fakes.
#[derive(Clone)]
pub struct ApiContext {
    pub config: Arc<Config>,
    pub db_path: PathBuf,
    pub store: ImageStore,
    pub identity: Arc<dyn IdentityVerifier>,
    pub inference: Arc<dyn InferenceGateway>,
    pub model: Arc<dyn ChatModel>,
    pub conversations: Arc<ConversationCache>,
}

impl ApiContext {
    pub fn new(
        config: Config,
        identity: Arc<dyn IdentityVerifier>,
        inference: Arc<dyn InferenceGateway>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        let store = ImageStore::new(config.images_dir.clone());
        let db_path = config.db_path.clone();
        Self {
            config: Arc::new(config),
            db_path,
            store,
            identity,
            inference,
            model,
            conversations: Arc::new(ConversationCache::new()),
        }
    }

    /// Open a connection to the application database. Connections are
    /// opened per operation; SQLite in WAL mode handles the concurrency.
    pub fn open_db(&self) -> Result<Connection, ApiError> {
        db::open_database(&self.db_path).map_err(|e| ApiError::Internal(e.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════
// Authenticated caller — injected by auth middleware
// ═══════════════════════════════════════════════════════════

/// Identity asserted by the verifier for the current request, injected
/// into request extensions after successful token verification.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub uid: String,
    pub email: String,
    pub name: Option<String>,
}
