use std::net::SocketAddr;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Anevia";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Request timeout for inference gateway calls, per deployment convention.
pub const INFERENCE_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration, read from environment variables with defaults
/// matching the development deployment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Root directory for stored images (scans/, conjunctivas/, profiles/).
    pub images_dir: PathBuf,
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Base URL of the inference gateway (crop + classify endpoints).
    pub inference_url: String,
    /// Base URL of the identity verifier REST API.
    pub identity_url: String,
    /// API key passed to the identity verifier.
    pub identity_api_key: String,
    /// Gemini API base URL.
    pub gemini_url: String,
    /// Gemini API key.
    pub gemini_api_key: String,
    /// Gemini model name.
    pub gemini_model: String,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Self {
        let host = env_or("HOST", "127.0.0.1");
        let port: u16 = env_or("PORT", "5000").parse().unwrap_or(5000);
        let bind_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 5000)));

        let data_dir = std::env::var("ANEVIA_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| app_data_dir());

        Self {
            bind_addr,
            images_dir: data_dir.join("images"),
            db_path: data_dir.join("anevia.db"),
            inference_url: env_or("INFERENCE_URL", "http://localhost:8000"),
            identity_url: env_or(
                "IDENTITY_URL",
                "https://identitytoolkit.googleapis.com",
            ),
            identity_api_key: env_or("IDENTITY_API_KEY", ""),
            gemini_url: env_or(
                "GEMINI_URL",
                "https://generativelanguage.googleapis.com",
            ),
            gemini_api_key: env_or("GEMINI_API_KEY", ""),
            gemini_model: env_or("GEMINI_MODEL", "gemini-1.5-pro"),
        }
    }

    /// Configuration rooted at an explicit data directory (used by tests).
    pub fn with_data_dir(data_dir: &std::path::Path) -> Self {
        let mut config = Self::from_env();
        config.images_dir = data_dir.join("images");
        config.db_path = data_dir.join("anevia.db");
        config
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get the application data directory (~/Anevia/ on all platforms).
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Anevia")
}

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    "info,anevia_server=debug".to_string()
}
