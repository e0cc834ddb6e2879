//! Image file storage — a flat directory tree under the configured
//! images root, keyed by a fixed naming convention:
//! `scans/scan-<id>.<ext>`, `conjunctivas/conj-<id>.<ext>`,
//! `profiles/photo-<uid>.<ext>`.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// File store for uploaded and derived images.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scans_dir(&self) -> PathBuf {
        self.root.join("scans")
    }

    pub fn conjunctivas_dir(&self) -> PathBuf {
        self.root.join("conjunctivas")
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join("profiles")
    }

    /// Persist an original scan photo. Returns the public serving path.
    pub fn save_scan(
        &self,
        scan_id: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let name = format!("scan-{scan_id}{extension}");
        self.write(&self.scans_dir(), &name, bytes)?;
        Ok(format!("/scans/{name}"))
    }

    /// Persist a cropped conjunctiva image derived from a scan.
    pub fn save_conjunctiva(
        &self,
        scan_id: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let name = format!("conj-{scan_id}{extension}");
        self.write(&self.conjunctivas_dir(), &name, bytes)?;
        Ok(format!("/conjunctivas/{name}"))
    }

    /// Persist a user's profile photo. Returns the public serving path.
    pub fn save_profile_photo(
        &self,
        uid: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let name = format!("photo-{uid}{extension}");
        self.write(&self.profiles_dir(), &name, bytes)?;
        Ok(format!("/profiles/{name}"))
    }

    /// Read back a stored scan photo by its public serving path.
    pub fn read_by_url(&self, photo_url: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(photo_url);
        std::fs::read(&path).map_err(|source| StorageError::Io { path, source })
    }

    /// Best-effort deletion of a stored image by serving path. Missing files
    /// and I/O failures are logged and swallowed; deletion is cleanup, not
    /// a correctness requirement.
    pub fn delete_by_url(&self, photo_url: &str) {
        let path = self.resolve(photo_url);
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to delete image file");
            }
        }
    }

    /// Map a public serving path (`/scans/scan-x.jpg`) to the on-disk path.
    fn resolve(&self, photo_url: &str) -> PathBuf {
        self.root.join(photo_url.trim_start_matches('/'))
    }

    /// Write bytes under a directory, creating it if missing. Directory
    /// creation is idempotent and safe under concurrent first-time creation
    /// (create_dir_all tolerates already-exists).
    fn write(&self, dir: &Path, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        std::fs::create_dir_all(dir).map_err(|source| StorageError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(name);
        std::fs::write(&path, bytes).map_err(|source| StorageError::Io { path, source })
    }
}

/// File extension (with leading dot) from an original upload filename.
/// Defaults to `.jpg` when the name has none.
pub fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_else(|| ".jpg".to_string())
}
