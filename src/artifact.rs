use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

/// Best-effort delete of a download or a download directory.
///
/// A missing path is not an error, so calling this twice is harmless.
/// Any other failure is logged and swallowed: cleanup must never be the
/// reason a request fails.
pub fn cleanup(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

/// A private working directory for one request.
///
/// The engine writes into it, the finished video is read from it, and the
/// whole directory is deleted exactly once: either by [`Artifact::cleanup`]
/// or, on every other exit path (early return, error, panic unwinding),
/// when the guard is dropped. Intermediate streams and partial files go
/// with it.
#[derive(Debug)]
pub struct Artifact {
    dir: Option<PathBuf>,
}

impl Artifact {
    /// Create a fresh, uniquely named directory under `parent`.
    pub fn create_in(parent: &Path) -> std::io::Result<Self> {
        let dir = parent.join(format!("req-{}", Uuid::new_v4().simple()));
        std::fs::create_dir_all(&dir)?;
        debug!("Created work dir {}", dir.display());
        Ok(Self { dir: Some(dir) })
    }

    pub fn dir(&self) -> &Path {
        self.dir.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Delete the directory now instead of waiting for the guard to drop.
    pub fn cleanup(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(dir) = self.dir.take() {
            cleanup(&dir);
        }
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        self.release();
    }
}
