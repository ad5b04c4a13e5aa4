//! Per-job scratch directories.

use std::path::{Path, PathBuf};

use tempfile::{Builder, TempDir};
use tracing::{debug, warn};

use super::error::PipelineError;

/// A job's private temporary directory.
///
/// Every local file a job creates lives here. The directory and all its
/// contents are removed when the value is dropped, on success, failure or
/// unwind alike.
#[derive(Debug)]
pub struct ScratchSpace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl ScratchSpace {
    /// Creates a fresh directory for `job_id` under `root`.
    pub fn create(root: &Path, job_id: &str) -> Result<Self, PipelineError> {
        std::fs::create_dir_all(root).map_err(|e| PipelineError::io(root, e))?;
        let prefix = format!("{}-", sanitize(job_id));
        let dir = Builder::new()
            .prefix(&prefix)
            .tempdir_in(root)
            .map_err(|e| PipelineError::io(root, e))?;
        let path = dir.path().to_path_buf();
        debug!(path = %path.display(), "Created scratch space");
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside the scratch space.
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => debug!(path = %self.path.display(), "Removed scratch space"),
                Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove scratch space"),
            }
        }
    }
}

/// Keeps ids usable as file name prefixes.
fn sanitize(job_id: &str) -> String {
    let cleaned: String = job_id
        .chars()
        .take(64)
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "job".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::create(root.path(), "job-1").unwrap();
        std::fs::write(scratch.file("input_0.jpg"), b"x").unwrap();
        let path = scratch.path().to_path_buf();
        assert!(path.starts_with(root.path()));
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("job-1-"));

        drop(scratch);
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_root_is_created() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a/b");
        let scratch = ScratchSpace::create(&nested, "j").unwrap();
        assert!(scratch.path().is_dir());
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize(""), "job");
        assert_eq!(sanitize("4f1c-9a"), "4f1c-9a");
    }
}
