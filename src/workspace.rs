//! Per-job scratch directory lifecycle (spec.md §5: "per-job workspace
//! isolation with guaranteed cleanup"). The pipeline runner (C9) and worker
//! pool (C11) never touch a shared directory — each job gets its own,
//! removed on drop regardless of success or failure.

use std::io;
use std::path::{Path, PathBuf};

/// Owns a job-scoped directory under a configured root. Dropping it removes
/// the directory tree; callers that want to handle cleanup errors
/// explicitly can call `close()` instead of letting drop do it silently.
pub struct JobWorkspace {
    path: PathBuf,
    cleaned: bool,
}

impl JobWorkspace {
    /// Create `<root>/<job_id>`, erroring if it can't be made fresh.
    pub fn create(root: &Path, job_id: &str) -> io::Result<Self> {
        let path = root.join(job_id);
        if path.exists() {
            std::fs::remove_dir_all(&path)?;
        }
        std::fs::create_dir_all(&path)?;
        Ok(Self { path, cleaned: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Remove the workspace directory now, surfacing any I/O error instead
    /// of swallowing it in `Drop`.
    pub fn close(mut self) -> io::Result<()> {
        self.remove()
    }

    fn remove(&mut self) -> io::Result<()> {
        if self.cleaned {
            return Ok(());
        }
        self.cleaned = true;
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to clean up job workspace");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_makes_a_fresh_directory() {
        let root = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::create(root.path(), "job-1").unwrap();
        assert!(ws.path().exists());
        assert_eq!(ws.join("audio.wav"), ws.path().join("audio.wav"));
    }

    #[test]
    fn drop_removes_the_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let ws = JobWorkspace::create(root.path(), "job-2").unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn create_wipes_a_stale_leftover_directory() {
        let root = tempfile::tempdir().unwrap();
        let stale = root.path().join("job-3");
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("leftover.txt"), b"old").unwrap();

        let ws = JobWorkspace::create(root.path(), "job-3").unwrap();
        assert!(!ws.join("leftover.txt").exists());
    }
}
