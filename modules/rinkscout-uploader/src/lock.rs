//! Single-instance lock for the uploader.
//!
//! A lock file created with `create_new` guards against two uploads
//! running at once; a companion PID file makes the stale-lock case
//! diagnosable by hand. Both are removed on release, including the
//! ctrl-c path in `main`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use rinkscout_common::RinkscoutError;

pub struct RunLock {
    lock_path: PathBuf,
    pid_path: PathBuf,
    released: bool,
}

impl RunLock {
    /// Take the lock, failing if another run holds it.
    pub fn acquire(lock_path: &Path, pid_path: &Path) -> Result<Self, RinkscoutError> {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
        {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(pid_path).unwrap_or_default();
                let holder = holder.trim();
                if holder.is_empty() {
                    warn!(path = %lock_path.display(), "Lock file exists with no PID file");
                } else {
                    warn!(path = %lock_path.display(), pid = holder, "Lock held by another process");
                }
                return Err(RinkscoutError::UploaderLockConflict);
            }
            Err(e) => {
                return Err(RinkscoutError::Upload(format!(
                    "creating lock file {}: {e}",
                    lock_path.display()
                )))
            }
        }

        let pid = std::process::id();
        if let Err(e) = std::fs::write(pid_path, pid.to_string()) {
            warn!(path = %pid_path.display(), "Could not write PID file: {e}");
        }
        info!(pid, "Uploader lock acquired");

        Ok(Self {
            lock_path: lock_path.to_path_buf(),
            pid_path: pid_path.to_path_buf(),
            released: false,
        })
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for path in [&self.lock_path, &self.pid_path] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), "Could not remove lock artifact: {e}"),
            }
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_conflicts_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("run.lock");
        let pid_path = dir.path().join("run.pid");

        let mut first = RunLock::acquire(&lock_path, &pid_path).unwrap();
        assert!(lock_path.exists());
        assert_eq!(
            std::fs::read_to_string(&pid_path).unwrap(),
            std::process::id().to_string()
        );

        assert!(matches!(
            RunLock::acquire(&lock_path, &pid_path),
            Err(RinkscoutError::UploaderLockConflict)
        ));

        first.release();
        assert!(!lock_path.exists());
        assert!(!pid_path.exists());

        RunLock::acquire(&lock_path, &pid_path).unwrap();
    }

    #[test]
    fn drop_releases_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("run.lock");
        let pid_path = dir.path().join("run.pid");

        {
            let _lock = RunLock::acquire(&lock_path, &pid_path).unwrap();
            assert!(lock_path.exists());
        }
        assert!(!lock_path.exists());
    }
}
