use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const LOCK_FILE: &str = ".lock";
const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Advisory lock on a state directory.
///
/// Held for the whole read-modify-write of the session file so concurrent
/// `annofold` invocations don't overwrite each other's view state. The lock
/// file itself is never removed: a waiter may already hold it open, and
/// unlinking it would let a third process lock a fresh inode.
pub struct StateLock {
    _file: File,
}

/// Error type for lock operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not create lock file at {path}: {source}")]
    CreateError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not lock {path}: another annofold process is updating the session")]
    Timeout { path: PathBuf },
}

impl StateLock {
    /// Lock `state_dir`, creating it if needed. Waits up to `timeout`.
    pub fn acquire(state_dir: &Path, timeout: Duration) -> Result<Self, LockError> {
        let path = state_dir.join(LOCK_FILE);
        let create_err = |e: std::io::Error| LockError::CreateError {
            path: path.clone(),
            source: e,
        };
        fs::create_dir_all(state_dir).map_err(create_err)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(create_err)?;

        let start = Instant::now();
        while try_lock(&file).is_err() {
            if start.elapsed() >= timeout {
                return Err(LockError::Timeout { path });
            }
            std::thread::sleep(RETRY_INTERVAL);
        }
        Ok(StateLock { _file: file })
    }

    /// Acquire with the default timeout (5 seconds)
    pub fn acquire_default(state_dir: &Path) -> Result<Self, LockError> {
        Self::acquire(state_dir, Duration::from_secs(5))
    }
}

#[cfg(unix)]
fn try_lock(file: &File) -> Result<(), std::io::Error> {
    use std::os::unix::io::AsRawFd;
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> Result<(), std::io::Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_missing_state_dir() {
        let tmp = TempDir::new().unwrap();
        let state_dir = tmp.path().join(".annofold");
        let lock = StateLock::acquire_default(&state_dir).unwrap();
        assert!(state_dir.join(LOCK_FILE).exists());
        drop(lock);
        // flock is released with the handle; the file stays
        assert!(state_dir.join(LOCK_FILE).exists());
    }

    #[test]
    fn released_lock_can_be_reacquired() {
        let tmp = TempDir::new().unwrap();
        drop(StateLock::acquire_default(tmp.path()).unwrap());
        assert!(StateLock::acquire_default(tmp.path()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn contended_lock_times_out() {
        let tmp = TempDir::new().unwrap();
        let _held = StateLock::acquire_default(tmp.path()).unwrap();
        let second = StateLock::acquire(tmp.path(), Duration::from_millis(50));
        assert!(matches!(second, Err(LockError::Timeout { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn waiter_keeps_exclusion_after_release() {
        use std::sync::mpsc;
        use std::thread;

        let tmp = TempDir::new().unwrap();
        let first = StateLock::acquire_default(tmp.path()).unwrap();

        let dir = tmp.path().to_path_buf();
        let (acquired_tx, acquired_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let waiter = thread::spawn(move || {
            let lock = StateLock::acquire(&dir, Duration::from_secs(5)).unwrap();
            acquired_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            drop(lock);
        });

        // Let the waiter open the lock file and start polling
        thread::sleep(Duration::from_millis(100));
        drop(first);
        acquired_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let third = StateLock::acquire(tmp.path(), Duration::from_millis(100));
        assert!(matches!(third, Err(LockError::Timeout { .. })));

        release_tx.send(()).unwrap();
        waiter.join().unwrap();
        assert!(StateLock::acquire(tmp.path(), Duration::from_millis(100)).is_ok());
    }
}
