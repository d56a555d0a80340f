use crate::error::ErrorCode;
use crate::model::GroupId;
use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// Advisory lock errors for a group's tree.
#[derive(Debug)]
pub enum LockError {
    Timeout { path: PathBuf, waited: Duration },
    IoError(io::Error),
}

impl From<io::Error> for LockError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err)
    }
}

impl LockError {
    /// Machine-readable code associated with this lock error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::LockContention,
            Self::IoError(_) => ErrorCode::StorageFailure,
        }
    }

    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { path, waited } => {
                write!(
                    f,
                    "{}: lock timed out after {:?} at {}",
                    self.code().code(),
                    waited,
                    path.display()
                )
            }
            Self::IoError(err) => write!(f, "{}: {}", self.code().code(), err),
        }
    }
}

impl std::error::Error for LockError {}

/// Lock file guarding mutations of one group's tree.
#[must_use]
pub fn group_lock_path(rubric_dir: &Path, group: GroupId) -> PathBuf {
    rubric_dir.join("locks").join(format!("group-{group}.lock"))
}

#[derive(Clone, Copy)]
enum LockKind {
    Shared,
    Exclusive,
}

#[derive(Debug)]
struct FileGuard {
    file: File,
    path: PathBuf,
}

impl FileGuard {
    fn acquire(path: &Path, timeout: Duration, kind: LockKind) -> Result<Self, LockError> {
        let parent = path.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "lock path has no parent")
        })?;
        fs::create_dir_all(parent)?;

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(path)?;

            let busy = match kind {
                LockKind::Shared => file.try_lock_shared().is_err(),
                LockKind::Exclusive => file.try_lock_exclusive().is_err(),
            };
            if !busy {
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                });
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    waited: start.elapsed(),
                });
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for FileGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Exclusive lock held while a command mutates a group's tree.
#[derive(Debug)]
pub struct TreeLock {
    guard: FileGuard,
}

impl TreeLock {
    /// Acquire the group's exclusive lock, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] when another holder keeps the lock.
    pub fn acquire(rubric_dir: &Path, group: GroupId, timeout: Duration) -> Result<Self, LockError> {
        let path = group_lock_path(rubric_dir, group);
        Ok(Self {
            guard: FileGuard::acquire(&path, timeout, LockKind::Exclusive)?,
        })
    }

    /// Release early. Dropping the guard releases too.
    pub fn release(self) {
        drop(self);
    }

    pub fn path(&self) -> &Path {
        &self.guard.path
    }
}

/// Shared lock for read-only reports; compatible with other readers.
#[derive(Debug)]
pub struct TreeReadLock {
    guard: FileGuard,
}

impl TreeReadLock {
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] while a writer holds the lock.
    pub fn acquire(rubric_dir: &Path, group: GroupId, timeout: Duration) -> Result<Self, LockError> {
        let path = group_lock_path(rubric_dir, group);
        Ok(Self {
            guard: FileGuard::acquire(&path, timeout, LockKind::Shared)?,
        })
    }

    pub fn release(self) {
        drop(self);
    }

    pub fn path(&self) -> &Path {
        &self.guard.path
    }
}
