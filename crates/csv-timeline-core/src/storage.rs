//! Blocking local-filesystem helpers.
//!
//! This module centralizes the small amount of file I/O that is not a
//! positioned read of a data or index file:
//!
//! - Atomic replacement of descriptor files (write-then-rename), so a crash
//!   while persisting never leaves a half-written JSON document behind.
//! - Whole-file reads of descriptors with `NotFound` kept distinct from other
//!   failures.
//! - A uniform mapping of `std::io::Error` into [`StorageError`] with the path
//!   that failed attached, used by the index and data-file layers as well.
//!
//! Everything here is synchronous; the engine performs plain blocking
//! seek+read calls and has no suspension points.

use snafu::{Backtrace, prelude::*};
use std::{
    error::Error,
    ffi::OsString,
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

/// Result of a side-file or data-file operation.
pub type StorageResult<T> = Result<T, StorageError>;

/// Raw failure from the filesystem, before a path is attached.
#[derive(Debug)]
pub enum BackendError {
    /// `std::io` error from a local file operation.
    Local(io::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "{e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
        }
    }
}

/// A filesystem operation failed on a specific path.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// The file or one of its parent directories does not exist.
    #[snafu(display("No such file: {path}"))]
    NotFound {
        /// Missing path.
        path: String,
        /// Filesystem error.
        source: BackendError,
        /// Where the error was raised.
        backtrace: Backtrace,
    },

    /// Any other failure to open, read, write, sync or rename.
    #[snafu(display("I/O failed on {path}: {source}"))]
    OtherIo {
        /// Path being accessed.
        path: String,
        /// Filesystem error.
        source: BackendError,
        /// Where the error was raised.
        backtrace: Backtrace,
    },
}

impl StorageError {
    /// The path the failed operation was acting on.
    pub fn path(&self) -> &str {
        match self {
            StorageError::NotFound { path, .. } | StorageError::OtherIo { path, .. } => path,
        }
    }
}

/// Attach `path` to an I/O result, classifying `NotFound` separately.
pub(crate) fn local<T>(result: io::Result<T>, path: &Path) -> StorageResult<T> {
    match result {
        Ok(v) => Ok(v),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(BackendError::Local(e)).context(NotFoundSnafu {
                path: path.display().to_string(),
            })
        }
        Err(e) => Err(BackendError::Local(e)).context(OtherIoSnafu {
            path: path.display().to_string(),
        }),
    }
}

fn create_parent_dir(abs: &Path) -> StorageResult<()> {
    if let Some(parent) = abs.parent()
        && !parent.as_os_str().is_empty()
    {
        local(fs::create_dir_all(parent), parent)?;
    }
    Ok(())
}

/// Deletes the temp file of an unfinished atomic write when dropped.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// Keep the file: it has been renamed into place.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            // Best-effort cleanup; we are already returning another error.
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn temp_path_for(abs: &Path) -> PathBuf {
    match abs.file_name() {
        Some(name) => {
            let mut tmp: OsString = name.to_os_string();
            tmp.push(".tmp");
            abs.with_file_name(tmp)
        }
        None => abs.with_extension("tmp"),
    }
}

/// Write `contents` to `path` using an atomic write.
///
/// The payload goes to a temporary sibling (`<name>.tmp`), is synced, and is
/// then renamed over the target. Parent directories are created as needed.
///
/// # Errors
///
/// Returns [`StorageError::OtherIo`] (or `NotFound` for a vanished directory)
/// when any filesystem step fails; the temporary file is removed in that case.
pub fn write_atomic(path: &Path, contents: &[u8]) -> StorageResult<()> {
    create_parent_dir(path)?;

    let tmp_path = temp_path_for(path);
    let mut guard = TempFileGuard::new(tmp_path.clone());

    {
        let mut file = local(fs::File::create(&tmp_path), &tmp_path)?;
        local(file.write_all(contents), &tmp_path)?;
        local(file.sync_all(), &tmp_path)?;
    }

    local(fs::rename(&tmp_path, path), path)?;
    guard.disarm();

    Ok(())
}

/// Read the file at `path` and return its contents as a `String`.
///
/// A missing file yields [`StorageError::NotFound`]; other failures produce
/// [`StorageError::OtherIo`].
pub fn read_to_string(path: &Path) -> StorageResult<String> {
    local(fs::read_to_string(path), path)
}

/// Current length in bytes of the file at `path`.
pub fn file_len(path: &Path) -> StorageResult<u64> {
    let meta = local(fs::metadata(path), path)?;
    Ok(meta.len())
}
