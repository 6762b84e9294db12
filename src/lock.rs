//! Single-instance run lock.
//!
//! An exclusive advisory lock on a well-known file keeps two runs from
//! working the same tree. The lock is taken without blocking: if another
//! process holds it, the caller is told so and should leave every file alone.

use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use fs2::FileExt;
use tracing::debug;

/// Held for the lifetime of a run; released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Tries to take the lock at `path`, creating the file if needed.
    ///
    /// Returns `Ok(None)` when another process holds it.
    pub fn try_acquire<P: AsRef<Path>>(path: P) -> io::Result<Option<Self>> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => return Ok(None),
            Err(e) => return Err(e),
        }

        // pid for whoever finds the lock busy
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        debug!("acquired run lock {}", path.display());

        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("failed to release {}: {}", self.path.display(), e);
        }
    }
}
