//! Atomic file replacement.
//!
//! New content is written to a temporary file next to the target, given its
//! final owner, group and mode, and renamed over the target in one step.
//! Readers of the target see either the old file or the complete new one,
//! never a partial write. If anything fails before the rename, the temporary
//! file is removed and the target is left exactly as it was.

use std::{
    fs::{self, Permissions},
    io::{self, Write},
    os::unix::fs::{fchown, PermissionsExt},
    path::Path,
};

use serde::Serialize;
use tracing::warn;

use crate::{candidate::Candidate, config::OwnershipOverride};

/// Final owner, group and permission bits of a rewritten file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileOwnership {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
}

impl FileOwnership {
    /// Configured overrides win; anything not overridden keeps the snapshot.
    pub fn resolve(candidate: &Candidate, overrides: &OwnershipOverride) -> Self {
        Self {
            uid: overrides.uid.unwrap_or(candidate.uid),
            gid: overrides.gid.unwrap_or(candidate.gid),
            mode: overrides.mode.unwrap_or(candidate.mode),
        }
    }

    /// Applies ownership first, then mode, so setuid/setgid bits survive the
    /// chown.
    pub fn apply(&self, file: &fs::File) -> io::Result<()> {
        fchown(file, Some(self.uid), Some(self.gid))?;
        file.set_permissions(Permissions::from_mode(self.mode))
    }
}

/// Replaces `target` with `payload`, owned and permissioned as `ownership`.
pub fn replace(target: &Path, payload: &[u8], ownership: &FileOwnership) -> io::Result<()> {
    write_atomic(target, payload, |file| ownership.apply(file))
}

/// Writes `payload` to a sibling temporary file, runs `finish` on it, then
/// renames it over `target`.
///
/// An error from any step, `finish` included, discards the temporary file and
/// leaves `target` untouched. Once the rename is done the parent directory is
/// synced; failing that only logs a warning, the target is already replaced.
pub fn write_atomic<F>(target: &Path, payload: &[u8], finish: F) -> io::Result<()>
where
    F: FnOnce(&fs::File) -> io::Result<()>,
{
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp_file = tempfile::Builder::new()
        .prefix(".optimg-")
        .suffix(".tmp")
        .tempfile_in(parent)?;
    temp_file.write_all(payload)?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;

    finish(temp_file.as_file())?;

    temp_file.persist(target).map_err(|e| e.error)?;
    if let Err(e) = sync_dir(parent) {
        warn!("cannot sync {}: {}", parent.display(), e);
    }
    Ok(())
}

/// Flushes a directory's entries, making a completed rename durable.
pub fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}
