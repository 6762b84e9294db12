//! Run configuration.
//!
//! `RunConfig` is assembled once by the command line front end and stays
//! immutable for the lifetime of the process. The parsing helpers here are the
//! validators the front end plugs into its argument parser, so a bad mode, user
//! or template is rejected before anything is scanned.

use std::{
    ffi::CString,
    path::PathBuf,
    time::Duration,
};

use serde::Serialize;

use crate::{
    error::{OptimizeError, Result},
    template::CompressorTemplate,
};

/// Default location of the system-wide run lock.
pub const DEFAULT_LOCK_FILE: &str = "/var/lock/optimize-image";

/// Default quality of the in-process encoder.
pub const DEFAULT_QUALITY: f32 = 85.0;

/// Largest accepted `--mode` value.
pub const MAX_MODE: u32 = 0o777;

/// How candidate bytes are produced.
#[derive(Debug, Clone)]
pub enum CompressorKind {
    /// Decode and re-encode with mozjpeg inside this process.
    InProcess { quality: f32 },
    /// Run an external program; its standard output is the new image.
    External {
        program: PathBuf,
        template: CompressorTemplate,
    },
}

impl Default for CompressorKind {
    fn default() -> Self {
        CompressorKind::InProcess {
            quality: DEFAULT_QUALITY,
        }
    }
}

/// Where "already optimized" markers live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MarkerBackend {
    /// `user.optimized_at` extended attribute on each image.
    #[default]
    Xattr,
    /// Sidecar JSON index keyed by absolute path.
    Index(PathBuf),
}

/// Owner, group and mode forced onto rewritten files.
///
/// Each `None` keeps the value from the original file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OwnershipOverride {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub mode: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Root directory to scan.
    pub root: PathBuf,
    pub compressor: CompressorKind,
    pub ownership: OwnershipOverride,
    /// Directory name patterns pruned from the walk.
    pub excludes: Vec<String>,
    /// Match `*.jpg`/`*.jpeg` regardless of case.
    pub ignore_case: bool,
    /// Ignore markers and recompress everything.
    pub force: bool,
    /// Wall-clock budget; `None` is unbounded.
    pub max_execution_time: Option<Duration>,
    pub lock_file: PathBuf,
    pub markers: MarkerBackend,
}

impl RunConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            compressor: CompressorKind::default(),
            ownership: OwnershipOverride::default(),
            excludes: Vec::new(),
            ignore_case: false,
            force: false,
            max_execution_time: None,
            lock_file: PathBuf::from(DEFAULT_LOCK_FILE),
            markers: MarkerBackend::default(),
        }
    }
}

/// Converts a budget in minutes into a duration.
pub fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}

/// Parses an octal permission value in `0..=0o777`.
pub fn parse_mode(value: &str) -> Result<u32> {
    let digits = value.strip_prefix("0o").unwrap_or(value);
    let mode = u32::from_str_radix(digits, 8)
        .map_err(|_| OptimizeError::InvalidMode(format!("{:?} is not an octal number", value)))?;
    if mode > MAX_MODE {
        return Err(OptimizeError::InvalidMode(format!(
            "{:o} is outside 0..=777",
            mode
        )));
    }
    Ok(mode)
}

/// Parses the in-process encoder quality (1 to 100).
pub fn parse_quality(value: &str) -> Result<f32> {
    match value.parse::<f32>() {
        Ok(q) if (1.0..=100.0).contains(&q) => Ok(q),
        _ => Err(OptimizeError::InvalidQuality(value.to_string())),
    }
}

/// Resolves a user name (or numeric uid) to a uid.
pub fn resolve_uid(value: &str) -> Result<u32> {
    if let Ok(uid) = value.parse::<u32>() {
        return Ok(uid);
    }
    let name = CString::new(value).map_err(|_| OptimizeError::UnknownUser(value.to_string()))?;
    let passwd = unsafe { libc::getpwnam(name.as_ptr()) };
    if passwd.is_null() {
        return Err(OptimizeError::UnknownUser(value.to_string()));
    }
    Ok(unsafe { (*passwd).pw_uid })
}

/// Resolves a group name (or numeric gid) to a gid.
pub fn resolve_gid(value: &str) -> Result<u32> {
    if let Ok(gid) = value.parse::<u32>() {
        return Ok(gid);
    }
    let name = CString::new(value).map_err(|_| OptimizeError::UnknownGroup(value.to_string()))?;
    let group = unsafe { libc::getgrnam(name.as_ptr()) };
    if group.is_null() {
        return Err(OptimizeError::UnknownGroup(value.to_string()));
    }
    Ok(unsafe { (*group).gr_gid })
}
