//! # Marker Store
//!
//! A marker records when a file's current content was last confirmed
//! optimized. It lives outside the file's bytes, so reading the image never
//! disturbs it, and it is compared against the file's modification time: a
//! marker older than the mtime means the content changed since and the file is
//! due again.
//!
//! Three stores share the [`MarkerStore`] trait:
//!
//! - [`XattrMarkerStore`]: the `user.optimized_at` extended attribute.
//! - [`IndexMarkerStore`]: a sidecar JSON index, for filesystems without user
//!   extended attributes.
//! - [`MemoryMarkerStore`]: process-local, nothing persisted.

use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, HashMap},
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{OptimizeError, Result};

/// Extended attribute holding the marker.
pub const MARKER_ATTRIBUTE: &str = "user.optimized_at";

/// Seconds since the Unix epoch, with fractional part.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

impl Timestamp {
    pub fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    /// The current time, rounded up to the next millisecond.
    ///
    /// Rounding up keeps a marker written right after a rewrite at or above
    /// the rewritten file's mtime.
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let mut millis = elapsed.as_millis();
        if elapsed.subsec_nanos() % 1_000_000 != 0 {
            millis += 1;
        }
        Self(millis as f64 / 1000.0)
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => Self(after.as_secs_f64()),
            Err(before) => Self(-before.duration().as_secs_f64()),
        }
    }

    pub fn as_secs(&self) -> f64 {
        self.0
    }

    fn encode(&self) -> String {
        format!("{:.3}", self.0)
    }

    /// Parses a stored value. Plain integral seconds are accepted too.
    fn decode(raw: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(raw).ok()?;
        let secs = text.trim().parse::<f64>().ok()?;
        secs.is_finite().then_some(Self(secs))
    }
}

/// Persistent "last optimized" timestamps, keyed by file.
pub trait MarkerStore {
    /// Reads the marker. Unset and unreadable markers are both `None`.
    fn get(&self, path: &Path) -> Option<Timestamp>;

    /// Writes or overwrites the marker.
    fn set(&self, path: &Path, at: Timestamp) -> Result<()>;

    /// Persists buffered markers.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Markers kept in the `user.optimized_at` extended attribute.
#[derive(Debug, Default, Clone, Copy)]
pub struct XattrMarkerStore;

impl MarkerStore for XattrMarkerStore {
    fn get(&self, path: &Path) -> Option<Timestamp> {
        match xattr::get(path, MARKER_ATTRIBUTE) {
            Ok(Some(raw)) => {
                let parsed = Timestamp::decode(&raw);
                if parsed.is_none() {
                    debug!("ignoring malformed marker on {}", path.display());
                }
                parsed
            }
            Ok(None) => None,
            Err(e) => {
                debug!("cannot read marker on {}: {}", path.display(), e);
                None
            }
        }
    }

    fn set(&self, path: &Path, at: Timestamp) -> Result<()> {
        xattr::set(path, MARKER_ATTRIBUTE, at.encode().as_bytes()).map_err(|e| {
            OptimizeError::Marker(format!(
                "cannot set {} on {}: {}",
                MARKER_ATTRIBUTE,
                path.display(),
                e
            ))
        })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    markers: BTreeMap<String, Timestamp>,
}

/// Unsaved markers that trigger a write of the index.
pub const INDEX_FLUSH_EVERY: usize = 32;

/// Age of the oldest unsaved marker that triggers a write of the index.
pub const INDEX_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Markers kept in a JSON index file, keyed by absolute path.
///
/// The index is read once by [`IndexMarkerStore::open`] and written back
/// atomically by [`MarkerStore::flush`]. `set` also writes it once
/// [`INDEX_FLUSH_EVERY`] markers are pending or the last write is older than
/// [`INDEX_FLUSH_INTERVAL`], and dropping the store writes whatever is left,
/// so an interrupted run loses at most a handful of markers.
#[derive(Debug)]
pub struct IndexMarkerStore {
    path: PathBuf,
    index: RefCell<IndexFile>,
    pending: Cell<usize>,
    last_flush: Cell<Instant>,
    flush_every: usize,
}

impl IndexMarkerStore {
    /// Opens an index, starting empty if the file does not exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let index = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                OptimizeError::Marker(format!("corrupt index {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => IndexFile::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            index: RefCell::new(index),
            pending: Cell::new(0),
            last_flush: Cell::new(Instant::now()),
            flush_every: INDEX_FLUSH_EVERY,
        })
    }

    /// Writes the index after every `count` new markers (at least one).
    pub fn with_flush_every(mut self, count: usize) -> Self {
        self.flush_every = count.max(1);
        self
    }

    /// Markers set since the index was last written.
    pub fn pending(&self) -> usize {
        self.pending.get()
    }

    pub fn len(&self) -> usize {
        self.index.borrow().markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(path: &Path) -> Option<String> {
        let absolute = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        absolute.to_str().map(str::to_string)
    }
}

impl MarkerStore for IndexMarkerStore {
    fn get(&self, path: &Path) -> Option<Timestamp> {
        let key = Self::key(path)?;
        self.index.borrow().markers.get(&key).copied()
    }

    fn set(&self, path: &Path, at: Timestamp) -> Result<()> {
        let key = Self::key(path).ok_or_else(|| {
            OptimizeError::Marker(format!("{} is not valid UTF-8", path.display()))
        })?;
        self.index.borrow_mut().markers.insert(key, at);
        self.pending.set(self.pending.get() + 1);
        if self.pending.get() >= self.flush_every
            || self.last_flush.get().elapsed() >= INDEX_FLUSH_INTERVAL
        {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        if self.pending.get() == 0 {
            return Ok(());
        }
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut temp_file = NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut temp_file, &*self.index.borrow())?;
        temp_file.write_all(b"\n")?;
        temp_file.as_file().sync_all()?;
        temp_file.persist(&self.path).map_err(|e| e.error)?;
        crate::writer::sync_dir(parent)?;
        self.pending.set(0);
        self.last_flush.set(Instant::now());
        debug!("saved {} markers to {}", self.len(), self.path.display());
        Ok(())
    }
}

impl Drop for IndexMarkerStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("cannot save marker index {}: {}", self.path.display(), e);
        }
    }
}

/// Markers held in memory only.
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    markers: RefCell<HashMap<PathBuf, Timestamp>>,
}

impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.markers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MarkerStore for MemoryMarkerStore {
    fn get(&self, path: &Path) -> Option<Timestamp> {
        self.markers.borrow().get(path).copied()
    }

    fn set(&self, path: &Path, at: Timestamp) -> Result<()> {
        self.markers.borrow_mut().insert(path.to_path_buf(), at);
        Ok(())
    }
}
