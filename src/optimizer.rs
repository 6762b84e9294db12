//! This module decides, image by image, whether to recompress and replace.
//!
//! For each [`Candidate`] the [`Optimizer`]:
//!
//! 1. skips it when its marker is at least as recent as its mtime (unless
//!    forced),
//! 2. asks the compressor for a new payload,
//! 3. keeps the payload only if it is strictly smaller, replacing the file
//!    atomically with the resolved owner, group and mode,
//! 4. records a marker, except when the replacement itself failed so the file
//!    is retried next run.
//!
//! Nothing that goes wrong with a single image escapes as an error; every path
//! ends in an [`Outcome`].

use tracing::{debug, warn};

use crate::{
    candidate::Candidate,
    compressor::Compressor,
    config::OwnershipOverride,
    marker::{MarkerStore, Timestamp},
    writer::{self, FileOwnership},
};

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Marker is current; the compressor was not invoked.
    Skipped,
    /// Rewritten with a smaller payload.
    Improved { before: u64, after: u64 },
    /// Compressor output was not smaller; file left alone.
    NoGain { size: u64, compressed: u64 },
    /// Compressor failed; file left alone but marked.
    CompressFailed { size: u64, reason: String },
    /// Replacement failed; file left alone and not marked.
    WriteFailed { size: u64, error: String },
}

impl Outcome {
    /// Bytes before and after, as they count towards the run totals.
    ///
    /// Anything but an improvement counts the original size on both sides.
    /// Skipped files do not count at all.
    pub fn sizes(&self) -> Option<(u64, u64)> {
        match *self {
            Outcome::Skipped => None,
            Outcome::Improved { before, after } => Some((before, after)),
            Outcome::NoGain { size, .. }
            | Outcome::CompressFailed { size, .. }
            | Outcome::WriteFailed { size, .. } => Some((size, size)),
        }
    }
}

/// Relative size change in percent, negative when the file shrank.
pub fn percent_change(before: u64, after: u64) -> f64 {
    if before == 0 {
        return 0.0;
    }
    (after as f64 - before as f64) * 100.0 / before as f64
}

/// The per-image decision engine.
pub struct Optimizer<'a> {
    compressor: &'a dyn Compressor,
    markers: &'a dyn MarkerStore,
    ownership: OwnershipOverride,
    force: bool,
}

impl<'a> Optimizer<'a> {
    pub fn new(compressor: &'a dyn Compressor, markers: &'a dyn MarkerStore) -> Self {
        Self {
            compressor,
            markers,
            ownership: OwnershipOverride::default(),
            force: false,
        }
    }

    /// Ignore markers and process every candidate.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_ownership(mut self, ownership: OwnershipOverride) -> Self {
        self.ownership = ownership;
        self
    }

    /// True when the candidate's content was already confirmed optimized.
    pub fn is_already_optimized(&self, candidate: &Candidate) -> bool {
        self.markers
            .get(&candidate.path)
            .is_some_and(|optimized_at| optimized_at >= candidate.mtime)
    }

    pub fn process(&self, candidate: &Candidate) -> Outcome {
        let path = candidate.path.display();
        if !self.force && self.is_already_optimized(candidate) {
            debug!("skipping {}, image was already optimized.", path);
            return Outcome::Skipped;
        }

        let size = candidate.size;
        debug!("processing {} (filesize={})", path, size);
        let output = match self.compressor.compress(&candidate.path) {
            Ok(output) => output,
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!("failed optimization on {} ({})", path, reason);
                // marked anyway so an unchanged file does not fail every run
                self.mark(candidate);
                return Outcome::CompressFailed { size, reason };
            }
        };

        let compressed = output.len() as u64;
        if compressed >= size {
            self.mark(candidate);
            debug!(
                "skipping {}, optimization not applicable (filesize={})",
                path, compressed
            );
            return Outcome::NoGain { size, compressed };
        }

        let ownership = FileOwnership::resolve(candidate, &self.ownership);
        match writer::replace(&candidate.path, &output, &ownership) {
            Ok(()) => {
                self.mark(candidate);
                debug!(
                    "successfully optimized {}: filesize={} ({:.2}%)",
                    path,
                    compressed,
                    percent_change(size, compressed)
                );
                Outcome::Improved {
                    before: size,
                    after: compressed,
                }
            }
            Err(e) => {
                warn!("skipping {}: {}", path, e);
                Outcome::WriteFailed {
                    size,
                    error: e.to_string(),
                }
            }
        }
    }

    fn mark(&self, candidate: &Candidate) {
        if let Err(e) = self.markers.set(&candidate.path, Timestamp::now()) {
            warn!("{}", e);
        }
    }
}
