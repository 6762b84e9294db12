//! # Run Controller
//!
//! Ties the pieces together for one unattended run:
//!
//! 1. take the system-wide [`RunLock`], or give up without touching anything,
//! 2. build the compressor and marker store from the [`RunConfig`],
//! 3. walk the tree, handing each image to the [`Optimizer`] until the walk
//!    ends or the wall-clock [`Budget`] runs out,
//! 4. flush markers and log the size totals.
//!
//! The budget is checked between images, never during one: an image whose
//! compression has started is always finished.

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    candidate::{self, Candidate, CandidateFilter},
    compressor,
    config::{MarkerBackend, RunConfig},
    error::{OptimizeError, Result},
    lock::RunLock,
    marker::{IndexMarkerStore, MarkerStore, XattrMarkerStore},
    optimizer::{percent_change, Optimizer, Outcome},
};

/// Bytes before and after optimization, over every processed image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    pub before: u64,
    pub after: u64,
}

impl RunTotals {
    pub fn record(&mut self, outcome: &Outcome) {
        if let Some((before, after)) = outcome.sizes() {
            self.before += before;
            self.after += after;
        }
    }

    pub fn saved(&self) -> u64 {
        self.before.saturating_sub(self.after)
    }

    pub fn percent_change(&self) -> f64 {
        percent_change(self.before, self.after)
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub totals: RunTotals,
    pub improved: usize,
    pub no_gain: usize,
    pub skipped: usize,
    pub compress_failed: usize,
    pub write_failed: usize,
    /// Paths that vanished or could not be stat'ed before processing.
    pub unreadable: usize,
    /// The scan stopped because the budget ran out.
    pub budget_exhausted: bool,
}

impl RunReport {
    pub fn record(&mut self, outcome: &Outcome) {
        self.totals.record(outcome);
        match outcome {
            Outcome::Skipped => self.skipped += 1,
            Outcome::Improved { .. } => self.improved += 1,
            Outcome::NoGain { .. } => self.no_gain += 1,
            Outcome::CompressFailed { .. } => self.compress_failed += 1,
            Outcome::WriteFailed { .. } => self.write_failed += 1,
        }
    }

    /// Number of images handed to the optimizer.
    pub fn processed(&self) -> usize {
        self.improved + self.no_gain + self.skipped + self.compress_failed + self.write_failed
    }
}

/// Wall-clock limit on starting new images.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    deadline: Option<Instant>,
}

impl Budget {
    /// Starts the clock now. `None`, or a limit too far out to represent,
    /// never runs out.
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            deadline: limit.and_then(|limit| Instant::now().checked_add(limit)),
        }
    }

    pub fn unlimited() -> Self {
        Self { deadline: None }
    }

    pub fn is_exhausted(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Runs the optimizer over `paths` until they run out or the budget does.
pub fn scan<I>(paths: I, optimizer: &Optimizer<'_>, budget: &Budget) -> RunReport
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut report = RunReport::default();
    for path in paths {
        if budget.is_exhausted() {
            info!("maximum execution time exceeded, exiting.");
            report.budget_exhausted = true;
            break;
        }
        let candidate = match Candidate::capture(&path) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!("skipping {}: {}", path.display(), e);
                report.unreadable += 1;
                continue;
            }
        };
        let outcome = optimizer.process(&candidate);
        report.record(&outcome);
    }
    report
}

/// Logs the aggregate size line for a run.
pub fn log_totals(totals: &RunTotals) {
    if totals.before > 0 {
        info!(
            "total jpeg size: {} => {} ({:.2}%)",
            totals.before,
            totals.after,
            totals.percent_change()
        );
    } else {
        info!("nothing to do.");
    }
}

/// One complete optimization run.
pub struct Runner {
    config: RunConfig,
}

impl Runner {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Executes the run.
    ///
    /// Fails without touching any image when the lock is busy
    /// ([`OptimizeError::AlreadyRunning`]), the compressor is missing, the
    /// marker index is unreadable or the image root does not exist.
    /// Problems with individual images are logged and counted in the report.
    pub fn run(&self) -> Result<RunReport> {
        let config = &self.config;
        let _lock = RunLock::try_acquire(&config.lock_file)?
            .ok_or_else(|| OptimizeError::AlreadyRunning(config.lock_file.clone()))?;

        let compressor = compressor::from_kind(&config.compressor)?;
        debug!("using {}", compressor.describe());

        let markers: Box<dyn MarkerStore> = match &config.markers {
            MarkerBackend::Xattr => Box::new(XattrMarkerStore),
            MarkerBackend::Index(path) => Box::new(IndexMarkerStore::open(path)?),
        };

        if !config.root.is_dir() {
            return Err(OptimizeError::RootNotFound(config.root.clone()));
        }
        let filter = CandidateFilter::new(config.excludes.as_slice(), config.ignore_case)?;

        let optimizer = Optimizer::new(compressor.as_ref(), markers.as_ref())
            .with_force(config.force)
            .with_ownership(config.ownership);
        let budget = Budget::new(config.max_execution_time);

        let report = scan(
            candidate::discover(&config.root, &filter),
            &optimizer,
            &budget,
        );

        if let Err(e) = markers.flush() {
            warn!("{}", e);
        }
        log_totals(&report.totals);
        Ok(report)
    }
}
