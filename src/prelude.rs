pub use crate::candidate::{discover, Candidate, CandidateFilter};
pub use crate::compressor::{Compressor, ExternalCompressor, MozjpegCompressor};
pub use crate::config::{CompressorKind, MarkerBackend, OwnershipOverride, RunConfig};
pub use crate::error::{OptimizeError, Result};
pub use crate::marker::{
    IndexMarkerStore, MarkerStore, MemoryMarkerStore, Timestamp, XattrMarkerStore,
};
pub use crate::optimizer::{Optimizer, Outcome};
pub use crate::runner::{scan, Budget, RunReport, RunTotals, Runner};
pub use crate::template::CompressorTemplate;
pub use crate::writer::FileOwnership;
