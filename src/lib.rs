//! # optimg
//!
//! optimg recompresses JPEG images in place to save storage, remembers which
//! images it has already optimized, and puts owner, group and mode back after
//! every rewrite. It is built for unattended batch runs over large media trees.
//!
//! ## Features
//!
//! - **Idempotent**: an "optimized at" marker stored outside the image bytes
//!   lets later runs skip unchanged files.
//! - **Never grows a file**: a rewrite happens only when the new payload is
//!   strictly smaller.
//! - **Atomic**: new content is written beside the original and renamed over
//!   it, with ownership and mode applied first.
//! - **Pluggable compressor**: in-process mozjpeg or any external program that
//!   writes the recompressed JPEG to standard output.
//! - **Bounded**: a wall-clock budget and a system-wide lock make it safe to
//!   run from cron.
//!
//! ## Modules
//!
//! - `runner`: the run controller and the entry point for a full run.
//! - `optimizer`: the per-image decision engine.
//! - `compressor`: in-process and external compressors.
//! - `writer`: atomic replacement with ownership and mode.
//! - `marker`: "already optimized" marker stores.
//! - `candidate`: tree walking and the per-file stat snapshot.
//! - `lock`: the single-instance run lock.
//! - `template`: the external compressor's argument template.
//! - `config`: run configuration and its parsing helpers.
//! - `error`: the error type for the library.
//! - `prelude`: a collection of the most commonly used types.

pub mod candidate;
pub mod compressor;
pub mod config;
pub mod error;
pub mod lock;
pub mod marker;
pub mod optimizer;
pub mod prelude;
pub mod runner;
pub mod template;
pub mod writer;
