//! # optimize-image
//!
//! Command line front end for the `optimg` library. It parses the arguments,
//! sets up logging on stderr and performs a single run over `IMAGESPATH`.
//!
//! Exit status is 0 when the run completes or another run already holds the
//! lock, 1 on a fatal error, and 2 on a usage error.

mod args;

use std::process::ExitCode;

use anyhow::Result;
use args::Args;
use clap::Parser;
use optimg::prelude::*;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.verbose);

    let json = args.json;
    let runner = Runner::new(args.into_config());
    match runner.run() {
        Ok(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ OptimizeError::AlreadyRunning(_)) => {
            error!("{}", e);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("{}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// `--verbose` forces debug output; otherwise `RUST_LOG` applies, then info.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
