//! Experiment driving for the scal queue benchmarks.
//!
//! The benchmarks themselves are separate native binaries. This crate builds
//! their command lines from a sweep (queues x works x thread counts), runs
//! them one at a time, and post-processes what they print: merging runs into
//! per-series data files, averaging repeated runs, and feeding operation logs
//! to the fairness analyzer.
#[macro_use]
extern crate lazy_static;

pub mod average;
pub mod command;
pub mod config;
pub mod driver;
pub mod error;
pub mod fairness;
pub mod merge;
pub mod process;
pub mod registry;

pub use crate::average::{average, average_all, MixedColumnPolicy};
pub use crate::command::{BenchmarkKind, CommandBuilder, Invocation, OutputMode, RunRecord};
pub use crate::config::Config;
pub use crate::driver::{run_sweep, CellOutcome, RunOptions, SweepReport, SweepSpec};
pub use crate::error::{Error, ErrorClass, Result};
pub use crate::fairness::analyze_logs;
pub use crate::merge::{merge_series, MergeReport, SeriesAxis};
pub use crate::process::{CancelToken, Launcher, ProcessLauncher};
pub use crate::registry::Registry;
