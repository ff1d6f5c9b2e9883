//! # parse-stress
//!
//! A concurrent stress harness for JSON parsers.
//!
//! Parsers that keep per-parse state in the instance work fine from one
//! thread and fall apart when an instance is shared. This crate schedules a
//! fixed workload of parse tasks onto a thread pool, counts how many succeed
//! and fail, and reports every captured error, so that kind of defect shows
//! up as numbers instead of folklore.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parse_stress::{HarnessConfig, ParserSource, SharedBufferParser, StressHarness, DEFAULT_INPUTS};
//!
//! let harness = StressHarness::with_config(HarnessConfig::from_env());
//!
//! // One instance for everybody: expect failures under contention.
//! let racy = ParserSource::shared(SharedBufferParser::new());
//! let report = harness.run(DEFAULT_INPUTS, &racy).unwrap();
//! println!("{} of {} parses failed", report.error_count, report.total());
//!
//! // One instance per task: no sharing, no race.
//! let fixed = ParserSource::per_task(SharedBufferParser::new);
//! assert!(harness.run(DEFAULT_INPUTS, &fixed).unwrap().is_clean());
//! ```
//!
//! ## Features
//!
//! - **`hdr`**: Enable HDR histogram for parse latency percentiles

mod config;
mod harness;
mod parser;
mod probe;
mod report;
mod result;
mod source;

pub use config::HarnessConfig;
pub use harness::{run, HarnessError, StressHarness, DEFAULT_INPUTS};
pub use parser::{
    MonitoredParser, ParseError, ParseErrorKind, Parser, SerdeParser, SharedBufferParser,
    DEFAULT_CHUNK_CHARS,
};
pub use probe::{format_probe, probe, ProbeReport, DEFAULT_PROBE_DELAY, NESTED_DOCUMENT, SIMPLE_DOCUMENT};
pub use report::{format_summary, ConsoleReporter, JsonReporter, MultiReporter, Reporter};
pub use result::{Failure, ParseOutcome, Report, TaskRecord};
pub use source::{ParserPool, ParserSource, PooledParser, Sharing};

#[cfg(feature = "hdr")]
pub mod histogram;
