//! Two-thread interference probe.
//!
//! A long parse and a short parse race on one parser instance, with the
//! short one started after a fixed delay so it lands while the long one is
//! still in progress. Handy for poking at a single parser by hand; the main
//! harness is the statistical version of the same experiment.

use crate::harness::{guarded_parse, join_worker, HarnessError};
use crate::parser::Parser;
use crate::result::ParseOutcome;
use log::debug;
use std::time::Duration;

/// Document parsed by the first probe thread.
pub const NESTED_DOCUMENT: &str = r#"{"level1":{"level2":{"level3":{"data":"value"}}}}"#;
/// Document parsed by the second probe thread.
pub const SIMPLE_DOCUMENT: &str = r#"{"key":"value"}"#;
/// How long the second thread waits before parsing.
pub const DEFAULT_PROBE_DELAY: Duration = Duration::from_millis(5);

/// Outcomes of both probe threads.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// The nested parse, started immediately.
    pub first: ParseOutcome,
    /// The simple parse, started after the delay.
    pub second: ParseOutcome,
}

impl ProbeReport {
    /// True if either parse failed.
    pub fn interfered(&self) -> bool {
        !self.first.is_success() || !self.second.is_success()
    }
}

/// Race a nested parse against a delayed simple parse on the same parser.
pub fn probe<P: Parser>(parser: &P, delay: Duration) -> Result<ProbeReport, HarnessError> {
    debug!("probing {} with {:?} delay", parser.name(), delay);

    std::thread::scope(|scope| -> Result<ProbeReport, HarnessError> {
        let first = std::thread::Builder::new()
            .name("probe-nested".to_string())
            .spawn_scoped(scope, || guarded_parse(|| parser.parse(NESTED_DOCUMENT)))?;
        let second = std::thread::Builder::new()
            .name("probe-simple".to_string())
            .spawn_scoped(scope, move || {
                std::thread::sleep(delay);
                guarded_parse(|| parser.parse(SIMPLE_DOCUMENT))
            })?;

        Ok(ProbeReport {
            first: join_worker(first, 0)?,
            second: join_worker(second, 1)?,
        })
    })
}

/// Render a probe report for the console.
pub fn format_probe(report: &ProbeReport) -> String {
    let line = |label: &str, outcome: &ParseOutcome| match outcome.error() {
        None => format!("{label}: ok\n"),
        Some(e) => format!("{label}: {}: {}\n", e.kind, e.message),
    };

    let mut output = String::new();
    output.push_str(&line("Thread 1 (nested)", &report.first));
    output.push_str(&line("Thread 2 (simple)", &report.second));
    if report.interfered() {
        output.push_str("Interference detected\n");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseError, ParseErrorKind, SerdeParser};

    #[test]
    fn should_pass_probe_with_thread_safe_parser() {
        let report = probe(&SerdeParser::new(), DEFAULT_PROBE_DELAY).unwrap();
        assert!(report.first.is_success());
        assert!(report.second.is_success());
        assert!(!report.interfered());
    }

    #[test]
    fn should_format_failures_and_flag_interference() {
        let report = ProbeReport {
            first: ParseOutcome::Success,
            second: ParseOutcome::Failure(ParseError::new(ParseErrorKind::Eof, "EOF")),
        };
        let text = format_probe(&report);
        assert!(text.contains("Thread 1 (nested): ok"));
        assert!(text.contains("Thread 2 (simple): UnexpectedEof: EOF"));
        assert!(text.contains("Interference detected"));
    }
}
