//! Pluggable reporters for stress run output.
//!
//! All reporters implement the `Reporter` trait and are designed to be:
//! - Non-panicking: errors are logged but never propagate
//! - Atomic: output is written in complete blocks so worker threads cannot interleave

use crate::config::HarnessConfig;
use crate::result::{Report, TaskRecord};
use crate::source::Sharing;
use log::warn;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// Trait for stress run reporters.
///
/// `task_end` is called from worker threads, in completion order. A panic in
/// any hook aborts the run with an error rather than unwinding through it.
pub trait Reporter: Send + Sync {
    /// Called before any task is dispatched.
    fn run_start(&self, _config: &HarnessConfig, _parser: &str, _sharing: Sharing) {}

    /// Called when a task completes, successfully or not.
    fn task_end(&self, _record: &TaskRecord) {}

    /// Called once every task has finished.
    fn run_end(&self, _report: &Report) {}
}

const RULE: &str = "---------------------------------------------------------------";
const FAILURE_RULE: &str = "--------------------";

/// Console reporter that prints results to stdout.
pub struct ConsoleReporter {
    show_tasks: bool,
    /// Mutex ensures atomic writes across threads.
    output_lock: Mutex<()>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            show_tasks: false,
            output_lock: Mutex::new(()),
        }
    }

    /// Print one line per completed task as it finishes.
    pub fn show_tasks(mut self, show: bool) -> Self {
        self.show_tasks = show;
        self
    }

    fn format_task(record: &TaskRecord) -> String {
        let status = match record.outcome.error() {
            None => "ok".to_string(),
            Some(e) => format!("failed ({})", e.kind),
        };
        format!(
            "  task {:>5} [input {}] {:<24} {:>10}",
            record.task,
            record.input_index,
            status,
            format_duration(record.elapsed)
        )
    }

    /// Atomically write a complete message to stdout.
    /// Never panics; logs a warning on error.
    fn write_stdout(&self, message: &str) {
        // Ignore poison: another thread panicked while printing
        let _guard = self.output_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", message) {
            warn!("failed to write to stdout: {}", e);
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn run_start(&self, config: &HarnessConfig, parser: &str, sharing: Sharing) {
        let header = format!(
            "{RULE}\n\
             Parse Stress: {} ({})\n\
             Tasks: {}, Workers: {}, Max delay: {}\n\
             {RULE}",
            parser,
            sharing,
            config.tasks,
            config.workers,
            format_duration(config.max_delay)
        );
        self.write_stdout(&header);
    }

    fn task_end(&self, record: &TaskRecord) {
        if self.show_tasks {
            self.write_stdout(&Self::format_task(record));
        }
    }

    fn run_end(&self, report: &Report) {
        self.write_stdout(&format_summary(report));
    }
}

/// Render the human-readable summary of a report.
///
/// Totals always appear; the error section only when something failed.
pub fn format_summary(report: &Report) -> String {
    let mut output = String::new();
    output.push_str(RULE);
    output.push('\n');
    output.push_str("Test complete!\n");
    output.push_str(&format!("Runs:      {}\n", report.total()));
    output.push_str(&format!("Succeeded: {}\n", report.success_count));
    output.push_str(&format!("Failed:    {}\n", report.error_count));
    output.push_str(&format!(
        "Elapsed:   {}\n",
        format_duration(report.total_duration)
    ));

    if let (Some(min), Some(median), Some(max)) = (
        report.min_parse_time(),
        report.median_parse_time(),
        report.max_parse_time(),
    ) {
        output.push_str(&format!(
            "Parse:     min {}, median {}, max {}\n",
            format_duration(min),
            format_duration(median),
            format_duration(max)
        ));
    }

    #[cfg(feature = "hdr")]
    if let Some(h) = crate::histogram::LatencyHistogram::from_durations(&report.parse_times) {
        output.push_str(&format!(
            "Parse:     p50 {}, p90 {}, p99 {}, max {}\n",
            format_duration(h.percentile(50.0)),
            format_duration(h.percentile(90.0)),
            format_duration(h.percentile(99.0)),
            format_duration(h.max())
        ));
    }

    output.push_str(RULE);
    output.push('\n');

    if !report.failures.is_empty() {
        output.push_str("\nErrors:\n");
        for (kind, count) in report.failures_by_kind() {
            output.push_str(&format!("  {:<14} {}\n", kind.as_str(), count));
        }
        output.push('\n');
        for failure in &report.failures {
            output.push_str(&format!(
                "Task:          {} (input {})\n",
                failure.task, failure.input_index
            ));
            output.push_str(&format!("Error kind:    {}\n", failure.kind));
            output.push_str(&format!("Error message: {}\n", failure.message));
            output.push_str(FAILURE_RULE);
            output.push('\n');
        }
    }

    output
}

/// JSON reporter that writes results to a directory.
///
/// Writes `{started_at}.json` and `{started_at}.txt`, plus `latest.json`
/// and `latest.txt` pointing at the most recent run.
pub struct JsonReporter {
    output_dir: PathBuf,
}

impl JsonReporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn write_results(&self, report: &Report) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
        let summary = format_summary(report);

        let json_path = self.output_dir.join(format!("{}.json", report.started_at));
        std::fs::write(&json_path, &json)?;
        std::fs::write(
            self.output_dir.join(format!("{}.txt", report.started_at)),
            &summary,
        )?;

        std::fs::write(self.output_dir.join("latest.json"), &json)?;
        std::fs::write(self.output_dir.join("latest.txt"), &summary)?;

        Ok(json_path)
    }
}

impl Reporter for JsonReporter {
    fn run_end(&self, report: &Report) {
        match self.write_results(report) {
            Ok(path) => eprintln!("  Results written to: {}", path.display()),
            Err(e) => warn!(
                "failed to write results to {}: {}",
                self.output_dir.display(),
                e
            ),
        }
    }
}

/// Combines multiple reporters.
///
/// A panic in one reporter does not affect the others.
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new(reporters: Vec<Box<dyn Reporter>>) -> Self {
        Self { reporters }
    }
}

impl Reporter for MultiReporter {
    fn run_start(&self, config: &HarnessConfig, parser: &str, sharing: Sharing) {
        for r in &self.reporters {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                r.run_start(config, parser, sharing);
            }));
        }
    }

    fn task_end(&self, record: &TaskRecord) {
        for r in &self.reporters {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                r.task_end(record);
            }));
        }
    }

    fn run_end(&self, report: &Report) {
        for r in &self.reporters {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                r.run_end(report);
            }));
        }
    }
}

/// Format a duration with consistent units: ns, us, ms, or s.
pub(crate) fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs_f64();
    if secs >= 1.0 {
        format!("{:.2}s", secs)
    } else if secs >= 0.001 {
        format!("{:.2}ms", secs * 1_000.0)
    } else if secs >= 0.000_001 {
        format!("{:.2}us", secs * 1_000_000.0)
    } else {
        format!("{:.2}ns", secs * 1_000_000_000.0)
    }
}
