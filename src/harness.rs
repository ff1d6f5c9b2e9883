//! The stress harness.
//!
//! A run schedules a fixed number of parse tasks onto a bounded pool of OS
//! threads. Workers pull task indices from a shared atomic cursor until the
//! workload is exhausted; the run returns once every worker has been joined.
//!
//! Each task sleeps a random delay to widen interleaving windows, parses its
//! input through the [`ParserSource`], and turns the result (or a panic) into
//! a [`ParseOutcome`]. Nothing a task does can abort the run.

use crate::config::HarnessConfig;
use crate::parser::{ParseError, ParseErrorKind, Parser};
use crate::report::{ConsoleReporter, JsonReporter, Reporter};
use crate::result::{Failure, ParseOutcome, Report, TaskRecord};
use crate::source::ParserSource;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::ScopedJoinHandle;
use std::time::{Duration, Instant};

/// The input set used when none is supplied.
pub const DEFAULT_INPUTS: &[&str] = &[
    r#"{"key1":"value1", "key2":{"nested":"value"}}"#,
    r#"[1,2,{"array":"test"}]"#,
    r#"{"array":[1,2,3],"object":{"nested":"value"}}"#,
    r#"{"key":"value"}"#,
];

/// Errors that abort a whole run.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("worker {worker} died outside the task boundary: {message}")]
    WorkerPanicked { worker: usize, message: String },
    #[error("reporter panicked in {hook}: {message}")]
    ReporterPanicked { hook: &'static str, message: String },
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Concurrent stress harness for a JSON parser.
///
/// # Example
///
/// ```rust,no_run
/// use parse_stress::{HarnessConfig, ParserSource, SharedBufferParser, StressHarness, DEFAULT_INPUTS};
///
/// let harness = StressHarness::with_config(HarnessConfig::new().tasks(100).workers(10));
/// let source = ParserSource::shared(SharedBufferParser::new());
///
/// let report = harness.run(DEFAULT_INPUTS, &source).unwrap();
/// assert_eq!(report.total(), 100);
/// ```
pub struct StressHarness {
    config: HarnessConfig,
    reporters: Vec<Box<dyn Reporter>>,
}

impl StressHarness {
    /// Create a harness with config from the environment.
    pub fn new() -> Self {
        Self::with_config(HarnessConfig::from_env())
    }

    /// Create a harness with explicit config.
    ///
    /// Reporters default to the console (when verbose) plus JSON output
    /// (when an output directory is set).
    pub fn with_config(config: HarnessConfig) -> Self {
        let mut reporters: Vec<Box<dyn Reporter>> = Vec::new();
        if config.verbose {
            reporters.push(Box::new(ConsoleReporter::new()));
        }
        if let Some(dir) = &config.output_dir {
            reporters.push(Box::new(JsonReporter::new(dir.clone())));
        }

        Self { config, reporters }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Replace reporters with a custom set.
    pub fn reporters(&mut self, reporters: Vec<Box<dyn Reporter>>) -> &mut Self {
        self.reporters = reporters;
        self
    }

    /// Add an additional reporter.
    pub fn add_reporter(&mut self, reporter: Box<dyn Reporter>) -> &mut Self {
        self.reporters.push(reporter);
        self
    }

    /// Run the configured workload and wait for every task to finish.
    ///
    /// Task `i` parses `inputs[i % inputs.len()]`.
    pub fn run<P, S>(&self, inputs: &[S], source: &ParserSource<P>) -> Result<Report, HarnessError>
    where
        P: Parser,
        S: AsRef<str> + Sync,
    {
        self.validate(inputs.len())?;

        let started_at = unix_millis_timestamp();
        let start = Instant::now();
        let pool_size = self.config.workers.min(self.config.tasks);

        debug!(
            "starting run: {} tasks on {} workers, parser {} ({})",
            self.config.tasks,
            pool_size,
            source.parser_name(),
            source.sharing()
        );

        for r in &self.reporters {
            notify("run_start", || {
                r.run_start(&self.config, source.parser_name(), source.sharing())
            })?;
        }

        let dispatch = Dispatch {
            inputs,
            source,
            config: &self.config,
            reporters: &self.reporters,
            cursor: AtomicUsize::new(0),
            successes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        };

        let mut records = std::thread::scope(|scope| -> Result<Vec<TaskRecord>, HarnessError> {
            let dispatch = &dispatch;
            let mut handles = Vec::with_capacity(pool_size);
            for worker in 0..pool_size {
                let handle = std::thread::Builder::new()
                    .name(format!("parse-worker-{}", worker))
                    .spawn_scoped(scope, move || dispatch.work())?;
                handles.push(handle);
            }

            // Join every worker before reporting the first failure so no
            // panicked thread is left for the scope to re-raise.
            let mut records = Vec::with_capacity(self.config.tasks);
            let mut first_err = None;
            for (worker, handle) in handles.into_iter().enumerate() {
                match join_worker(handle, worker) {
                    Ok(batch) => records.extend(batch),
                    Err(e) => {
                        first_err.get_or_insert(e);
                    }
                }
            }
            match first_err {
                Some(e) => Err(e),
                None => Ok(records),
            }
        })?;

        records.sort_by_key(|r| r.task);

        let failures = records
            .iter()
            .filter_map(|r| {
                r.outcome.error().map(|e| Failure {
                    task: r.task,
                    input_index: r.input_index,
                    kind: e.kind,
                    message: e.message.clone(),
                })
            })
            .collect();

        let report = Report {
            task_count: self.config.tasks,
            worker_count: self.config.workers,
            success_count: dispatch.successes.load(Ordering::SeqCst),
            error_count: dispatch.errors.load(Ordering::SeqCst),
            failures,
            parser: source.parser_name().to_string(),
            sharing: source.sharing(),
            started_at,
            total_duration: start.elapsed(),
            parse_times: records.iter().map(|r| r.elapsed).collect(),
        };
        debug_assert_eq!(report.total(), records.len());

        debug!(
            "run finished: {} succeeded, {} failed in {:?}",
            report.success_count, report.error_count, report.total_duration
        );

        for r in &self.reporters {
            notify("run_end", || r.run_end(&report))?;
        }

        Ok(report)
    }

    fn validate(&self, input_count: usize) -> Result<(), HarnessError> {
        if self.config.workers == 0 {
            return Err(HarnessError::InvalidConfig(
                "worker count must be greater than zero".to_string(),
            ));
        }
        if self.config.tasks > 0 && input_count == 0 {
            return Err(HarnessError::InvalidConfig(
                "at least one input is required".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StressHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `task_count` parses of `inputs` on `worker_count` threads, all sharing
/// `parser`. Tasks keep the default random delay; no reporters are attached.
pub fn run<P, S>(
    inputs: &[S],
    task_count: usize,
    worker_count: usize,
    parser: P,
) -> Result<Report, HarnessError>
where
    P: Parser,
    S: AsRef<str> + Sync,
{
    let mut harness = StressHarness::with_config(run_config(task_count, worker_count));
    harness.reporters(Vec::new());
    harness.run(inputs, &ParserSource::shared(parser))
}

fn run_config(task_count: usize, worker_count: usize) -> HarnessConfig {
    HarnessConfig::new()
        .tasks(task_count)
        .workers(worker_count)
        .verbose(false)
}

/// Call a reporter hook on the caller thread, turning a panic into an error.
fn notify<F: FnOnce()>(hook: &'static str, f: F) -> Result<(), HarnessError> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| HarnessError::ReporterPanicked {
        hook,
        message: panic_message(payload.as_ref()),
    })
}

/// State shared by all workers of one run.
struct Dispatch<'a, P, S> {
    inputs: &'a [S],
    source: &'a ParserSource<P>,
    config: &'a HarnessConfig,
    reporters: &'a [Box<dyn Reporter>],
    cursor: AtomicUsize,
    successes: AtomicUsize,
    errors: AtomicUsize,
}

impl<P, S> Dispatch<'_, P, S>
where
    P: Parser,
    S: AsRef<str> + Sync,
{
    fn work(&self) -> Vec<TaskRecord> {
        let mut records = Vec::new();
        loop {
            let task = self.cursor.fetch_add(1, Ordering::Relaxed);
            if task >= self.config.tasks {
                break;
            }
            records.push(self.run_task(task));
        }
        records
    }

    fn run_task(&self, task: usize) -> TaskRecord {
        let input_index = task % self.inputs.len();
        let text = self.inputs[input_index].as_ref();

        let delay = task_delay(self.config, task);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let start = Instant::now();
        let outcome = guarded_parse(|| self.source.parse(text));
        let elapsed = start.elapsed();

        if outcome.is_success() {
            self.successes.fetch_add(1, Ordering::SeqCst);
        } else {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        let record = TaskRecord {
            task,
            input_index,
            outcome,
            elapsed,
        };
        for r in self.reporters {
            r.task_end(&record);
        }
        record
    }
}

/// Run a parse, converting both errors and panics into an outcome.
pub(crate) fn guarded_parse<F>(f: F) -> ParseOutcome
where
    F: FnOnce() -> Result<serde_json::Value, ParseError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => ParseOutcome::from(result),
        Err(payload) => ParseOutcome::Failure(ParseError::new(
            ParseErrorKind::Panic,
            panic_message(payload.as_ref()),
        )),
    }
}

pub(crate) fn join_worker<T>(
    handle: ScopedJoinHandle<'_, T>,
    worker: usize,
) -> Result<T, HarnessError> {
    handle
        .join()
        .map_err(|payload| HarnessError::WorkerPanicked {
            worker,
            message: panic_message(payload.as_ref()),
        })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Random delay before task `task`, uniform in `[0, max_delay)`.
///
/// With a seed the delay depends only on the seed and the task index.
pub(crate) fn task_delay(config: &HarnessConfig, task: usize) -> Duration {
    let max = config.max_delay.as_micros() as u64;
    if max == 0 {
        return Duration::ZERO;
    }
    let micros = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(task as u64)).gen_range(0..max),
        None => rand::thread_rng().gen_range(0..max),
    };
    Duration::from_micros(micros)
}

fn unix_millis_timestamp() -> String {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", duration.as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{SerdeParser, SharedBufferParser};
    use crate::source::Sharing;
    use serde_json::Value;
    use std::sync::Arc;

    fn quiet(tasks: usize, workers: usize) -> StressHarness {
        let config = HarnessConfig::new()
            .tasks(tasks)
            .workers(workers)
            .no_delay()
            .verbose(false);
        let mut harness = StressHarness::with_config(config);
        harness.reporters(vec![]);
        harness
    }

    struct PanickingParser;

    impl Parser for PanickingParser {
        fn name(&self) -> &str {
            "panicking"
        }

        fn parse(&self, _text: &str) -> Result<Value, ParseError> {
            panic!("parser state corrupted");
        }
    }

    struct CountingReporter(Arc<AtomicUsize>);

    impl Reporter for CountingReporter {
        fn task_end(&self, _record: &TaskRecord) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn should_succeed_for_every_task_with_thread_safe_parser() {
        let report = run(&[r#"{"a":1}"#], 100, 10, SerdeParser::new()).unwrap();
        assert_eq!(report.success_count, 100);
        assert_eq!(report.error_count, 0);
        assert!(report.failures.is_empty());
        assert_eq!(report.parse_times.len(), 100);
    }

    #[test]
    fn should_not_fail_racy_parser_when_sequential() {
        let report = run(DEFAULT_INPUTS, 40, 1, SharedBufferParser::with_chunk_chars(1)).unwrap();
        assert_eq!(report.total(), 40);
        assert_eq!(report.error_count, 0);
    }

    #[test]
    fn should_account_for_every_task_under_contention() {
        for _ in 0..3 {
            let report = run(DEFAULT_INPUTS, 200, 16, SharedBufferParser::with_chunk_chars(1)).unwrap();
            assert_eq!(report.total(), 200);
            assert_eq!(report.error_count, report.failures.len());
        }
    }

    #[test]
    fn should_schedule_nothing_when_task_count_is_zero() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut harness = quiet(0, 4);
        harness.add_reporter(Box::new(CountingReporter(Arc::clone(&calls))));

        let report = harness
            .run(&[] as &[&str], &ParserSource::shared(SerdeParser::new()))
            .unwrap();

        assert_eq!(report.success_count, 0);
        assert_eq!(report.error_count, 0);
        assert!(report.failures.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn should_reject_zero_workers() {
        let err = run(DEFAULT_INPUTS, 10, 0, SerdeParser::new()).unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig(_)));
    }

    #[test]
    fn should_reject_empty_inputs_when_tasks_scheduled() {
        let err = run(&[] as &[&str], 1, 1, SerdeParser::new()).unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig(_)));
    }

    #[test]
    fn should_assign_inputs_round_robin() {
        let inputs = ["[1]", "{broken", "[2]"];
        let report = run(&inputs, 9, 3, SerdeParser::new()).unwrap();

        assert_eq!(report.success_count, 6);
        assert_eq!(report.error_count, 3);
        let tasks: Vec<_> = report.failures.iter().map(|f| f.task).collect();
        assert_eq!(tasks, vec![1, 4, 7]);
        assert!(report.failures.iter().all(|f| f.input_index == 1));
        assert!(report
            .failures
            .iter()
            .all(|f| matches!(f.kind, ParseErrorKind::Syntax | ParseErrorKind::Eof)));
    }

    #[test]
    fn should_capture_panics_as_failures() {
        let report = run(DEFAULT_INPUTS, 8, 4, PanickingParser).unwrap();
        assert_eq!(report.error_count, 8);
        assert!(report.failures.iter().all(|f| f.kind == ParseErrorKind::Panic));
        assert_eq!(report.failures[0].message, "parser state corrupted");
    }

    #[test]
    fn should_not_race_with_per_task_parsers() {
        let harness = quiet(200, 16);
        let source = ParserSource::per_task(|| SharedBufferParser::with_chunk_chars(1));

        let report = harness.run(DEFAULT_INPUTS, &source).unwrap();
        assert_eq!(report.success_count, 200);
        assert_eq!(report.sharing, Sharing::PerTask);
    }

    #[test]
    fn should_not_race_with_pooled_parsers() {
        let harness = quiet(200, 16);
        let source = ParserSource::pooled(4, || SharedBufferParser::with_chunk_chars(1));

        let report = harness.run(DEFAULT_INPUTS, &source).unwrap();
        assert_eq!(report.success_count, 200);
        assert_eq!(report.sharing, Sharing::Pooled);
    }

    #[test]
    fn should_notify_reporters_once_per_task() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut harness = quiet(50, 5);
        harness.add_reporter(Box::new(CountingReporter(Arc::clone(&calls))));

        harness
            .run(DEFAULT_INPUTS, &ParserSource::shared(SerdeParser::new()))
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn should_produce_same_total_across_runs() {
        let first = run(DEFAULT_INPUTS, 64, 8, SharedBufferParser::new()).unwrap();
        let second = run(DEFAULT_INPUTS, 64, 8, SharedBufferParser::new()).unwrap();
        assert_eq!(first.total(), second.total());
    }

    #[test]
    fn should_derive_delay_from_seed_and_task() {
        let config = HarnessConfig::new().seed(7);
        let a = task_delay(&config, 3);
        let b = task_delay(&config, 3);
        assert_eq!(a, b);
        assert!(a < config.max_delay);
    }

    #[test]
    fn should_skip_delay_when_disabled() {
        let config = HarnessConfig::new().no_delay();
        assert_eq!(task_delay(&config, 0), Duration::ZERO);
    }

    #[test]
    fn should_keep_default_delay_in_plain_run() {
        let config = run_config(100, 10);
        assert_eq!(config.max_delay, Duration::from_millis(10));

        let seeded = config.seed(5);
        let delays: Vec<_> = (0..100).map(|task| task_delay(&seeded, task)).collect();
        assert!(delays.iter().any(|d| !d.is_zero()));
        assert!(delays.iter().all(|d| *d < seeded.max_delay));
    }

    #[test]
    fn should_sleep_between_sequential_tasks_in_plain_run() {
        // Twenty draws from [0, 10ms) essentially never sum below 1ms.
        let report = run(&[r#"{"a":1}"#], 20, 1, SerdeParser::new()).unwrap();
        assert_eq!(report.success_count, 20);
        assert!(report.total_duration >= Duration::from_millis(1));
    }

    struct PanicOnStart;

    impl Reporter for PanicOnStart {
        fn run_start(&self, _config: &HarnessConfig, _parser: &str, _sharing: Sharing) {
            panic!("header failed");
        }
    }

    struct PanicOnEnd;

    impl Reporter for PanicOnEnd {
        fn run_end(&self, _report: &Report) {
            panic!("summary failed");
        }
    }

    #[test]
    fn should_turn_run_start_panic_into_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut harness = quiet(10, 2);
        harness.add_reporter(Box::new(PanicOnStart));
        harness.add_reporter(Box::new(CountingReporter(Arc::clone(&calls))));

        let err = harness
            .run(DEFAULT_INPUTS, &ParserSource::shared(SerdeParser::new()))
            .unwrap_err();

        match err {
            HarnessError::ReporterPanicked { hook, message } => {
                assert_eq!(hook, "run_start");
                assert_eq!(message, "header failed");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn should_turn_run_end_panic_into_error() {
        let mut harness = quiet(10, 2);
        harness.add_reporter(Box::new(PanicOnEnd));

        let err = harness
            .run(DEFAULT_INPUTS, &ParserSource::shared(SerdeParser::new()))
            .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::ReporterPanicked { hook: "run_end", .. }
        ));
    }

    #[test]
    fn should_finish_with_random_delays() {
        let config = HarnessConfig::new()
            .tasks(20)
            .workers(4)
            .max_delay(Duration::from_millis(2))
            .verbose(false);
        let mut harness = StressHarness::with_config(config);
        harness.reporters(vec![]);

        let report = harness
            .run(DEFAULT_INPUTS, &ParserSource::shared(SerdeParser::new()))
            .unwrap();
        assert_eq!(report.success_count, 20);
    }
}
