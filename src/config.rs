//! Configuration for a stress run.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the stress harness.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Number of parse tasks to schedule.
    pub tasks: usize,
    /// Number of worker threads in the pool.
    pub workers: usize,
    /// Upper bound (exclusive) of the random delay before each parse.
    pub max_delay: Duration,
    /// Seed for the delay schedule. `None` draws from the thread RNG.
    pub seed: Option<u64>,
    /// Output directory for JSON reports. `None` disables JSON output.
    pub output_dir: Option<PathBuf>,
    /// Print the report to stdout.
    pub verbose: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            tasks: 100,
            workers: 10,
            max_delay: Duration::from_millis(10),
            seed: None,
            output_dir: None,
            verbose: true,
        }
    }
}

impl HarnessConfig {
    /// Create a new config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config from environment variables.
    ///
    /// Supported variables:
    /// - `STRESS_TASKS`: number of tasks (default: 100)
    /// - `STRESS_WORKERS`: worker threads (default: 10)
    /// - `STRESS_MAX_DELAY_MS`: max random delay per task (default: 10)
    /// - `STRESS_SEED`: seed for the delay schedule
    /// - `STRESS_OUTPUT_DIR`: directory for JSON reports
    /// - `STRESS_VERBOSE`: print the report (default: true)
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("STRESS_TASKS") {
            if let Ok(n) = v.parse() {
                cfg.tasks = n;
            }
        }
        if let Ok(v) = std::env::var("STRESS_WORKERS") {
            if let Ok(n) = v.parse() {
                cfg.workers = n;
            }
        }
        if let Ok(v) = std::env::var("STRESS_MAX_DELAY_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                cfg.max_delay = Duration::from_millis(ms);
            }
        }
        if let Ok(v) = std::env::var("STRESS_SEED") {
            if let Ok(seed) = v.parse() {
                cfg.seed = Some(seed);
            }
        }
        if let Ok(v) = std::env::var("STRESS_OUTPUT_DIR") {
            cfg.output_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("STRESS_VERBOSE") {
            cfg.verbose = v != "0" && !v.eq_ignore_ascii_case("false");
        }

        cfg
    }

    /// Set the number of tasks.
    pub fn tasks(mut self, n: usize) -> Self {
        self.tasks = n;
        self
    }

    /// Set the number of worker threads.
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    /// Set the maximum random delay before each parse.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Disable the random delay entirely.
    pub fn no_delay(mut self) -> Self {
        self.max_delay = Duration::ZERO;
        self
    }

    /// Seed the delay schedule.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Write JSON reports into this directory.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Set verbose output.
    pub fn verbose(mut self, v: bool) -> Self {
        self.verbose = v;
        self
    }
}
