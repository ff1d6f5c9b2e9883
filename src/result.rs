//! Outcome and report types.

use crate::parser::{ParseError, ParseErrorKind};
use crate::source::Sharing;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Result of one parse attempt, as data.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Success,
    Failure(ParseError),
}

impl ParseOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ParseOutcome::Success)
    }

    pub fn error(&self) -> Option<&ParseError> {
        match self {
            ParseOutcome::Success => None,
            ParseOutcome::Failure(e) => Some(e),
        }
    }
}

impl From<Result<Value, ParseError>> for ParseOutcome {
    fn from(result: Result<Value, ParseError>) -> Self {
        match result {
            Ok(_) => ParseOutcome::Success,
            Err(e) => ParseOutcome::Failure(e),
        }
    }
}

/// A finished task, handed to reporters as it completes.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    /// Submission index of the task.
    pub task: usize,
    /// Index into the input set.
    pub input_index: usize,
    pub outcome: ParseOutcome,
    /// Time spent inside `parse` (the random delay is excluded).
    pub elapsed: Duration,
}

/// A captured failure in the final report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub task: usize,
    pub input_index: usize,
    pub kind: ParseErrorKind,
    pub message: String,
}

/// Aggregate result of a stress run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub task_count: usize,
    pub worker_count: usize,
    pub success_count: usize,
    pub error_count: usize,
    /// Failures in task submission order.
    pub failures: Vec<Failure>,
    /// Name of the parser under test
    pub parser: String,
    pub sharing: Sharing,
    /// Timestamp when the run started (unix millis)
    pub started_at: String,
    /// Wall time of the whole run
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Parse time of every task, in submission order
    #[serde(with = "duration_vec_serde")]
    pub parse_times: Vec<Duration>,
}

impl Report {
    /// Number of recorded outcomes. Always equals `task_count`.
    pub fn total(&self) -> usize {
        self.success_count + self.error_count
    }

    pub fn is_clean(&self) -> bool {
        self.error_count == 0
    }

    /// Failure counts grouped by kind.
    pub fn failures_by_kind(&self) -> BTreeMap<ParseErrorKind, usize> {
        let mut counts = BTreeMap::new();
        for f in &self.failures {
            *counts.entry(f.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn min_parse_time(&self) -> Option<Duration> {
        self.parse_times.iter().copied().min()
    }

    pub fn max_parse_time(&self) -> Option<Duration> {
        self.parse_times.iter().copied().max()
    }

    pub fn median_parse_time(&self) -> Option<Duration> {
        if self.parse_times.is_empty() {
            return None;
        }
        let mut sorted = self.parse_times.clone();
        sorted.sort();
        Some(sorted[sorted.len() / 2])
    }

    /// Load a report from a JSON file.
    pub fn load(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_nanos().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let nanos = u128::deserialize(d)?;
        Ok(Duration::from_nanos(nanos as u64))
    }
}

mod duration_vec_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(v: &[Duration], s: S) -> Result<S::Ok, S::Error> {
        v.iter()
            .map(|d| d.as_nanos())
            .collect::<Vec<_>>()
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Duration>, D::Error> {
        let nanos: Vec<u128> = Vec::deserialize(d)?;
        Ok(nanos
            .into_iter()
            .map(|n| Duration::from_nanos(n as u64))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with(failures: Vec<Failure>, parse_times: Vec<Duration>) -> Report {
        Report {
            task_count: 4,
            worker_count: 2,
            success_count: 4 - failures.len(),
            error_count: failures.len(),
            failures,
            parser: "serde".to_string(),
            sharing: Sharing::Shared,
            started_at: "0".to_string(),
            total_duration: Duration::from_millis(5),
            parse_times,
        }
    }

    fn failure(task: usize, kind: ParseErrorKind) -> Failure {
        Failure {
            task,
            input_index: task % 2,
            kind,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn should_convert_result_into_outcome() {
        let ok: ParseOutcome = Ok(Value::Null).into();
        assert!(ok.is_success());
        assert!(ok.error().is_none());

        let err: ParseOutcome = Err(ParseError::new(ParseErrorKind::Eof, "eof")).into();
        assert!(!err.is_success());
        assert_eq!(err.error().unwrap().kind, ParseErrorKind::Eof);
    }

    #[test]
    fn should_group_failures_by_kind() {
        let report = report_with(
            vec![
                failure(0, ParseErrorKind::Syntax),
                failure(1, ParseErrorKind::Eof),
                failure(3, ParseErrorKind::Syntax),
            ],
            vec![],
        );
        let counts = report.failures_by_kind();
        assert_eq!(counts[&ParseErrorKind::Syntax], 2);
        assert_eq!(counts[&ParseErrorKind::Eof], 1);
        assert_eq!(report.total(), 4);
        assert!(!report.is_clean());
    }

    #[test]
    fn should_compute_parse_time_stats() {
        let report = report_with(
            vec![],
            vec![
                Duration::from_micros(30),
                Duration::from_micros(10),
                Duration::from_micros(20),
            ],
        );
        assert_eq!(report.min_parse_time(), Some(Duration::from_micros(10)));
        assert_eq!(report.median_parse_time(), Some(Duration::from_micros(20)));
        assert_eq!(report.max_parse_time(), Some(Duration::from_micros(30)));
    }

    #[test]
    fn should_return_no_stats_when_no_tasks_ran() {
        let report = report_with(vec![], vec![]);
        assert!(report.median_parse_time().is_none());
        assert!(report.min_parse_time().is_none());
    }

    #[test]
    fn should_load_report_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = report_with(vec![failure(2, ParseErrorKind::Data)], vec![]);
        std::fs::write(&path, serde_json::to_string(&report).unwrap()).unwrap();

        let loaded = Report::load(&path).unwrap();
        assert_eq!(loaded.failures, report.failures);
        assert_eq!(loaded.sharing, Sharing::Shared);
        assert_eq!(loaded.total_duration, Duration::from_millis(5));
    }
}
