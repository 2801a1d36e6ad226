//! Job state primitive
//!
//! A [`JobResult`] tracks one long-running unit of work: an import, a
//! post-import chain, a single processor. It is serialized into a
//! [`JsonStore`](crate::storage::JsonStore) between invocations so that the
//! work can resume after the process or queue worker restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Waiting,
    InProgress,
    Done,
    Error,
    Stopped,
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::InProgress => "in_progress",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Stopped => "stopped",
        }
    }

    /// Done, Error and Stopped accept no further work
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error | JobStatus::Stopped)
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "waiting" => JobStatus::Waiting,
            "in_progress" => JobStatus::InProgress,
            "done" => JobStatus::Done,
            "error" => JobStatus::Error,
            "stopped" => JobStatus::Stopped,
            _ => JobStatus::Waiting,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status, progress and error of a unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct JobResult {
    pub status: JobStatus,
    /// 0.0 ..= 100.0
    #[serde(default)]
    pub percent_done: f64,
    #[serde(default)]
    pub error: Option<String>,
    /// Free-form output of the work (e.g. a processor's summary)
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl JobResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// A finished result carrying `data`
    pub fn done(data: impl Into<String>) -> Self {
        let mut result = Self::new();
        result.set_done();
        result.data = Some(data.into());
        result
    }

    /// A failed result carrying `error`
    pub fn failed(error: impl Into<String>) -> Self {
        let mut result = Self::new();
        result.set_error(error);
        result
    }

    pub fn start(&mut self) {
        let now = Utc::now();
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.status = JobStatus::InProgress;
        self.updated_at = Some(now);
    }

    pub fn set_progress(&mut self, percent: f64) {
        self.percent_done = percent.clamp(0.0, 100.0);
        self.updated_at = Some(Utc::now());
    }

    pub fn set_done(&mut self) {
        self.status = JobStatus::Done;
        self.percent_done = 100.0;
        self.error = None;
        self.updated_at = Some(Utc::now());
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Error;
        self.error = Some(error.into());
        self.updated_at = Some(Utc::now());
    }

    pub fn set_stopped(&mut self) {
        self.status = JobStatus::Stopped;
        self.updated_at = Some(Utc::now());
    }

    pub fn is_done(&self) -> bool {
        self.status == JobStatus::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_string() {
        for status in [
            JobStatus::Waiting,
            JobStatus::InProgress,
            JobStatus::Done,
            JobStatus::Error,
            JobStatus::Stopped,
        ] {
            assert_eq!(JobStatus::from(status.as_str().to_string()), status);
        }
        assert_eq!(JobStatus::from("bogus".to_string()), JobStatus::Waiting);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Waiting.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(JobStatus::Stopped.is_terminal());
    }

    #[test]
    fn test_lifecycle() {
        let mut result = JobResult::new();
        assert_eq!(result.status, JobStatus::Waiting);

        result.start();
        let started = result.started_at;
        result.set_progress(42.5);
        result.start();
        assert_eq!(result.started_at, started);
        assert_eq!(result.percent_done, 42.5);

        result.set_progress(150.0);
        assert_eq!(result.percent_done, 100.0);

        result.set_error("boom");
        assert_eq!(result.status, JobStatus::Error);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_serialized_shape() {
        let result = JobResult::failed("Row size too large");
        let value = serde_json::to_value(&result).unwrap_or_default();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], "Row size too large");
    }
}
