//! Execution records and per-tool metrics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle of one tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

/// Why an execution failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionError {
    /// Input rejected before the handler ran
    Validation { errors: Vec<String> },

    /// Handler returned an error, panicked, or produced invalid output
    Execution { message: String },

    /// Handler did not finish within the time budget
    Timeout { after_ms: u64 },
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::Validation { errors } => {
                write!(f, "validation failed: {}", errors.join("; "))
            }
            ExecutionError::Execution { message } => write!(f, "{}", message),
            ExecutionError::Timeout { after_ms } => write!(f, "timed out after {} ms", after_ms),
        }
    }
}

/// Audit trail of a single `tools/call`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error: Option<ExecutionError>,
}

impl ExecutionRecord {
    /// New pending record with a fresh id
    pub fn new(tool_name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            tool_name: tool_name.into(),
            input,
            output: None,
            status: ExecutionStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            error: None,
        }
    }

    /// Move a pending record to running
    pub fn start(&mut self) {
        if self.status == ExecutionStatus::Pending {
            self.status = ExecutionStatus::Running;
        }
    }

    /// Finish successfully. Terminal records are left untouched.
    pub fn complete(&mut self, output: serde_json::Value, elapsed: Duration) {
        if self.status.is_terminal() {
            return;
        }
        self.output = Some(output);
        self.status = ExecutionStatus::Completed;
        self.finish(elapsed);
    }

    /// Finish with an error. Terminal records are left untouched.
    pub fn fail(&mut self, error: ExecutionError, elapsed: Duration) {
        if self.status.is_terminal() {
            return;
        }
        self.error = Some(error);
        self.status = ExecutionStatus::Failed;
        self.finish(elapsed);
    }

    fn finish(&mut self, elapsed: Duration) {
        self.end_time = Some(Utc::now());
        self.duration_ms = Some(elapsed.as_millis() as u64);
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

/// Error counters by failure class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorStats {
    pub validation_errors: u64,
    pub execution_errors: u64,
    pub timeouts: u64,
}

/// Performance counters for one tool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolMetrics {
    /// Handler invocations
    pub total: u64,
    pub success: u64,
    pub failed: u64,

    /// Running mean of handler wall-clock time
    pub avg_duration_ms: f64,

    pub error_stats: ErrorStats,
}

impl ToolMetrics {
    /// Fold one handler invocation into the counters
    pub fn record(&mut self, elapsed: Duration, error: Option<&ExecutionError>) {
        self.total += 1;
        let duration_ms = elapsed.as_secs_f64() * 1000.0;
        self.avg_duration_ms += (duration_ms - self.avg_duration_ms) / self.total as f64;

        match error {
            None => self.success += 1,
            Some(err) => {
                self.failed += 1;
                match err {
                    ExecutionError::Timeout { .. } => self.error_stats.timeouts += 1,
                    ExecutionError::Execution { .. } => self.error_stats.execution_errors += 1,
                    ExecutionError::Validation { .. } => self.error_stats.validation_errors += 1,
                }
            }
        }
    }

    /// Count input that never reached the handler
    pub fn record_rejected(&mut self) {
        self.error_stats.validation_errors += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_lifecycle() {
        let mut record = ExecutionRecord::new("analyze_wallet", json!({}));
        assert_eq!(record.status, ExecutionStatus::Pending);

        record.start();
        assert_eq!(record.status, ExecutionStatus::Running);

        record.complete(json!({"ok": true}), Duration::from_millis(12));
        assert!(record.is_success());
        assert_eq!(record.duration_ms, Some(12));
        assert!(record.end_time.is_some());
    }

    #[test]
    fn test_terminal_record_is_immutable() {
        let mut record = ExecutionRecord::new("x", json!({}));
        record.fail(
            ExecutionError::Execution {
                message: "boom".to_string(),
            },
            Duration::ZERO,
        );
        record.complete(json!(1), Duration::ZERO);

        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.output.is_none());
    }

    #[test]
    fn test_running_average() {
        let mut metrics = ToolMetrics::default();
        metrics.record(Duration::from_millis(10), None);
        metrics.record(Duration::from_millis(20), None);
        metrics.record(
            Duration::from_millis(30),
            Some(&ExecutionError::Timeout { after_ms: 30 }),
        );

        assert_eq!(metrics.total, 3);
        assert_eq!(metrics.success, 2);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.error_stats.timeouts, 1);
        assert!((metrics.avg_duration_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_error_serialization() {
        let err = ExecutionError::Validation {
            errors: vec!["depth: required field missing".to_string()],
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "validation");
        assert_eq!(json["errors"][0], "depth: required field missing");
    }
}
