use crate::device::DeviceId;
use crate::error::ErrorCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Result of driving a single SSH session against one device (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub host: String,
    pub success: bool,
    #[serde(default)]
    pub transcript: String,
    pub duration_ms: f64,
    pub error_category: ErrorCategory,
    pub error: Option<String>,
    pub error_traceback: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    pub prompt_detected: Option<String>,
    pub credential_name: Option<String>,
    /// Non-fatal error noted during teardown (§4.7 step 5, §7 `disconnect`).
    pub disconnect_error: Option<String>,
}

impl ExecutionResult {
    pub fn cancelled(host: impl Into<String>) -> Self {
        ExecutionResult {
            host: host.into(),
            success: false,
            transcript: String::new(),
            duration_ms: 0.0,
            error_category: ErrorCategory::Cancelled,
            error: Some("cancelled before dispatch".into()),
            error_traceback: None,
            retry_count: 0,
            prompt_detected: None,
            credential_name: None,
            disconnect_error: None,
        }
    }
}

/// A single parsed record: a named-field map produced by a TextFSM-style
/// template (§3 ParseResult, §4.5).
pub type TemplateRecord = HashMap<String, String>;

/// Outcome of scoring cleaned output against the template library (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResult {
    pub is_valid: bool,
    pub template_id: Option<String>,
    pub records: Vec<TemplateRecord>,
    pub score: f64,
    pub error: Option<String>,
}

impl ParseResult {
    pub fn invalid(error: impl Into<String>) -> Self {
        ParseResult {
            is_valid: false,
            template_id: None,
            records: Vec::new(),
            score: 0.0,
            error: Some(error.into()),
        }
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

/// A file written to disk for one device in one run (§3 JobResult).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveRecord {
    pub device: DeviceId,
    pub path: PathBuf,
    pub bytes: usize,
    pub score: f64,
    pub template_id: Option<String>,
}

/// A categorized failure for a single device within a job run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceError {
    pub device: DeviceId,
    pub category: ErrorCategory,
    pub message: String,
}

/// A device whose output parsed but did not clear `min_score` and was not
/// saved (§4.8 step 7, §7 "validation_failures").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub device: DeviceId,
    pub score: f64,
    pub template_id: Option<String>,
}

/// Result of one job run (§3). `success_count + failed_count +
/// validation_skipped_count <= total considered` per P2; the shortfall is
/// devices filtered out before dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success_count: usize,
    pub failed_count: usize,
    pub validation_skipped_count: usize,
    pub skipped_before_dispatch: usize,
    pub device_results: Vec<ExecutionResult>,
    pub saved_files: Vec<SaveRecord>,
    pub device_errors: Vec<DeviceError>,
    pub validation_failures: Vec<ValidationFailure>,
    pub job_error: Option<String>,
    pub history_id: Option<String>,
}

impl JobResult {
    pub fn total_devices(&self) -> usize {
        self.device_results.len()
    }

    /// §3 I5: success if all devices succeeded, failed if none did,
    /// otherwise partial.
    pub fn last_run_status(&self) -> HistoryStatus {
        if self.device_results.is_empty() {
            return HistoryStatus::Failed;
        }
        if self.failed_count == 0 {
            HistoryStatus::Success
        } else if self.success_count == 0 {
            HistoryStatus::Failed
        } else {
            HistoryStatus::Partial
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Running,
    Success,
    Partial,
    Failed,
}

/// A row in the collector's history store (§3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRow {
    pub id: String,
    pub job_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_devices: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub status: HistoryStatus,
    pub error_message: Option<String>,
}

impl HistoryRow {
    pub fn open(id: impl Into<String>, job_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        HistoryRow {
            id: id.into(),
            job_id: job_id.into(),
            started_at,
            finished_at: None,
            total_devices: 0,
            success_count: 0,
            failed_count: 0,
            status: HistoryStatus::Running,
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_job_result() -> JobResult {
        JobResult {
            job_id: "j1".into(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            success_count: 0,
            failed_count: 0,
            validation_skipped_count: 0,
            skipped_before_dispatch: 0,
            device_results: Vec::new(),
            saved_files: Vec::new(),
            device_errors: Vec::new(),
            validation_failures: Vec::new(),
            job_error: None,
            history_id: None,
        }
    }

    #[test]
    fn all_success_is_success_status() {
        let mut result = empty_job_result();
        result.device_results.push(ExecutionResult::cancelled("h1"));
        result.success_count = 1;
        assert_eq!(result.last_run_status(), HistoryStatus::Success);
    }

    #[test]
    fn mixed_outcomes_are_partial() {
        let mut result = empty_job_result();
        result.device_results.push(ExecutionResult::cancelled("h1"));
        result.device_results.push(ExecutionResult::cancelled("h2"));
        result.success_count = 1;
        result.failed_count = 1;
        assert_eq!(result.last_run_status(), HistoryStatus::Partial);
    }

    #[test]
    fn all_failed_is_failed_status() {
        let mut result = empty_job_result();
        result.device_results.push(ExecutionResult::cancelled("h1"));
        result.failed_count = 1;
        assert_eq!(result.last_run_status(), HistoryStatus::Failed);
    }
}
