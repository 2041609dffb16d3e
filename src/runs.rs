use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle of a persisted report run. A run is created GENERATING and
/// always ends READY or FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Generating,
    Ready,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Generating => "GENERATING",
            RunStatus::Ready => "READY",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GENERATING" => Some(RunStatus::Generating),
            "READY" => Some(RunStatus::Ready),
            "FAILED" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report layouts a run can be generated with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportTemplate {
    #[default]
    SprintSummary,
}

impl ReportTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportTemplate::SprintSummary => "sprint_summary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sprint_summary" | "summary" => Some(ReportTemplate::SprintSummary),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReportTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted report run, keyed by sprint and template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRun {
    pub id: i64,
    pub org_id: String,
    pub sprint_id: String,
    pub template: ReportTemplate,
    pub status: RunStatus,
    /// Serialized `ReportData`, set once the run is READY.
    pub data: Option<String>,
    pub html: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReportRun {
    pub fn is_ready(&self) -> bool {
        self.status == RunStatus::Ready
    }
}
