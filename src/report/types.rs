use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::model::SprintStatus;

/// Points attributed to one calendar day of the sprint window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyPoints {
    pub date: NaiveDate,
    pub points: u64,
}

/// Cycle time metrics: how long started work takes to reach done.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleTimeMetrics {
    pub samples: u64,
    pub avg_days: Option<f64>,
    pub median_days: Option<f64>,
    pub p90_days: Option<f64>,
}

/// Sprint-level aggregates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SprintMetrics {
    pub velocity: u64,
    pub total_points: u64,
    /// Rounded percentage in `[0, 100]`.
    pub completion_pct: u32,
    /// Tasks created inside the report window.
    pub scoped_in: u64,
    pub carried_over: u64,
    pub reopened: u64,
    pub tasks_total: u64,
    pub tasks_completed: u64,
    /// Number of calendar days in the window, both boundary days included.
    pub days: u32,
    pub throughput: Vec<DailyPoints>,
    pub burndown: Vec<DailyPoints>,
    pub cycle_time: CycleTimeMetrics,
}

/// Completed work of one assignee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssigneeRollup {
    pub name: String,
    pub email: String,
    pub points_done: u64,
    pub tasks_done: u64,
}

/// One task as it appears in a report list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskLine {
    pub id: String,
    pub title: String,
    pub points: u64,
    pub status: Option<String>,
    pub assignee_id: Option<String>,
    pub task_type: String,
    pub priority: String,
    pub started_at: Option<DateTime<Utc>>,
    pub done_at: Option<DateTime<Utc>>,
    pub reopened: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SprintSummary {
    pub id: String,
    pub name: String,
    pub goal: Option<String>,
    pub status: SprintStatus,
    /// Resolved window start (after fallbacks).
    pub start: DateTime<Utc>,
    /// Resolved window end (after fallbacks).
    pub end: DateTime<Utc>,
    pub utc_offset: String,
}

/// JSON payload persisted next to the rendered HTML.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportData {
    pub sprint: SprintSummary,
    pub metrics: SprintMetrics,
    pub completed: Vec<TaskLine>,
    pub in_progress: Vec<TaskLine>,
    pub not_done: Vec<TaskLine>,
    pub assignees: Vec<AssigneeRollup>,
}

/// Output of one engine run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SprintReport {
    pub data: ReportData,
    pub html: String,
}
