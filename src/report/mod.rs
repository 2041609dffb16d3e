//! Sprint report aggregation engine.
//!
//! One synchronous pass per request: timelines are replayed from the
//! status-change log, the window is resolved, tasks are classified and
//! aggregated, completed work is rolled up per assignee, and the result is
//! rendered to a standalone HTML document. Nothing here touches the store.

pub mod metrics;
pub mod render;
pub mod rollup;
pub mod timeline;
pub mod types;
pub mod window;

pub use types::*;

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::date_util::format_utc_offset;
use crate::error::Result;
use crate::model::{Sprint, StatusChangeEvent, Task, UserRef};
use metrics::{classify, compute_metrics, effective_done_at, points, timeline_of};
use timeline::{reconstruct_timelines, Timeline};
use window::ReportWindow;

/// Knobs that change how a report is computed.
#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    /// Offset used to cut the window into calendar days.
    pub utc_offset: FixedOffset,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            utc_offset: Utc.fix(),
        }
    }
}

/// Build the report for `sprint` as of `now`.
///
/// `events` may include events for tasks outside the sprint and may be in
/// any order. `users` resolves assignee ids; unknown ids are tolerated.
pub fn build_report(
    sprint: &Sprint,
    events: &[StatusChangeEvent],
    users: &[UserRef],
    now: DateTime<Utc>,
    options: &ReportOptions,
) -> Result<SprintReport> {
    let timelines = reconstruct_timelines(&sprint.tasks, events);
    let window = ReportWindow::resolve(sprint, now, options.utc_offset);
    let classification = classify(&sprint.tasks, &timelines);
    let metrics = compute_metrics(&sprint.tasks, &timelines, &window, &classification);
    let assignees = rollup::rollup_by_assignee(&classification.completed, users);

    let lines = |tasks: &[&Task]| -> Vec<TaskLine> {
        tasks
            .iter()
            .map(|t| task_line(t, &timelines, &window))
            .collect()
    };

    let data = ReportData {
        sprint: SprintSummary {
            id: sprint.id.clone(),
            name: sprint.name.clone(),
            goal: sprint.goal.clone(),
            status: sprint.status,
            start: window.start,
            end: window.end,
            utc_offset: format_utc_offset(options.utc_offset),
        },
        metrics,
        completed: lines(classification.completed.as_slice()),
        in_progress: lines(classification.in_progress.as_slice()),
        not_done: lines(classification.not_done.as_slice()),
        assignees,
    };

    let html = render::render_html(&data, options.utc_offset, now)?;

    log::debug!(
        "Built report for sprint {}: {} tasks, velocity {}/{}",
        sprint.id,
        data.metrics.tasks_total,
        data.metrics.velocity,
        data.metrics.total_points
    );

    Ok(SprintReport { data, html })
}

fn task_line(task: &Task, timelines: &HashMap<String, Timeline>, window: &ReportWindow) -> TaskLine {
    let tl = timeline_of(timelines, task);
    TaskLine {
        id: task.id.clone(),
        title: task.title.clone(),
        points: points(task),
        status: task.status.as_ref().map(|s| s.as_str().to_string()),
        assignee_id: task.assignee_id.clone(),
        task_type: task.task_type.clone(),
        priority: task.priority.clone(),
        started_at: tl.started_at,
        done_at: effective_done_at(task, tl, window),
        reopened: tl.reopened,
    }
}
