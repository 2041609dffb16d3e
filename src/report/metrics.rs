use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::timeline::Timeline;
use super::types::{CycleTimeMetrics, DailyPoints, SprintMetrics};
use super::window::ReportWindow;
use crate::model::Task;

static EMPTY_TIMELINE: Timeline = Timeline {
    started_at: None,
    done_at: None,
    reopened: false,
};

/// Point value of a task. Unestimated tasks count as 1 so they still weigh
/// into velocity.
pub fn points(task: &Task) -> u64 {
    task.estimate.map(u64::from).unwrap_or(1)
}

pub(crate) fn timeline_of<'a>(timelines: &'a HashMap<String, Timeline>, task: &Task) -> &'a Timeline {
    timelines.get(&task.id).unwrap_or(&EMPTY_TIMELINE)
}

/// When a task counts as finished for day bucketing: its first DONE event,
/// or the window end for tasks sitting in DONE without any DONE event.
pub fn effective_done_at(task: &Task, timeline: &Timeline, window: &ReportWindow) -> Option<DateTime<Utc>> {
    timeline
        .done_at
        .or_else(|| task.is_done().then_some(window.end))
}

/// Literal carry-over predicate: not finished by the window end and not
/// currently in DONE.
pub fn is_carried_over(task: &Task, timeline: &Timeline, window: &ReportWindow) -> bool {
    let done_in_window = timeline.done_at.is_some_and(|d| d <= window.end);
    !done_in_window && !task.is_done()
}

/// The three report lists. Each task lands in exactly one, checked in
/// field order.
#[derive(Debug, Default)]
pub struct Classification<'a> {
    pub completed: Vec<&'a Task>,
    pub in_progress: Vec<&'a Task>,
    pub not_done: Vec<&'a Task>,
}

pub fn classify<'a>(tasks: &'a [Task], timelines: &HashMap<String, Timeline>) -> Classification<'a> {
    let mut out = Classification::default();
    for task in tasks {
        let timeline = timeline_of(timelines, task);
        if timeline.done_at.is_some() || task.is_done() {
            out.completed.push(task);
        } else if task.status.is_some() {
            out.in_progress.push(task);
        } else {
            out.not_done.push(task);
        }
    }
    out
}

pub fn compute_metrics(
    tasks: &[Task],
    timelines: &HashMap<String, Timeline>,
    window: &ReportWindow,
    classification: &Classification<'_>,
) -> SprintMetrics {
    let velocity: u64 = classification.completed.iter().map(|t| points(t)).sum();
    let total_points: u64 = tasks.iter().map(points).sum();
    let completion_pct = if total_points == 0 {
        0
    } else {
        (velocity as f64 / total_points as f64 * 100.0).round() as u32
    };

    let scoped_in = tasks.iter().filter(|t| window.contains(t.created_at)).count() as u64;
    let carried_over = tasks
        .iter()
        .filter(|t| is_carried_over(t, timeline_of(timelines, t), window))
        .count() as u64;
    let reopened = tasks
        .iter()
        .filter(|t| timeline_of(timelines, t).reopened)
        .count() as u64;

    let done_at: Vec<(u64, Option<DateTime<Utc>>)> = tasks
        .iter()
        .map(|t| (points(t), effective_done_at(t, timeline_of(timelines, t), window)))
        .collect();
    let completed_done_at: Vec<(u64, DateTime<Utc>)> = classification
        .completed
        .iter()
        .map(|t| {
            let at = effective_done_at(t, timeline_of(timelines, t), window).unwrap_or(window.end);
            (points(t), at)
        })
        .collect();

    let dates = window.dates();
    let throughput = dates
        .iter()
        .map(|&date| {
            let (day_start, next_day) = window.day_bounds(date);
            let points = completed_done_at
                .iter()
                .filter(|(_, at)| *at >= day_start && *at < next_day)
                .map(|(p, _)| p)
                .sum();
            DailyPoints { date, points }
        })
        .collect();
    let burndown = dates
        .iter()
        .map(|&date| {
            let eod = window.end_of_day(date);
            let points = done_at
                .iter()
                .filter(|(_, at)| at.is_none_or(|at| at > eod))
                .map(|(p, _)| p)
                .sum();
            DailyPoints { date, points }
        })
        .collect();

    let mut cycle_days: Vec<f64> = classification
        .completed
        .iter()
        .filter_map(|t| {
            let tl = timeline_of(timelines, t);
            let (started, done) = (tl.started_at?, tl.done_at?);
            (done >= started).then(|| (done - started).num_milliseconds() as f64 / 86_400_000.0)
        })
        .collect();
    cycle_days.sort_by(|a, b| a.total_cmp(b));

    SprintMetrics {
        velocity,
        total_points,
        completion_pct,
        scoped_in,
        carried_over,
        reopened,
        tasks_total: tasks.len() as u64,
        tasks_completed: classification.completed.len() as u64,
        days: window.days,
        throughput,
        burndown,
        cycle_time: percentiles_from_days(&cycle_days),
    }
}

/// Summary statistics over sorted day durations.
fn percentiles_from_days(days: &[f64]) -> CycleTimeMetrics {
    if days.is_empty() {
        return CycleTimeMetrics::default();
    }

    let avg = days.iter().sum::<f64>() / days.len() as f64;

    #[allow(clippy::manual_is_multiple_of)]
    let median = if days.len() % 2 == 0 {
        let mid = days.len() / 2;
        (days[mid - 1] + days[mid]) / 2.0
    } else {
        days[days.len() / 2]
    };

    let p90_idx = ((days.len() as f64) * 0.9).ceil() as usize;
    let p90_idx = p90_idx.min(days.len()).max(1) - 1;

    CycleTimeMetrics {
        samples: days.len() as u64,
        avg_days: Some(round2(avg)),
        median_days: Some(round2(median)),
        p90_days: Some(round2(days[p90_idx])),
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
