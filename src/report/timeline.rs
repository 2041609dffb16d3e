//! Per-task lifecycle reconstruction from the status-change log.
//!
//! The current column of a task says nothing about its history, so start and
//! finish times are replayed from the events. A timeline is derived on every
//! report run and never stored.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{StatusChangeEvent, Task};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Timeline {
    /// First transition into an in-progress-like column.
    pub started_at: Option<DateTime<Utc>>,
    /// First transition into DONE.
    pub done_at: Option<DateTime<Utc>>,
    /// Set once any transition after the first DONE leaves DONE. Sticky.
    pub reopened: bool,
}

impl Timeline {
    /// Fold one event into the timeline. Events must arrive in timestamp order.
    pub fn apply(mut self, event: &StatusChangeEvent) -> Self {
        let Some(to) = event.transition.to.as_ref() else {
            return self;
        };

        if self.done_at.is_some() && !to.is_done() {
            self.reopened = true;
        }
        if to.is_in_progress() && self.started_at.is_none() {
            self.started_at = Some(event.at);
        }
        if to.is_done() && self.done_at.is_none() {
            self.done_at = Some(event.at);
        }
        self
    }
}

/// Replay a single task's events. Sorting is stable, so events sharing a
/// timestamp keep their store order.
pub fn replay<'a>(events: impl IntoIterator<Item = &'a StatusChangeEvent>) -> Timeline {
    let mut sorted: Vec<&StatusChangeEvent> = events.into_iter().collect();
    sorted.sort_by_key(|e| e.at);
    sorted.into_iter().fold(Timeline::default(), Timeline::apply)
}

/// Build a timeline for every task. Events referencing tasks outside the
/// list are ignored.
pub fn reconstruct_timelines(
    tasks: &[Task],
    events: &[StatusChangeEvent],
) -> HashMap<String, Timeline> {
    let mut by_task: HashMap<&str, Vec<&StatusChangeEvent>> = HashMap::new();
    for event in events {
        by_task.entry(event.task_id.as_str()).or_default().push(event);
    }

    tasks
        .iter()
        .map(|task| {
            let timeline = by_task
                .remove(task.id.as_str())
                .map(replay)
                .unwrap_or_default();
            (task.id.clone(), timeline)
        })
        .collect()
}
