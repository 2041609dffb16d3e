use std::collections::HashMap;

use super::metrics::points;
use super::types::AssigneeRollup;
use crate::model::{Task, UserRef};

pub const UNASSIGNED: &str = "Unassigned";

/// Group completed tasks by assignee, in order of first appearance.
///
/// Tasks without an assignee collect under `Unassigned`. An assignee the
/// lookup did not resolve is listed under the raw identifier.
pub fn rollup_by_assignee(completed: &[&Task], users: &[UserRef]) -> Vec<AssigneeRollup> {
    let directory: HashMap<&str, &UserRef> = users.iter().map(|u| (u.id.as_str(), u)).collect();

    let mut index: HashMap<Option<&str>, usize> = HashMap::new();
    let mut rows: Vec<AssigneeRollup> = Vec::new();

    for task in completed {
        let key = task.assignee_id.as_deref();
        let slot = *index.entry(key).or_insert_with(|| {
            let (name, email) = match key {
                None => (UNASSIGNED.to_string(), String::new()),
                Some(id) => match directory.get(id) {
                    Some(user) => (user.name.clone(), user.email.clone().unwrap_or_default()),
                    None => (id.to_string(), String::new()),
                },
            };
            rows.push(AssigneeRollup {
                name,
                email,
                points_done: 0,
                tasks_done: 0,
            });
            rows.len() - 1
        });

        let row = &mut rows[slot];
        row.points_done += points(task);
        row.tasks_done += 1;
    }

    rows
}
