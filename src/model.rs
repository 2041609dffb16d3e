use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A board column. The four built-in columns have fixed semantics; any
/// other column name is carried through as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Review,
    Done,
    Other(String),
}

impl TaskStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().replace([' ', '-'], "_").as_str() {
            "TODO" | "TO_DO" => TaskStatus::Todo,
            "IN_PROGRESS" => TaskStatus::InProgress,
            "REVIEW" | "IN_REVIEW" => TaskStatus::Review,
            "DONE" => TaskStatus::Done,
            _ => TaskStatus::Other(s.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Todo => "TODO",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Review => "REVIEW",
            TaskStatus::Done => "DONE",
            TaskStatus::Other(s) => s,
        }
    }

    /// Columns that count as "work has started".
    pub fn is_in_progress(&self) -> bool {
        matches!(self, TaskStatus::InProgress | TaskStatus::Review)
    }

    pub fn is_done(&self) -> bool {
        matches!(self, TaskStatus::Done)
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        TaskStatus::parse(&s)
    }
}

impl From<TaskStatus> for String {
    fn from(s: TaskStatus) -> Self {
        s.as_str().to_string()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SprintStatus {
    #[default]
    Planned,
    Active,
    Closed,
}

impl SprintStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PLANNED" => Some(SprintStatus::Planned),
            "ACTIVE" => Some(SprintStatus::Active),
            "CLOSED" => Some(SprintStatus::Closed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SprintStatus::Planned => "PLANNED",
            SprintStatus::Active => "ACTIVE",
            SprintStatus::Closed => "CLOSED",
        }
    }
}

/// Column change recorded on a status-change activity. Either side may be
/// missing in old or hand-edited rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    #[serde(default)]
    pub from: Option<TaskStatus>,
    #[serde(default)]
    pub to: Option<TaskStatus>,
}

impl Transition {
    /// Parse activity metadata. Anything that is not a `{from?, to?}` object
    /// becomes an empty transition, which the timeline treats as a no-op.
    pub fn from_metadata(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Transition::default();
        };
        let value = match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(_) => {
                log::warn!("Ignoring non-object status-change metadata: {raw}");
                return Transition::default();
            }
            Err(e) => {
                log::warn!("Ignoring malformed status-change metadata ({e}): {raw}");
                return Transition::default();
            }
        };
        Transition {
            from: status_field(&value, "from", raw),
            to: status_field(&value, "to", raw),
        }
    }
}

// A field that is present but not a string is dropped on its own.
fn status_field(map: &serde_json::Map<String, serde_json::Value>, key: &str, raw: &str) -> Option<TaskStatus> {
    match map.get(key)? {
        serde_json::Value::String(s) => Some(TaskStatus::parse(s)),
        serde_json::Value::Null => None,
        _ => {
            log::warn!("Ignoring malformed '{key}' in status-change metadata: {raw}");
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangeEvent {
    pub task_id: String,
    pub at: DateTime<Utc>,
    pub transition: Transition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    /// Story points; unestimated tasks score as 1.
    #[serde(default)]
    pub estimate: Option<u32>,
    #[serde(default)]
    pub assignee_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Current board column. `None` when the task sits in the backlog.
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(rename = "type", default = "default_task_type")]
    pub task_type: String,
    #[serde(default = "default_priority")]
    pub priority: String,
}

impl Task {
    pub fn is_done(&self) -> bool {
        self.status.as_ref().is_some_and(TaskStatus::is_done)
    }
}

fn default_task_type() -> String {
    "TASK".to_string()
}

fn default_priority() -> String {
    "MEDIUM".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sprint {
    pub id: String,
    #[serde(default)]
    pub org_id: String,
    pub name: String,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub status: SprintStatus,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    /// Tasks in board order.
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}
