use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Sprint, UserRef};

/// A snapshot of one organization's board data, as loaded by `import`.
#[derive(Debug, Clone, Deserialize)]
pub struct Dataset {
    pub org_id: String,
    #[serde(default)]
    pub users: Vec<UserRef>,
    /// Sprints with their tasks in board order. A sprint without an
    /// `org_id` belongs to the dataset's organization.
    #[serde(default)]
    pub sprints: Vec<Sprint>,
    #[serde(default)]
    pub events: Vec<DatasetEvent>,
}

/// A raw status-change activity. `metadata` is kept as-is, so malformed
/// entries survive the import and are handled at report time.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetEvent {
    pub task_id: String,
    #[serde(alias = "created_at")]
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl DatasetEvent {
    /// Metadata as stored in the activity log. A JSON string is taken to be
    /// already-encoded metadata and stored verbatim.
    pub fn metadata_text(&self) -> Option<String> {
        match &self.metadata {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub users: u64,
    pub sprints: u64,
    pub tasks: u64,
    pub events: u64,
}
