use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::delivery::{DeliveryRecord, DeliveryStatus};
use crate::model::{Sprint, SprintStatus, StatusChangeEvent, Task, TaskStatus, Transition, UserRef};
use crate::runs::{ReportRun, ReportTemplate, RunStatus};

/// Activity kind carrying `{"from","to"}` column metadata.
pub const STATUS_CHANGE: &str = "status_change";

/// Upper bound on ids bound into one `IN (...)` list.
const IN_CHUNK: usize = 500;

// ── Users ──────────────────────────────────────────────────────────

pub fn upsert_user(conn: &Connection, org_id: &str, user: &UserRef) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO users (user_id, org_id, name, email, cached_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))
         ON CONFLICT(org_id, user_id) DO UPDATE SET
           name = CASE WHEN excluded.name != '' THEN excluded.name ELSE users.name END,
           email = COALESCE(excluded.email, users.email),
           cached_at = excluded.cached_at",
        params![user.id, org_id, user.name, user.email],
    )?;
    Ok(())
}

/// Look up display names and emails within one organization. Unknown ids
/// are simply absent from the result.
pub fn resolve_users(
    conn: &Connection,
    org_id: &str,
    user_ids: &[String],
) -> Result<Vec<UserRef>, rusqlite::Error> {
    let mut ids: Vec<&str> = user_ids.iter().map(String::as_str).collect();
    ids.sort_unstable();
    ids.dedup();

    let mut users = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(IN_CHUNK) {
        let sql = format!(
            "SELECT user_id, name, email FROM users
             WHERE org_id = ?1 AND user_id IN ({}) ORDER BY user_id",
            placeholders(2, chunk.len())
        );
        let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&org_id];
        params.extend(chunk.iter().map(|id| id as &dyn rusqlite::types::ToSql));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), |row| {
            Ok(UserRef {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
            })
        })?;
        for row in rows {
            users.push(row?);
        }
    }
    Ok(users)
}

// ── Sprints ────────────────────────────────────────────────────────

/// Upsert the sprint row. Tasks are written separately with `upsert_task`.
pub fn upsert_sprint(conn: &Connection, sprint: &Sprint) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO sprints (sprint_id, org_id, name, goal, status, start_date, end_date, cached_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'))
         ON CONFLICT(sprint_id) DO UPDATE SET
           org_id=excluded.org_id, name=excluded.name, goal=excluded.goal,
           status=excluded.status, start_date=excluded.start_date,
           end_date=excluded.end_date, cached_at=excluded.cached_at",
        params![
            sprint.id,
            sprint.org_id,
            sprint.name,
            sprint.goal,
            sprint.status.as_str(),
            sprint.start_date,
            sprint.end_date,
        ],
    )?;
    Ok(())
}

/// Load a sprint and its tasks in board order, or `None` if it does not exist.
pub fn load_sprint_with_tasks(conn: &Connection, sprint_id: &str) -> Result<Option<Sprint>, rusqlite::Error> {
    let sprint = conn
        .query_row(
            "SELECT sprint_id, org_id, name, goal, status, start_date, end_date
             FROM sprints WHERE sprint_id = ?1",
            params![sprint_id],
            |row| {
                let status: String = row.get(4)?;
                Ok(Sprint {
                    id: row.get(0)?,
                    org_id: row.get(1)?,
                    name: row.get(2)?,
                    goal: row.get(3)?,
                    status: SprintStatus::parse(&status).unwrap_or_default(),
                    start_date: row.get(5)?,
                    end_date: row.get(6)?,
                    tasks: Vec::new(),
                })
            },
        )
        .optional()?;

    let Some(mut sprint) = sprint else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT task_id, title, estimate, assignee_id, created_at, updated_at,
                status, task_type, priority
         FROM tasks WHERE sprint_id = ?1
         ORDER BY position, created_at, task_id",
    )?;
    let rows = stmt.query_map(params![sprint_id], task_from_row)?;
    sprint.tasks = rows.collect::<Result<Vec<_>, _>>()?;

    Ok(Some(sprint))
}

#[derive(Debug, Clone, Serialize)]
pub struct SprintOverview {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub status: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub task_count: i64,
}

pub fn list_sprints(conn: &Connection, org_id: Option<&str>) -> Result<Vec<SprintOverview>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT s.sprint_id, s.org_id, s.name, s.status, s.start_date, s.end_date,
                (SELECT COUNT(*) FROM tasks t WHERE t.sprint_id = s.sprint_id)
         FROM sprints s
         WHERE ?1 IS NULL OR s.org_id = ?1
         ORDER BY s.start_date IS NULL, s.start_date, s.sprint_id",
    )?;
    let rows = stmt.query_map(params![org_id], |row| {
        Ok(SprintOverview {
            id: row.get(0)?,
            org_id: row.get(1)?,
            name: row.get(2)?,
            status: row.get(3)?,
            start_date: row.get(4)?,
            end_date: row.get(5)?,
            task_count: row.get(6)?,
        })
    })?;
    rows.collect()
}

// ── Tasks ──────────────────────────────────────────────────────────

pub fn upsert_task(
    conn: &Connection,
    org_id: &str,
    sprint_id: Option<&str>,
    position: u32,
    task: &Task,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO tasks (
            task_id, org_id, sprint_id, position, title, estimate, assignee_id,
            status, task_type, priority, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(task_id) DO UPDATE SET
            org_id=excluded.org_id, sprint_id=excluded.sprint_id, position=excluded.position,
            title=excluded.title, estimate=excluded.estimate, assignee_id=excluded.assignee_id,
            status=excluded.status, task_type=excluded.task_type, priority=excluded.priority,
            created_at=excluded.created_at, updated_at=excluded.updated_at",
        params![
            task.id,
            org_id,
            sprint_id,
            position,
            task.title,
            task.estimate,
            task.assignee_id,
            task.status.as_ref().map(TaskStatus::as_str),
            task.task_type,
            task.priority,
            task.created_at,
            task.updated_at,
        ],
    )?;
    Ok(())
}

fn task_from_row(row: &Row<'_>) -> Result<Task, rusqlite::Error> {
    let status: Option<String> = row.get(6)?;
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        estimate: row.get(2)?,
        assignee_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        status: status.as_deref().map(TaskStatus::parse),
        task_type: row.get(7)?,
        priority: row.get(8)?,
    })
}

// ── Activities ─────────────────────────────────────────────────────

/// Append a status-change activity. `metadata` is stored verbatim.
pub fn insert_status_change(
    conn: &Connection,
    org_id: &str,
    task_id: &str,
    at: DateTime<Utc>,
    metadata: Option<&str>,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO activities (org_id, task_id, kind, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![org_id, task_id, STATUS_CHANGE, metadata, at],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Status-change events of the given tasks within one organization, in
/// store order. Metadata that does not parse becomes an empty transition.
pub fn load_status_change_events(
    conn: &Connection,
    org_id: &str,
    task_ids: &[String],
) -> Result<Vec<StatusChangeEvent>, rusqlite::Error> {
    let mut events = Vec::new();
    for chunk in task_ids.chunks(IN_CHUNK) {
        let sql = format!(
            "SELECT task_id, created_at, metadata FROM activities
             WHERE org_id = ?1 AND kind = ?2 AND task_id IN ({})
             ORDER BY created_at, id",
            placeholders(3, chunk.len())
        );
        let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&org_id, &STATUS_CHANGE];
        params.extend(chunk.iter().map(|id| id as &dyn rusqlite::types::ToSql));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), |row| {
            let metadata: Option<String> = row.get(2)?;
            Ok(StatusChangeEvent {
                task_id: row.get(0)?,
                at: row.get(1)?,
                transition: Transition::from_metadata(metadata.as_deref()),
            })
        })?;
        for row in rows {
            events.push(row?);
        }
    }
    Ok(events)
}

// ── Report Runs ────────────────────────────────────────────────────

pub fn insert_report_run(
    conn: &Connection,
    org_id: &str,
    sprint_id: &str,
    template: ReportTemplate,
    created_at: DateTime<Utc>,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO report_runs (org_id, sprint_id, template, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            org_id,
            sprint_id,
            template.as_str(),
            RunStatus::Generating.as_str(),
            created_at
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Mark a run READY with its payload. Returns false if the run is unknown.
pub fn complete_report_run(
    conn: &Connection,
    run_id: i64,
    data: &str,
    html: &str,
    completed_at: DateTime<Utc>,
) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "UPDATE report_runs SET
            status = ?2, data = ?3, html = ?4, error_message = NULL, completed_at = ?5
         WHERE id = ?1",
        params![run_id, RunStatus::Ready.as_str(), data, html, completed_at],
    )?;
    Ok(count > 0)
}

pub fn fail_report_run(
    conn: &Connection,
    run_id: i64,
    error_message: &str,
    completed_at: DateTime<Utc>,
) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "UPDATE report_runs SET status = ?2, error_message = ?3, completed_at = ?4
         WHERE id = ?1",
        params![run_id, RunStatus::Failed.as_str(), error_message, completed_at],
    )?;
    Ok(count > 0)
}

pub fn get_report_run(conn: &Connection, run_id: i64) -> Result<Option<ReportRun>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, org_id, sprint_id, template, status, data, html, error_message,
                created_at, completed_at
         FROM report_runs WHERE id = ?1",
        params![run_id],
        run_from_row,
    )
    .optional()
}

/// Most recent runs first, optionally restricted to one sprint.
pub fn list_report_runs(
    conn: &Connection,
    sprint_id: Option<&str>,
    limit: u32,
) -> Result<Vec<ReportRun>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, org_id, sprint_id, template, status, data, html, error_message,
                created_at, completed_at
         FROM report_runs
         WHERE ?1 IS NULL OR sprint_id = ?1
         ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![sprint_id, limit], run_from_row)?;
    rows.collect()
}

fn run_from_row(row: &Row<'_>) -> Result<ReportRun, rusqlite::Error> {
    let template: String = row.get(3)?;
    let status: String = row.get(4)?;
    Ok(ReportRun {
        id: row.get(0)?,
        org_id: row.get(1)?,
        sprint_id: row.get(2)?,
        template: ReportTemplate::parse(&template).ok_or_else(|| unexpected_text(3, &template))?,
        status: RunStatus::parse(&status).ok_or_else(|| unexpected_text(4, &status))?,
        data: row.get(5)?,
        html: row.get(6)?,
        error_message: row.get(7)?,
        created_at: row.get(8)?,
        completed_at: row.get(9)?,
    })
}

// ── Deliveries ─────────────────────────────────────────────────────

pub fn record_delivery(
    conn: &Connection,
    run_id: i64,
    recipient: &str,
    status: DeliveryStatus,
    error_message: Option<&str>,
    attempted_at: DateTime<Utc>,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO report_deliveries (run_id, recipient, status, error_message, attempted_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![run_id, recipient, status.as_str(), error_message, attempted_at],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_deliveries(conn: &Connection, run_id: i64) -> Result<Vec<DeliveryRecord>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, run_id, recipient, status, error_message, attempted_at
         FROM report_deliveries WHERE run_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![run_id], |row| {
        let status: String = row.get(3)?;
        Ok(DeliveryRecord {
            id: row.get(0)?,
            run_id: row.get(1)?,
            recipient: row.get(2)?,
            status: DeliveryStatus::parse(&status).ok_or_else(|| unexpected_text(3, &status))?,
            error_message: row.get(4)?,
            attempted_at: row.get(5)?,
        })
    })?;
    rows.collect()
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Status ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub users: i64,
    pub sprints: i64,
    pub tasks: i64,
    pub status_changes: i64,
    pub report_runs: i64,
    pub deliveries: i64,
}

pub fn store_stats(conn: &Connection) -> Result<StoreStats, rusqlite::Error> {
    conn.query_row(
        "SELECT
            (SELECT COUNT(*) FROM users),
            (SELECT COUNT(*) FROM sprints),
            (SELECT COUNT(*) FROM tasks),
            (SELECT COUNT(*) FROM activities WHERE kind = ?1),
            (SELECT COUNT(*) FROM report_runs),
            (SELECT COUNT(*) FROM report_deliveries)",
        params![STATUS_CHANGE],
        |row| {
            Ok(StoreStats {
                users: row.get(0)?,
                sprints: row.get(1)?,
                tasks: row.get(2)?,
                status_changes: row.get(3)?,
                report_runs: row.get(4)?,
                deliveries: row.get(5)?,
            })
        },
    )
}

// ── Helpers ────────────────────────────────────────────────────────

/// `?first, ?first+1, ...` for `count` parameters.
fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn unexpected_text(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unexpected value {value:?}").into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    fn task(id: &str, status: Option<TaskStatus>) -> Task {
        Task {
            id: id.to_string(),
            title: format!("Task {id}"),
            estimate: Some(3),
            assignee_id: Some("u1".into()),
            created_at: at(1, 9),
            updated_at: at(2, 9),
            status,
            task_type: "BUG".into(),
            priority: "HIGH".into(),
        }
    }

    fn sprint() -> Sprint {
        Sprint {
            id: "s1".into(),
            org_id: "acme".into(),
            name: "Sprint 1".into(),
            goal: Some("Goal".into()),
            status: SprintStatus::Active,
            start_date: Some(at(3, 0)),
            end_date: None,
            tasks: vec![],
        }
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1, 3), "?1, ?2, ?3");
        assert_eq!(placeholders(3, 1), "?3");
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                set_config(conn, "org_id", "acme")?;
                let val = get_config(conn, "org_id")?;
                assert_eq!(val, Some("acme".to_string()));

                set_config(conn, "report.utc_offset", "+02:00")?;
                let all = list_config(conn)?;
                assert_eq!(all.len(), 2);
                assert_eq!(all[0].0, "org_id");

                let missing = get_config(conn, "nonexistent")?;
                assert_eq!(missing, None);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sprint_round_trip_keeps_board_order() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                upsert_sprint(conn, &sprint())?;
                upsert_task(conn, "acme", Some("s1"), 1, &task("b", Some(TaskStatus::Done)))?;
                upsert_task(conn, "acme", Some("s1"), 0, &task("a", None))?;
                upsert_task(conn, "acme", None, 0, &task("loose", None))?;

                let loaded = load_sprint_with_tasks(conn, "s1")?.unwrap();
                assert_eq!(loaded.org_id, "acme");
                assert_eq!(loaded.status, SprintStatus::Active);
                assert_eq!(loaded.start_date, Some(at(3, 0)));
                assert_eq!(loaded.end_date, None);

                let ids: Vec<&str> = loaded.tasks.iter().map(|t| t.id.as_str()).collect();
                assert_eq!(ids, vec!["a", "b"]);
                assert_eq!(loaded.tasks[1], task("b", Some(TaskStatus::Done)));
                assert_eq!(loaded.tasks[0].status, None);

                assert!(load_sprint_with_tasks(conn, "missing")?.is_none());

                let overview = list_sprints(conn, Some("acme"))?;
                assert_eq!(overview.len(), 1);
                assert_eq!(overview[0].task_count, 2);
                assert!(list_sprints(conn, Some("other"))?.is_empty());
                assert_eq!(list_sprints(conn, None)?.len(), 1);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_status_change_events_scoped_by_org_and_task() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                insert_status_change(conn, "acme", "t1", at(4, 9), Some(r#"{"from":"IN_PROGRESS","to":"DONE"}"#))?;
                insert_status_change(conn, "acme", "t1", at(3, 9), Some(r#"{"from":"TODO","to":"IN_PROGRESS"}"#))?;
                insert_status_change(conn, "acme", "t2", at(3, 9), Some("not json"))?;
                insert_status_change(conn, "other", "t1", at(5, 9), Some(r#"{"to":"TODO"}"#))?;
                insert_status_change(conn, "acme", "t3", at(5, 9), Some(r#"{"to":"DONE"}"#))?;
                conn.execute(
                    "INSERT INTO activities (org_id, task_id, kind, metadata, created_at)
                     VALUES ('acme', 't1', 'comment', NULL, ?1)",
                    params![at(6, 9)],
                )?;

                let ids = vec!["t1".to_string(), "t2".to_string()];
                let events = load_status_change_events(conn, "acme", &ids)?;
                assert_eq!(events.len(), 3);

                let t1: Vec<&StatusChangeEvent> = events.iter().filter(|e| e.task_id == "t1").collect();
                assert_eq!(t1.len(), 2);
                assert_eq!(t1[0].at, at(3, 9));
                assert_eq!(t1[0].transition.to, Some(TaskStatus::InProgress));
                assert_eq!(t1[1].transition.to, Some(TaskStatus::Done));

                let t2 = events.iter().find(|e| e.task_id == "t2").unwrap();
                assert_eq!(t2.transition, Transition::default());

                assert!(load_status_change_events(conn, "acme", &[])?.is_empty());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_resolve_users() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                upsert_user(
                    conn,
                    "acme",
                    &UserRef {
                        id: "u1".into(),
                        name: "Ada".into(),
                        email: Some("ada@example.com".into()),
                    },
                )?;
                // A later upsert without email keeps the stored one
                upsert_user(
                    conn,
                    "acme",
                    &UserRef {
                        id: "u1".into(),
                        name: "Ada L.".into(),
                        email: None,
                    },
                )?;

                let ids = vec!["u1".to_string(), "u1".to_string(), "ghost".to_string()];
                let users = resolve_users(conn, "acme", &ids)?;
                assert_eq!(users.len(), 1);
                assert_eq!(users[0].name, "Ada L.");
                assert_eq!(users[0].email.as_deref(), Some("ada@example.com"));

                assert!(resolve_users(conn, "acme", &[])?.is_empty());

                // The same id in another organization is a different person
                upsert_user(
                    conn,
                    "globex",
                    &UserRef {
                        id: "u1".into(),
                        name: "Grace".into(),
                        email: Some("grace@globex.test".into()),
                    },
                )?;
                let ids = vec!["u1".to_string()];
                let acme = resolve_users(conn, "acme", &ids)?;
                let globex = resolve_users(conn, "globex", &ids)?;
                assert_eq!(acme[0].name, "Ada L.");
                assert_eq!(acme[0].email.as_deref(), Some("ada@example.com"));
                assert_eq!(globex[0].name, "Grace");
                assert_eq!(globex[0].email.as_deref(), Some("grace@globex.test"));
                assert!(resolve_users(conn, "initech", &ids)?.is_empty());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_report_run_lifecycle() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let id = insert_report_run(conn, "acme", "s1", ReportTemplate::SprintSummary, at(10, 9))?;
                let run = get_report_run(conn, id)?.unwrap();
                assert_eq!(run.status, RunStatus::Generating);
                assert_eq!(run.template, ReportTemplate::SprintSummary);
                assert_eq!(run.created_at, at(10, 9));
                assert!(run.data.is_none() && run.completed_at.is_none());

                assert!(complete_report_run(conn, id, "{}", "<html></html>", at(10, 10))?);
                let run = get_report_run(conn, id)?.unwrap();
                assert!(run.is_ready());
                assert_eq!(run.data.as_deref(), Some("{}"));
                assert_eq!(run.completed_at, Some(at(10, 10)));

                let failed = insert_report_run(conn, "acme", "s2", ReportTemplate::SprintSummary, at(11, 9))?;
                assert!(fail_report_run(conn, failed, "boom", at(11, 10))?);
                let run = get_report_run(conn, failed)?.unwrap();
                assert_eq!(run.status, RunStatus::Failed);
                assert_eq!(run.error_message.as_deref(), Some("boom"));

                assert!(!fail_report_run(conn, 999, "nope", at(11, 10))?);
                assert!(get_report_run(conn, 999)?.is_none());

                let all = list_report_runs(conn, None, 10)?;
                assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![failed, id]);
                let s1 = list_report_runs(conn, Some("s1"), 10)?;
                assert_eq!(s1.len(), 1);
                assert_eq!(list_report_runs(conn, None, 1)?.len(), 1);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deliveries_and_stats() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let run = insert_report_run(conn, "acme", "s1", ReportTemplate::SprintSummary, at(10, 9))?;
                record_delivery(conn, run, "a@example.com", DeliveryStatus::Sent, None, at(10, 11))?;
                record_delivery(conn, run, "b@example.com", DeliveryStatus::Failed, Some("bounced"), at(10, 11))?;

                let records = list_deliveries(conn, run)?;
                assert_eq!(records.len(), 2);
                assert_eq!(records[0].status, DeliveryStatus::Sent);
                assert_eq!(records[1].error_message.as_deref(), Some("bounced"));

                let stats = store_stats(conn)?;
                assert_eq!(stats.report_runs, 1);
                assert_eq!(stats.deliveries, 2);
                assert_eq!(stats.tasks, 0);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }
}
