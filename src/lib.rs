pub mod date_util;
pub mod delivery;
pub mod error;
pub mod import;
pub mod model;
pub mod report;
pub mod runs;
pub mod storage;

pub use delivery::{DeliveryRecord, DeliveryReport, DeliveryStatus, ReportSender};
pub use error::{Error, Result};
pub use import::{Dataset, DatasetEvent, ImportSummary};
pub use model::{Sprint, SprintStatus, StatusChangeEvent, Task, TaskStatus, Transition, UserRef};
pub use report::{build_report, ReportData, ReportOptions, SprintMetrics, SprintReport};
pub use runs::{ReportRun, ReportTemplate, RunStatus};
pub use storage::Database;

// Re-export repository types needed by the binary crate, but not the module itself
pub use storage::repository::{SprintOverview, StoreStats};

use chrono::{DateTime, Utc};

use storage::repository;

/// Config key holding the default organization for CLI commands.
pub const CONFIG_ORG_ID: &str = "org_id";
/// Config key holding the `+HH:MM` offset used to cut reports into days.
pub const CONFIG_UTC_OFFSET: &str = "report.utc_offset";

/// Main entry point: generates, stores, and delivers sprint reports.
pub struct SprintReporter {
    db: Database,
}

impl SprintReporter {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Report options derived from `app_config`.
    pub async fn report_options(&self) -> Result<ReportOptions> {
        match self.config_get(CONFIG_UTC_OFFSET).await? {
            Some(raw) => Ok(ReportOptions {
                utc_offset: date_util::parse_utc_offset(&raw)?,
            }),
            None => Ok(ReportOptions::default()),
        }
    }

    // ── Report runs ────────────────────────────────────────────────

    /// Generate a report for `sprint_id` and persist it as a new run.
    pub async fn generate(&self, org_id: &str, sprint_id: &str, template: ReportTemplate) -> Result<ReportRun> {
        self.generate_at(org_id, sprint_id, template, Utc::now()).await
    }

    /// Like `generate`, with an explicit clock.
    ///
    /// A sprint that does not exist or belongs to another organization fails
    /// with `Error::NotFound` before anything is written. Once the run row
    /// exists, every failure is recorded on it and the run is returned with
    /// status FAILED; it is never left GENERATING.
    pub async fn generate_at(
        &self,
        org_id: &str,
        sprint_id: &str,
        template: ReportTemplate,
        now: DateTime<Utc>,
    ) -> Result<ReportRun> {
        let sprint = self
            .db
            .reader()
            .call({
                let sprint_id = sprint_id.to_string();
                move |conn| repository::load_sprint_with_tasks(conn, &sprint_id)
            })
            .await?
            .filter(|s| s.org_id == org_id)
            .ok_or_else(|| Error::NotFound(format!("sprint {sprint_id} in organization {org_id}")))?;

        let options = self.report_options().await?;

        let run_id = self
            .db
            .writer()
            .call({
                let org_id = org_id.to_string();
                let sprint_id = sprint_id.to_string();
                move |conn| repository::insert_report_run(conn, &org_id, &sprint_id, template, now)
            })
            .await?;
        log::info!("Report run {run_id} started for sprint {sprint_id} ({template})");

        let completion = match self.compute(&sprint, now, &options).await {
            Ok((data, html)) => self
                .db
                .writer()
                .call(move |conn| repository::complete_report_run(conn, run_id, &data, &html, Utc::now()))
                .await
                .map(|_| ())
                .map_err(Error::from),
            Err(e) => Err(e),
        };

        if let Err(e) = completion {
            log::error!("Report run {run_id} for sprint {sprint_id} failed: {e}");
            let message = e.to_string();
            let marked = self
                .db
                .writer()
                .call(move |conn| repository::fail_report_run(conn, run_id, &message, Utc::now()))
                .await;
            if let Err(mark_err) = marked {
                log::error!("Could not mark report run {run_id} as FAILED: {mark_err}");
                return Err(e);
            }
        }

        let run = self.get_run(run_id).await?;
        log::info!("Report run {run_id} finished: {}", run.status);
        Ok(run)
    }

    /// Load events and assignees for `sprint`, build the report, and
    /// serialize the payload.
    async fn compute(
        &self,
        sprint: &Sprint,
        now: DateTime<Utc>,
        options: &ReportOptions,
    ) -> Result<(String, String)> {
        let task_ids: Vec<String> = sprint.tasks.iter().map(|t| t.id.clone()).collect();
        let assignee_ids: Vec<String> = sprint
            .tasks
            .iter()
            .filter_map(|t| t.assignee_id.clone())
            .collect();

        let org_id = sprint.org_id.clone();
        let (events, users) = self
            .db
            .reader()
            .call(move |conn| {
                let events = repository::load_status_change_events(conn, &org_id, &task_ids)?;
                let users = repository::resolve_users(conn, &org_id, &assignee_ids)?;
                Ok::<_, rusqlite::Error>((events, users))
            })
            .await?;

        let report = report::build_report(sprint, &events, &users, now, options)?;
        let data = serde_json::to_string(&report.data)?;
        Ok((data, report.html))
    }

    pub async fn get_run(&self, run_id: i64) -> Result<ReportRun> {
        self.db
            .reader()
            .call(move |conn| repository::get_report_run(conn, run_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("report run {run_id}")))
    }

    pub async fn list_runs(&self, sprint_id: Option<&str>, limit: u32) -> Result<Vec<ReportRun>> {
        let sprint_id = sprint_id.map(str::to_string);
        let runs = self
            .db
            .reader()
            .call(move |conn| repository::list_report_runs(conn, sprint_id.as_deref(), limit))
            .await?;
        Ok(runs)
    }

    // ── Delivery ───────────────────────────────────────────────────

    /// Send a READY run to each recipient and record every attempt.
    ///
    /// Individual failures are recorded and do not stop the loop or affect
    /// the run's status.
    pub async fn deliver(
        &self,
        run_id: i64,
        recipients: &[String],
        sender: &dyn ReportSender,
    ) -> Result<DeliveryReport> {
        let run = self.get_run(run_id).await?;
        if !run.is_ready() {
            return Err(Error::InvalidState(format!(
                "report run {run_id} is {}, only READY runs can be delivered",
                run.status
            )));
        }

        let subject = delivery_subject(&run);
        let html = run.html.as_deref().unwrap_or_default();

        let mut records = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let (status, error_message) = match sender.send(recipient, &subject, html) {
                Ok(()) => {
                    log::info!("Delivered report run {run_id} to {recipient}");
                    (DeliveryStatus::Sent, None)
                }
                Err(e) => {
                    log::error!("Delivery of report run {run_id} to {recipient} failed: {e}");
                    (DeliveryStatus::Failed, Some(e.to_string()))
                }
            };

            let attempted_at = Utc::now();
            let id = self
                .db
                .writer()
                .call({
                    let recipient = recipient.clone();
                    let error_message = error_message.clone();
                    move |conn| {
                        repository::record_delivery(
                            conn,
                            run_id,
                            &recipient,
                            status,
                            error_message.as_deref(),
                            attempted_at,
                        )
                    }
                })
                .await?;

            records.push(DeliveryRecord {
                id,
                run_id,
                recipient: recipient.clone(),
                status,
                error_message,
                attempted_at,
            });
        }

        Ok(DeliveryReport::from_records(run_id, records))
    }

    pub async fn deliveries(&self, run_id: i64) -> Result<Vec<DeliveryRecord>> {
        let records = self
            .db
            .reader()
            .call(move |conn| repository::list_deliveries(conn, run_id))
            .await?;
        Ok(records)
    }

    // ── Import ─────────────────────────────────────────────────────

    /// Load a dataset into the store in a single transaction.
    ///
    /// Every sprint must belong to the dataset's organization, since status
    /// changes are stored under that organization.
    pub async fn import(&self, dataset: Dataset) -> Result<ImportSummary> {
        if let Some(sprint) = dataset
            .sprints
            .iter()
            .find(|s| !s.org_id.is_empty() && s.org_id != dataset.org_id)
        {
            return Err(Error::InvalidState(format!(
                "sprint {} belongs to organization {}, dataset is for {}",
                sprint.id, sprint.org_id, dataset.org_id
            )));
        }

        let summary = self
            .db
            .writer()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut summary = ImportSummary::default();
                let org_id = dataset.org_id.as_str();

                for user in &dataset.users {
                    repository::upsert_user(&tx, org_id, user)?;
                    summary.users += 1;
                }

                for sprint in &dataset.sprints {
                    let mut sprint = sprint.clone();
                    if sprint.org_id.is_empty() {
                        sprint.org_id = org_id.to_string();
                    }
                    repository::upsert_sprint(&tx, &sprint)?;
                    summary.sprints += 1;

                    for (position, task) in (0u32..).zip(&sprint.tasks) {
                        repository::upsert_task(&tx, &sprint.org_id, Some(&sprint.id), position, task)?;
                        summary.tasks += 1;
                    }
                }

                for event in &dataset.events {
                    let metadata = event.metadata_text();
                    repository::insert_status_change(
                        &tx,
                        org_id,
                        &event.task_id,
                        event.at,
                        metadata.as_deref(),
                    )?;
                    summary.events += 1;
                }

                tx.commit()?;
                Ok::<_, rusqlite::Error>(summary)
            })
            .await?;

        log::info!(
            "Imported {} users, {} sprints, {} tasks, {} status changes",
            summary.users,
            summary.sprints,
            summary.tasks,
            summary.events
        );
        Ok(summary)
    }

    // ── Store overview ─────────────────────────────────────────────

    pub async fn list_sprints(&self, org_id: Option<&str>) -> Result<Vec<SprintOverview>> {
        let org_id = org_id.map(str::to_string);
        let sprints = self
            .db
            .reader()
            .call(move |conn| repository::list_sprints(conn, org_id.as_deref()))
            .await?;
        Ok(sprints)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let stats = self.db.reader().call(|conn| repository::store_stats(conn)).await?;
        Ok(stats)
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Store a config value. Known keys are validated before they are written.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        let value = if key == CONFIG_UTC_OFFSET {
            date_util::format_utc_offset(date_util::parse_utc_offset(value)?)
        } else {
            value.to_string()
        };
        self.db
            .writer()
            .call({
                let key = key.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

/// Subject line for a delivered report, using the sprint name from the
/// stored payload when it is available.
fn delivery_subject(run: &ReportRun) -> String {
    let name = run
        .data
        .as_deref()
        .and_then(|d| serde_json::from_str::<serde_json::Value>(d).ok())
        .and_then(|v| v["sprint"]["name"].as_str().map(str::to_string))
        .unwrap_or_else(|| run.sprint_id.clone());
    format!("Sprint report: {name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    const DATASET: &str = r#"{
        "org_id": "acme",
        "users": [
            {"id": "u1", "name": "Ada", "email": "ada@example.com"},
            {"id": "u2", "name": "Grace"}
        ],
        "sprints": [{
            "id": "s1",
            "name": "Sprint <1>",
            "goal": "Ship it",
            "status": "ACTIVE",
            "start_date": "2025-03-03T00:00:00Z",
            "end_date": "2025-03-07T00:00:00Z",
            "tasks": [
                {"id": "t1", "title": "Parser", "estimate": 2, "assignee_id": "u1", "status": "DONE",
                 "created_at": "2025-03-01T09:00:00Z", "updated_at": "2025-03-04T09:00:00Z"},
                {"id": "t2", "title": "Renderer", "estimate": 3, "assignee_id": "u2", "status": "DONE",
                 "created_at": "2025-03-01T09:00:00Z", "updated_at": "2025-03-05T09:00:00Z"},
                {"id": "t3", "title": "CLI", "estimate": 5, "status": "IN_PROGRESS",
                 "created_at": "2025-03-04T09:00:00Z", "updated_at": "2025-03-05T09:00:00Z"}
            ]
        }],
        "events": [
            {"task_id": "t1", "at": "2025-03-03T10:00:00Z", "metadata": {"from": "TODO", "to": "IN_PROGRESS"}},
            {"task_id": "t1", "at": "2025-03-04T10:00:00Z", "metadata": {"from": "IN_PROGRESS", "to": "DONE"}},
            {"task_id": "t2", "at": "2025-03-05T10:00:00Z", "metadata": {"to": "DONE"}},
            {"task_id": "t3", "at": "2025-03-05T11:00:00Z", "metadata": "garbage"}
        ]
    }"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    async fn reporter() -> SprintReporter {
        let reporter = SprintReporter::new(Database::open_memory().await.unwrap());
        let dataset: Dataset = serde_json::from_str(DATASET).unwrap();
        let summary = reporter.import(dataset).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                users: 2,
                sprints: 1,
                tasks: 3,
                events: 4
            }
        );
        reporter
    }

    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl ReportSender for RecordingSender {
        fn send(&self, recipient: &str, subject: &str, _html: &str) -> Result<()> {
            if recipient.contains("bounce") {
                return Err(Error::Delivery {
                    recipient: recipient.to_string(),
                    message: "mailbox unavailable".into(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), subject.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_generate_ready_run() {
        let reporter = reporter().await;
        let run = reporter
            .generate_at("acme", "s1", ReportTemplate::SprintSummary, now())
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Ready);
        assert!(run.error_message.is_none());
        assert!(run.completed_at.is_some());
        assert!(run.html.as_deref().unwrap().contains("Sprint &lt;1&gt;"));

        let data: serde_json::Value = serde_json::from_str(run.data.as_deref().unwrap()).unwrap();
        assert_eq!(data["metrics"]["velocity"], 5);
        assert_eq!(data["metrics"]["total_points"], 10);
        assert_eq!(data["metrics"]["completion_pct"], 50);
        assert_eq!(data["assignees"].as_array().unwrap().len(), 2);
        assert_eq!(data["completed"].as_array().unwrap().len(), 2);
        assert_eq!(data["in_progress"][0]["id"], "t3");
        // Malformed metadata is a no-op, so t3 has no recorded start
        assert!(data["in_progress"][0]["started_at"].is_null());

        let runs = reporter.list_runs(Some("s1"), 10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, run.id);
    }

    #[tokio::test]
    async fn test_generate_twice_gives_identical_payloads() {
        let reporter = reporter().await;
        let a = reporter
            .generate_at("acme", "s1", ReportTemplate::SprintSummary, now())
            .await
            .unwrap();
        let b = reporter
            .generate_at("acme", "s1", ReportTemplate::SprintSummary, now())
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.data, b.data);
        assert_eq!(a.html, b.html);
    }

    #[tokio::test]
    async fn test_generate_unknown_sprint_writes_nothing() {
        let reporter = reporter().await;
        let err = reporter
            .generate_at("acme", "missing", ReportTemplate::SprintSummary, now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(reporter.list_runs(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generate_other_org_is_not_found() {
        let reporter = reporter().await;
        let err = reporter
            .generate_at("globex", "s1", ReportTemplate::SprintSummary, now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(reporter.list_runs(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generate_failure_marks_run_failed() {
        let reporter = reporter().await;
        // Break the event store after the sprint is readable
        reporter
            .db()
            .writer()
            .call(|conn| conn.execute_batch("DROP TABLE activities;"))
            .await
            .unwrap();

        let run = reporter
            .generate_at("acme", "s1", ReportTemplate::SprintSummary, now())
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error_message.as_deref().is_some_and(|m| !m.is_empty()));
        assert!(run.data.is_none() && run.html.is_none());
        assert!(run.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_utc_offset_config() {
        let reporter = reporter().await;
        assert_eq!(reporter.report_options().await.unwrap().utc_offset.local_minus_utc(), 0);

        reporter.config_set(CONFIG_UTC_OFFSET, "-0500").await.unwrap();
        assert_eq!(
            reporter.config_get(CONFIG_UTC_OFFSET).await.unwrap().as_deref(),
            Some("-05:00")
        );
        assert_eq!(
            reporter.report_options().await.unwrap().utc_offset.local_minus_utc(),
            -5 * 3600
        );

        assert!(matches!(
            reporter.config_set(CONFIG_UTC_OFFSET, "soon").await,
            Err(Error::Config(_))
        ));

        let run = reporter
            .generate_at("acme", "s1", ReportTemplate::SprintSummary, now())
            .await
            .unwrap();
        let data: serde_json::Value = serde_json::from_str(run.data.as_deref().unwrap()).unwrap();
        assert_eq!(data["sprint"]["utc_offset"], "-05:00");
    }

    #[tokio::test]
    async fn test_deliver_records_each_recipient() {
        let reporter = reporter().await;
        let run = reporter
            .generate_at("acme", "s1", ReportTemplate::SprintSummary, now())
            .await
            .unwrap();

        let sender = RecordingSender {
            sent: Mutex::new(Vec::new()),
        };
        let recipients = vec![
            "ada@example.com".to_string(),
            "bounce@example.com".to_string(),
            "grace@example.com".to_string(),
        ];
        let report = reporter.deliver(run.id, &recipients, &sender).await.unwrap();
        assert_eq!(report.sent, 2);
        assert_eq!(report.failed, 1);

        let sent = sender.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1, "Sprint report: Sprint <1>");

        let stored = reporter.deliveries(run.id).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[1].status, DeliveryStatus::Failed);
        assert!(stored[1].error_message.as_deref().unwrap().contains("mailbox unavailable"));

        // Delivery failures leave the run untouched
        assert_eq!(reporter.get_run(run.id).await.unwrap().status, RunStatus::Ready);
    }

    #[tokio::test]
    async fn test_deliver_requires_ready_run() {
        let reporter = reporter().await;
        reporter
            .db()
            .writer()
            .call(|conn| conn.execute_batch("DROP TABLE activities;"))
            .await
            .unwrap();
        let run = reporter
            .generate_at("acme", "s1", ReportTemplate::SprintSummary, now())
            .await
            .unwrap();

        let sender = RecordingSender {
            sent: Mutex::new(Vec::new()),
        };
        let err = reporter
            .deliver(run.id, &["ada@example.com".to_string()], &sender)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert!(matches!(
            reporter.deliver(404, &[], &sender).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_import_is_idempotent_for_snapshots() {
        let reporter = reporter().await;
        let dataset: Dataset = serde_json::from_str(DATASET).unwrap();
        reporter.import(dataset).await.unwrap();

        let stats = reporter.stats().await.unwrap();
        assert_eq!(stats.users, 2);
        assert_eq!(stats.sprints, 1);
        assert_eq!(stats.tasks, 3);
        // The activity log is append-only
        assert_eq!(stats.status_changes, 8);

        let sprints = reporter.list_sprints(Some("acme")).await.unwrap();
        assert_eq!(sprints.len(), 1);
        assert_eq!(sprints[0].task_count, 3);
    }

    #[tokio::test]
    async fn test_import_rejects_sprint_from_other_org() {
        let reporter = SprintReporter::new(Database::open_memory().await.unwrap());
        let mut dataset: Dataset = serde_json::from_str(DATASET).unwrap();
        dataset.sprints[0].org_id = "globex".into();

        let err = reporter.import(dataset).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        let stats = reporter.stats().await.unwrap();
        assert_eq!(stats.users, 0);
        assert_eq!(stats.sprints, 0);
        assert_eq!(stats.tasks, 0);
        assert_eq!(stats.status_changes, 0);

        // A matching explicit org is accepted
        let mut dataset: Dataset = serde_json::from_str(DATASET).unwrap();
        dataset.sprints[0].org_id = "acme".into();
        assert_eq!(reporter.import(dataset).await.unwrap().sprints, 1);
    }

    #[tokio::test]
    async fn test_generate_returns_original_error_when_run_cannot_be_marked() {
        let reporter = reporter().await;
        reporter
            .db()
            .writer()
            .call(|conn| {
                conn.execute_batch(
                    "DROP TABLE activities;
                     CREATE TRIGGER block_failed_runs BEFORE UPDATE ON report_runs
                     WHEN NEW.status = 'FAILED'
                     BEGIN SELECT RAISE(ABORT, 'runs are frozen'); END;",
                )
            })
            .await
            .unwrap();

        let err = reporter
            .generate_at("acme", "s1", ReportTemplate::SprintSummary, now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Database(_)));
        let message = err.to_string();
        assert!(message.contains("activities"), "{message}");
        assert!(!message.contains("runs are frozen"), "{message}");
    }
}
