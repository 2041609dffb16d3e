use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use sprintreport::{ReportRun, ReportSender, ReportTemplate, SprintReporter};

#[derive(Parser)]
#[command(name = "sprintreport", about = "Sprint report generator")]
struct Cli {
    /// Database path (default: ~/.sprintreport/sprintreport.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import users, sprints, tasks, and status changes from a JSON dataset
    Import {
        /// Path to the dataset file
        file: PathBuf,
    },
    /// Generate a report run for a sprint
    Generate {
        sprint_id: String,
        /// Organization (default: config org_id)
        #[arg(long)]
        org: Option<String>,
        /// Report template
        #[arg(long, default_value = "sprint_summary")]
        template: String,
        /// Write the HTML document to this file
        #[arg(long)]
        out: Option<PathBuf>,
        /// Print the run as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a stored report run
    Show {
        run_id: i64,
        /// Print the metrics payload as JSON
        #[arg(long)]
        json: bool,
        /// Write the HTML document to this file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List report runs, newest first
    Runs {
        /// Only runs of this sprint
        #[arg(long)]
        sprint: Option<String>,
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// List imported sprints
    Sprints {
        /// Organization (default: all)
        #[arg(long)]
        org: Option<String>,
    },
    /// Deliver a READY run to recipients through an outbox directory
    Deliver {
        run_id: i64,
        /// Recipient address (repeatable)
        #[arg(long = "to", required = true)]
        to: Vec<String>,
        /// Directory receiving one HTML file per recipient
        #[arg(long)]
        outbox: PathBuf,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show store statistics
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

/// Sender that drops each message into a directory as an HTML file.
struct OutboxSender {
    dir: PathBuf,
}

impl OutboxSender {
    fn path_for(&self, recipient: &str) -> PathBuf {
        let name: String = recipient
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || "@.-_".contains(c) { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.html"))
    }
}

impl ReportSender for OutboxSender {
    fn send(&self, recipient: &str, subject: &str, html: &str) -> sprintreport::Result<()> {
        let path = self.path_for(recipient);
        let body = format!("<!-- To: {recipient} | Subject: {subject} -->\n{html}");
        std::fs::write(&path, body).map_err(|e| sprintreport::Error::Delivery {
            recipient: recipient.to_string(),
            message: format!("{}: {e}", path.display()),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => sprintreport::Database::open_at(path).await?,
        None => sprintreport::Database::open().await?,
    };
    let reporter = SprintReporter::new(db);

    match cli.command {
        Commands::Import { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let dataset: sprintreport::Dataset = serde_json::from_str(&raw)?;
            let summary = reporter.import(dataset).await?;
            println!(
                "Imported {} users, {} sprints, {} tasks, {} status changes",
                summary.users, summary.sprints, summary.tasks, summary.events
            );
        }
        Commands::Generate {
            sprint_id,
            org,
            template,
            out,
            json,
        } => {
            let template = ReportTemplate::parse(&template)
                .ok_or_else(|| anyhow::anyhow!("Unknown template '{template}'"))?;
            let org = resolve_org(&reporter, org).await?;
            let run = reporter.generate(&org, &sprint_id, template).await?;
            if let Some(path) = &out {
                write_html(&run, path)?;
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&run_summary(&run))?);
            } else {
                print_run(&run);
            }
            if run.status == sprintreport::RunStatus::Failed {
                anyhow::bail!("Report run {} failed", run.id);
            }
        }
        Commands::Show { run_id, json, out } => {
            let run = reporter.get_run(run_id).await?;
            if let Some(path) = &out {
                write_html(&run, path)?;
            }
            if json {
                let data = run.data.as_deref().unwrap_or("null");
                let value: serde_json::Value = serde_json::from_str(data)?;
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print_run(&run);
                for d in reporter.deliveries(run_id).await? {
                    let err = d.error_message.as_deref().unwrap_or("");
                    println!("  delivery {} {} {}", d.recipient, d.status.as_str(), err);
                }
            }
        }
        Commands::Runs { sprint, limit } => {
            let runs = reporter.list_runs(sprint.as_deref(), limit).await?;
            if runs.is_empty() {
                println!("No report runs.");
            }
            for run in runs {
                println!(
                    "{:>6}  {:<10}  {:<14}  {}  {}",
                    run.id,
                    run.status.as_str(),
                    run.template.as_str(),
                    run.sprint_id,
                    run.created_at.to_rfc3339()
                );
            }
        }
        Commands::Sprints { org } => {
            let sprints = reporter.list_sprints(org.as_deref()).await?;
            if sprints.is_empty() {
                println!("No sprints imported.");
            }
            for s in sprints {
                let start = s.start_date.map(|d| d.format("%Y-%m-%d").to_string());
                let end = s.end_date.map(|d| d.format("%Y-%m-%d").to_string());
                println!(
                    "{}  {}  [{}]  {} to {}  ({} tasks)",
                    s.id,
                    s.name,
                    s.status,
                    start.as_deref().unwrap_or("?"),
                    end.as_deref().unwrap_or("now"),
                    s.task_count
                );
            }
        }
        Commands::Deliver { run_id, to, outbox } => {
            std::fs::create_dir_all(&outbox)?;
            let sender = OutboxSender { dir: outbox };
            let report = reporter.deliver(run_id, &to, &sender).await?;
            for r in &report.records {
                match &r.error_message {
                    Some(err) => println!("  {} FAILED: {err}", r.recipient),
                    None => println!("  {} sent", r.recipient),
                }
            }
            println!("Delivered {} of {}", report.sent, report.sent + report.failed);
        }
        Commands::Config { action } => {
            handle_config(&reporter, action).await?;
        }
        Commands::Status => {
            let stats = reporter.stats().await?;
            println!("Store Status");
            println!("  Users:          {}", stats.users);
            println!("  Sprints:        {}", stats.sprints);
            println!("  Tasks:          {}", stats.tasks);
            println!("  Status changes: {}", stats.status_changes);
            println!("  Report runs:    {}", stats.report_runs);
            println!("  Deliveries:     {}", stats.deliveries);
        }
    }

    Ok(())
}

async fn resolve_org(reporter: &SprintReporter, org: Option<String>) -> anyhow::Result<String> {
    if let Some(org) = org {
        return Ok(org);
    }
    reporter
        .config_get(sprintreport::CONFIG_ORG_ID)
        .await?
        .ok_or_else(|| {
            anyhow::anyhow!("No organization given. Pass --org or run: sprintreport config set org_id <ID>")
        })
}

async fn handle_config(reporter: &SprintReporter, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match reporter.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            reporter.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = reporter.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

fn write_html(run: &ReportRun, path: &Path) -> anyhow::Result<()> {
    let html = run
        .html
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("Report run {} has no HTML ({})", run.id, run.status))?;
    std::fs::write(path, html)?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}

fn run_summary(run: &ReportRun) -> serde_json::Value {
    serde_json::json!({
        "id": run.id,
        "org_id": run.org_id,
        "sprint_id": run.sprint_id,
        "template": run.template,
        "status": run.status,
        "error_message": run.error_message,
        "created_at": run.created_at,
        "completed_at": run.completed_at,
    })
}

fn print_run(run: &ReportRun) {
    println!("Report run {}", run.id);
    println!("  Sprint:   {} ({})", run.sprint_id, run.org_id);
    println!("  Template: {}", run.template);
    println!("  Status:   {}", run.status);
    if let Some(err) = &run.error_message {
        println!("  Error:    {err}");
    }
    println!("  Created:  {}", run.created_at.to_rfc3339());
    if let Some(done) = run.completed_at {
        println!("  Finished: {}", done.to_rfc3339());
    }
}
