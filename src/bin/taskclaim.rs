//! taskclaim CLI: operator and user interface to the task store.

use std::process::ExitCode;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use taskclaim::config::Config;
use taskclaim::config::secrets::ExposeSecret;
use taskclaim::db::Db;
use taskclaim::error::Error;
use taskclaim::model::{NewTask, Status, Task, TaskFilter, TaskId, TaskPatch, User};
use taskclaim::service::TaskService;
use taskclaim::telemetry::{TelemetryConfig, init_telemetry};

/// Exit code for a lost claim race: a conflict, not a failure of the tool.
const EXIT_CONFLICT: u8 = 2;

#[derive(Parser)]
#[command(name = "taskclaim", about = "Task tracker with exclusive task claiming")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending database migrations
    Migrate,
    /// User accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// API tokens
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
    /// Task operations
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a user
    Create { username: String },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Print a user's API token, creating it if needed
    Issue { username: String },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Create a new unassigned task
    Create {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// API token of the creator
        #[arg(long)]
        token: String,
    },
    /// List tasks
    List {
        /// Filter by status (unassigned, in_progress, done, archived)
        #[arg(long)]
        status: Option<String>,
        /// Filter by owner username
        #[arg(long)]
        owner: Option<String>,
        /// Filter by creation date (YYYY-MM-DD, UTC)
        #[arg(long)]
        created_on: Option<NaiveDate>,
        /// Maximum tasks to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show a task
    Show {
        /// Task ID (full UUID or prefix)
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Count tasks per status
    Board,
    /// Edit a task's title or description
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        token: String,
    },
    /// Delete a task
    Delete {
        id: String,
        #[arg(long)]
        token: String,
    },
    /// Claim an unassigned task
    Claim {
        id: String,
        #[arg(long)]
        token: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "taskclaim".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let db = Arc::new(
        Db::connect(
            config.database_url.expose_secret(),
            config.max_connections,
            config.lock_timeout,
        )
        .await?,
    );

    match cli.command {
        Command::Migrate => {
            db.migrate().await?;
            println!("Migrations applied.");
            Ok(ExitCode::SUCCESS)
        }
        Command::User {
            action: UserAction::Create { username },
        } => {
            let user = db.create_user(&username).await?;
            println!("Created user {} ({})", user.username, user.id);
            Ok(ExitCode::SUCCESS)
        }
        Command::Token {
            action: TokenAction::Issue { username },
        } => {
            let user = db.find_user(&username).await?;
            let token = db.issue_token(user.id).await?;
            println!("{}", token.token);
            Ok(ExitCode::SUCCESS)
        }
        Command::Task { action } => {
            let service = TaskService::new(db.clone());
            cmd_task(&db, &service, action).await
        }
    }
}

async fn cmd_task(db: &Db, service: &TaskService, action: TaskAction) -> anyhow::Result<ExitCode> {
    match action {
        TaskAction::Create {
            title,
            description,
            token,
        } => {
            let user = db.authenticate(&token).await?;
            let task = service
                .create_task(user.id, NewTask::new(title).description(description))
                .await?;
            println!("Created: {} (status: {})", task.id, task.status);
        }
        TaskAction::List {
            status,
            owner,
            created_on,
            limit,
            json,
        } => {
            let mut filter = TaskFilter::default().limit(limit);
            if let Some(s) = status {
                filter = filter.status(s.parse::<Status>()?);
            }
            if let Some(username) = owner {
                filter = filter.owner(db.find_user(&username).await?.id);
            }
            if let Some(date) = created_on {
                filter = filter.created_on(date);
            }
            let tasks = service.list_tasks(&filter).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                print_task_list(&tasks);
            }
        }
        TaskAction::Show { id, json } => {
            let id = resolve_task_id(db, &id).await?;
            let task = service.get_task(id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&task)?);
            } else {
                print_task(&task);
            }
        }
        TaskAction::Board => {
            let board = service.board().await?;
            for status in Status::ALL {
                println!("{:<12} {}", status, board.get(status));
            }
            println!("{:<12} {}", "total", board.total());
        }
        TaskAction::Edit {
            id,
            title,
            description,
            token,
        } => {
            let user = db.authenticate(&token).await?;
            let id = resolve_task_id(db, &id).await?;
            let task = service
                .update_task(user.id, id, TaskPatch { title, description })
                .await?;
            println!("Updated: {}", task.id);
        }
        TaskAction::Delete { id, token } => {
            let user = db.authenticate(&token).await?;
            let id = resolve_task_id(db, &id).await?;
            service.delete_task(user.id, id).await?;
            println!("Deleted: {id}");
        }
        TaskAction::Claim { id, token } => {
            let user = db.authenticate(&token).await?;
            let id = resolve_task_id(db, &id).await?;
            return cmd_task_claim(service, &user, id).await;
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_task_claim(service: &TaskService, user: &User, id: TaskId) -> anyhow::Result<ExitCode> {
    match service.claim_task(user.id, id).await {
        Ok(task) => {
            println!("Claimed: {} (owner: {}, status: {})", task.id, user.username, task.status);
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ Error::AlreadyClaimed { .. }) => {
            eprintln!("{e}");
            Ok(ExitCode::from(EXIT_CONFLICT))
        }
        Err(e) => Err(e.into()),
    }
}

/// Accept a full UUID or a unique prefix of one.
async fn resolve_task_id(db: &Db, id_str: &str) -> anyhow::Result<TaskId> {
    if id_str.len() >= 36 {
        return Ok(id_str.parse()?);
    }

    let matches = db.task_ids_with_prefix(id_str, 2).await?;
    match matches.as_slice() {
        [] => anyhow::bail!("no task matching prefix '{id_str}'"),
        [id] => Ok(*id),
        _ => anyhow::bail!("several tasks match prefix '{id_str}', be more specific"),
    }
}

fn print_task_list(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("No tasks found.");
        return;
    }

    println!("{:<8}  {:<12}  {:<40}  CREATED", "ID", "STATUS", "TITLE");
    println!("{}", "-".repeat(80));

    for task in tasks {
        let short_id = &task.id.to_string()[..8];
        let title: String = task.title.chars().take(40).collect();
        println!(
            "{:<8}  {:<12}  {:<40}  {}",
            short_id,
            task.status,
            title,
            task.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!("\n{} task(s)", tasks.len());
}

fn print_task(task: &Task) {
    println!("ID:          {}", task.id);
    println!("Title:       {}", task.title);
    println!("Status:      {}", task.status);
    println!(
        "Owner:       {}",
        task.owner
            .map(|o| o.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("Creator:     {}", task.creator);
    println!("Created:     {}", task.created_at);
    println!("Updated:     {}", task.updated_at);
    if !task.description.is_empty() {
        println!("---");
        println!("{}", task.description);
    }
}
