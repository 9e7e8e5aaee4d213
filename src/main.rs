use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use taskboard::config::BoardConfig;
use taskboard::db::Database;
use taskboard::models::*;

#[derive(Parser)]
#[command(name = "taskboard")]
#[command(about = "Collaborative task board with dense column and task ordering")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides config and TASKBOARD_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and run migrations
    Init,
    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Manage columns
    #[command(subcommand)]
    Column(ColumnCommand),
    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommand),
    /// Verify every column and task position on a board is dense
    Check { project: Uuid },
}

#[derive(Subcommand)]
enum ProjectCommand {
    Create {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    List,
    /// Print the board
    Show { id: Uuid },
    Delete { id: Uuid },
}

#[derive(Subcommand)]
enum ColumnCommand {
    Add {
        project: Uuid,
        name: String,
        /// Slot to insert at; defaults to the end
        #[arg(short, long)]
        position: Option<i64>,
    },
    Rename { id: Uuid, name: String },
    Move { id: Uuid, position: i64 },
    Delete { id: Uuid },
    /// Give the project's columns exactly this order
    Reorder { project: Uuid, ids: Vec<Uuid> },
}

#[derive(Subcommand)]
enum TaskCommand {
    Add {
        column: Uuid,
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Slot to insert at; defaults to the end
        #[arg(short, long)]
        position: Option<i64>,
        #[arg(short, long)]
        assignee: Option<String>,
    },
    Update {
        id: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// todo, in_progress or done
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long, conflicts_with = "description")]
        clear_description: bool,
        #[arg(long, conflicts_with = "assignee")]
        clear_assignee: bool,
    },
    /// Move a task to a slot in any column of the same project
    Move { id: Uuid, column: Uuid, position: i64 },
    Delete { id: Uuid },
    /// Give the column's tasks exactly this order
    Reorder { column: Uuid, ids: Vec<Uuid> },
    Search { project: Uuid, query: String },
    /// Tasks assigned to someone, newest first
    List {
        #[arg(long)]
        assignee: String,
        /// todo, in_progress or done
        #[arg(long)]
        status: Option<String>,
    },
}

/// Logs go to stderr so stdout stays clean for `--json` output
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "taskboard=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = BoardConfig::load(cli.config.as_deref())?;
    if let Some(path) = cli.db.clone() {
        config.database_path = Some(path);
    }

    let db = Database::open_with_config(&config)?;
    db.migrate()?;

    match cli.command {
        Commands::Init => {
            println!("Initialized {}", config.database_path()?.display());
        }
        Commands::Project(cmd) => run_project(&db, cmd, cli.json)?,
        Commands::Column(cmd) => run_column(&db, cmd, cli.json)?,
        Commands::Task(cmd) => run_task(&db, cmd, cli.json)?,
        Commands::Check { project } => {
            if db.check_board(project)? {
                println!("ok");
            } else {
                bail!("board {} has gaps or duplicate positions", project);
            }
        }
    }

    Ok(())
}

fn run_project(db: &Database, cmd: ProjectCommand, json: bool) -> anyhow::Result<()> {
    match cmd {
        ProjectCommand::Create { name, description } => {
            let project = db.create_project(CreateProjectInput { name, description })?;
            emit(json, &project, || println!("{}  {}", project.id, project.name))?;
        }
        ProjectCommand::List => {
            let projects = db.get_all_projects()?;
            emit(json, &projects, || {
                for p in &projects {
                    println!("{}  {}", p.id, p.name);
                }
            })?;
        }
        ProjectCommand::Show { id } => {
            let board = db.get_board(id)?;
            emit(json, &board, || print_board(&board))?;
        }
        ProjectCommand::Delete { id } => {
            if !db.delete_project(id)? {
                bail!("Project not found: {}", id);
            }
        }
    }
    Ok(())
}

fn run_column(db: &Database, cmd: ColumnCommand, json: bool) -> anyhow::Result<()> {
    let column = match cmd {
        ColumnCommand::Add {
            project,
            name,
            position,
        } => db.create_column(
            project,
            CreateColumnInput {
                name,
                position: position.unwrap_or(i64::MAX),
            },
        )?,
        ColumnCommand::Rename { id, name } => db.update_column(
            id,
            UpdateColumnInput {
                name: Some(name),
                position: None,
            },
        )?,
        ColumnCommand::Move { id, position } => db.update_column(
            id,
            UpdateColumnInput {
                name: None,
                position: Some(position),
            },
        )?,
        ColumnCommand::Delete { id } => {
            if !db.delete_column(id)? {
                bail!("Column not found: {}", id);
            }
            return Ok(());
        }
        ColumnCommand::Reorder { project, ids } => {
            db.reorder_columns(project, &ids)?;
            return Ok(());
        }
    };

    emit(json, &column, || {
        println!("{}  [{}] {}", column.id, column.position, column.name)
    })
}

fn run_task(db: &Database, cmd: TaskCommand, json: bool) -> anyhow::Result<()> {
    let task = match cmd {
        TaskCommand::Add {
            column,
            title,
            description,
            position,
            assignee,
        } => db.create_task(
            column,
            CreateTaskInput {
                title,
                description,
                position: position.unwrap_or(i64::MAX),
                assignee,
                ..Default::default()
            },
        )?,
        TaskCommand::Update {
            id,
            title,
            description,
            status,
            assignee,
            clear_description,
            clear_assignee,
        } => db.update_task(
            id,
            UpdateTaskInput {
                title,
                description: if clear_description {
                    Some(None)
                } else {
                    description.map(Some)
                },
                status: parse_status(status)?,
                assignee: if clear_assignee {
                    Some(None)
                } else {
                    assignee.map(Some)
                },
                ..Default::default()
            },
        )?,
        TaskCommand::Move {
            id,
            column,
            position,
        } => db.move_task(
            id,
            MoveTaskInput {
                column_id: column,
                position,
            },
        )?,
        TaskCommand::Delete { id } => {
            if !db.delete_task(id)? {
                bail!("Task not found: {}", id);
            }
            return Ok(());
        }
        TaskCommand::Reorder { column, ids } => {
            db.reorder_tasks(column, &ids)?;
            return Ok(());
        }
        TaskCommand::Search { project, query } => {
            let tasks = db.search_tasks(project, &query)?;
            return emit(json, &tasks, || {
                for t in &tasks {
                    println!("{}  [{}] {}", t.id, t.status.as_str(), t.title);
                }
            });
        }
        TaskCommand::List { assignee, status } => {
            let tasks = db.get_assignee_tasks(&assignee, parse_status(status)?)?;
            return emit(json, &tasks, || {
                for t in &tasks {
                    println!("{}  [{}] {}", t.id, t.status.as_str(), t.title);
                }
            });
        }
    };

    emit(json, &task, || {
        println!(
            "{}  [{}] {} ({})",
            task.id,
            task.position,
            task.title,
            task.status.as_str()
        )
    })
}

fn parse_status(status: Option<String>) -> anyhow::Result<Option<TaskStatus>> {
    status
        .map(|s| TaskStatus::from_str(&s).with_context(|| format!("Unknown status: {}", s)))
        .transpose()
}

fn emit<T: Serialize>(json: bool, value: &T, plain: impl FnOnce()) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        plain();
    }
    Ok(())
}

fn print_board(board: &Board) {
    println!("{} ({})", board.project.name, board.project.id);
    for entry in &board.columns {
        println!(
            "\n[{}] {} ({})",
            entry.column.position, entry.column.name, entry.column.id
        );
        for task in &entry.tasks {
            println!(
                "  {}. {} [{}] ({})",
                task.position,
                task.title,
                task.status.as_str(),
                task.id
            );
        }
    }
}
