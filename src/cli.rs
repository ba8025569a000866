use chrono::{DateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::fmt::Display;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::categorize::{Bucket, CategorizedView};
use crate::clock::Clock;
use crate::database::StoreError;
use crate::feed::TaskFeed;
use crate::migrations::MigrationReport;
use crate::models::{TaskId, TaskRecord};
use crate::session::EditSession;
use crate::store::RecordStore;
use crate::utils::{format_instant, parse_due_date};

#[derive(Parser)]
#[command(name = "tasklane")]
#[command(about = "Personal task tracker that sorts tasks by when they are due")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Use development mode (uses separate dev config/database)
    #[arg(long)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show tasks grouped by due date (default if no subcommand)
    List,
    /// Add a new task
    Add {
        /// Task text
        text: String,
        /// Due date (YYYY-MM-DD or "YYYY-MM-DD HH:MM")
        #[arg(long)]
        due: Option<String>,
    },
    /// Show a single task
    Show {
        id: TaskId,
    },
    /// Change an existing task
    Edit {
        id: TaskId,
        /// New task text
        #[arg(long)]
        text: Option<String>,
        /// New due date (YYYY-MM-DD or "YYYY-MM-DD HH:MM")
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,
        /// Remove the due date
        #[arg(long)]
        clear_due: bool,
        /// Set completion explicitly
        #[arg(long)]
        completed: Option<bool>,
    },
    /// Flip a task between done and not done
    Toggle {
        id: TaskId,
    },
    /// Delete a task
    Delete {
        id: TaskId,
    },
    /// Print the database schema version and what opening it did
    Schema,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),
    #[error("Failed to parse date: {0}")]
    DateParseError(String),
}

fn parse_due<C: Clock>(input: &str, clock: &C) -> Result<DateTime<Utc>, CliError> {
    parse_due_date(input, &clock.now().timezone()).map_err(CliError::DateParseError)
}

/// Handle the list command
pub async fn handle_list<C: Clock>(
    store: &RecordStore,
    clock: Arc<C>,
    grace_period: Duration,
) -> Result<(), CliError>
where
    <C::Tz as TimeZone>::Offset: Display,
{
    let tz = clock.now().timezone();
    let feed = TaskFeed::new(store.subscribe(), clock, grace_period);
    let observer = feed.subscribe();
    print!("{}", render_view(&observer.current(), &tz));
    Ok(())
}

/// Handle the add command
pub async fn handle_add<C: Clock>(
    text: String,
    due: Option<String>,
    store: &RecordStore,
    clock: &C,
) -> Result<(), CliError> {
    let due_date = due.as_deref().map(|d| parse_due(d, clock)).transpose()?;
    let id = store.create(&text, due_date)?.wait().await?;
    println!("Task created successfully (ID: {})", id);
    Ok(())
}

/// Handle the show command
pub async fn handle_show<C: Clock>(id: TaskId, store: &RecordStore, clock: &C) -> Result<(), CliError>
where
    <C::Tz as TimeZone>::Offset: Display,
{
    let task = store.get_by_id(id).await?;
    print!("{}", render_task_detail(&task, &clock.now().timezone()));
    Ok(())
}

/// Handle the edit command
pub async fn handle_edit<C: Clock>(
    id: TaskId,
    text: Option<String>,
    due: Option<String>,
    clear_due: bool,
    completed: Option<bool>,
    store: &RecordStore,
    clock: &C,
) -> Result<(), CliError> {
    let mut session = EditSession::new();
    session.start(store.get_by_id(id).await?);

    if let Some(text) = text {
        session.set_text(text);
    }
    if clear_due {
        session.set_due_date(None);
    } else if let Some(due) = due {
        session.set_due_date(Some(parse_due(&due, clock)?));
    }
    if let Some(completed) = completed {
        session.set_completed(completed);
    }

    if let Some(pending) = session.commit(store) {
        pending?.wait().await?;
    }
    println!("Task {} updated", id);
    Ok(())
}

/// Handle the toggle command
pub async fn handle_toggle(id: TaskId, store: &RecordStore) -> Result<(), CliError> {
    store.toggle_completion(id)?.wait().await?;
    let task = store.get_by_id(id).await?;
    let state = if task.is_completed { "done" } else { "not done" };
    println!("Task {} marked {}", id, state);
    Ok(())
}

/// Handle the delete command
pub async fn handle_delete(id: TaskId, store: &RecordStore) -> Result<(), CliError> {
    store.delete(id)?.wait().await?;
    println!("Task {} deleted", id);
    Ok(())
}

/// Handle the schema command
pub fn handle_schema(report: &MigrationReport) -> Result<(), CliError> {
    println!("Schema version: {}", report.to_version);
    if report.created {
        println!("Database was created on this run");
    } else if report.applied.is_empty() {
        println!("No migrations were needed");
    } else {
        for (from, to) in &report.applied {
            println!("Migrated {} -> {}", from, to);
        }
    }
    Ok(())
}

/// Render every non-empty bucket as a titled list.
pub fn render_view<Tz: TimeZone>(view: &CategorizedView, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    if view.is_empty() {
        return "No tasks\n".to_string();
    }

    let mut out = String::new();
    for bucket in Bucket::ALL {
        let tasks = view.bucket(bucket);
        if tasks.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{} ({})", bucket.title(), tasks.len());
        for task in tasks {
            let _ = writeln!(out, "  {}", render_task_line(task, tz));
        }
    }
    out
}

fn render_task_line<Tz: TimeZone>(task: &TaskRecord, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    let mark = if task.is_completed { "x" } else { " " };
    match task.due_date {
        Some(due) => format!("[{}] #{} {} (due {})", mark, task.id, task.text, format_instant(due, tz)),
        None => format!("[{}] #{} {}", mark, task.id, task.text),
    }
}

fn render_task_detail<Tz: TimeZone>(task: &TaskRecord, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    let mut out = String::new();
    let _ = writeln!(out, "ID:        {}", task.id);
    let _ = writeln!(out, "Text:      {}", task.text);
    let _ = writeln!(out, "Completed: {}", if task.is_completed { "yes" } else { "no" });
    let _ = writeln!(out, "Created:   {}", format_instant(task.creation_date, tz));
    let _ = writeln!(out, "Updated:   {}", format_instant(task.update_date, tz));
    if let Some(due) = task.due_date {
        let _ = writeln!(out, "Due:       {}", format_instant(due, tz));
    }
    out
}
