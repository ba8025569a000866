use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction};
use thiserror::Error;

use crate::dates::to_millis;

/// Schema version this build reads and writes.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Table holding the task rows.
pub const TASKS_TABLE: &str = "tasks";

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Database schema v{found} is newer than this build supports (v{supported})")]
    NewerThanSupported { found: u32, supported: u32 },
    #[error("Database has a tasks table but no schema version")]
    Unversioned,
    #[error("No migration registered from schema v{from}")]
    MissingStep { from: u32 },
    #[error("Migration v{from} -> v{to} failed: {source}")]
    StepFailed {
        from: u32,
        to: u32,
        #[source]
        source: rusqlite::Error,
    },
    #[error("Failed to read or write schema version: {0}")]
    VersionError(#[source] rusqlite::Error),
}

/// Values shared by every step of one migration run.
#[derive(Debug, Clone, Copy)]
pub struct MigrationContext {
    /// Single instant used to backfill timestamp columns.
    pub executed_at: DateTime<Utc>,
}

/// One schema step, `from` -> `from + 1`.
#[derive(Clone, Copy)]
pub struct Migration {
    pub from: u32,
    pub to: u32,
    pub description: &'static str,
    pub apply: fn(&Transaction<'_>, &MigrationContext) -> rusqlite::Result<()>,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("description", &self.description)
            .finish()
    }
}

/// Every schema change this app has shipped, oldest first.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        from: 1,
        to: 2,
        description: "add creation_date and update_date",
        apply: add_timestamps,
    },
    Migration {
        from: 2,
        to: 3,
        description: "add due_date",
        apply: add_due_date,
    },
];

/// Layout of the very first release. Fresh databases start here and walk the
/// same chain as upgraded ones.
fn create_baseline(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        "CREATE TABLE tasks (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            text            TEXT NOT NULL,
            is_completed    INTEGER NOT NULL DEFAULT 0
        )",
    )
}

fn add_timestamps(tx: &Transaction<'_>, ctx: &MigrationContext) -> rusqlite::Result<()> {
    // SQLite only accepts a literal DEFAULT in ALTER TABLE, and the literal is
    // what backfills the existing rows.
    let executed_at = to_millis(ctx.executed_at);
    tx.execute_batch(&format!(
        "ALTER TABLE tasks ADD COLUMN creation_date INTEGER NOT NULL DEFAULT {executed_at};
         ALTER TABLE tasks ADD COLUMN update_date INTEGER NOT NULL DEFAULT {executed_at};"
    ))
}

fn add_due_date(tx: &Transaction<'_>, _ctx: &MigrationContext) -> rusqlite::Result<()> {
    tx.execute_batch(
        "ALTER TABLE tasks ADD COLUMN due_date INTEGER;
         CREATE INDEX IF NOT EXISTS idx_tasks_due_date ON tasks(due_date);",
    )
}

/// What a successful open did to the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub created: bool,
    pub applied: Vec<(u32, u32)>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        !self.created && self.applied.is_empty()
    }
}

/// Runs a registry of migrations up to a target version.
#[derive(Debug, Clone, Copy)]
pub struct Migrator<'a> {
    migrations: &'a [Migration],
    target: u32,
}

impl Default for Migrator<'static> {
    fn default() -> Self {
        Self::new(MIGRATIONS, CURRENT_SCHEMA_VERSION)
    }
}

impl<'a> Migrator<'a> {
    pub fn new(migrations: &'a [Migration], target: u32) -> Self {
        Self { migrations, target }
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    /// The ordered steps taking `from` to the target, or the first gap.
    pub fn plan(&self, from: u32) -> Result<Vec<&'a Migration>, MigrationError> {
        if from > self.target {
            return Err(MigrationError::NewerThanSupported { found: from, supported: self.target });
        }
        (from..self.target)
            .map(|version| {
                self.migrations
                    .iter()
                    .find(|step| step.from == version && step.to == version + 1)
                    .ok_or(MigrationError::MissingStep { from: version })
            })
            .collect()
    }

    /// Bring `conn` to the target version in one transaction.
    ///
    /// Either every step commits together with the new `user_version`, or
    /// nothing does.
    pub fn run(&self, conn: &mut Connection, ctx: &MigrationContext) -> Result<MigrationReport, MigrationError> {
        let tx = conn.transaction().map_err(MigrationError::VersionError)?;

        let stored = read_version(&tx)?;
        let created = stored == 0 && !table_exists(&tx, TASKS_TABLE).map_err(MigrationError::VersionError)?;
        if stored == 0 && !created {
            return Err(MigrationError::Unversioned);
        }
        let from_version = if created { 1 } else { stored };

        let plan = self.plan(from_version)?;
        if !created && plan.is_empty() {
            tracing::debug!(version = from_version, "schema is current");
            return Ok(MigrationReport {
                from_version,
                to_version: from_version,
                created,
                applied: Vec::new(),
            });
        }

        if created {
            tracing::info!("creating {} table", TASKS_TABLE);
            create_baseline(&tx).map_err(|source| MigrationError::StepFailed { from: 0, to: 1, source })?;
        }

        let mut applied = Vec::with_capacity(plan.len());
        for step in plan {
            tracing::info!(from = step.from, to = step.to, "migrating: {}", step.description);
            (step.apply)(&tx, ctx).map_err(|source| MigrationError::StepFailed {
                from: step.from,
                to: step.to,
                source,
            })?;
            applied.push((step.from, step.to));
        }

        tx.pragma_update(None, "user_version", self.target)
            .map_err(MigrationError::VersionError)?;
        tx.commit().map_err(MigrationError::VersionError)?;

        Ok(MigrationReport {
            from_version: if created { 0 } else { from_version },
            to_version: self.target,
            created,
            applied,
        })
    }
}

/// Read `PRAGMA user_version`.
pub fn read_version(conn: &Connection) -> Result<u32, MigrationError> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(MigrationError::VersionError)
}

fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        rusqlite::params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
