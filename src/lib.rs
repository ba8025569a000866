pub mod categorize;
pub mod cli;
pub mod clock;
pub mod config;
pub mod database;
pub mod dates;
pub mod feed;
pub mod logging;
pub mod migrations;
pub mod models;
pub mod session;
pub mod store;
pub mod utils;

pub use categorize::{categorize, Bucket, CategorizedView};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use database::{Database, StoreError};
pub use feed::{TaskFeed, ViewObserver};
pub use migrations::{MigrationReport, Migrator, CURRENT_SCHEMA_VERSION};
pub use models::{TaskId, TaskPatch, TaskRecord};
pub use session::EditSession;
pub use store::{Pending, RecordStore, Snapshot};
pub use utils::Profile;
