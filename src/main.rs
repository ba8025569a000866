use clap::Parser;
use color_eyre::Result;
use std::path::Path;
use std::sync::Arc;
use tasklane::{
    cli::{self, Cli, Commands},
    Config, Profile, RecordStore, SystemClock,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine profile: --dev flag enables dev mode, otherwise use prod
    let profile = if cli.dev { Profile::Dev } else { Profile::Prod };

    let (config, wrote_default) = match cli.config.as_deref() {
        Some(path) => (Config::load_from(Path::new(path))?, false),
        None => Config::load_with_profile(profile)?,
    };

    tasklane::logging::init_logging(&config.log_level);
    if wrote_default {
        let path = Config::get_config_path(profile)?;
        tracing::info!(path = %path.display(), "wrote default config");
    }

    let clock = Arc::new(SystemClock::new(config.week_start()?));
    let (store, report) = RecordStore::open(&config.get_database_path(), Arc::clone(&clock))?;

    let result = match cli.command.unwrap_or(Commands::List) {
        Commands::List => cli::handle_list(&store, Arc::clone(&clock), config.feed_grace_period()).await,
        Commands::Add { text, due } => cli::handle_add(text, due, &store, clock.as_ref()).await,
        Commands::Show { id } => cli::handle_show(id, &store, clock.as_ref()).await,
        Commands::Edit { id, text, due, clear_due, completed } => {
            cli::handle_edit(id, text, due, clear_due, completed, &store, clock.as_ref()).await
        }
        Commands::Toggle { id } => cli::handle_toggle(id, &store).await,
        Commands::Delete { id } => cli::handle_delete(id, &store).await,
        Commands::Schema => cli::handle_schema(&report),
    };

    // Close even when the command failed so queued writes are flushed.
    store.close()?;
    result?;

    Ok(())
}
