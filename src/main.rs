use anyhow::{bail, Context, Result};
use clap::Parser;
use dbmods::config::{read_config, DbModsConfig};
use dbmods::execution::{
    ExecutionEngine, SimpleExecutionEngine, SqliteConnection, TransactionalExecutionEngine,
};
use dbmods::migration::{LoggingListener, MigrationEngine, MigrationEvent};
use dbmods::mods::ModCatalog;
use dbmods::utils::{default_external_sql_dir, CONFIG_FILE};
use dbmods::ContentGenerator;
use std::path::PathBuf;
use std::sync::mpsc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// dbmods - Versioned schema mods and declarative table content for SQLite databases
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file. Used only when it exists.
    #[arg(short, long, env = "DBMODS_CONFIG", default_value = CONFIG_FILE)]
    config: PathBuf,

    /// SQLite database file
    #[arg(short, long, env = "DBMODS_DATABASE")]
    database: Option<PathBuf>,

    /// Mod catalog (XML)
    #[arg(short, long, env = "DBMODS_MODS")]
    mods: Option<PathBuf>,

    /// Version to update to. Defaults to the latest version in the catalog.
    #[arg(short, long)]
    target_version: Option<String>,

    /// Treat the database as being at this version instead of reading the
    /// version table
    #[arg(long)]
    current_version: Option<String>,

    /// Schema partition to start in
    #[arg(short, long, env = "DBMODS_SCHEMA")]
    schema: Option<u32>,

    /// Share one transaction across all mods
    #[arg(long)]
    merge_transactions: bool,

    /// Print the mod catalog and exit
    #[arg(short, long)]
    list_mods: bool,

    /// Directory of content documents
    #[arg(long, env = "DBMODS_CONTENT_DIR")]
    content_dir: Option<PathBuf>,

    /// Skip the content update
    #[arg(long)]
    no_content: bool,

    /// Value for a %KEY% placeholder in SQL steps (repeatable)
    #[arg(short = 'D', value_name = "KEY=VALUE", value_parser = parse_parameter)]
    parameters: Vec<(String, String)>,

    /// Log every step. `RUST_LOG` takes precedence when set.
    #[arg(short, long)]
    verbose: bool,
}

fn parse_parameter(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

/// Config file values, overridden by command line flags.
fn resolve_config(args: &Args) -> Result<DbModsConfig> {
    let mut config = read_config(&args.config)
        .with_context(|| format!("Failed to read config {}", args.config.display()))?
        .unwrap_or_default();

    if let Some(database) = &args.database {
        config.database = Some(database.clone());
    }
    if let Some(mods) = &args.mods {
        config.mods_file = Some(mods.clone());
    }
    if let Some(schema) = args.schema {
        config.schema = schema;
    }
    if args.merge_transactions {
        config.merge_transactions = true;
    }
    if let Some(dir) = &args.content_dir {
        config.content_dir = Some(dir.clone());
    }
    config.parameters.extend(args.parameters.iter().cloned());
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = resolve_config(&args)?;

    let mods_file = config
        .mods_file
        .clone()
        .context("No mod catalog given (use --mods or modsFile in the config)")?;
    let catalog = ModCatalog::load(&mods_file)
        .with_context(|| format!("Failed to load mods from {}", mods_file.display()))?;
    info!(mods = catalog.len(), file = %mods_file.display(), "Loaded mod catalog");

    let external_sql_dir = config
        .external_sql_dir
        .clone()
        .unwrap_or_else(|| default_external_sql_dir(&mods_file));
    let mut migration = MigrationEngine::new(catalog)
        .with_schema(config.schema)
        .with_parameters(config.parameters.clone())
        .with_external_sql_dir(external_sql_dir);

    if args.list_mods {
        println!("{}", migration.list_mods());
        return Ok(());
    }

    let database = config
        .database
        .clone()
        .context("No database given (use --database or database in the config)")?;
    let connection = SqliteConnection::open(&database)
        .with_context(|| format!("Failed to open database {}", database.display()))?;
    let simple = SimpleExecutionEngine::new(Box::new(connection))
        .with_version_table(config.version_table.clone());
    let mut engine = TransactionalExecutionEngine::from_simple(simple, config.merge_transactions);

    let current = match &args.current_version {
        Some(version) => version.clone(),
        None => engine.db_version(),
    };

    let (tx, rx) = mpsc::channel();
    migration.add_listener(Box::new(LoggingListener));
    migration.add_listener(Box::new(tx));

    let num_mods = migration.get_num_mods(&current, args.target_version.as_deref())?;
    info!(current = %current, mods = num_mods, "Resolved update path");

    let reached = migration.update_db(&mut engine, &current, args.target_version.as_deref())?;
    let failed = rx
        .try_iter()
        .any(|event| matches!(event, MigrationEvent::FinishedApplyMod { success: false, .. }));
    if failed {
        engine
            .commit_existing_transaction()
            .context("Failed to commit applied mods")?;
        bail!("Database update stopped at version {}", reached);
    }

    if !args.no_content {
        if let Some(dir) = &config.content_dir {
            ContentGenerator::new(dir)
                .update_content(&mut engine)
                .context("Failed to update content")?;
        }
    }

    engine
        .commit_existing_transaction()
        .context("Failed to commit")?;

    if reached == current {
        println!("No new mods to apply, database is at version {}", current);
    } else {
        println!("Updated database from version {} to {}", current, reached);
    }
    Ok(())
}
