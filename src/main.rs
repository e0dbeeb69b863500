//! Mudstore CLI - inspect joined-table-per-class store files

use clap::{Parser, Subcommand};
use mudstore::config::{self, StoreConfig};
use mudstore::storage::Inspector;
use mudstore::ui::{self, Icons};
use mudstore::EntityId;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "mudstore")]
#[command(version)]
#[command(about = "Inspect joined-table-per-class store files")]
#[command(long_about = r#"
Mudstore keeps one table per entity class and joins them on a shared id.
This tool reads a store file without needing the application's class
registry, so it works on any world file.

Example usage:
  mudstore init
  mudstore stats --database world.db
  mudstore tables
  mudstore show 42 --json
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress banners and progress lines
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default mudstore.toml
    Init {
        /// Database path to record in the config
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Entity counts per class
    Stats {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// Tables with their columns and row counts
    Tables {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// Every stored row of one entity
    Show {
        /// Entity id
        id: u64,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Emit JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    if let Err(e) = run() {
        ui::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let loaded = config::load_config(cli.config.as_deref())?;
    let quiet = cli.quiet || loaded.as_ref().and_then(|c| c.quiet).unwrap_or(false);
    mudstore::output::set_quiet(quiet);

    match cli.command {
        Commands::Init { database, force } => {
            let path = cli.config.clone().unwrap_or_else(config::default_config_path);
            let database = database.unwrap_or_else(config::default_database_path);
            let cfg = StoreConfig {
                database: Some(database.to_string_lossy().to_string()),
                quiet: None,
            };
            config::write_config(&path, &cfg, force)?;
            config::ensure_db_dir(&database)?;
            ui::success(&format!("Wrote {}", path.display()));
        }

        Commands::Stats { database, json } => {
            let database = open_path(database, loaded.as_ref())?;
            let stats = Inspector::open(&database)?.stats()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                ui::header(Icons::STATS, &format!("Store statistics ({})", database.display()));
                ui::summary_row("Tables:", &stats.tables.to_string());
                ui::summary_row("Entities:", &stats.entities.to_string());
                ui::summary_row("Highest id:", &stats.max_id.to_string());
                if stats.classes.is_empty() {
                    println!("{} No entities stored.", Icons::EMPTY);
                } else {
                    ui::section("Classes");
                    println!("{}", ui::classes_table(&stats));
                }
            }
        }

        Commands::Tables { database, json } => {
            let database = open_path(database, loaded.as_ref())?;
            let tables = Inspector::open(&database)?.tables()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&tables)?);
            } else if tables.is_empty() {
                println!("{} No tables in {}.", Icons::EMPTY, database.display());
            } else {
                ui::header(Icons::DATABASE, &format!("{} tables", tables.len()));
                println!("{}", ui::tables_table(&tables));
            }
        }

        Commands::Show { id, database, json } => {
            let database = open_path(database, loaded.as_ref())?;
            let id = EntityId(id);
            if id.is_null() {
                anyhow::bail!("id 0 is the null reference");
            }
            let rows = Inspector::open(&database)?.entity_rows(id)?;

            if rows.is_empty() {
                anyhow::bail!("no rows stored for entity {}", id);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                ui::header(Icons::DATABASE, &format!("Entity {}", id));
                println!("{}", ui::rows_table(&rows));
            }
        }
    }

    Ok(())
}

/// Resolve the database path and make sure it exists; inspection never creates files
fn open_path(flag: Option<PathBuf>, loaded: Option<&StoreConfig>) -> anyhow::Result<PathBuf> {
    let path = config::resolve_database(flag, loaded);
    if !path.exists() {
        anyhow::bail!("database {} does not exist", path.display());
    }
    tracing::debug!(path = %path.display(), "inspecting store");
    Ok(path)
}
