//! Lineup feature pipeline CLI
//!
//! Resolves tournament matches into per-player feature rows and exports
//! them for classifier training.

use clap::{Parser, Subcommand};
use lineup::{Config, Result};

#[derive(Parser)]
#[command(name = "lineup")]
#[command(about = "Per-player lineup features from knockout tournament matches", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve tournament matches into feature rows
    Resolve {
        /// Tournament match id to resolve
        match_id: Option<i64>,
        /// Resolve every tournament match in the database
        #[arg(long)]
        all: bool,
        /// Re-resolve matches that already have feature rows
        #[arg(long)]
        force: bool,
    },
    /// Show database status
    Status,
    /// Export feature rows as CSV
    Export {
        /// Output path (defaults to the configured export path)
        #[arg(long)]
        output: Option<String>,
    },
    /// Initialize a new project with default config
    Init,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let result = match cli.command {
        Commands::Resolve {
            match_id,
            all,
            force,
        } => commands::resolve(&config, match_id, all, force),
        Commands::Status => commands::status(&config),
        Commands::Export { output } => commands::export(&config, output),
        Commands::Init => commands::init(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use lineup::data::{SqliteDocs, SqliteStandings, SqliteStore, Store};
    use lineup::features::export::export_to_path;
    use lineup::resolve::Resolver;
    use lineup::{LineupError, MatchId};

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all("data")?;
        println!("Created data/ directory");

        println!("\nNext steps:");
        println!("  1. Edit {} to customize settings", config_path);
        println!("  2. Load match documents into the database");
        println!("  3. Run 'lineup resolve --all' to derive feature rows");
        println!("  4. Run 'lineup export' to write the training CSV");

        Ok(())
    }

    pub fn resolve(
        config: &Config,
        match_id: Option<i64>,
        all: bool,
        force: bool,
    ) -> Result<()> {
        let store = SqliteStore::open(&config.data.database_path)?;
        let docs = SqliteDocs::open(&config.data.database_path)?;
        let standings = SqliteStandings::open(&config.data.standings_path)?;

        let targets: Vec<MatchId> = if all {
            store
                .tournament_matches()?
                .into_iter()
                .map(|m| m.key.id)
                .collect()
        } else {
            match match_id {
                Some(id) => vec![MatchId(id)],
                None => {
                    return Err(LineupError::Config(
                        "Pass a match id or --all".to_string(),
                    ))
                }
            }
        };

        let mut resolver = Resolver::new(config, &store, &docs, &standings);
        let mut resolved = 0usize;
        let mut skipped = 0usize;
        let mut failed = 0usize;
        let mut rows = 0usize;

        for id in targets {
            if !force && store.has_performances(id)? {
                log::debug!("Match {} already analyzed, skipping", id);
                skipped += 1;
                continue;
            }
            // one bad match must not take down the batch
            match resolver.process_tournament_match(id) {
                Ok(report) => {
                    resolved += 1;
                    rows += report.rows_written;
                }
                Err(e) => {
                    log::error!("Match {} failed: {}", id, e);
                    failed += 1;
                }
            }
        }

        println!(
            "{} matches resolved ({} rows), {} already analyzed, {} failed",
            resolved, rows, skipped, failed
        );
        Ok(())
    }

    pub fn status(config: &Config) -> Result<()> {
        let store = SqliteStore::open(&config.data.database_path)?;
        let matches = store.tournament_matches()?;
        let mut analyzed = 0usize;
        for m in &matches {
            if store.has_performances(m.key.id)? {
                analyzed += 1;
            }
        }
        let rows = store.feature_rows()?.len();

        println!("Database Status");
        println!("───────────────────────────────");
        println!("  Path:          {}", config.data.database_path);
        println!("  Matches:       {}", matches.len());
        println!("  Analyzed:      {}", analyzed);
        println!("  Feature rows:  {}", rows);
        if let (Some(first), Some(last)) = (matches.first(), matches.last()) {
            println!("  Range:         {} to {}", first.date, last.date);
        }

        Ok(())
    }

    pub fn export(config: &Config, output: Option<String>) -> Result<()> {
        let store = SqliteStore::open(&config.data.database_path)?;
        let rows = store.feature_rows()?;
        if rows.is_empty() {
            println!("No feature rows to export. Run 'lineup resolve' first.");
            return Ok(());
        }

        let path = output.unwrap_or_else(|| config.data.export_path.clone());
        export_to_path(&path, &rows, config.history.window, config.history.sentinel)?;
        println!("Exported {} rows to {}", rows.len(), path);
        Ok(())
    }
}
