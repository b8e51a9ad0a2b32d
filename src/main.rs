use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli_style;
use cli_style::{format_counts, get_styles};

use songplay_warehouse::config::{AppConfig, CliConfig, FileConfig};
use songplay_warehouse::staging::{stage_all, JsonFileCopier};
use songplay_warehouse::{LoadCoordinator, SqliteWarehouse};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir().context("Error resolving current directory")?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
#[command(name = "songplay-warehouse", styles = get_styles())]
#[command(about = "Stage song play logs and load them into a star schema warehouse")]
struct CliArgs {
    /// Path to a TOML config file. Its values override the command line.
    #[clap(long, global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite warehouse database file.
    #[clap(long, global = true, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Location of the activity log records (file:// URI or path).
    #[clap(long, global = true)]
    pub log_data: Option<String>,

    /// Location of the song catalog records (file:// URI or path).
    #[clap(long, global = true)]
    pub song_data: Option<String>,

    /// Record mapping of the activity logs: `auto` or a JSONPaths document.
    #[clap(long, global = true)]
    pub log_mapping: Option<String>,

    /// Role authorizing reads from the record locations.
    #[clap(long, global = true)]
    pub access_role: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates the staging and warehouse tables that do not exist yet.
    Provision {
        /// Drop every table first.
        #[clap(long)]
        reset: bool,
    },

    /// Copies the activity logs and the song catalog into the staging tables.
    Stage,

    /// Loads dimensions and song plays from the staging tables.
    Load,

    /// Stages the records, then loads them.
    Run,

    /// Prints the row count of every table.
    Stats {
        /// Print the counts as JSON.
        #[clap(long)]
        json: bool,
    },
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_path: self.db_path.clone(),
            log_data: self.log_data.clone(),
            log_mapping: self.log_mapping.clone(),
            song_data: self.song_data.clone(),
            access_role: self.access_role.clone(),
        }
    }
}

fn stage(config: &AppConfig, warehouse: &SqliteWarehouse) -> Result<()> {
    let requests = config.copy_requests()?;
    let copier = JsonFileCopier::new(warehouse.clone());
    for (target, report) in stage_all(&copier, &requests).context("Staging failed")? {
        info!(
            "{}: {} records from {} files",
            target, report.records, report.files
        );
    }
    Ok(())
}

fn load(warehouse: &SqliteWarehouse) -> Result<()> {
    let mut coordinator = LoadCoordinator::new(warehouse.clone());
    let report = coordinator.run()?;
    info!(
        "artists: {}, songs: {}, users: {}, time: {}, songplays: {}",
        report.dimensions.artists,
        report.dimensions.songs,
        report.dimensions.users,
        report.dimensions.time,
        report.songplays.inserted
    );
    Ok(())
}

fn print_stats(warehouse: &SqliteWarehouse, json: bool) -> Result<()> {
    let counts = warehouse.table_counts()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }
    println!(
        "{}",
        format_counts(&[
            ("staging_events", counts.staging_events),
            ("staging_songs", counts.staging_songs),
            ("artists", counts.artists),
            ("songs", counts.songs),
            ("users", counts.users),
            ("time", counts.time),
            ("songplays", counts.songplays),
        ])
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;
    let warehouse = SqliteWarehouse::open(&config.db_path)?;

    match cli_args.command {
        Command::Provision { reset } => {
            if reset {
                warehouse.reset()?;
            } else {
                warehouse.provision()?;
            }
            info!("Warehouse ready at {:?}", config.db_path);
        }
        Command::Stage => stage(&config, &warehouse)?,
        Command::Load => load(&warehouse)?,
        Command::Run => {
            stage(&config, &warehouse)?;
            load(&warehouse)?;
        }
        Command::Stats { json } => print_stats(&warehouse, json)?,
    }
    Ok(())
}
