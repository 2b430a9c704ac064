mod log_cmds;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use pagewatch_config::{AppConfig, DEFAULT_CONFIG_PATH, TelemetryConfig};
use pagewatch_runtime::{AppContext, run_service};

#[derive(Debug, Parser)]
#[command(
    name = "pagewatch",
    version,
    about = "Watch a web page for changes and serve the latest update"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Poll on the configured interval and serve the query pages (default).
    Start,
    /// Run a single detection cycle now.
    Check,
    /// Print the most recent update.
    Latest,
    /// Print the full update log.
    Log {
        /// Emit the raw JSON state instead of a table.
        #[arg(long)]
        json: bool,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration (file + environment overrides).
    Show,
    /// Write the default configuration to the config path.
    Init {
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let _log_guard = init_tracing(&config.telemetry)?;

    match cli.command.unwrap_or(Commands::Start) {
        Commands::Start => {
            let ctx = AppContext::from_config(config)?;
            run_service(ctx, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
        }
        Commands::Check => {
            let ctx = AppContext::from_config(config)?;
            log_cmds::run_check(&ctx.watcher).await?;
        }
        Commands::Latest => log_cmds::run_latest(&config.store_path()).await,
        Commands::Log { json } => log_cmds::run_log(&config.store_path(), json).await?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => print!("{}", toml::to_string_pretty(&config)?),
            ConfigCommands::Init { force } => {
                init_config(&cli.config, force)?;
                println!("wrote default configuration to {}", cli.config.display());
            }
        },
    }

    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }
    AppConfig::default().save_to(path)
}

/// Install the global subscriber.  `RUST_LOG` wins over the configured level.
/// The returned guard flushes the optional log file and must be held for the
/// life of the process.
fn init_tracing(telemetry: &TelemetryConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&telemetry.log_level));

    let (file_layer, guard) = if telemetry.log_file.trim().is_empty() {
        (None, None)
    } else {
        let path = Path::new(telemetry.log_file.trim());
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| anyhow!("log_file `{}` has no file name", path.display()))?;

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(name.to_string_lossy().to_string())
            .build(dir)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (
            Some(fmt::layer().with_ansi(false).with_writer(writer)),
            Some(guard),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}
