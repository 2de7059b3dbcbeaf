//! VersaMesh - batch mesh simplification and shape analysis
//!
//! Simplifies folders of 3D surface scans with the Morley and de Vries
//! pipelines and measures DNE, OPCR and RFI on the results, either from
//! an interactive shell or as one-shot commands.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (invalid arguments, config, failed command, etc.)

mod analysis;
mod backend;
mod cli;
mod config;
mod engine;
mod models;
mod progress;
mod scanner;
mod settings;
mod shell;
mod store;

use anyhow::{Context, Result};
use backend::ScriptBackend;
use cli::{Args, Command};
use config::{Config, CONFIG_FILE};
use engine::ProcessEngine;
use shell::{Shell, ShellCommand};
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(&args, &config);

    info!("{} v{}", shell::PROGRAM_NAME, env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(args, config).await {
        error!("{:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .versamesh.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize folders, algorithms, filter parameters and tools.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = if !args.quiet && config.general.verbose {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Build the engine and run either one command or the shell.
async fn run(args: Args, config: Config) -> Result<()> {
    let settings = config
        .to_settings()
        .context("Invalid settings in configuration")?;

    let backend = ScriptBackend::new(
        config.tools.clone(),
        config.simplify.clone(),
        config.smoothing.clone(),
    );
    let engine = ProcessEngine::new(settings, backend).with_progress(!args.quiet);
    let mut shell = Shell::new(engine, config);

    match args.command {
        Some(command) => {
            let command = match command {
                Command::Process => ShellCommand::Process,
                Command::Analyze => ShellCommand::Analyze,
                Command::Combine(combine) => ShellCommand::Combine(combine),
            };
            shell.execute(command).await?;
            Ok(())
        }
        None => shell.run().await,
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Ignoring {}: {:#}", CONFIG_FILE, e);
            Ok(Config::default())
        }
    }
}
