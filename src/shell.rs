//! Interactive command shell.
//!
//! Each input line is split shell-style and parsed with clap in multicall
//! mode, so the first word names the command. Errors in one command are
//! reported and the shell keeps running.

use crate::backend::MeshBackend;
use crate::cli::CombineArgs;
use crate::config::Config;
use crate::engine::ProcessEngine;
use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error};

/// Product name shown in the banner and messages.
pub const PROGRAM_NAME: &str = "VersaMesh";

/// Project home page.
pub const WEBSITE: &str = "https://github.com/christoferpeterson/versamesh";

const PROMPT: &str = "> ";

const BANNER: [&str; 4] = [
    r" _____                 _____         _   ",
    r"|  |  |___ ___ ___ ___|     |___ ___| |_ ",
    r"|  |  | -_|  _|_ -| .'| | | | -_|_ -|   |",
    r" \___/|___|_| |___|__,|_|_|_|___|___|_|_|",
];

#[derive(Parser, Debug)]
#[command(multicall = true)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

/// Commands accepted at the prompt.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// Update one or more settings: set inputFolder=/data outputFolder="./my output"
    Set {
        #[arg(required = true, value_name = "KEY=VALUE")]
        pairs: Vec<String>,
    },
    /// Display the current settings
    Settings,
    /// Simplify every mesh in the input folder with the selected algorithms
    Process,
    /// Analyze the simplified and smoothed meshes
    Analyze,
    /// Combine result tables into one dataset
    Combine(CombineArgs),
    /// Open the project website in a web browser
    Website,
    /// Display version information
    About,
    /// Exit the program
    #[command(alias = "quit")]
    Exit,
}

/// Whether the shell should keep reading commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Split a command line into words, honouring single and double quotes.
///
/// Inside double quotes a backslash escapes the next character.
pub fn split_command_line(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some('\''), '\'') | (Some('"'), '"') => quote = None,
            (Some('"'), '\\') => match chars.next() {
                Some(next) => current.push(next),
                None => bail!("No escaped character"),
            },
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        bail!("No closing quotation");
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Parse one line of input. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ShellCommand>> {
    let words = split_command_line(line)?;
    if words.is_empty() {
        return Ok(None);
    }

    let parsed = ShellLine::try_parse_from(words)?;
    Ok(Some(parsed.command))
}

/// Split a `key=value` argument, trimming both sides.
pub fn parse_pair(arg: &str) -> Result<(&str, &str)> {
    arg.split_once('=')
        .map(|(key, value)| (key.trim(), value.trim()))
        .ok_or_else(|| anyhow!("Invalid argument '{}'. Expected format key=value.", arg))
}

/// Banner printed when the shell starts.
pub fn banner() -> String {
    let mut lines: Vec<String> = BANNER.iter().map(|l| l.to_string()).collect();
    if let Some(last) = lines.last_mut() {
        last.push_str(&format!(" v{}", env!("CARGO_PKG_VERSION")));
    }
    lines.join("\n")
}

/// Interactive front end over a [`ProcessEngine`].
pub struct Shell<B: MeshBackend> {
    engine: ProcessEngine<B>,
    config: Config,
}

impl<B: MeshBackend> Shell<B> {
    pub fn new(engine: ProcessEngine<B>, config: Config) -> Self {
        Self { engine, config }
    }

    /// Read and execute commands from stdin until `exit` or end of input.
    pub async fn run(&mut self) -> Result<()> {
        println!("{}", banner());
        println!(
            "Welcome to {}. Type help to list commands.\n",
            PROGRAM_NAME
        );

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("{}", PROMPT);
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                println!();
                break;
            };

            let command = match parse_line(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    match e.downcast_ref::<clap::Error>() {
                        Some(clap_err) => {
                            let _ = clap_err.print();
                        }
                        None => println!("Error processing input: {}", e),
                    }
                    continue;
                }
            };

            match self.execute(command).await {
                Ok(Flow::Exit) => break,
                Ok(Flow::Continue) => {}
                Err(e) => {
                    error!("{:#}", e);
                    eprintln!("❌ Error: {:#}", e);
                }
            }
        }

        Ok(())
    }

    /// Execute a single command.
    pub async fn execute(&mut self, command: ShellCommand) -> Result<Flow> {
        debug!("Executing {:?}", command);

        match command {
            ShellCommand::Set { pairs } => self.set(&pairs),
            ShellCommand::Settings => {
                for (key, value) in self.engine.settings().entries() {
                    println!("{} = {}", key, value);
                }
            }
            ShellCommand::Process => {
                let summary = self.engine.process().await?;
                println!("\n📊 Process Summary:");
                println!("   Started: {}", summary.started_at.format("%Y-%m-%d %H:%M:%S"));
                println!("   Input meshes: {}", summary.inputs);
                println!(
                    "   Simplified: {} new | {} skipped | {} failed",
                    summary.simplify.completed, summary.simplify.skipped, summary.simplify.failed
                );
                println!(
                    "   Smoothed: {} new | {} skipped | {} failed",
                    summary.smooth.completed, summary.smooth.skipped, summary.smooth.failed
                );
                println!("   Duration: {:.2}s", summary.duration_seconds);
                if summary.failed() > 0 {
                    println!(
                        "⚠️  {} step(s) failed, see the log above for details.",
                        summary.failed()
                    );
                }
            }
            ShellCommand::Analyze => {
                let summary = self.engine.analyze().await?;
                println!("\n📊 Analysis Summary:");
                println!("   Groups: {}", summary.groups);
                println!(
                    "   Analyzed: {} | Skipped: {} | Failed: {}",
                    summary.analyzed, summary.skipped, summary.failed
                );
                println!("   Duration: {:.2}s", summary.duration_seconds);
            }
            ShellCommand::Combine(args) => self.combine(args)?,
            ShellCommand::Website => open_website().await,
            ShellCommand::About => {
                println!("{} v{}", PROGRAM_NAME, env!("CARGO_PKG_VERSION"));
                println!("{}", env!("CARGO_PKG_DESCRIPTION"));
                println!("{}", WEBSITE);
            }
            ShellCommand::Exit => {
                println!("Exiting...");
                return Ok(Flow::Exit);
            }
        }

        Ok(Flow::Continue)
    }

    fn set(&mut self, pairs: &[String]) {
        for arg in pairs {
            let (key, value) = match parse_pair(arg) {
                Ok(pair) => pair,
                Err(e) => {
                    println!("Error: {}", e);
                    continue;
                }
            };

            match self.engine.update_setting(key, value) {
                Ok(()) => println!("✅ {} = {}", key, value),
                Err(e) => {
                    error!("{}", e);
                    println!("Error: {}", e);
                }
            }
        }
    }

    fn combine(&self, args: CombineArgs) -> Result<()> {
        let folder = args
            .folder
            .unwrap_or_else(|| PathBuf::from(&self.config.general.aggregate_folder));
        let control_group = args
            .control_group
            .unwrap_or_else(|| self.config.general.control_group.clone());

        let summary = self.engine.combine(
            &folder,
            &control_group,
            &self.config.general.numeric_column,
        )?;

        println!("\n📊 Combine Summary:");
        println!("   Tables: {} | Rows: {}", summary.tables, summary.rows);
        if summary.unreadable > 0 {
            println!(
                "⚠️  {} table(s) could not be read, see the log above for details.",
                summary.unreadable
            );
        }
        if summary.errors.is_empty() {
            println!("   All {} values parsed as numbers", self.config.general.numeric_column);
        } else {
            println!(
                "   {} value(s) could not be parsed as numbers:",
                summary.errors.total()
            );
            for entry in summary.errors.entries() {
                println!("     {} x{}", entry.name, entry.count);
            }
        }
        println!("   Combined: {}", summary.combined_path.display());
        println!("   Errors: {}", summary.error_path.display());
        Ok(())
    }
}

/// Open the website with the platform opener, or print it.
async fn open_website() {
    let opener = if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "windows") {
        "explorer"
    } else {
        "xdg-open"
    };

    let opened = tokio::process::Command::new(opener)
        .arg(WEBSITE)
        .status()
        .await
        .is_ok_and(|status| status.success());

    if !opened {
        println!(
            "Visit {} for detailed information about {}.",
            WEBSITE, PROGRAM_NAME
        );
    }
}
