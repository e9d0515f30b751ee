//! Rubberduck CLI
//!
//! A command-line front end for evaluating untrusted script snippets in a
//! pool of sandboxed workers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rubberduck::{Config, EXAMPLE_CONFIG, ExecutionResult, Runner};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

use crate::chat::MessageReader;

mod chat;

#[derive(Parser)]
#[command(name = "rubberduck")]
#[command(about = "Evaluate untrusted script snippets in sandboxed workers")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: rubberduck.toml)
        #[arg(short, long, default_value = "rubberduck.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a script and print its output
    Run {
        /// Script to run, or `-` for stdin
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Seconds to wait for a result
        #[arg(short, long)]
        timeout: Option<f64>,
    },

    /// Validate a script without running it
    Check {
        /// Script to check, or `-` for stdin
        #[arg(value_name = "FILE")]
        source: PathBuf,
    },

    /// Answer chat messages read from stdin
    Chat {
        /// Prefix marking a message as code to run
        #[arg(short, long, default_value = ">>")]
        prefix: String,
    },

    /// Show the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run { source, timeout } => run_script(config, &source, timeout).await,
        Commands::Check { source } => check_script(&config, &source).await,
        Commands::Chat { prefix } => run_chat(config, prefix).await,
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn read_source(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut source = String::new();
        tokio::io::stdin()
            .read_to_string(&mut source)
            .await
            .context("failed to read script from stdin")?;
        return Ok(source);
    }

    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read script '{}'", path.display()))
}

async fn run_script(config: Config, path: &Path, timeout: Option<f64>) -> Result<()> {
    let source = read_source(path).await?;
    let timeout = timeout
        .map(Duration::try_from_secs_f64)
        .transpose()
        .context("invalid timeout")?;

    let runner = Runner::start(config).context("failed to start worker pool")?;
    let timed = runner.run_timed(&source, timeout).await;
    runner.shutdown().await;

    info!(
        status = %timed.status(),
        elapsed = format_args!("{:.3}s", timed.elapsed.as_secs_f64()),
        "execution result"
    );

    match timed.result {
        ExecutionResult::Success(output) => {
            print!("{output}");
            Ok(())
        }
        failure => {
            eprintln!("{}", failure.describe());
            std::process::exit(1);
        }
    }
}

async fn check_script(config: &Config, path: &Path) -> Result<()> {
    let source = read_source(path).await?;

    match rubberduck::compile(&source, &config.policy) {
        Ok(_) => {
            println!("OK");
            Ok(())
        }
        Err(e) => {
            eprintln!("Compile error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run_chat(config: Config, prefix: String) -> Result<()> {
    let runner = Arc::new(Runner::start(config).context("failed to start worker pool")?);
    let mut reader = MessageReader::new(prefix);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut replies = JoinSet::new();
    let mut received = 0_u64;

    while let Some(line) = lines.next_line().await.context("failed to read message")? {
        if let Some(message) = reader.push(&line) {
            received += 1;
            replies.spawn(answer(runner.clone(), received, message));
        }
    }
    if let Some(message) = reader.finish() {
        received += 1;
        replies.spawn(answer(runner.clone(), received, message));
    }

    while let Some(joined) = replies.join_next().await {
        joined.context("reply task failed")?;
    }

    let stats = runner.stats();
    info!(
        messages = received,
        completed = stats.completed,
        peak_busy = stats.peak_busy,
        reclaimed = stats.reclaimed,
        "chat finished"
    );
    runner.shutdown().await;
    Ok(())
}

async fn answer(runner: Arc<Runner>, number: u64, message: String) {
    let source = chat::extract_code(&message);
    let timed = runner.run_timed(&source, None).await;
    println!("--- reply to message {number} ---\n{}", chat::render(&timed));
}

fn show_config(config: &Config) {
    println!("Worker binary: {}", config.worker_binary().display());
    println!("Pool size: {}", config.pool_size);
    println!("Timeout: {:?}", config.timeout());
    println!("Reclaim grace: {:?}", config.reclaim_grace());
    println!("Sweep interval: {:?}", config.sweep_interval());
    println!("Jobs per worker: {}", config.max_jobs_per_worker);
    println!();
    println!("Sandbox policy:");
    println!("  Allowed modules: {}", config.policy.allowed_modules.join(", "));
    println!("  Max output: {} bytes", config.policy.max_output);
    println!("  Max recursion: {}", config.policy.max_recursion);
    println!("  Max sequence: {}", config.policy.max_sequence);
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
