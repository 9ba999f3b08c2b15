#![forbid(unsafe_code)]

//! `goja-server` — participant study engine binary.
//!
//! Bootstraps configuration and the case dataset, wires the session
//! coordinator to the conversational-agent client, and serves events over
//! the stdio bridge until EOF.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use goja_server::agent::OpenAiAgent;
use goja_server::cases::CaseSet;
use goja_server::channels::ChannelRegistry;
use goja_server::config::StudyConfig;
use goja_server::coordinator::SessionCoordinator;
use goja_server::{ipc, AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "goja-server", about = "Participant study engine", version, long_about = None)]
struct Cli {
    /// Path to the TOML study configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("goja-server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args.config))
}

async fn run(config_path: PathBuf) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config_text = std::fs::read_to_string(config_path)
        .map_err(|err| AppError::Config(format!("cannot read config: {err}")))?;
    let mut config = StudyConfig::from_toml_str(&config_text)?;
    config.load_credentials()?;

    // ── Load the case dataset, if configured ────────────
    let cases = match &config.cases {
        Some(cases_config) => {
            let set = CaseSet::load(&cases_config.file, cases_config.columns.as_deref())?;
            info!(cases = set.len(), "case dataset loaded");
            Some(Arc::new(set))
        }
        None => {
            info!("no case dataset configured, case-rating stage disabled");
            None
        }
    };
    if let Some(set) = &cases {
        config.clamp_case_limit(set.len());
    }

    let config = Arc::new(config);
    info!("configuration loaded");

    // ── Wire up the engine ──────────────────────────────
    let agent = Arc::new(OpenAiAgent::new(config.agent.clone())?);
    let channels = Arc::new(ChannelRegistry::new());
    let coordinator = SessionCoordinator::new(Arc::clone(&config), cases, channels, agent)?;

    info!("study engine ready");

    // ── Serve events until stdin closes ─────────────────
    ipc::run_stdio_bridge(&coordinator).await?;
    info!("goja-server shut down");
    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
