use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use concierge_core::{
    Concierge, ConversationContext, InMemorySessionStore, IntentClassifier, TurnOutcome, TurnStatus,
    types::format_tags,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::ConciergeConfig;

#[derive(Parser)]
#[command(name = "concierge")]
#[command(version)]
#[command(about = "Concierge — routes each message to the right specialist")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory and default config
    Init,

    /// Show current configuration (secrets masked)
    Config,

    /// Show tags, urgency and route for a message without calling any specialist
    Classify {
        /// The message to classify
        message: String,
    },

    /// Send a one-shot message in a fresh session
    Ask {
        /// The message to send
        message: String,
    },

    /// Interactive session on stdin (Ctrl-C or an empty line ends it)
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Classify { message } => cmd_classify(&cli.config, &message).await,
        Commands::Ask { message } => cmd_ask(&cli.config, &message, cli.debug).await,
        Commands::Chat => cmd_chat(&cli.config, cli.debug).await,
    }
}

/// Build the concierge described by the config
fn build_concierge(cfg: &ConciergeConfig) -> Result<Concierge> {
    let registry = Arc::new(cfg.build_registry()?);
    Ok(Concierge::new(registry, cfg.settings())
        .with_classifier(IntentClassifier::new(cfg.keywords.clone())))
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config::default_config_path();
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        tokio::fs::write(&config_path, config::DEFAULT_CONFIG)
            .await
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("Concierge initialized at {}", config_dir.display());
    println!(
        "Edit {} to configure your API key and specialists.",
        config_path.display()
    );
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = ConciergeConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.redacted())?);
    Ok(())
}

async fn cmd_classify(config_path: &Option<PathBuf>, message: &str) -> Result<()> {
    let cfg = ConciergeConfig::load(config_path)?;
    let concierge = build_concierge(&cfg)?;

    let (tags, decision, urgency) = concierge.preview(&ConversationContext::new(), message);
    println!("tags:       {}", format_tags(&tags));
    println!("urgency:    {}", urgency);
    println!("specialist: {}", decision.selected_specialist);
    match decision.primary_tag {
        Some(tag) => println!("reason:     {} tier", tag),
        None => println!("reason:     default route"),
    }
    Ok(())
}

async fn cmd_ask(config_path: &Option<PathBuf>, message: &str, verbose: bool) -> Result<()> {
    let cfg = ConciergeConfig::load(config_path)?;
    let concierge = build_concierge(&cfg)?;

    let mut context = ConversationContext::new();
    let outcome = concierge.handle_turn(&mut context, message).await;
    print_outcome(&outcome, verbose);
    Ok(())
}

async fn cmd_chat(config_path: &Option<PathBuf>, verbose: bool) -> Result<()> {
    let cfg = ConciergeConfig::load(config_path)?;
    let concierge = build_concierge(&cfg)?;
    let store = InMemorySessionStore::new();
    let session_id = store.create().await;

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            cancel_on_signal.cancel();
        }
    });

    println!("Concierge chat (session {}). Empty line or Ctrl-C to quit.", session_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line.context("Failed to read from stdin")?,
        };

        let Some(line) = line else { break };
        let message = line.trim();
        if message.is_empty() {
            break;
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = concierge.handle_session_turn(&store, &session_id, message) => outcome?,
        };
        print_outcome(&outcome, verbose);
    }

    concierge.end_session(&session_id).await;
    store.remove(&session_id).await;
    println!();
    info!("Chat session {} ended", session_id);
    Ok(())
}

fn print_outcome(outcome: &TurnOutcome, verbose: bool) {
    if verbose {
        let status = match outcome.status {
            TurnStatus::Completed => "ok".to_string(),
            TurnStatus::Fallback { category } => format!("fallback: {}", category),
        };
        println!(
            "[{} {} urgency={} {}ms {}]",
            outcome.decision.selected_specialist,
            format_tags(&outcome.decision.matched_tags),
            outcome.urgency,
            outcome.elapsed.as_millis(),
            status
        );
    }
    println!("{}", outcome.response_text);
}
