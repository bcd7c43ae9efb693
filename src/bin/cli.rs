//! Agency Gateway CLI
//!
//! Command-line access to the OpenClaw gateway: inspect sessions, read
//! transcripts, send messages, spawn workers and watch live events.

use agency_gateway::config::{self, Config, LogFormat};
use agency_gateway::gateway::{
    ClientOptions, GatewayClient, GatewayEvent, GatewayHttpClient, SpawnSessionParams,
};
use agency_gateway::VERSION;
use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use secrecy::ExposeSecret;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "agency-gateway",
    author = "Agency Dashboard Contributors",
    version = VERSION,
    about = "Agency Gateway - client for the OpenClaw agent runtime",
    long_about = None
)]
struct Cli {
    /// Gateway URL (overrides config and OPENCLAW_GATEWAY_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show gateway status
    Status,

    /// List sessions
    Sessions,

    /// Show the transcript of a session
    History {
        /// Session key
        key: String,
    },

    /// Send a message into a session
    Send {
        /// Session key
        key: String,
        /// Message text
        message: String,
        /// Use the HTTP tool endpoint instead of the WebSocket
        #[arg(long)]
        http: bool,
    },

    /// Spawn a new worker session
    Spawn {
        /// Task description
        task: String,
        /// Session label
        #[arg(short, long)]
        label: Option<String>,
        /// Model override
        #[arg(short, long)]
        model: Option<String>,
        /// Agent identity
        #[arg(short, long)]
        agent: Option<String>,
        /// Run timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Print gateway events until Ctrl-C
    Watch,

    /// Show the effective configuration and validation issues
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = config::load_config().context("Failed to load configuration")?;
    if let Some(url) = cli.url {
        config.gateway.url = url;
    }

    init_logging(&config);
    debug!(url = %config.gateway.url, "Loaded configuration");

    match cli.command {
        Commands::Status => show_status(&config).await,
        Commands::Sessions => list_sessions(&config).await,
        Commands::History { key } => show_history(&config, &key).await,
        Commands::Send { key, message, http } => send_message(&config, &key, &message, http).await,
        Commands::Spawn {
            task,
            label,
            model,
            agent,
            timeout,
        } => {
            let mut params = SpawnSessionParams::new(task);
            params.label = label;
            params.model = model;
            params.agent_id = agent;
            params.run_timeout_seconds = timeout;
            spawn_session(&config, params).await
        }
        Commands::Watch => watch_events(&config).await,
        Commands::Config { init } => show_config(&config, init),
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_new(&config.log.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn connect(config: &Config) -> anyhow::Result<GatewayClient> {
    let client = GatewayClient::new(ClientOptions::from_config(&config.gateway))?;
    client
        .connect()
        .await
        .with_context(|| format!("Could not connect to {}", config.gateway.url))?;
    info!(url = %config.gateway.url, "Connected to gateway");
    Ok(client)
}

// ============================================================================
// Commands
// ============================================================================

async fn show_status(config: &Config) -> anyhow::Result<()> {
    let client = connect(config).await?;
    let status = client.get_status().await?;

    println!("{} {}", style("●").green(), style(&config.gateway.url).cyan());
    println!("{}", serde_json::to_string_pretty(&status)?);

    client.close().await;
    Ok(())
}

async fn list_sessions(config: &Config) -> anyhow::Result<()> {
    let client = connect(config).await?;
    let sessions = client.list_sessions().await?;
    client.close().await;

    if sessions.is_empty() {
        println!("{}", style("No sessions").dim());
        return Ok(());
    }

    for session in &sessions {
        let name = session
            .label
            .as_deref()
            .or(session.display_name.as_deref())
            .unwrap_or("-");
        let updated = session
            .last_activity()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{}  {}  {}  {}",
            style(&session.key).cyan(),
            name,
            style(session.model.as_deref().unwrap_or("-")).dim(),
            style(updated).dim()
        );
    }
    println!("\n{} session(s)", sessions.len());
    Ok(())
}

async fn show_history(config: &Config, key: &str) -> anyhow::Result<()> {
    let client = connect(config).await?;
    let messages = client.get_session_history(key).await?;
    client.close().await;

    for message in &messages {
        let role = format!("{:?}", message.role).to_lowercase();
        let text = message
            .text()
            .unwrap_or_else(|| message.content.to_string());
        println!("{} {}", style(format!("[{}]", role)).bold(), text);
    }
    Ok(())
}

async fn send_message(config: &Config, key: &str, message: &str, http: bool) -> anyhow::Result<()> {
    if http {
        let client = GatewayHttpClient::from_options(&ClientOptions::from_config(&config.gateway))?;
        let result = client.send_session_message(key, message).await?;
        debug!(?result, "Tool invocation result");
    } else {
        let client = connect(config).await?;
        client.send_message(key, message).await?;
        client.close().await;
    }

    println!("{} Sent to {}", style("✓").green(), style(key).cyan());
    Ok(())
}

async fn spawn_session(config: &Config, params: SpawnSessionParams) -> anyhow::Result<()> {
    let client = connect(config).await?;
    let spawned = client.spawn_session(params).await?;
    client.close().await;

    println!("{} Spawned {}", style("✓").green(), style(&spawned.session_key).cyan());
    if let Some(run_id) = spawned.run_id {
        println!("   └─ Run: {}", run_id);
    }
    Ok(())
}

async fn watch_events(config: &Config) -> anyhow::Result<()> {
    let client = GatewayClient::new(ClientOptions::from_config(&config.gateway))?;
    let mut events = client.subscribe();
    client
        .connect()
        .await
        .with_context(|| format!("Could not connect to {}", config.gateway.url))?;

    println!("{}", style("Watching gateway events (Ctrl-C to stop)").dim());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(GatewayEvent::Method { method, params }) => {
                    println!("{} {}", style(method).cyan(), params);
                }
                Ok(GatewayEvent::Notification(_)) => {}
                Ok(GatewayEvent::Disconnected { reason }) => {
                    println!("{} Disconnected: {}", style("✗").red(), reason);
                    break;
                }
                Ok(event) => println!("{} {:?}", style(event.name()).yellow(), event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    println!("{} skipped {} event(s)", style("⚠").yellow(), skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    client.close().await;
    Ok(())
}

fn show_config(config: &Config, init: bool) -> anyhow::Result<()> {
    let path = config::config_path();
    if init && !path.exists() {
        config::save_config(&Config::default(), &path)?;
        println!("{} Wrote {}", style("✓").green(), path.display());
    }

    let gateway = &config.gateway;
    let token = if gateway.token.expose_secret().is_empty() {
        style("(not set)").red().to_string()
    } else {
        style("(set)").green().to_string()
    };

    println!("{}", style("Gateway").bold());
    println!("   └─ URL: {}", style(&gateway.url).cyan());
    println!("   └─ Token: {}", token);
    println!(
        "   └─ Timeouts: connect {}, request {}",
        humantime::format_duration(gateway.connect_timeout),
        humantime::format_duration(gateway.request_timeout)
    );
    println!("   └─ History limit: {}", gateway.history_limit);
    println!("{}", style("Logging").bold());
    println!("   └─ Level: {}", config.log.level);
    println!("   └─ Format: {}", config.log.format);

    let snapshot = config::read_config_snapshot(&path);
    println!("{}", style("Config file").bold());
    println!("   └─ Path: {}", snapshot.path.display());
    if snapshot.exists {
        for issue in &snapshot.issues {
            println!("   └─ {} {}", style("⚠").yellow(), issue);
        }
    } else {
        println!("   └─ {} (run `config --init` to create it)", style("not found").dim());
    }

    println!("{}", style("Effective settings").bold());

    let validation = config::validate_config(config);
    for issue in &validation.errors {
        println!("{} {}: {}", style("✗").red(), issue.path, issue.message);
        if let Some(suggestion) = &issue.suggestion {
            println!("   └─ {}", style(suggestion).dim());
        }
    }
    for issue in &validation.warnings {
        println!("{} {}: {}", style("⚠").yellow(), issue.path, issue.message);
        if let Some(suggestion) = &issue.suggestion {
            println!("   └─ {}", style(suggestion).dim());
        }
    }

    if !validation.valid {
        anyhow::bail!("Configuration has {} error(s)", validation.errors.len());
    }
    Ok(())
}
