use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;

use chat_relay::client::RelayClient;
use chat_relay::config::{FileConfig, RelayConfig, ServerConfig, load_config};
use chat_relay::server::RelayServer;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Realtime message and typing relay for one-to-one chat")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server in the foreground (default)
    Serve(ServeArgs),

    /// Join a room and print every relayed event as a JSON line
    Listen(ListenArgs),
}

#[derive(Parser, Default)]
struct ServeArgs {
    /// Host to bind to (overrides relay.toml / RELAY_SERVER__HOST)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port to listen on (overrides relay.toml / RELAY_SERVER__PORT / PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding relay.toml (defaults to the working directory)
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Parser)]
struct ListenArgs {
    /// Relay WebSocket URL
    #[arg(long, default_value = "ws://127.0.0.1:3001/ws")]
    url: String,

    /// User whose room to join
    #[arg(long)]
    user: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => {
            let args = ServeArgs {
                config_dir: PathBuf::from("."),
                ..Default::default()
            };
            run_server(args).await
        }
        Some(Commands::Serve(args)) => run_server(args).await,
        Some(Commands::Listen(args)) => run_listener(args).await,
    }
}

fn init_logging(debug: bool) {
    let default_directive = if debug {
        "relay=debug,chat_relay=debug,tower_http=debug,info"
    } else {
        "relay=info,chat_relay=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();
}

async fn run_server(args: ServeArgs) -> Result<()> {
    init_logging(args.debug);

    let file_config: FileConfig = load_config(&args.config_dir)
        .extract()
        .context("Failed to load relay configuration")?;
    let env_port = std::env::var("PORT").ok();
    let server_config = ServerConfig::resolve(
        &file_config.server,
        args.host.as_deref(),
        args.port,
        env_port.as_deref(),
    )?;
    let relay_config = RelayConfig::from_file(&file_config.relay);

    info!("Starting chat relay");
    info!(
        queue = relay_config.send_queue_capacity,
        typing_ttl_ms = relay_config.typing_ttl.map(|d| d.as_millis() as u64).unwrap_or(0),
        heartbeat_secs = relay_config.heartbeat_interval.map(|d| d.as_secs()).unwrap_or(0),
        "Relay configuration"
    );

    let server = RelayServer::bind(&server_config, relay_config).await?;
    let addr = server.local_addr()?;

    info!("Relay listening on http://{}", addr);
    info!("  GET /ws          - WebSocket (join, sendMessage, typing)");
    info!("  GET /health      - Health status");
    info!("  GET /metrics     - Relay metrics");

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    server.run(shutdown_signal).await
}

async fn run_listener(args: ListenArgs) -> Result<()> {
    init_logging(false);

    let mut client = RelayClient::connect(&args.url).await?;
    client.join(&args.user).await?;
    info!(user = %args.user, "Joined room, waiting for events (Ctrl-C to stop)");

    loop {
        tokio::select! {
            event = client.next_event() => {
                match event? {
                    Some(event) => println!("{}", serde_json::to_string(&event)?),
                    None => {
                        info!("Relay closed the connection");
                        return Ok(());
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.close().await?;
    Ok(())
}
