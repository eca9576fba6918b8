//! Lasertag - Handheld core for live-action laser tag
//!
//! Links the gun and the vest to the match server and keeps the local view of
//! the player and the match.

mod config;
mod game;
mod link;
mod network;
mod presenter;
mod protocol;

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::{Config, DeviceConfig, Settings};
use game::{EngineConfig, GameService, MatchEngine};
use link::{connector_for, LinkConfig, Peer, SerialLinkClient};
use network::{DatagramClient, DatagramConfig};
use presenter::{ConsolePresenter, Presenter, TracingPresenter};

/// Lasertag - handheld core for live-action laser tag
#[derive(Parser)]
#[command(name = "lasertag")]
#[command(author = "Lasertag Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Connect a laser tag gun and vest to the match server", long_about = None)]
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
    /// Join the match: connect the devices and the server
    Run {
        /// Player id assigned by the organiser
        #[arg(short, long)]
        player_id: Option<u8>,

        /// Match server address (skips broadcast discovery)
        #[arg(short, long)]
        server: Option<IpAddr>,

        /// Gun link, serial:NAME or tcp:HOST:PORT
        #[arg(long)]
        gun: Option<DeviceConfig>,

        /// Vest link, serial:NAME or tcp:HOST:PORT
        #[arg(long)]
        vest: Option<DeviceConfig>,

        /// Print notifications as JSON lines
        #[arg(long)]
        json: bool,

        /// Only log notifications, print nothing
        #[arg(long, conflicts_with = "json")]
        log_only: bool,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Write the configuration (or the sample) to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List serial ports visible for device discovery
    Ports,

    /// Show protocol information
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    match cli.command {
        Commands::Run {
            player_id,
            server,
            gun,
            vest,
            json,
            log_only,
        } => {
            if let Some(id) = player_id {
                config.player.id = id;
            }
            if server.is_some() {
                config.server.address = server;
            }
            if let Some(gun) = gun {
                config.devices.gun = gun;
            }
            if let Some(vest) = vest {
                config.devices.vest = vest;
            }

            let presenter: Box<dyn Presenter> = if log_only {
                Box::new(TracingPresenter)
            } else {
                Box::new(ConsolePresenter::stdout(json))
            };
            run_handheld(config, presenter).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else if let Some(path) = output {
                config.save(&path)?;
                println!("Configuration written to: {}", path.display());
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Ports => {
            list_ports()?;
        }
        Commands::Info => {
            print_info(&config);
        }
    }

    Ok(())
}

/// Run the handheld until Ctrl+C
async fn run_handheld(config: Config, presenter: Box<dyn Presenter>) -> anyhow::Result<()> {
    config.validate()?;
    let settings = Settings::from_config(&config);

    tracing::info!(
        "Starting player {} ({})",
        config.player.id,
        config.player.name
    );

    let (link_tx, link_rx) = mpsc::channel(64);
    let link_config = LinkConfig::from(&config.devices);
    let mut gun = SerialLinkClient::new(
        Peer::Gun,
        link_config.clone(),
        connector_for(&config.devices.gun),
        link_tx.clone(),
    );
    let mut vest = SerialLinkClient::new(
        Peer::Vest,
        link_config,
        connector_for(&config.devices.vest),
        link_tx,
    );

    let mut datagram = DatagramClient::new(
        DatagramConfig::from_server_config(&config.server),
        settings.clone(),
    );
    let datagram_rx = datagram
        .take_event_receiver()
        .ok_or_else(|| anyhow::anyhow!("datagram event receiver already taken"))?;
    datagram.start().await?;
    gun.start()?;
    vest.start()?;

    let engine = MatchEngine::new(EngineConfig::from(&config.player));
    let service = GameService::new(
        engine,
        presenter,
        datagram.handle(),
        vec![gun.handle(), vest.handle()],
        link_rx,
        datagram_rx,
    );
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let service_task = tokio::spawn(service.run(shutdown_rx));

    eprintln!("\n========================================");
    eprintln!("  Lasertag Handheld Running");
    eprintln!("========================================");
    eprintln!("  Player: {} (#{})", config.player.name, config.player.id);
    if let Some(listen) = datagram.listen_addr() {
        eprintln!("  Listen: {}", listen);
    }
    match settings.server_address.get().await {
        Some(addr) => eprintln!("  Server: {}:{}", addr, config.server.server_port),
        None => eprintln!(
            "  Server: discovering via {}",
            config.server.broadcast_address
        ),
    }
    eprintln!("  Gun:    {}", connector_for(&config.devices.gun).describe());
    eprintln!("  Vest:   {}", connector_for(&config.devices.vest).describe());
    eprintln!("========================================");
    eprintln!("\nPress Ctrl+C to stop.\n");

    tokio::signal::ctrl_c().await?;
    eprintln!("\nShutting down...");

    drop(shutdown_tx);
    let engine = service_task.await?;
    gun.stop().await;
    vest.stop().await;
    datagram.stop().await;

    let view = engine.view();
    tracing::info!(
        state = ?view.state,
        score = view.player.score,
        "Handheld stopped"
    );

    Ok(())
}

/// Print the serial ports the device discovery can see
fn list_ports() -> anyhow::Result<()> {
    let ports = link::list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }

    println!("Serial ports");
    println!("============\n");
    for (name, description) in ports {
        println!("  {:<24} {}", name, description);
    }
    Ok(())
}

/// Print protocol constants and the active device setup
fn print_info(config: &Config) {
    println!("Lasertag Handheld Information");
    println!("=============================\n");

    println!("Player: {} (#{})", config.player.name, config.player.id);
    println!(
        "Max health: {}, max bullets: {}",
        config.player.max_health, config.player.max_bullets
    );

    println!("\nServer port: {}", config.server.server_port);
    println!("Listening port: {}", config.server.listen_port);
    println!(
        "Heartbeat: every {} ms, timeout {} ms",
        config.server.heartbeat_interval_ms, config.server.heartbeat_timeout_ms
    );

    println!("\nGun:  {}", connector_for(&config.devices.gun).describe());
    println!("Vest: {}", connector_for(&config.devices.vest).describe());
    println!("Reconnect backoff: {} ms", config.devices.reconnect_backoff_ms);
    println!("Frame terminator: {}", protocol::FRAME_TERMINATOR);
}
