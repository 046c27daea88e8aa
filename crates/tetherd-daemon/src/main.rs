use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use tetherd_bt::{BluetoothctlRunner, ConnectivityProbe};
use tetherd_core::config::Config;

use tetherd_daemon::actuator::{Actuator, ExecDriver, HotspotDriver, LogDriver};
use tetherd_daemon::client::DaemonClient;
use tetherd_daemon::monitor::Monitor;
use tetherd_daemon::poller::ProbeSource;
use tetherd_daemon::preflight::run_preflight;
use tetherd_daemon::relay::CommandRelay;
use tetherd_daemon::server::{ControlServer, SharedState, StatusInfo};
use tetherd_daemon::status::format_status;
use tetherd_daemon::store::StateStore;

const DEFAULT_CONFIG: &str = "/etc/tetherd.toml";

#[derive(Parser)]
#[command(name = "tetherd", about = "Bluetooth-keyed hotspot automation daemon")]
struct Cli {
    /// Config file path. A missing file falls back to built-in defaults.
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Override the control socket path from the config.
    #[arg(long)]
    socket: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the monitor daemon (default when no subcommand given)
    Daemon,
    /// Start the actuator process that applies relayed commands
    Actuator,
    /// Show current daemon status (one-shot)
    Status {
        /// Emit the raw status snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Stream the activity feed until interrupted
    Watch,
    /// Switch the monitored device
    SetTarget {
        /// Bluetooth device name
        target: String,
    },
    /// Enable or disable automatic hotspot commands
    Automation {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Clear persisted state and stop the daemon
    Stop,
    /// Check the host environment (bluez, controller, binary, sockets)
    Preflight,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing. Respects RUST_LOG env var, defaults to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let socket = cli.socket.unwrap_or_else(|| config.paths.socket.clone());

    match cli.command {
        None | Some(Commands::Daemon) => run_daemon(config, socket).await?,
        Some(Commands::Actuator) => run_actuator(config, socket).await?,
        Some(Commands::Status { json }) => run_status(&socket, json).await?,
        Some(Commands::Watch) => run_watch(&socket).await?,
        Some(Commands::SetTarget { target }) => {
            connect(&socket).await?.set_target(&target).await.map_err(to_anyhow)?;
            println!("target set to {target:?}");
        }
        Some(Commands::Automation { state }) => {
            let enabled = matches!(state, Toggle::On);
            connect(&socket).await?.set_automation(enabled).await.map_err(to_anyhow)?;
            println!("automation {}", if enabled { "on" } else { "off" });
        }
        Some(Commands::Stop) => {
            connect(&socket).await?.stop().await.map_err(to_anyhow)?;
            println!("stop requested");
        }
        Some(Commands::Preflight) => {
            std::process::exit(run_preflight());
        }
    }

    Ok(())
}

/// A missing config file is a normal first run; a malformed one is not.
fn load_config(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }
    Config::load(path).with_context(|| format!("loading config {}", path.display()))
}

async fn run_daemon(config: Config, socket: String) -> anyhow::Result<()> {
    tracing::info!(
        target = %config.monitor.target,
        window_ms = config.monitor.debounce_window_ms,
        socket = %socket,
        "starting tetherd daemon"
    );

    // An absent signal source at startup is the one unrecoverable error:
    // everything downstream would only ever observe "disconnected".
    let probe = Arc::new(ConnectivityProbe::new(Box::new(BluetoothctlRunner::default())));
    if let Err(e) = probe.controller_powered() {
        if e.is_source_unavailable() {
            anyhow::bail!("bluetooth signal source unavailable: {e}");
        }
        tracing::warn!(error = %e, "controller check failed, continuing");
    }

    ensure_parent_dir(&config.paths.state_db)?;
    ensure_parent_dir(&config.paths.relay_db)?;

    let store = StateStore::open(Path::new(&config.paths.state_db))
        .with_context(|| format!("opening state db {}", config.paths.state_db))?;
    let relay = CommandRelay::open(Path::new(&config.paths.relay_db))
        .with_context(|| format!("opening relay db {}", config.paths.relay_db))?;

    // Event channel: sources/server -> monitor. Activity broadcast:
    // monitor -> subscribed clients.
    let (event_tx, event_rx) = mpsc::channel(256);
    let (activity_tx, _) = broadcast::channel(64);
    let shared: SharedState = Arc::new(RwLock::new(StatusInfo {
        target: config.monitor.target.clone(),
        automation_enabled: config.monitor.automation_enabled,
        ..StatusInfo::default()
    }));
    let cancel = CancellationToken::new();

    let monitor = Monitor::new(
        config.monitor.clone(),
        config.wake.clone(),
        store,
        relay,
        Arc::clone(&probe),
        event_rx,
        Arc::clone(&shared),
        activity_tx.clone(),
        cancel.clone(),
    );
    let poller = ProbeSource::new(
        probe,
        Arc::clone(&shared),
        event_tx.clone(),
        config.monitor.poll_interval(),
        cancel.clone(),
    );
    let server = ControlServer::new(&socket, shared, event_tx, activity_tx, cancel.clone());

    tokio::select! {
        _ = monitor.run() => {
            tracing::warn!("monitor exited");
        }
        _ = poller.run() => {
            tracing::warn!("probe source exited unexpectedly");
        }
        result = server.run() => {
            match result {
                Ok(()) => tracing::warn!("server exited"),
                Err(e) => tracing::warn!("server error: {e}"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }
    cancel.cancel();

    // Remove the socket if the server did not get to clean up itself.
    let socket_path = PathBuf::from(&socket);
    if socket_path.exists() {
        if let Err(e) = std::fs::remove_file(&socket_path) {
            tracing::warn!(path = %socket_path.display(), "failed to remove socket file: {e}");
        }
    }

    tracing::info!("tetherd daemon stopped");
    Ok(())
}

async fn run_actuator(config: Config, socket: String) -> anyhow::Result<()> {
    ensure_parent_dir(&config.paths.relay_db)?;
    let relay = CommandRelay::open(Path::new(&config.paths.relay_db))
        .with_context(|| format!("opening relay db {}", config.paths.relay_db))?;

    let driver: Arc<dyn HotspotDriver> = match &config.actuator.driver_program {
        Some(program) => {
            tracing::info!(program = %program, "using exec driver");
            Arc::new(ExecDriver::new(program.clone()))
        }
        None => {
            tracing::warn!("no driver_program configured, commands will only be logged");
            Arc::new(LogDriver)
        }
    };

    let cancel = CancellationToken::new();
    let actuator = Actuator::new(
        relay,
        driver,
        &socket,
        config.actuator.poll_interval(),
        cancel.clone(),
    );

    tracing::info!(
        interval_ms = config.actuator.poll_interval_ms,
        "starting tetherd actuator"
    );
    tokio::select! {
        _ = actuator.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
            cancel.cancel();
        }
    }
    Ok(())
}

/// Connect to the daemon, fetch the snapshot, and print it.
async fn run_status(socket: &str, json: bool) -> anyhow::Result<()> {
    let mut client = connect(socket).await?;
    let info = client.status().await.map_err(to_anyhow)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        print!("{}", format_status(&info));
    }
    Ok(())
}

/// Subscribe to the activity feed and print entries until the daemon goes
/// away or the user interrupts.
async fn run_watch(socket: &str) -> anyhow::Result<()> {
    let mut client = connect(socket).await?;
    client
        .watch(|entry| {
            let tag = if entry.success { "ok" } else { "FAIL" };
            println!(
                "{}  [{}] {} ({}): {}",
                entry.at.to_rfc3339(),
                tag,
                entry.action,
                entry.subject,
                entry.details,
            );
        })
        .await
        .map_err(to_anyhow)?;
    Ok(())
}

async fn connect(socket: &str) -> anyhow::Result<DaemonClient> {
    DaemonClient::connect(socket).await.map_err(|e| {
        eprintln!("Failed to connect to daemon at {}: {}", socket, e);
        eprintln!("Is the daemon running? Start it with: tetherd daemon");
        anyhow::Error::from(e)
    })
}

fn ensure_parent_dir(path: &str) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    Ok(())
}

fn to_anyhow(e: Box<dyn std::error::Error>) -> anyhow::Error {
    anyhow::anyhow!(e.to_string())
}
