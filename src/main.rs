//! D3Net Bridge - background service
//!
//! Opens the RS-485 link to the gateway, discovers the indoor units and keeps
//! their status mirrors fresh until interrupted.

use anyhow::Context;
use clap::Parser;
use d3net_core::core::transport::RegisterBus;
use d3net_core::{AppConfig, Bridge, Gateway, LogRing, LoggingConfig, RtuTransport, SimulatedBus};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// D3Net Bridge service
#[derive(Parser, Debug)]
#[command(name = "d3net-bridge", version, about = "D3Net HVAC bridge service", long_about = None)]
struct Args {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "D3NET_CONFIG")]
    config: Option<PathBuf>,

    /// Serial port, overrides the config file
    #[arg(short, long, env = "D3NET_PORT")]
    port: Option<String>,

    /// Run against a simulated installation instead of a serial port
    #[arg(long)]
    simulate: bool,

    /// Emit JSON log lines
    #[arg(long)]
    json: bool,
}

type DynBus = Box<dyn RegisterBus + Send>;

fn init_logging(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("invalid log level")?;

    let console = if config.json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let mut guard = None;
    let file = match config.file_dir() {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(&dir, "d3net-bridge.log");
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            guard = Some(file_guard);
            Some(fmt::layer().with_writer(writer).with_ansi(false).boxed())
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("installing log subscriber")?;
    Ok(guard)
}

fn open_bus(config: &AppConfig, simulate: bool) -> anyhow::Result<DynBus> {
    if simulate {
        tracing::info!("using simulated installation");
        return Ok(Box::new(SimulatedBus::demo()));
    }
    tracing::info!("opening {}", config.serial.connection_info());
    let transport = RtuTransport::open(&config.serial, config.rtu.clone())
        .with_context(|| format!("opening {}", config.serial.port))?;
    Ok(Box::new(transport))
}

/// Copy new ring lines into the tracing output
async fn follow_ring(logs: Arc<LogRing>, shutdown: CancellationToken) {
    let mut since = 0;
    loop {
        for line in logs.get_logs(since, usize::MAX) {
            tracing::info!(target: "d3net::ring", seq = line.seq, "{}", line.text);
            since = line.seq;
        }
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(Duration::from_millis(500)) => {}
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(port) = args.port {
        config.serial.port = port;
    }
    config.logging.json |= args.json;

    let _guard = init_logging(&config.logging)?;
    tracing::info!("Starting {} v{}", d3net_core::NAME, d3net_core::VERSION);

    let bus = open_bus(&config, args.simulate)?;
    let gateway = Gateway::with_clock(
        bus,
        d3net_core::core::gateway::SystemClock::new(),
        config.rtu.slave_id,
        config.gateway.clone(),
    );
    let bridge = Arc::new(Bridge::new(gateway, config.bridge.clone()));

    let shutdown = CancellationToken::new();
    let follower = config
        .logging
        .follow_ring
        .then(|| tokio::spawn(follow_ring(Arc::clone(bridge.logs()), shutdown.clone())));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received, shutting down"),
            Err(e) => tracing::error!("cannot listen for interrupt: {}", e),
        }
        signal_token.cancel();
    });

    Arc::clone(&bridge).run(shutdown.clone()).await;
    shutdown.cancel();
    if let Some(follower) = follower {
        follower.await.context("log follower")?;
    }

    let stats = bridge.stats();
    tracing::info!(
        polls = stats.poll_cycles,
        commands = stats.commands,
        errors = stats.errors,
        busy = stats.busy,
        "stopped"
    );
    Ok(())
}
