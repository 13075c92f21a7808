//! D3Net CLI - Command-line interface
//!
//! One-shot gateway queries and commands for scripting and commissioning.

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use d3net_core::cli::{format_errors, format_ports, format_units, from_anyhow, print_exit_codes};
use d3net_core::core::gateway::SystemClock;
use d3net_core::core::transport::{list_ports, DirectionLine, RegisterBus, SerialParity};
use d3net_core::{
    AppConfig, Bridge, CliResult, Command, ErrorReport, ExitCodes, FanDirection, FanSpeed, Gateway,
    GatewayError, Mode, OutputFormat, RtuTransport, SimulatedBus, UnitReport,
};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// D3Net CLI
#[derive(Parser, Debug)]
#[command(
    name = "d3net-cli",
    version,
    about = "Query and control D3Net HVAC units over RS-485",
    long_about = None
)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "D3NET_CONFIG")]
    config: Option<PathBuf>,

    /// Serial port name (e.g., COM3, /dev/ttyUSB0)
    #[arg(short, long, global = true, env = "D3NET_PORT")]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Data bits (5-8)
    #[arg(long, global = true)]
    data_bits: Option<u8>,

    /// Parity (none, odd, even)
    #[arg(long, global = true)]
    parity: Option<SerialParity>,

    /// Stop bits (1, 2)
    #[arg(long, global = true)]
    stop_bits: Option<u8>,

    /// Response timeout (ms)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Gateway slave address
    #[arg(long, global = true)]
    slave: Option<u8>,

    /// Line driving the transceiver's transmit enable (rts, dtr)
    #[arg(long, global = true)]
    tx_enable: Option<DirectionLine>,

    /// Use the simulated installation instead of a serial port
    #[arg(long, global = true)]
    simulate: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    Ports,

    /// Discover units and print the bus flags and healthy slots
    Scan,

    /// Print the status of units
    #[command(group(ArgGroup::new("target").required(true).args(["units", "all"])))]
    Status {
        /// Unit slot (repeatable)
        #[arg(short, long = "unit")]
        units: Vec<u8>,
        /// Every present unit
        #[arg(short, long)]
        all: bool,
    },

    /// Print the error state of units
    #[command(group(ArgGroup::new("target").required(true).args(["units", "all"])))]
    Errors {
        /// Unit slot (repeatable)
        #[arg(short, long = "unit")]
        units: Vec<u8>,
        /// Every present unit
        #[arg(short, long)]
        all: bool,
        /// Also list units without an active error
        #[arg(long)]
        show_clear: bool,
    },

    /// Send commands to a unit
    #[command(group(
        ArgGroup::new("action")
            .required(true)
            .multiple(true)
            .args(["power", "mode", "setpoint", "fan_speed", "fan_direction", "filter_reset"])
    ))]
    Control {
        /// Unit slot
        #[arg(short, long)]
        unit: u8,
        /// Switch on or off
        #[arg(long, value_enum)]
        power: Option<Power>,
        /// Operating mode (fan, heat, cool, auto, vent, dry)
        #[arg(long)]
        mode: Option<Mode>,
        /// Target temperature in °C
        #[arg(long, allow_negative_numbers = true)]
        setpoint: Option<f32>,
        /// Fan speed (auto, low, low-medium, medium, high-medium, high)
        #[arg(long)]
        fan_speed: Option<FanSpeed>,
        /// Louvre position (p0-p4, stop, swing)
        #[arg(long)]
        fan_direction: Option<FanDirection>,
        /// Reset the filter sign
        #[arg(long)]
        filter_reset: bool,
    },

    /// Poll continuously and print one JSON line per unit and cycle
    Watch {
        /// Unit slot (repeatable)
        #[arg(short, long = "unit", required = true)]
        units: Vec<u8>,
        /// Seconds between samples
        #[arg(short, long, default_value = "10")]
        interval: u64,
        /// Stop after this many seconds; 0 or less runs until interrupted
        #[arg(short, long, default_value = "0", allow_negative_numbers = true)]
        duration: i64,
        /// Append lines to this file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print the exit code table
    ExitCodes,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Power {
    /// Switch on
    On,
    /// Switch off
    Off,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the effective configuration to the config file
    Init,
    /// Print the config file location
    Path,
}

type DynBus = Box<dyn RegisterBus + Send>;
type CliBridge = Bridge<DynBus, SystemClock>;

impl Cli {
    fn load_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load_from(path)?,
            None => AppConfig::load()?,
        };
        if let Some(port) = &self.port {
            config.serial.port.clone_from(port);
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(bits) = self.data_bits {
            config.serial.data_bits = bits;
        }
        if let Some(parity) = self.parity {
            config.serial.parity = parity;
        }
        if let Some(bits) = self.stop_bits {
            config.serial.stop_bits = bits;
        }
        if let Some(ms) = self.timeout {
            config.rtu.timeout_ms = ms;
        }
        if let Some(slave) = self.slave {
            config.rtu.slave_id = slave;
        }
        if self.tx_enable.is_some() {
            config.rtu.tx_enable = self.tx_enable;
        }
        Ok(config)
    }

    fn bridge(&self, config: &AppConfig) -> anyhow::Result<Arc<CliBridge>> {
        let bus: DynBus = if self.simulate {
            Box::new(SimulatedBus::demo())
        } else {
            if !self.quiet {
                eprintln!("Connecting to {}...", config.serial.connection_info());
            }
            Box::new(
                RtuTransport::open(&config.serial, config.rtu.clone())
                    .with_context(|| format!("opening {}", config.serial.port))?,
            )
        };
        let gateway = Gateway::with_clock(
            bus,
            SystemClock::new(),
            config.rtu.slave_id,
            config.gateway.clone(),
        );
        Ok(Arc::new(Bridge::new(gateway, config.bridge.clone())))
    }

    fn connect(&self, config: &AppConfig) -> anyhow::Result<Arc<CliBridge>> {
        let bridge = self.bridge(config)?;
        let count = bridge.discover().context("discovery")?;
        if self.verbose {
            eprintln!("Discovered {count} units");
        }
        Ok(bridge)
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Reports for the selected units, failing on slots that are not present
fn select_units(bridge: &CliBridge, units: &[u8], all: bool) -> anyhow::Result<Vec<UnitReport>> {
    let reports = bridge.snapshot()?;
    if all {
        return Ok(reports);
    }
    units
        .iter()
        .map(|&index| {
            reports
                .iter()
                .find(|r| r.index == index)
                .cloned()
                .ok_or_else(|| anyhow::Error::new(GatewayError::UnitNotPresent(index)))
        })
        .collect()
}

async fn run(cli: &Cli) -> anyhow::Result<CliResult> {
    let config = cli.load_config()?;

    match &cli.command {
        Commands::Ports => {
            let ports = list_ports()?;
            Ok(CliResult::success_with_message(format_ports(&ports, cli.format)?))
        }
        Commands::Scan => {
            let bridge = cli.connect(&config)?;
            let (system, present) = bridge.with_gateway(|gw| {
                let ids: Vec<String> = gw.present_units().map(|u| u.id().to_string()).collect();
                (*gw.system_status(), ids)
            })?;
            let healthy: Vec<usize> = system.healthy_units().collect();
            let msg = match cli.format {
                OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                    "initialized": system.initialized(),
                    "other_master": system.other_master(),
                    "healthy": healthy,
                    "present": present,
                }))?,
                OutputFormat::Text => format!(
                    "initialized={} other_master={}\nhealthy slots: {:?}\npresent units ({}): {}",
                    system.initialized(),
                    system.other_master(),
                    healthy,
                    present.len(),
                    present.join(" ")
                ),
            };
            Ok(CliResult::success_with_message(msg))
        }
        Commands::Status { units, all } => {
            let bridge = cli.connect(&config)?;
            let reports = select_units(&bridge, units, *all)?;
            Ok(CliResult::success_with_message(format_units(&reports, cli.format)?))
        }
        Commands::Errors {
            units,
            all,
            show_clear,
        } => {
            let bridge = cli.connect(&config)?;
            let mut reports = select_units(&bridge, units, *all)?
                .iter()
                .map(|u| bridge.read_error(u.index))
                .collect::<Result<Vec<_>, _>>()?;
            if !show_clear {
                reports.retain(ErrorReport::is_active);
            }
            if reports.is_empty() && cli.format == OutputFormat::Text {
                return Ok(CliResult::success_with_message("No active errors."));
            }
            Ok(CliResult::success_with_message(format_errors(&reports, cli.format)?))
        }
        Commands::Control {
            unit,
            power,
            mode,
            setpoint,
            fan_speed,
            fan_direction,
            filter_reset,
        } => {
            // mode switches the unit on, so an explicit power option goes after it
            let commands: Vec<Command> = [
                mode.map(Command::Mode),
                power.map(|p| Command::Power(matches!(p, Power::On))),
                setpoint.map(Command::Setpoint),
                fan_speed.map(Command::FanSpeed),
                fan_direction.map(Command::FanDirection),
                filter_reset.then_some(Command::FilterReset),
            ]
            .into_iter()
            .flatten()
            .collect();

            let bridge = cli.connect(&config)?;
            for command in commands {
                bridge
                    .execute(*unit, command)
                    .with_context(|| format!("unit {unit}: {command}"))?;
                if cli.verbose {
                    eprintln!("unit {unit}: {command}");
                }
            }
            if cli.quiet {
                return Ok(CliResult::success());
            }
            let reports = select_units(&bridge, &[*unit], false)?;
            Ok(CliResult::success_with_message(format_units(&reports, cli.format)?))
        }
        Commands::Watch {
            units,
            interval,
            duration,
            out,
        } => watch(cli, &config, units, *interval, *duration, out.as_deref()).await,
        Commands::Config { action } => match action {
            ConfigAction::Show => Ok(CliResult::success_with_message(config.to_toml()?)),
            ConfigAction::Init => {
                let path = match &cli.config {
                    Some(path) => {
                        config.save_to(path)?;
                        path.clone()
                    }
                    None => config.save()?,
                };
                Ok(CliResult::success_with_message(format!("Wrote {}", path.display())))
            }
            ConfigAction::Path => {
                let path = match &cli.config {
                    Some(path) => path.clone(),
                    None => AppConfig::default_path()?,
                };
                Ok(CliResult::success_with_message(path.display().to_string()))
            }
        },
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(CliResult::success())
        }
    }
}

async fn watch(
    cli: &Cli,
    config: &AppConfig,
    units: &[u8],
    interval: u64,
    duration: i64,
    out: Option<&Path>,
) -> anyhow::Result<CliResult> {
    let bridge = cli.connect(config)?;
    select_units(&bridge, units, false)?;

    let mut sink: Box<dyn Write + Send> = match out {
        Some(path) => Box::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout()),
    };

    let deadline = u64::try_from(duration)
        .ok()
        .filter(|&secs| secs > 0)
        .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    let selected = units.to_vec();

    loop {
        let stop = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                return Ok(CliResult::error(ExitCodes::INTERRUPTED, "interrupted"));
            }
            () = stop => break,
            _ = ticker.tick() => {}
        }

        let worker = Arc::clone(&bridge);
        let sample = tokio::task::spawn_blocking(move || {
            worker.with_gateway(|gw| gw.poll_status())?;
            worker.snapshot()
        })
        .await?;

        match sample {
            Ok(reports) => {
                let ts = chrono::Local::now().to_rfc3339();
                for report in reports.iter().filter(|r| selected.contains(&r.index)) {
                    let line = serde_json::json!({ "ts": ts, "unit": report });
                    writeln!(sink, "{line}")?;
                }
                sink.flush()?;
            }
            Err(e) if cli.verbose => eprintln!("sample skipped: {e}"),
            Err(_) => {}
        }
    }
    Ok(CliResult::success())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match run(&cli).await {
        Ok(result) => result,
        Err(e) => from_anyhow(&e),
    };

    match &result {
        CliResult::Success(Some(msg)) => println!("{msg}"),
        CliResult::Success(None) => {}
        CliResult::Error(code, _) if *code == ExitCodes::INTERRUPTED && cli.quiet => {}
        CliResult::Error(_, msg) => eprintln!("Error: {msg}"),
    }
    result.to_exit_code()
}
