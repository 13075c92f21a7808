//! Bridge service
//!
//! Shares one gateway between the periodic poller, the status reporter and
//! command callers. Every gateway call runs under a single lock taken with a
//! per-activity timeout; a caller that cannot get the lock in time gives up
//! with [`BridgeError::Busy`] rather than queueing behind a slow bus.

use crate::core::gateway::{
    Clock, Command, CommandError, ErrorReport, Gateway, GatewayError, PollSummary, SystemClock,
    UnitReport,
};
use crate::core::logger::LogRing;
use crate::core::transport::{ReadRegisters, WriteRegisters};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Bridge error types
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Gateway lock not acquired in time
    #[error("gateway busy ({0})")]
    Busy(&'static str),

    /// Gateway call failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Command request rejected
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Lock timeouts and reporting cadence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Seconds between status reports
    pub status_interval_s: u64,
    /// Lock timeout for a poll cycle
    pub poll_lock_ms: u64,
    /// Lock timeout for a status report
    pub status_lock_ms: u64,
    /// Lock timeout for a command
    pub command_lock_ms: u64,
    /// Lock timeout for discovery, error reads and snapshots
    pub query_lock_ms: u64,
    /// Retained log lines
    pub log_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            status_interval_s: 5,
            poll_lock_ms: 4000,
            status_lock_ms: 200,
            command_lock_ms: 5000,
            query_lock_ms: 2000,
            log_capacity: 128,
        }
    }
}

/// Result of one poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// First successful discovery, with the unit count
    Discovered(usize),
    /// Regular status pass
    Polled(PollSummary),
}

/// Bridge statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct BridgeStats {
    /// Poll cycles that got the lock
    pub poll_cycles: u64,
    /// Successful discoveries
    pub discoveries: u64,
    /// Commands applied
    pub commands: u64,
    /// Failed discoveries, polls and commands
    pub errors: u64,
    /// Lock timeouts
    pub busy: u64,
}

/// Gateway shared behind one lock, with a log ring
pub struct Bridge<B, C = SystemClock> {
    gateway: Mutex<Gateway<B, C>>,
    logs: Arc<LogRing>,
    config: BridgeConfig,
    poll_interval: Duration,
    discovered: AtomicBool,
    stats: Mutex<BridgeStats>,
}

impl<B, C> Bridge<B, C>
where
    B: ReadRegisters + WriteRegisters,
    C: Clock,
{
    /// Create new bridge with its own log ring
    pub fn new(gateway: Gateway<B, C>, config: BridgeConfig) -> Self {
        let logs = Arc::new(LogRing::new(config.log_capacity));
        Self::with_logs(gateway, config, logs)
    }

    /// Create new bridge writing to a shared log ring
    pub fn with_logs(gateway: Gateway<B, C>, config: BridgeConfig, logs: Arc<LogRing>) -> Self {
        let poll_interval = Duration::from_secs(u64::from(gateway.config().poll_interval_s));
        Self {
            gateway: Mutex::new(gateway),
            logs,
            config,
            poll_interval,
            discovered: AtomicBool::new(false),
            stats: Mutex::new(BridgeStats::default()),
        }
    }

    /// Log ring fed by this bridge
    pub fn logs(&self) -> &Arc<LogRing> {
        &self.logs
    }

    /// Active settings
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Get statistics
    pub fn stats(&self) -> BridgeStats {
        self.stats.lock().clone()
    }

    /// A discovery has succeeded since startup
    pub fn is_discovered(&self) -> bool {
        self.discovered.load(Ordering::Acquire)
    }

    fn lock(&self, timeout_ms: u64, activity: &'static str) -> Result<MutexGuard<'_, Gateway<B, C>>, BridgeError> {
        self.gateway
            .try_lock_for(Duration::from_millis(timeout_ms))
            .ok_or_else(|| {
                self.stats.lock().busy += 1;
                tracing::debug!("gateway lock timeout for {}", activity);
                BridgeError::Busy(activity)
            })
    }

    /// Run one poller step: discovery until it first succeeds, status polls afterwards
    pub fn poll_cycle(&self) -> Result<PollOutcome, BridgeError> {
        let mut gateway = self.lock(self.config.poll_lock_ms, "poll")?;
        self.stats.lock().poll_cycles += 1;

        if !self.is_discovered() {
            return match gateway.discover_units() {
                Ok(count) => {
                    self.logs.push(format!("discovered {count} units"));
                    self.discovered.store(true, Ordering::Release);
                    self.stats.lock().discoveries += 1;
                    Ok(PollOutcome::Discovered(count))
                }
                Err(e) => {
                    self.logs.push(format!("discover failed: {e}"));
                    self.stats.lock().errors += 1;
                    Err(e.into())
                }
            };
        }

        let summary = gateway.poll_status();
        if summary.failed > 0 {
            self.logs.push(format!(
                "poll failed: {} of {} units",
                summary.failed,
                summary.failed + summary.polled
            ));
            self.stats.lock().errors += 1;
        }
        Ok(PollOutcome::Polled(summary))
    }

    /// Log a one-line summary per present unit and return the lines
    pub fn report_status(&self) -> Result<Vec<String>, BridgeError> {
        let gateway = self.lock(self.config.status_lock_ms, "status")?;

        let mut lines = vec![format!("units={}", gateway.discovered_count())];
        for unit in gateway.present_units() {
            let status = unit.status();
            lines.push(format!(
                "{} pwr={} mode={} set={:.1} cur={:.1}",
                unit.id(),
                u8::from(status.power()),
                status.mode_code(),
                status.setpoint(),
                status.room_temperature()
            ));
        }
        drop(gateway);

        for line in &lines {
            self.logs.push(line.as_str());
        }
        Ok(lines)
    }

    /// Apply a command to a present unit
    pub fn execute(&self, index: u8, command: Command) -> Result<(), BridgeError> {
        let mut gateway = self.lock(self.config.command_lock_ms, "command")?;
        if !gateway.unit(index)?.is_present() {
            return Err(GatewayError::UnitNotPresent(index).into());
        }

        if let Err(e) = gateway.apply(index, command) {
            self.stats.lock().errors += 1;
            tracing::warn!("command {} on unit {} failed: {}", command, index, e);
            return Err(e.into());
        }
        drop(gateway);

        self.stats.lock().commands += 1;
        self.logs.push(format!("hvac cmd idx={index} {}", command.name()));
        Ok(())
    }

    /// Parse and apply a named command
    pub fn execute_request(&self, index: u8, name: &str, value: Option<f64>) -> Result<(), BridgeError> {
        let command = Command::from_request(name, value)?;
        self.execute(index, command)
    }

    /// Rescan the bus now
    pub fn discover(&self) -> Result<usize, BridgeError> {
        let mut gateway = self.lock(self.config.query_lock_ms, "discover")?;
        let count = gateway.discover_units()?;
        self.discovered.store(true, Ordering::Release);
        self.stats.lock().discoveries += 1;
        self.logs.push(format!("discovered {count} units"));
        Ok(count)
    }

    /// Read (or serve from cache) a unit's error block
    pub fn read_error(&self, index: u8) -> Result<ErrorReport, BridgeError> {
        let mut gateway = self.lock(self.config.query_lock_ms, "error read")?;
        gateway.read_error(index)?;
        Ok(ErrorReport::from(gateway.unit(index)?))
    }

    /// Reports for all present units
    pub fn snapshot(&self) -> Result<Vec<UnitReport>, BridgeError> {
        let gateway = self.lock(self.config.query_lock_ms, "snapshot")?;
        Ok(gateway.present_units().map(UnitReport::from).collect())
    }

    /// Run a closure against the locked gateway
    pub fn with_gateway<R>(&self, f: impl FnOnce(&mut Gateway<B, C>) -> R) -> Result<R, BridgeError> {
        let mut gateway = self.lock(self.config.query_lock_ms, "query")?;
        Ok(f(&mut gateway))
    }
}

impl<B, C> Bridge<B, C>
where
    B: ReadRegisters + WriteRegisters + Send + 'static,
    C: Clock + 'static,
{
    /// Run the poller and the status reporter until `shutdown` is cancelled
    ///
    /// Gateway calls block on the bus, so each step runs on the blocking pool.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        tracing::info!(
            poll_s = self.poll_interval.as_secs(),
            status_s = self.config.status_interval_s,
            "bridge started"
        );

        let poller = tokio::spawn(Self::every(
            Arc::clone(&self),
            self.poll_interval,
            shutdown.clone(),
            |bridge| {
                if let Err(e) = bridge.poll_cycle() {
                    tracing::warn!("poll cycle: {}", e);
                }
            },
        ));
        let reporter = tokio::spawn(Self::every(
            Arc::clone(&self),
            Duration::from_secs(self.config.status_interval_s),
            shutdown.clone(),
            |bridge| {
                if let Err(e) = bridge.report_status() {
                    tracing::debug!("status report skipped: {}", e);
                }
            },
        ));

        let (poller, reporter) = tokio::join!(poller, reporter);
        for result in [poller, reporter] {
            if let Err(e) = result {
                tracing::error!("bridge task ended abnormally: {}", e);
            }
        }
        tracing::info!("bridge stopped");
    }

    async fn every(
        bridge: Arc<Self>,
        period: Duration,
        shutdown: CancellationToken,
        step: fn(&Self),
    ) {
        loop {
            let worker = Arc::clone(&bridge);
            if let Err(e) = tokio::task::spawn_blocking(move || step(&worker)).await {
                tracing::error!("bridge step panicked: {}", e);
            }
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(period) => {}
            }
        }
    }
}
