//! Tempo soak harness.
//!
//! Runs the timing engine against a synthetic host population and prints the
//! audit report:
//! - Realtime mode: the pulse driver thread on the wall clock, requests
//!   queued through hook registrations
//! - Accelerated mode: virtual time, ticks back to back (default)
//!
//! Exits non-zero when a baseline is configured and the run regressed.

mod host;
mod workload;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tempo_audit::AuditReport;
use tempo_core::{
    Clock, HookRegistration, ManualClock, MonotonicClock, PulseDriver, TimingConfig, TimingModule,
};

use crate::host::SimHost;
use crate::workload::Workload;

// =============================================================================
// CLI Arguments
// =============================================================================

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum Mode {
    /// Wall-clock ticks on the driver thread
    Realtime,
    /// Virtual time, as fast as possible
    #[default]
    Accelerated,
}

#[derive(Parser, Debug)]
#[command(name = "tempo-sim")]
#[command(about = "Soak the action timing engine against a synthetic population")]
#[command(version)]
struct Args {
    /// Engine configuration file (JSON); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulated duration in seconds
    #[arg(short, long, default_value_t = 60)]
    duration: u64,

    /// Actors known to the host
    #[arg(long, default_value_t = 5_000)]
    population: u64,

    /// Mean action requests per tick
    #[arg(long, default_value_t = 20)]
    rate: u32,

    /// Percentage of actors in combat (auto-repeating swings)
    #[arg(long, default_value_t = 10)]
    combat_pct: u32,

    /// Percentage of spells disrupted mid-cast
    #[arg(long, default_value_t = 5)]
    interrupt_pct: u32,

    /// RNG seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, value_enum, default_value_t = Mode::Accelerated)]
    mode: Mode,

    /// Record engine vs native differentials
    #[arg(long)]
    shadow: bool,

    /// Baseline metrics to compare against (overrides the config)
    #[arg(long)]
    baseline: Option<PathBuf>,

    /// Write the full report as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write raw samples as CSV
    #[arg(long)]
    csv: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TimingConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => TimingConfig::default(),
    };
    config.audit.shadow_mode |= args.shadow;
    if let Some(path) = &args.baseline {
        config.audit.baseline_path = Some(path.clone());
    }

    let host = SimHost::new(args.population, args.combat_pct, args.seed).with_interrupt_pct(args.interrupt_pct);
    let duration_ms = args.duration.saturating_mul(1_000);

    info!(
        mode = ?args.mode,
        duration_ms,
        population = args.population,
        rate = args.rate,
        seed = args.seed,
        "starting soak"
    );

    let report = match args.mode {
        Mode::Accelerated => run_accelerated(config, host, &args, duration_ms)?,
        Mode::Realtime => run_realtime(config, host, &args, duration_ms)?,
    };

    println!("{}", report.to_table());

    if let Some(path) = &args.json {
        std::fs::write(path, report.to_json()?).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "report written");
    }
    if let Some(path) = &args.csv {
        std::fs::write(path, report.samples_csv()).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), samples = report.samples.len(), "samples written");
    }

    if report.passed() == Some(false) {
        bail!("timing regressed against baseline");
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn start(config: TimingConfig, host: SimHost, clock: Arc<dyn Clock>) -> Result<TimingModule<SimHost>> {
    let module = TimingModule::initialize(config, host, clock);
    if !module.is_enabled() {
        bail!("timing module disabled: {:?}", module.status());
    }
    Ok(module)
}

// =============================================================================
// Accelerated
// =============================================================================

fn run_accelerated(config: TimingConfig, host: SimHost, args: &Args, duration_ms: u64) -> Result<AuditReport> {
    let clock = ManualClock::starting_at(0);
    let mut module = start(config, host, Arc::new(clock.clone()))?;
    let mut workload = Workload::new(module.table(), args.population, args.rate, args.seed ^ 0x5EED);
    let tick_ms = module.cadence().interval_ms();

    let wall = Instant::now();
    let mut now_ms = 0;
    while now_ms <= duration_ms {
        clock.set_ms(now_ms);
        let started = Instant::now();
        for event in workload.next_slot() {
            module.apply_event(now_ms, event);
        }
        module.tick_at(now_ms);
        let processing_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        module.complete_tick(now_ms, now_ms, processing_us);
        now_ms += tick_ms;
    }

    info!(
        elapsed = ?wall.elapsed(),
        ticks = module.pulse_stats().ticks,
        host = ?module.host().counters(),
        "accelerated run finished"
    );
    module.report_at(duration_ms).context("audit collector unavailable")
}

// =============================================================================
// Realtime
// =============================================================================

fn run_realtime(config: TimingConfig, host: SimHost, args: &Args, duration_ms: u64) -> Result<AuditReport> {
    let module = start(config, host, Arc::new(MonotonicClock::new()))?;
    let workload = Workload::new(module.table(), args.population, args.rate, args.seed ^ 0x5EED);
    let tick = Duration::from_millis(module.cadence().interval_ms());

    let handle = PulseDriver::spawn(module)?;
    let feeder = {
        let registration = handle.registration();
        thread::Builder::new()
            .name("tempo-sim-feeder".into())
            .spawn(move || feed(registration, workload, tick, Duration::from_millis(duration_ms)))
            .context("spawning feeder thread")?
    };

    let sent = feeder.join().map_err(|_| anyhow::anyhow!("feeder thread panicked"))?;
    let mut module = handle.stop()?;

    let now_ms = module.clock().now_ms();
    info!(
        sent,
        ticks = module.pulse_stats().ticks,
        overruns = module.pulse_stats().overruns,
        host = ?module.host().counters(),
        "realtime run finished"
    );
    module.report_at(now_ms).context("audit collector unavailable")
}

/// Sends one slot of events per tick until `duration` elapses. Returns the
/// number of events sent.
fn feed(registration: HookRegistration, mut workload: Workload, tick: Duration, duration: Duration) -> u64 {
    let deadline = Instant::now() + duration;
    let mut sent = 0;
    while Instant::now() < deadline {
        for event in workload.next_slot() {
            if !registration.send(event) {
                return sent;
            }
            sent += 1;
        }
        thread::sleep(tick);
    }
    sent
}
