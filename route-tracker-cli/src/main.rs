//! Route Tracker CLI Application
//!
//! This is the command-line host for the route-tracker library.
//! It plays the role of the background service host:
//! - Loads configuration and opens the file-backed route store
//! - Replays recorded position samples through the tracking controller
//! - Resumes tracking on process start when it was left enabled
//! - Prints, resets and exports the recorded route

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use route_tracker::{
    route_distance_m, EventBus, FileSubstrate, HostCommand, RawPosition, ReplaySource,
    RouteStore, ServiceLifecycleAdapter, Subscription, TrackingController,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

mod config;
mod events;
mod report;
mod samples;

use config::AppConfig;

/// Route Tracker - Record and inspect a location trail
#[derive(Parser, Debug)]
#[command(name = "route-tracker")]
#[command(about = "Record, resume and inspect a persisted location route", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Storage directory (overrides the config file)
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start tracking and replay samples from a JSON file
    Record {
        /// JSON array of {lat, lon, ts?} samples
        #[arg(short, long, value_name = "FILE")]
        samples: PathBuf,

        /// Simulate the user refusing location permission
        #[arg(long)]
        deny_permission: bool,

        /// Stop tracking once the replay is done (default: leave it enabled)
        #[arg(long)]
        stop: bool,

        /// Delay between samples in milliseconds
        #[arg(long, value_name = "MS")]
        pacing_ms: Option<u64>,
    },

    /// Simulate a host restart: resume tracking if it was left enabled
    Resume {
        /// Samples to feed the resumed session
        #[arg(short, long, value_name = "FILE")]
        samples: Option<PathBuf>,
    },

    /// Stop tracking
    Stop,

    /// Print the recorded route
    Show,

    /// Print tracking flag and route summary
    Status,

    /// Clear the recorded route and switch tracking off
    Reset,

    /// Write the recorded route as JSON
    Export {
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Route Tracker CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using tracker library v{}", route_tracker::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.storage.dir = dir.clone();
    }
    log::debug!("Storage directory: {:?}", config.storage.dir);

    match &args.command {
        Command::Record {
            samples,
            deny_permission,
            stop,
            pacing_ms,
        } => {
            let samples = samples::load_samples(samples)?;
            let pacing = pacing_ms.or(config.replay.pacing_ms);
            let source = replay_source(samples, pacing).with_permission_denied(*deny_permission);
            record_mode(&config, source, *stop)
        }
        Command::Resume { samples } => {
            let samples = match samples {
                Some(path) => samples::load_samples(path)?,
                None => Vec::new(),
            };
            resume_mode(&config, replay_source(samples, config.replay.pacing_ms))
        }
        Command::Stop => {
            let host = Host::open(&config, ReplaySource::new(Vec::new()))?;
            host.adapter.handle(HostCommand::Stop)?;
            println!("✓ Tracking stopped");
            Ok(())
        }
        Command::Show => {
            let store = open_store(&config)?;
            let route = store.list().context("Route could not be read completely")?;
            print!("{}", report::render_route(&route));
            Ok(())
        }
        Command::Status => status_mode(&config),
        Command::Reset => {
            let host = Host::open(&config, ReplaySource::new(Vec::new()))?;
            host.adapter.handle(HostCommand::Reset)?;
            println!("✓ Route cleared, tracking disabled");
            Ok(())
        }
        Command::Export { output } => {
            let store = open_store(&config)?;
            let route = store.list().context("Route could not be read completely")?;
            report::export_json(&route, output)?;
            println!("✓ Exported {} fix(es) to {:?}", route.len(), output);
            Ok(())
        }
    }
}

fn replay_source(samples: Vec<RawPosition>, pacing_ms: Option<u64>) -> ReplaySource {
    let source = ReplaySource::new(samples);
    match pacing_ms {
        Some(ms) => source.with_pacing(Duration::from_millis(ms)),
        None => source,
    }
}

fn open_store(config: &AppConfig) -> Result<RouteStore> {
    let substrate = FileSubstrate::open(&config.storage.dir)
        .with_context(|| format!("Failed to open storage at {:?}", config.storage.dir))?;
    Ok(RouteStore::new(Arc::new(substrate)))
}

/// Everything a host process wires up around the controller
struct Host {
    source: Arc<ReplaySource>,
    adapter: ServiceLifecycleAdapter,
    feed: Subscription,
}

impl Host {
    fn open(config: &AppConfig, source: ReplaySource) -> Result<Self> {
        let store = open_store(config)?;
        let source = Arc::new(source);
        let bus = EventBus::new(config.tracker.bus.queue_capacity);

        let controller =
            TrackingController::new(config.tracker.clone(), store, source.clone(), bus)
                .context("Failed to create tracking controller")?;
        let feed = controller.bus().subscribe();
        let adapter = ServiceLifecycleAdapter::new(controller, Arc::new(events::ConsoleIndicator));

        Ok(Self {
            source,
            adapter,
            feed,
        })
    }

    /// Print events until the replay finishes or `timeout` passes
    fn follow_replay(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let controller = self.adapter.controller();

        while self.replaying(controller) && Instant::now() < deadline {
            if let Some(event) = self.feed.recv_timeout(Duration::from_millis(100)) {
                println!("{}", events::format_event(&event));
            }
        }

        if self.replaying(controller) {
            log::warn!("Replay still running after {:?}", timeout);
        }

        for event in self.feed.drain() {
            println!("{}", events::format_event(&event));
        }
    }

    fn replaying(&self, controller: &TrackingController) -> bool {
        controller.state().is_active() && !self.source.is_finished()
    }

    fn print_summary(&self) {
        let controller = self.adapter.controller();
        let stats = controller.stats();

        println!("\n📊 Session:");
        println!("  State:    {}", controller.state());
        println!("  Accepted: {}", stats.accepted);
        println!("  Filtered: {}", stats.filtered);
        println!("  Rejected: {}", stats.rejected);
        println!("  Dropped:  {}", stats.dropped);

        let dropped = controller.bus().backpressure_dropped();
        if dropped > 0 {
            println!("  Events lost to backpressure: {}", dropped);
        }
    }
}

/// Record mode - start tracking and replay a sample file
fn record_mode(config: &AppConfig, source: ReplaySource, stop: bool) -> Result<()> {
    println!("═══════════════════════════════════════════════");
    println!("  Route Tracker - Record");
    println!("═══════════════════════════════════════════════\n");

    let replaying = source.len();
    let host = Host::open(config, source)?;
    println!("Replaying {} sample(s)...\n", replaying);

    host.adapter.handle(HostCommand::Start)?;
    host.follow_replay(Duration::from_secs(config.replay.timeout_secs));

    if stop {
        host.adapter.handle(HostCommand::Stop)?;
        host.follow_replay(Duration::ZERO);
    }

    host.print_summary();
    Ok(())
}

/// Resume mode - what the host does every time the process comes up
fn resume_mode(config: &AppConfig, source: ReplaySource) -> Result<()> {
    println!("═══════════════════════════════════════════════");
    println!("  Route Tracker - Process Start");
    println!("═══════════════════════════════════════════════\n");

    let host = Host::open(config, source)?;

    if host.adapter.on_process_start()? {
        println!("✓ Tracking was enabled, resumed\n");
        host.follow_replay(Duration::from_secs(config.replay.timeout_secs));
        host.print_summary();
    } else {
        println!("Tracking is not enabled, nothing to resume");
    }

    Ok(())
}

fn status_mode(config: &AppConfig) -> Result<()> {
    let store = open_store(config)?;
    let enabled = store.is_tracking_enabled()?;
    let route = store.list().context("Route could not be read completely")?;

    println!("Tracking enabled: {}", if enabled { "yes" } else { "no" });
    println!("Fixes recorded:   {}", route.len());
    println!("Distance:         {:.3} km", route_distance_m(&route) / 1000.0);
    if let Some(last) = route.last() {
        println!("Last fix:         {}", last);
    }
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
