//! # AVES Controller
//!
//! Reads DMX universe frames, maps them through a creature rig, and
//! streams smoothed servo positions to a servo module over a
//! checksummed serial protocol.

#![deny(warnings)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use aves_common::transport::Transport;
use aves_controller::config::build_creature;
use aves_controller::dmx::UniverseReceiver;
use aves_controller::link::Link;
use aves_controller::link::ping::PingTask;
use aves_common::queue::MessageQueue;
use aves_controller::scheduler::FrameScheduler;
use aves_controller::server::{LogSink, ServerWriter};
use aves_controller::telemetry::StatusProcessor;
use aves_controller::watchdog::{WatchdogLimits, WatchdogMonitor};
use aves_controller::worker::{Worker, WorkerSet};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// AVES Controller - creature animation host
#[derive(Parser, Debug)]
#[command(name = "aves_controller")]
#[command(version)]
#[command(about = "Drives an animatronic creature from streamed DMX frames")]
struct Args {
    /// Path to the creature configuration file (JSON)
    #[arg(short, long)]
    creature_config: PathBuf,

    /// Serial device of the servo module
    #[arg(short, long, default_value = "/dev/ttyACM0")]
    device: PathBuf,

    /// Bind address for raw universe frames
    #[arg(long, default_value = "0.0.0.0:5568")]
    dmx_bind: String,

    /// Board temperature limit before ESTOP [°F]
    #[arg(long, default_value_t = 140.0)]
    max_temperature_f: f64,

    /// Motor rail current limit before ESTOP [A]
    #[arg(long, default_value_t = 4.0)]
    max_motor_amps: f64,

    /// Grace period a limit may stay exceeded [s]
    #[arg(long, default_value_t = 3)]
    grace_seconds: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!(
        "AVES Controller v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = run(args) {
        error!("controller startup failed: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    // Build and check the creature before anything else spins up.
    let (creature, mapper) = build_creature(&args.creature_config)?;
    creature.preflight()?;
    info!(
        "working with {}! ({})",
        creature.name(),
        creature.description()
    );
    info!(
        "{} has {} motors on universe {} at offset {}",
        creature.name(),
        creature.bank().len(),
        creature.universe(),
        creature.channel_offset()
    );

    // Queues between the tasks.
    let inputs = MessageQueue::bounded(4);
    let outgoing = MessageQueue::bounded(64);
    let incoming = MessageQueue::bounded(64);
    let telemetry = MessageQueue::bounded(8);
    let events = MessageQueue::bounded(32);

    let device = args.device.clone();
    let link = Link::new(
        Box::new(move || Transport::serial(&device)),
        outgoing.clone(),
        incoming.clone(),
        creature.config_records().to_vec(),
    );
    let link_shared = link.shared();

    let receiver = UniverseReceiver::bind(&args.dmx_bind, mapper, inputs.clone())?;

    let limits = WatchdogLimits {
        max_temperature_f: args.max_temperature_f,
        max_motor_amps: args.max_motor_amps,
        grace: Duration::from_secs(args.grace_seconds),
    };

    // Shutdown plumbing. Ctrl-C once is graceful; twice is immediate.
    let shutdown = Arc::new(AtomicBool::new(false));
    let ctrlc_flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        if ctrlc_flag.swap(true, Ordering::SeqCst) {
            eprintln!("second interrupt, hard exit");
            std::process::exit(1);
        }
        eprintln!("interrupt received, shutting down gracefully");
    })?;

    // Spin up the tasks. Construction order matters: consumers first,
    // so shutdown (reverse order) stops producers first.
    let mut workers = WorkerSet::new();

    let server_writer = ServerWriter::new(events.clone(), Box::new(LogSink));
    workers.push(Worker::spawn("server-writer", move |stop| {
        server_writer.run(&stop);
    }));

    workers.push(Worker::spawn("link", move |stop| link.run(&stop)));

    let status = StatusProcessor::new(incoming, telemetry.clone());
    workers.push(Worker::spawn("status-processor", move |stop| {
        status.run(&stop);
    }));

    let watchdog = WatchdogMonitor::new(limits, telemetry, outgoing.clone(), events.clone());
    workers.push(Worker::spawn("watchdog", move |stop| watchdog.run(&stop)));

    let ping = PingTask::new(link_shared, outgoing.clone(), events);
    workers.push(Worker::spawn("ping-task", move |stop| ping.run(&stop)));

    let scheduler = FrameScheduler::new(creature, inputs, outgoing);
    workers.push(Worker::spawn("frame-scheduler", move |stop| {
        scheduler.run(&stop);
    }));

    workers.push(Worker::spawn("universe-receiver", move |stop| {
        receiver.run(&stop);
    }));

    info!("all systems running, press Ctrl+C to shut down");
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(500));
    }

    info!("shutdown requested, stopping workers");
    workers.shutdown();
    info!("graceful shutdown complete");
    Ok(())
}

fn setup_tracing(args: &Args) {
    let default = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
