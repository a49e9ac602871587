//! # AVES Firmware (host build)
//!
//! Runs the servo module core against simulated hardware, speaking the
//! real wire protocol over a serial device. Useful for bench bring-up
//! and for driving a controller without a module on the desk.

#![deny(warnings)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use aves_common::queue::MessageQueue;
use aves_common::transport::Transport;
use aves_firmware::dynamixel::{DynamixelMap, SimBus};
use aves_firmware::io::{InitRequester, run_reader, run_writer};
use aves_firmware::motor::{MotorMap, PwmParams};
use aves_firmware::power::{PowerControl, SimPower};
use aves_firmware::processor::MessageProcessor;
use aves_firmware::pwm::{SimPwm, SimWatchdog, WrapContext, on_pwm_wrap};
use aves_firmware::sensors::{BoardSensors, SimSensors};
use aves_firmware::state::FirmwareState;
use aves_firmware::telemetry::{SensorReporter, StatsReporter};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// AVES Firmware - servo module core on simulated hardware
#[derive(Parser, Debug)]
#[command(name = "aves_firmware")]
#[command(version)]
#[command(about = "Servo module firmware core with simulated PWM and sensors")]
struct Args {
    /// Serial device connected to the controller
    #[arg(short, long, default_value = "/dev/ttyGS0")]
    device: PathBuf,

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

    info!("AVES Firmware v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args) {
        error!("firmware startup failed: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(FirmwareState::new());
    let motors = Arc::new(MotorMap::new(PwmParams::standard()));
    let dynamixel = Arc::new(DynamixelMap::new(SimBus::new()));
    let power: Arc<SimPower> = Arc::new(SimPower::new());
    let sensors: Arc<SimSensors> = Arc::new(SimSensors::new());
    let pwm = Arc::new(SimPwm::new());
    let hw_watchdog = Arc::new(SimWatchdog::new());
    let outbound = MessageQueue::bounded(64);

    let stop = Arc::new(AtomicBool::new(false));
    let ctrlc_flag = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        eprintln!("interrupt received, shutting down");
        ctrlc_flag.store(true, Ordering::SeqCst);
    })?;

    // The wrap "interrupt": one call per PWM frame for the life of the
    // process, exactly like the hardware timer it stands in for.
    let ticker_state = Arc::clone(&state);
    let ticker_motors = Arc::clone(&motors);
    let ticker_pwm = Arc::clone(&pwm);
    let ticker_watchdog = Arc::clone(&hw_watchdog);
    let ticker_stop = Arc::clone(&stop);
    let frame = Duration::from_micros(motors.params().frame_length_us as u64);
    std::thread::Builder::new()
        .name("pwm-wrap".into())
        .spawn(move || {
            let mut context = WrapContext::default();
            let mut deadline = Instant::now() + frame;
            while !ticker_stop.load(Ordering::SeqCst) {
                on_pwm_wrap(
                    &ticker_state,
                    &ticker_motors,
                    ticker_pwm.as_ref(),
                    ticker_watchdog.as_ref(),
                    &mut context,
                );
                let now = Instant::now();
                if now < deadline {
                    std::thread::sleep(deadline - now);
                }
                deadline += frame;
            }
        })?;

    // Reporters run for the life of the process.
    let stats = StatsReporter::new(Arc::clone(&state), outbound.clone());
    let stats_stop = Arc::clone(&stop);
    std::thread::Builder::new()
        .name("stats-reporter".into())
        .spawn(move || stats.run(&stats_stop))?;

    let sensor_reporter =
        SensorReporter::new(Arc::clone(&sensors) as Arc<dyn BoardSensors>, outbound.clone());
    let sensor_stop = Arc::clone(&stop);
    std::thread::Builder::new()
        .name("sensor-reporter".into())
        .spawn(move || sensor_reporter.run(&sensor_stop))?;

    let init = InitRequester::new(Arc::clone(&state), outbound.clone());
    let init_stop = Arc::clone(&stop);
    std::thread::Builder::new()
        .name("init-requester".into())
        .spawn(move || init.run(&init_stop))?;

    let processor = MessageProcessor::new(
        Arc::clone(&state),
        Arc::clone(&motors),
        Arc::clone(&dynamixel),
        Arc::clone(&power) as Arc<dyn PowerControl>,
        outbound.clone(),
    );

    // Session loop: open the transport, run until it drops, retry.
    while !stop.load(Ordering::SeqCst) {
        let transport = match Transport::serial(&args.device) {
            Ok(t) => t,
            Err(e) => {
                warn!("waiting for controller transport: {e}");
                std::thread::sleep(Duration::from_secs(1));
                continue;
            }
        };

        info!("controller transport up: {}", transport.description());
        state.on_connected();
        let (read_half, write_half) = transport.split();

        let writer_outbound = outbound.clone();
        let writer_state = Arc::clone(&state);
        let writer_stop = Arc::clone(&stop);
        let writer = std::thread::Builder::new()
            .name("transport-writer".into())
            .spawn(move || run_writer(write_half, &writer_outbound, &writer_state, &writer_stop))?;

        run_reader(read_half, &processor, &state, &stop);

        // Reader returned: transport gone, estop parked us until stop,
        // or shutdown. The writer notices the same conditions.
        let _ = writer.join();

        if state.is_emergency_stopped() {
            break;
        }
        if !stop.load(Ordering::SeqCst) {
            warn!("controller transport lost, waiting for reconnect");
        }
    }

    info!("firmware shutdown complete");
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
