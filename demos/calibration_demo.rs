//! Calibration Demo
//!
//! Runs a calibration against the synthetic battery, without any hardware.
//! The clock is advanced by hand, so a run that would take minutes of demo
//! stages finishes instantly.
//!
//! Usage:
//!   cargo run --example calibration_demo          # 1 cycle
//!   cargo run --example calibration_demo -- 3     # 3 cycles
//!
//! Set RUST_LOG environment variable to control logging:
//!   RUST_LOG=debug cargo run --example calibration_demo

use log::info;
use sbs_conditioner::{
    Indication, ManualClock, ProcessConfig, ProcessController, ProcessEvent, ProcessOutputs,
    RelayState, Result, TelemetrySnapshot, TelemetrySource,
};

/// Demo runs never poll the bus.
struct NoBattery;

impl TelemetrySource for NoBattery {
    fn poll(&mut self) -> TelemetrySnapshot {
        TelemetrySnapshot::default()
    }
}

/// Prints relay and LED changes instead of driving pins.
struct ConsoleOutputs;

impl ProcessOutputs for ConsoleOutputs {
    fn set_relays(&mut self, state: RelayState) -> Result<()> {
        let (charge, discharge) = state.outputs();
        println!("  relays: charge={} discharge={}", charge, discharge);
        Ok(())
    }

    fn indicate(&mut self, indication: Indication) {
        println!("  led: {:?}", indication);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cycles = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(1);

    let config = ProcessConfig::default();
    let stage = config.demo_stage_duration_ms;
    let clock = ManualClock::new();
    let mut controller = ProcessController::new(NoBattery, ConsoleOutputs, clock.clone(), config)?;

    controller.start_demo(cycles)?;
    while controller.is_busy() {
        clock.advance(stage);
        match controller.update() {
            Some(ProcessEvent::StepEntered { step, cycle }) => {
                let soc = controller
                    .last_snapshot()
                    .map(|s| s.relative_state_of_charge.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("[{:>4}s] cycle {} {:?} (SoC {}%)", clock_secs(&controller), cycle, step, soc);
            }
            Some(event) => println!("{:?}", event),
            None => {}
        }
    }

    info!("Demo finished");
    Ok(())
}

fn clock_secs<S, O, C>(controller: &ProcessController<S, O, C>) -> u64
where
    S: TelemetrySource,
    O: ProcessOutputs,
    C: sbs_conditioner::Clock,
{
    controller.process_elapsed_ms().unwrap_or(0) / 1000
}
