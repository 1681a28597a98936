//! # SBS Conditioner
//!
//! A Rust library for conditioning Smart Battery System (SBS) packs on a
//! relay-switched charge/discharge rig. It polls the battery over SMBus,
//! decodes its registers into a typed snapshot, and sequences charge,
//! discharge and multi-cycle calibration runs.
//!
//! ## Features
//!
//! - Decode the 23 SBS registers the rig uses (words and length-prefixed strings)
//! - Interpret the battery status word and derive state of health
//! - Stop charge and discharge on battery flags or configured thresholds
//! - Run calibration cycles with timed rests between phases
//! - Abort after repeated bus failures, with relays forced open
//! - Demo mode driving the same state machine from a synthetic battery
//!
//! ## Example
//!
//! ```no_run
//! use sbs_conditioner::{BatteryMonitor, Smbus};
//!
//! # fn run<I: embedded_hal::i2c::I2c>(i2c: I) {
//! let mut monitor = BatteryMonitor::new(Smbus::new(i2c));
//! if monitor.connect() {
//!     let snapshot = monitor.poll();
//!     println!("Battery voltage: {} mV, health {}%", snapshot.voltage, snapshot.state_of_health);
//! }
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod constants;
pub mod controller;
pub mod demo;
pub mod error;
pub mod monitor;
pub mod outputs;
pub mod policy;
pub mod protocol;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ProcessConfig;
pub use controller::{
    AbortReason, CalibrationStep, ProcessController, ProcessEvent, ProcessKind, ProcessState,
    Timing,
};
pub use error::{Error, Result};
pub use monitor::{BatteryMonitor, TelemetrySource};
pub use outputs::{Indication, PinRelays, ProcessOutputs, RelayState};
pub use protocol::{BusError, Command, SmartBatteryBus, Smbus};
pub use types::*;
