//! Error types for battery conditioning operations.

use thiserror::Error;

use crate::protocol::BusError;

/// Result type alias for conditioner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types surfaced to the caller of the conditioner.
///
/// Bus failures during a poll never show up here: the snapshot builder
/// folds them into sentinel values. Only direct register access through
/// [`BatteryMonitor::read_word`](crate::BatteryMonitor::read_word) and
/// [`BatteryMonitor::read_string`](crate::BatteryMonitor::read_string)
/// returns [`Error::Bus`].
#[derive(Error, Debug)]
pub enum Error {
    /// Register access failed
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// A calibration needs at least one cycle
    #[error("Invalid cycle count: {0} (must be at least 1)")]
    InvalidCycleCount(u32),

    /// A process is already running
    #[error("Controller busy")]
    Busy,

    /// Relay output could not be driven
    #[error("Relay error: {0}")]
    Relay(String),

    /// Configuration values are unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
