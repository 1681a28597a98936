//! Termination rules for charge and discharge phases.
//!
//! Both checks are stateless: they look only at the snapshot and the
//! configuration they are given.

use crate::config::ProcessConfig;
use crate::types::TelemetrySnapshot;

/// Whether an active charge should end.
pub fn should_stop_charging(snapshot: &TelemetrySnapshot, config: &ProcessConfig) -> bool {
    if snapshot.is_fully_charged() || snapshot.has_error() {
        return true;
    }
    config.use_additional_conditions
        && (snapshot.voltage >= config.charge_term_voltage
            || snapshot.current.unsigned_abs() < config.charge_term_current)
}

/// Whether an active discharge should end.
pub fn should_stop_discharging(snapshot: &TelemetrySnapshot, config: &ProcessConfig) -> bool {
    if snapshot.is_fully_discharged() || snapshot.has_error() {
        return true;
    }
    config.use_additional_conditions
        && (snapshot.voltage <= config.discharge_term_voltage
            || snapshot.current.unsigned_abs() < config.discharge_term_current)
}
