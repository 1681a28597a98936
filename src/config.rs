//! Operational thresholds and durations consumed by the controller.
//!
//! Loading and saving is left to the embedding application; the struct is
//! `serde`-ready for whatever store it uses.

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Also stop on the voltage and current thresholds below, not only on
    /// the battery's own flags
    pub use_additional_conditions: bool,
    /// mV
    pub charge_term_voltage: u16,
    /// mA
    pub charge_term_current: u16,
    /// mV
    pub discharge_term_voltage: u16,
    /// mA
    pub discharge_term_current: u16,
    pub pre_charge_wait_ms: u64,
    pub charge_wait_ms: u64,
    pub discharge_wait_ms: u64,
    /// Cycles offered when the caller has no count of its own
    pub calibration_cycles: u32,
    pub demo_stage_duration_ms: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        ProcessConfig {
            use_additional_conditions: true,
            charge_term_voltage: DEFAULT_CHARGE_TERM_VOLTAGE,
            charge_term_current: DEFAULT_CHARGE_TERM_CURRENT,
            discharge_term_voltage: DEFAULT_DISCHARGE_TERM_VOLTAGE,
            discharge_term_current: DEFAULT_DISCHARGE_TERM_CURRENT,
            pre_charge_wait_ms: DEFAULT_PRE_CHARGE_WAIT_MS,
            charge_wait_ms: DEFAULT_CHARGE_WAIT_MS,
            discharge_wait_ms: DEFAULT_DISCHARGE_WAIT_MS,
            calibration_cycles: 1,
            demo_stage_duration_ms: DEFAULT_DEMO_STAGE_DURATION_MS,
        }
    }
}

impl ProcessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.calibration_cycles == 0 {
            return Err(Error::InvalidConfig(
                "calibration_cycles must be at least 1".to_string(),
            ));
        }
        if self.demo_stage_duration_ms == 0 {
            return Err(Error::InvalidConfig(
                "demo_stage_duration_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
