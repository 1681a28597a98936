//! Synthetic battery used by demo runs.
//!
//! Each call to [`DemoBattery::next_snapshot`] moves the state of charge
//! one step in the requested direction and raises the same fully charged /
//! fully discharged flags a real pack would, so the termination policy runs
//! unchanged against it.

use crate::constants::*;
use crate::types::{state_of_health, ManufactureDate, StatusFlags, TelemetrySnapshot};

/// Direction the synthetic pack is being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoDirection {
    Charging,
    Discharging,
    Idle,
}

#[derive(Debug, Clone)]
pub struct DemoBattery {
    state_of_charge: u16,
    polls: u32,
}

impl Default for DemoBattery {
    fn default() -> Self {
        DemoBattery::new(50)
    }
}

impl DemoBattery {
    pub fn new(state_of_charge: u16) -> Self {
        DemoBattery {
            state_of_charge: state_of_charge.min(100),
            polls: 0,
        }
    }

    pub fn state_of_charge(&self) -> u16 {
        self.state_of_charge
    }

    pub fn next_snapshot(&mut self, direction: DemoDirection) -> TelemetrySnapshot {
        let mut status_word = STATUS_INITIALIZED;
        let current = match direction {
            DemoDirection::Charging => {
                self.state_of_charge = (self.state_of_charge + DEMO_SOC_STEP).min(100);
                if self.state_of_charge >= DEMO_FULL_SOC {
                    status_word |= STATUS_FULLY_CHARGED;
                }
                2000
            }
            DemoDirection::Discharging => {
                self.state_of_charge = self.state_of_charge.saturating_sub(DEMO_SOC_STEP);
                status_word |= STATUS_DISCHARGING;
                if self.state_of_charge <= DEMO_EMPTY_SOC {
                    status_word |= STATUS_FULLY_DISCHARGED;
                }
                -1500
            }
            DemoDirection::Idle => 0,
        };
        self.polls = self.polls.wrapping_add(1);

        let soc = self.state_of_charge;
        let voltage = 10_000 + 25 * soc;
        let full_charge_capacity: u16 = 5000;
        let design_capacity: u16 = 6000;
        TelemetrySnapshot {
            voltage,
            current,
            relative_state_of_charge: soc,
            absolute_state_of_charge: soc,
            remaining_capacity: (full_charge_capacity as u32 * soc as u32 / 100) as u16,
            full_charge_capacity,
            temperature: 2982 + (self.polls.wrapping_mul(7) % 50) as u16,
            cycle_count: 10,
            status_word,
            manufacturer_name: "DEMO INC.".to_string(),
            device_name: "DEMO-BATT".to_string(),
            chemistry: "LION".to_string(),
            design_capacity,
            design_voltage: 11_100,
            manufacture_date: ManufactureDate::from_ymd(2023, 10, 26),
            serial_number: 12345,
            specification_info: 33,
            cell_voltages: [voltage / 3, voltage / 3, voltage / 3, 0],
            charging_current: 1500,
            charging_voltage: 12_600,
            state_of_health: state_of_health(full_charge_capacity, design_capacity),
            flags: StatusFlags::from_word(status_word),
            read_error: false,
        }
    }
}
