use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::*;

/// Conditions encoded in the battery status word.
///
/// Always derived from a status word with [`StatusFlags::from_word`]; the
/// flags are never edited on their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFlags {
    pub error_condition: bool,
    pub fully_charged: bool,
    pub fully_discharged: bool,
    pub discharging: bool,
    pub initialized: bool,
    pub over_charged_alarm: bool,
    pub terminate_charge_alarm: bool,
    pub over_temperature_alarm: bool,
    pub terminate_discharge_alarm: bool,
    pub remaining_capacity_alarm: bool,
    pub remaining_time_alarm: bool,
}

impl StatusFlags {
    pub fn from_word(word: u16) -> Self {
        let set = |mask: u16| word & mask != 0;
        StatusFlags {
            error_condition: set(STATUS_ERROR_CONDITION),
            fully_charged: set(STATUS_FULLY_CHARGED),
            fully_discharged: set(STATUS_FULLY_DISCHARGED),
            discharging: set(STATUS_DISCHARGING),
            initialized: set(STATUS_INITIALIZED),
            over_charged_alarm: set(STATUS_OVER_CHARGED_ALARM),
            terminate_charge_alarm: set(STATUS_TERMINATE_CHARGE_ALARM),
            over_temperature_alarm: set(STATUS_OVER_TEMP_ALARM),
            terminate_discharge_alarm: set(STATUS_TERMINATE_DISCHARGE_ALARM),
            remaining_capacity_alarm: set(STATUS_REMAINING_CAPACITY_ALARM),
            remaining_time_alarm: set(STATUS_REMAINING_TIME_ALARM),
        }
    }

    /// Short names and states of every flag, in report order.
    pub fn labels(&self) -> [(&'static str, bool); 10] {
        [
            ("FC", self.fully_charged),
            ("FD", self.fully_discharged),
            ("DSG", self.discharging),
            ("INIT", self.initialized),
            ("OCA", self.over_charged_alarm),
            ("TCA", self.terminate_charge_alarm),
            ("OTA", self.over_temperature_alarm),
            ("TDA", self.terminate_discharge_alarm),
            ("RCA", self.remaining_capacity_alarm),
            ("RTA", self.remaining_time_alarm),
        ]
    }
}

/// Packed manufacture date: bits 0-4 day, 5-8 month, 9-15 years since 1980.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufactureDate(pub u16);

impl ManufactureDate {
    pub fn from_ymd(year: u16, month: u8, day: u8) -> Self {
        let years = year.saturating_sub(MANUFACTURE_EPOCH_YEAR as u16) & 0x7F;
        ManufactureDate(years << 9 | ((month as u16) & 0x0F) << 5 | (day as u16) & 0x1F)
    }

    pub fn year(self) -> u16 {
        ((self.0 >> 9) & 0x7F) + MANUFACTURE_EPOCH_YEAR as u16
    }

    pub fn month(self) -> u8 {
        ((self.0 >> 5) & 0x0F) as u8
    }

    pub fn day(self) -> u8 {
        (self.0 & 0x1F) as u8
    }

    /// Packed word
    pub fn encode(self) -> u16 {
        self.0
    }

    /// Calendar date, if the packed fields form one
    pub fn to_naive_date(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year() as i32, self.month() as u32, self.day() as u32)
    }
}

impl fmt::Display for ManufactureDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}-{:02}", self.year(), self.month(), self.day())
    }
}

/// Full charge capacity as a percentage of design capacity, rounded down.
///
/// A design capacity of zero gives zero.
pub fn state_of_health(full_charge_capacity: u16, design_capacity: u16) -> u16 {
    if design_capacity == 0 {
        return 0;
    }
    (full_charge_capacity as u32 * 100 / design_capacity as u32).min(u16::MAX as u32) as u16
}

/// Result of one poll of the battery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Pack voltage (mV)
    pub voltage: u16,
    /// Pack current (mA), negative while discharging
    pub current: i16,
    pub relative_state_of_charge: u16,
    pub absolute_state_of_charge: u16,
    /// mAh
    pub remaining_capacity: u16,
    /// mAh
    pub full_charge_capacity: u16,
    /// Tenths of a Kelvin
    pub temperature: u16,
    pub cycle_count: u16,
    pub status_word: u16,
    pub manufacturer_name: String,
    pub device_name: String,
    pub chemistry: String,
    /// mAh
    pub design_capacity: u16,
    /// mV
    pub design_voltage: u16,
    pub manufacture_date: ManufactureDate,
    pub serial_number: u16,
    pub specification_info: u16,
    /// Cells 1 to 4 (mV)
    pub cell_voltages: [u16; 4],
    /// Charge current the battery asks for (mA)
    pub charging_current: u16,
    /// Charge voltage the battery asks for (mV)
    pub charging_voltage: u16,
    /// Derived, zero on an error snapshot
    pub state_of_health: u16,
    /// Derived, all clear on an error snapshot
    pub flags: StatusFlags,
    /// Set when the status word was the sentinel
    pub read_error: bool,
}

impl TelemetrySnapshot {
    /// Snapshot of a poll whose status word came back as the sentinel
    pub fn is_error(&self) -> bool {
        self.read_error
    }

    /// Error snapshot, or the battery itself reports an error condition
    pub fn has_error(&self) -> bool {
        self.read_error || self.flags.error_condition
    }

    pub fn is_fully_charged(&self) -> bool {
        self.flags.fully_charged
    }

    pub fn is_fully_discharged(&self) -> bool {
        self.flags.fully_discharged
    }

    pub fn temperature_celsius(&self) -> f64 {
        let celsius = self.temperature as f64 / 10.0 - 273.15;
        (celsius * 100.0).round() / 100.0
    }

    /// Fill in the fields derived from the raw registers.
    ///
    /// A sentinel status word marks the snapshot as an error and leaves the
    /// derived fields untouched.
    pub(crate) fn derive(&mut self) {
        if self.status_word == SENTINEL_WORD {
            self.read_error = true;
            return;
        }
        self.flags = StatusFlags::from_word(self.status_word);
        self.state_of_health = state_of_health(self.full_charge_capacity, self.design_capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_of_health_guards_zero_design_capacity() {
        assert_eq!(state_of_health(0, 0), 0);
        assert_eq!(state_of_health(4200, 0), 0);
        assert_eq!(state_of_health(5000, 5000), 100);
        assert_eq!(state_of_health(4750, 5000), 95);
        assert_eq!(state_of_health(4999, 5000), 99);
        assert_eq!(state_of_health(u16::MAX, 1), u16::MAX);
    }

    #[test]
    fn manufacture_date_round_trips_every_word() {
        for word in 0..=u16::MAX {
            let date = ManufactureDate(word);
            let again = ManufactureDate::from_ymd(date.year(), date.month(), date.day());
            assert_eq!(again.encode(), word);
        }
    }

    #[test]
    fn manufacture_date_fields() {
        let date = ManufactureDate((2023 - 1980) * 512 + 10 * 32 + 26);
        assert_eq!((date.year(), date.month(), date.day()), (2023, 10, 26));
        assert_eq!(date.to_string(), "2023-10-26");
        assert_eq!(date.to_naive_date(), NaiveDate::from_ymd_opt(2023, 10, 26));
        assert_eq!(ManufactureDate(0).to_naive_date(), None);
    }

    #[test]
    fn status_flags_follow_bits() {
        let flags = StatusFlags::from_word(0x0020 | 0x0080);
        assert!(flags.fully_charged);
        assert!(flags.initialized);
        assert!(!flags.fully_discharged);
        assert!(!flags.error_condition);

        let flags = StatusFlags::from_word(0x8000 | 0x0010 | 0x0040);
        assert!(flags.error_condition);
        assert!(flags.over_charged_alarm);
        assert!(flags.fully_discharged);
        assert!(flags.discharging);

        let flags = StatusFlags::from_word(0x4000 | 0x1000 | 0x0800 | 0x0200 | 0x0100);
        assert!(flags.terminate_charge_alarm);
        assert!(flags.over_temperature_alarm);
        assert!(flags.terminate_discharge_alarm);
        assert!(flags.remaining_capacity_alarm);
        assert!(flags.remaining_time_alarm);
        assert!(!flags.error_condition);
        assert_eq!(flags.labels().iter().filter(|(_, set)| *set).count(), 5);
    }

    #[test]
    fn sentinel_status_leaves_derived_fields_default() {
        let mut snapshot = TelemetrySnapshot {
            status_word: SENTINEL_WORD,
            full_charge_capacity: 4000,
            design_capacity: 5000,
            ..Default::default()
        };
        snapshot.derive();
        assert!(snapshot.is_error());
        assert!(snapshot.has_error());
        assert_eq!(snapshot.state_of_health, 0);
        assert_eq!(snapshot.flags, StatusFlags::default());
    }

    #[test]
    fn valid_status_derives_health_and_flags() {
        let mut snapshot = TelemetrySnapshot {
            status_word: 0x00A0,
            full_charge_capacity: 4750,
            design_capacity: 5000,
            ..Default::default()
        };
        snapshot.derive();
        assert!(!snapshot.is_error());
        assert!(snapshot.is_fully_charged());
        assert_eq!(snapshot.state_of_health, 95);
    }

    #[test]
    fn temperature_is_converted_from_decikelvin() {
        let snapshot = TelemetrySnapshot {
            temperature: 2982,
            ..Default::default()
        };
        assert_eq!(snapshot.temperature_celsius(), 25.05);
    }
}
