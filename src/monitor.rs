//! Telemetry snapshot builder.
//!
//! [`BatteryMonitor::poll`] reads every register of the command map once
//! and assembles a [`TelemetrySnapshot`]. Bus failures never escape a poll:
//! they show up as sentinel values, and a sentinel status word turns the
//! whole snapshot into an error snapshot.

use log::{debug, info};

use crate::constants::{CONNECT_RETRIES, SENTINEL_WORD};
use crate::error::Result;
use crate::protocol::{Command, RegisterKind, SmartBatteryBus};
use crate::types::{ManufactureDate, TelemetrySnapshot};

/// Anything that can produce a fresh snapshot on demand.
pub trait TelemetrySource {
    fn poll(&mut self) -> TelemetrySnapshot;
}

impl<T: TelemetrySource + ?Sized> TelemetrySource for &mut T {
    fn poll(&mut self) -> TelemetrySnapshot {
        (**self).poll()
    }
}

/// Smart battery on a bus, with the result of its last poll.
pub struct BatteryMonitor<B> {
    bus: B,
    last: TelemetrySnapshot,
}

impl<B: SmartBatteryBus> BatteryMonitor<B> {
    pub fn new(bus: B) -> Self {
        BatteryMonitor {
            bus,
            last: TelemetrySnapshot::default(),
        }
    }

    /// Check that the battery answers on the bus, probing up to
    /// [`CONNECT_RETRIES`] times.
    pub fn connect(&mut self) -> bool {
        self.connect_with_retries(CONNECT_RETRIES)
    }

    pub fn connect_with_retries(&mut self, attempts: u8) -> bool {
        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            if self.bus.probe() {
                info!("Battery found on bus");
                return true;
            }
            debug!("Battery did not acknowledge probe ({}/{})", attempt, attempts);
        }
        false
    }

    /// Read one word register directly, without sentinel folding.
    pub fn read_word(&mut self, command: Command) -> Result<u16> {
        Ok(self.bus.read_word(command)?)
    }

    /// Read one string register directly, without placeholder folding.
    pub fn read_string(&mut self, command: Command) -> Result<String> {
        Ok(self.bus.read_string(command)?)
    }

    /// Read all registers and return the new snapshot.
    pub fn poll(&mut self) -> TelemetrySnapshot {
        let mut snapshot = TelemetrySnapshot::default();
        for command in Command::ALL {
            match command.kind() {
                RegisterKind::Word => {
                    let word = self.bus.read_word_or_sentinel(command);
                    store_word(&mut snapshot, command, word);
                }
                RegisterKind::Text => {
                    let text = self.bus.read_string_or_placeholder(command);
                    store_text(&mut snapshot, command, text);
                }
            }
        }

        snapshot.derive();
        if snapshot.is_error() {
            debug!("Battery status read back as 0x{:04X}, snapshot invalid", SENTINEL_WORD);
        }
        self.last = snapshot.clone();
        snapshot
    }

    pub fn last_snapshot(&self) -> &TelemetrySnapshot {
        &self.last
    }

    pub fn is_fully_charged(&self) -> bool {
        self.last.is_fully_charged()
    }

    pub fn is_fully_discharged(&self) -> bool {
        self.last.is_fully_discharged()
    }

    pub fn has_error(&self) -> bool {
        self.last.has_error()
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn release(self) -> B {
        self.bus
    }
}

impl<B: SmartBatteryBus> TelemetrySource for BatteryMonitor<B> {
    fn poll(&mut self) -> TelemetrySnapshot {
        BatteryMonitor::poll(self)
    }
}

fn store_word(snapshot: &mut TelemetrySnapshot, command: Command, word: u16) {
    match command {
        Command::Temperature => snapshot.temperature = word,
        Command::Voltage => snapshot.voltage = word,
        Command::Current => snapshot.current = word as i16,
        Command::RelativeStateOfCharge => snapshot.relative_state_of_charge = word,
        Command::AbsoluteStateOfCharge => snapshot.absolute_state_of_charge = word,
        Command::RemainingCapacity => snapshot.remaining_capacity = word,
        Command::FullChargeCapacity => snapshot.full_charge_capacity = word,
        Command::ChargingCurrent => snapshot.charging_current = word,
        Command::ChargingVoltage => snapshot.charging_voltage = word,
        Command::BatteryStatus => snapshot.status_word = word,
        Command::CycleCount => snapshot.cycle_count = word,
        Command::DesignCapacity => snapshot.design_capacity = word,
        Command::DesignVoltage => snapshot.design_voltage = word,
        Command::SpecificationInfo => snapshot.specification_info = word,
        Command::ManufactureDate => snapshot.manufacture_date = ManufactureDate(word),
        Command::SerialNumber => snapshot.serial_number = word,
        Command::CellVoltage1 => snapshot.cell_voltages[0] = word,
        Command::CellVoltage2 => snapshot.cell_voltages[1] = word,
        Command::CellVoltage3 => snapshot.cell_voltages[2] = word,
        Command::CellVoltage4 => snapshot.cell_voltages[3] = word,
        Command::ManufacturerName | Command::DeviceName | Command::DeviceChemistry => {}
    }
}

fn store_text(snapshot: &mut TelemetrySnapshot, command: Command, text: String) {
    match command {
        Command::ManufacturerName => snapshot.manufacturer_name = text,
        Command::DeviceName => snapshot.device_name = text,
        Command::DeviceChemistry => snapshot.chemistry = text,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::READ_ERROR_TEXT;
    use crate::error::Error;
    use crate::protocol::BusError;
    use std::collections::{HashMap, HashSet};

    /// Bus holding fixed register values; commands listed in `failing`
    /// fail with a transport error.
    #[derive(Default)]
    struct RegisterBus {
        words: HashMap<Command, u16>,
        texts: HashMap<Command, String>,
        failing: HashSet<Command>,
        reads: Vec<Command>,
        missed_probes: u8,
        probes: u8,
    }

    impl SmartBatteryBus for RegisterBus {
        fn probe(&mut self) -> bool {
            self.probes += 1;
            if self.missed_probes > 0 {
                self.missed_probes -= 1;
                return false;
            }
            !self.failing.contains(&Command::BatteryStatus)
        }

        fn read_word(&mut self, command: Command) -> std::result::Result<u16, BusError> {
            self.reads.push(command);
            if self.failing.contains(&command) {
                return Err(BusError::Transport("nack".to_string()));
            }
            Ok(self.words.get(&command).copied().unwrap_or(0))
        }

        fn read_string(&mut self, command: Command) -> std::result::Result<String, BusError> {
            self.reads.push(command);
            if self.failing.contains(&command) {
                return Err(BusError::LengthOutOfRange(40));
            }
            Ok(self.texts.get(&command).cloned().unwrap_or_default())
        }
    }

    fn healthy_bus() -> RegisterBus {
        let mut bus = RegisterBus::default();
        for (command, word) in [
            (Command::Voltage, 12_100),
            (Command::Current, (-1500i16) as u16),
            (Command::RelativeStateOfCharge, 80),
            (Command::FullChargeCapacity, 4750),
            (Command::DesignCapacity, 5000),
            (Command::BatteryStatus, 0x00C0),
            (Command::CellVoltage1, 4010),
            (Command::CellVoltage4, 4040),
            (Command::ManufactureDate, (43 << 9) | (10 << 5) | 26),
        ] {
            bus.words.insert(command, word);
        }
        bus.texts.insert(Command::ManufacturerName, "ACME".to_string());
        bus.texts.insert(Command::DeviceChemistry, "LION".to_string());
        bus
    }

    #[test]
    fn poll_reads_every_register_once() {
        let mut monitor = BatteryMonitor::new(healthy_bus());
        monitor.poll();

        let reads = &monitor.bus_mut().reads;
        assert_eq!(reads.len(), 23);
        let unique: HashSet<_> = reads.iter().collect();
        assert_eq!(unique.len(), 23);
    }

    #[test]
    fn poll_decodes_fields_and_derives_health() {
        let mut monitor = BatteryMonitor::new(healthy_bus());
        let snapshot = monitor.poll();

        assert!(!snapshot.is_error());
        assert_eq!(snapshot.voltage, 12_100);
        assert_eq!(snapshot.current, -1500);
        assert_eq!(snapshot.cell_voltages, [4010, 0, 0, 4040]);
        assert_eq!(snapshot.manufacturer_name, "ACME");
        assert_eq!(snapshot.chemistry, "LION");
        assert_eq!(snapshot.manufacture_date.to_string(), "2023-10-26");
        assert_eq!(snapshot.state_of_health, 95);
        assert!(snapshot.flags.discharging);
        assert!(snapshot.flags.initialized);
        assert_eq!(monitor.last_snapshot(), &snapshot);
    }

    #[test]
    fn failed_reads_become_sentinels() {
        let mut bus = healthy_bus();
        bus.failing.insert(Command::Voltage);
        bus.failing.insert(Command::DeviceName);
        let mut monitor = BatteryMonitor::new(bus);
        let snapshot = monitor.poll();

        assert!(!snapshot.is_error());
        assert_eq!(snapshot.voltage, SENTINEL_WORD);
        assert_eq!(snapshot.device_name, READ_ERROR_TEXT);
    }

    #[test]
    fn sentinel_status_gives_error_snapshot() {
        let mut bus = healthy_bus();
        bus.failing.insert(Command::BatteryStatus);
        let mut monitor = BatteryMonitor::new(bus);
        let snapshot = monitor.poll();

        assert!(snapshot.is_error());
        assert!(monitor.has_error());
        assert_eq!(snapshot.state_of_health, 0);
        assert!(!monitor.is_fully_charged());
        assert!(!monitor.is_fully_discharged());
    }

    #[test]
    fn accessors_track_last_poll() {
        let mut bus = healthy_bus();
        bus.words.insert(Command::BatteryStatus, 0x0020);
        let mut monitor = BatteryMonitor::new(bus);
        assert!(!monitor.is_fully_charged());
        monitor.poll();
        assert!(monitor.is_fully_charged());

        monitor.bus_mut().words.insert(Command::BatteryStatus, 0x0010);
        monitor.poll();
        assert!(!monitor.is_fully_charged());
        assert!(monitor.is_fully_discharged());
    }

    #[test]
    fn connect_retries_until_present() {
        let mut bus = healthy_bus();
        bus.failing.insert(Command::BatteryStatus);
        let mut monitor = BatteryMonitor::new(bus);
        assert!(!monitor.connect_with_retries(3));
        assert_eq!(monitor.bus_mut().probes, 3);

        monitor.bus_mut().failing.clear();
        monitor.bus_mut().probes = 0;
        monitor.bus_mut().missed_probes = 2;
        assert!(monitor.connect_with_retries(3));
        assert_eq!(monitor.bus_mut().probes, 3);
    }

    #[test]
    fn connect_gives_up_after_default_retries() {
        let mut bus = healthy_bus();
        bus.missed_probes = CONNECT_RETRIES;
        let mut monitor = BatteryMonitor::new(bus);
        assert!(!monitor.connect());
        assert_eq!(monitor.bus_mut().probes, CONNECT_RETRIES);

        monitor.bus_mut().missed_probes = CONNECT_RETRIES - 1;
        assert!(monitor.connect());
    }

    #[test]
    fn direct_reads_surface_bus_errors() {
        let mut bus = healthy_bus();
        bus.failing.insert(Command::Voltage);
        bus.failing.insert(Command::DeviceName);
        let mut monitor = BatteryMonitor::new(bus);

        assert_eq!(monitor.read_word(Command::DesignCapacity).unwrap(), 5000);
        assert_eq!(monitor.read_string(Command::DeviceChemistry).unwrap(), "LION");
        assert!(matches!(
            monitor.read_word(Command::Voltage),
            Err(Error::Bus(BusError::Transport(_)))
        ));
        assert!(matches!(
            monitor.read_string(Command::DeviceName),
            Err(Error::Bus(BusError::LengthOutOfRange(40)))
        ));
    }
}
