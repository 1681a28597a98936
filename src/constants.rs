//! Protocol and timing constants for SBS battery communication.
//!
//! This module defines the SMBus device address, the Smart Battery
//! command codes the conditioner reads, the status word bit masks, and
//! the timing parameters of the process controller.

/// 7-bit SMBus address of a Smart Battery
pub const SMBUS_ADDRESS: u8 = 0x0B;

/// Value returned for a word read that failed, and the status word of an
/// unusable snapshot
pub const SENTINEL_WORD: u16 = 0xFFFF;

/// Longest string a block read may report
pub const MAX_STRING_LEN: u8 = 31;

/// Placeholder returned for a string read that failed
pub const READ_ERROR_TEXT: &str = "READ_ERR";

/// Interval between battery polls in live mode
pub const POLL_INTERVAL_MS: u64 = 15_000;

/// Back-to-back failed polls that abort a running process
pub const MAX_CONSECUTIVE_FAILURES: u8 = 3;

/// Probe attempts made by `BatteryMonitor::connect`
pub const CONNECT_RETRIES: u8 = 3;

// Battery status word bits
pub const STATUS_OVER_CHARGED_ALARM: u16 = 0x8000;
pub const STATUS_TERMINATE_CHARGE_ALARM: u16 = 0x4000;
pub const STATUS_OVER_TEMP_ALARM: u16 = 0x1000;
pub const STATUS_TERMINATE_DISCHARGE_ALARM: u16 = 0x0800;
pub const STATUS_REMAINING_CAPACITY_ALARM: u16 = 0x0200;
pub const STATUS_REMAINING_TIME_ALARM: u16 = 0x0100;
pub const STATUS_INITIALIZED: u16 = 0x0080;
pub const STATUS_DISCHARGING: u16 = 0x0040;
pub const STATUS_FULLY_CHARGED: u16 = 0x0020;
pub const STATUS_FULLY_DISCHARGED: u16 = 0x0010;

/// The error condition shares its bit with the over-charged alarm
pub const STATUS_ERROR_CONDITION: u16 = STATUS_OVER_CHARGED_ALARM;

/// Manufacture dates count years from this one
pub const MANUFACTURE_EPOCH_YEAR: i32 = 1980;

/// Default charge termination voltage (mV)
pub const DEFAULT_CHARGE_TERM_VOLTAGE: u16 = 12_600;

/// Default charge termination current (mA)
pub const DEFAULT_CHARGE_TERM_CURRENT: u16 = 10;

/// Default discharge termination voltage (mV)
pub const DEFAULT_DISCHARGE_TERM_VOLTAGE: u16 = 7_500;

/// Default discharge termination current (mA)
pub const DEFAULT_DISCHARGE_TERM_CURRENT: u16 = 10;

/// Rest after the initial charge of a calibration (30 minutes)
pub const DEFAULT_PRE_CHARGE_WAIT_MS: u64 = 1_800_000;

/// Rest after each calibration charge (1 hour)
pub const DEFAULT_CHARGE_WAIT_MS: u64 = 3_600_000;

/// Rest after each calibration discharge (5 hours)
pub const DEFAULT_DISCHARGE_WAIT_MS: u64 = 18_000_000;

/// Poll interval and wait duration of a demo run
pub const DEFAULT_DEMO_STAGE_DURATION_MS: u64 = 3_000;

/// State of charge change per synthetic poll
pub const DEMO_SOC_STEP: u16 = 5;

/// Synthetic state of charge at or above which the pack reports full
pub const DEMO_FULL_SOC: u16 = 99;

/// Synthetic state of charge at or below which the pack reports empty
pub const DEMO_EMPTY_SOC: u16 = 5;
