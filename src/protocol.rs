//! SMBus register codec for Smart Battery System devices.
//!
//! Two wire shapes are used: a 16-bit word sent low byte first, and a
//! block of up to 31 bytes preceded by a one byte length. Failed reads are
//! folded into [`SENTINEL_WORD`] and [`READ_ERROR_TEXT`] by the
//! `*_or_sentinel` / `*_or_placeholder` helpers, which is what the snapshot
//! builder uses.

use embedded_hal::i2c::I2c;
use log::debug;
use thiserror::Error;

use crate::constants::*;

/// Register access failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The transport rejected the transfer
    #[error("Transport error: {0}")]
    Transport(String),

    /// Fewer bytes arrived than the register needs
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Bytes the register needs
        expected: usize,
        /// Bytes received
        actual: usize,
    },

    /// Block length prefix beyond [`MAX_STRING_LEN`]
    #[error("String length out of range: {0} (max 31)")]
    LengthOutOfRange(u8),
}

/// Wire shape of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    Word,
    Text,
}

/// Smart Battery commands read on every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Temperature = 0x08,
    Voltage = 0x09,
    Current = 0x0A,
    RelativeStateOfCharge = 0x0D,
    AbsoluteStateOfCharge = 0x0E,
    RemainingCapacity = 0x0F,
    FullChargeCapacity = 0x10,
    ChargingCurrent = 0x14,
    ChargingVoltage = 0x15,
    BatteryStatus = 0x16,
    CycleCount = 0x17,
    DesignCapacity = 0x18,
    DesignVoltage = 0x19,
    SpecificationInfo = 0x1A,
    ManufactureDate = 0x1B,
    SerialNumber = 0x1C,
    ManufacturerName = 0x20,
    DeviceName = 0x21,
    DeviceChemistry = 0x22,
    CellVoltage4 = 0x3C,
    CellVoltage3 = 0x3D,
    CellVoltage2 = 0x3E,
    CellVoltage1 = 0x3F,
}

impl Command {
    /// Every command, in the order a poll issues them.
    pub const ALL: [Command; 23] = [
        Command::Voltage,
        Command::Current,
        Command::RelativeStateOfCharge,
        Command::AbsoluteStateOfCharge,
        Command::RemainingCapacity,
        Command::FullChargeCapacity,
        Command::Temperature,
        Command::CycleCount,
        Command::BatteryStatus,
        Command::ManufacturerName,
        Command::DeviceName,
        Command::DeviceChemistry,
        Command::DesignCapacity,
        Command::DesignVoltage,
        Command::ManufactureDate,
        Command::SerialNumber,
        Command::SpecificationInfo,
        Command::CellVoltage1,
        Command::CellVoltage2,
        Command::CellVoltage3,
        Command::CellVoltage4,
        Command::ChargingCurrent,
        Command::ChargingVoltage,
    ];

    /// Command code put on the wire
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn kind(self) -> RegisterKind {
        match self {
            Command::ManufacturerName | Command::DeviceName | Command::DeviceChemistry => {
                RegisterKind::Text
            }
            _ => RegisterKind::Word,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Command::Temperature => "Temperature",
            Command::Voltage => "Voltage",
            Command::Current => "Current",
            Command::RelativeStateOfCharge => "Relative State of Charge",
            Command::AbsoluteStateOfCharge => "Absolute State of Charge",
            Command::RemainingCapacity => "Remaining Capacity",
            Command::FullChargeCapacity => "Full Charge Capacity",
            Command::ChargingCurrent => "Charging Current",
            Command::ChargingVoltage => "Charging Voltage",
            Command::BatteryStatus => "Battery Status",
            Command::CycleCount => "Cycle Count",
            Command::DesignCapacity => "Design Capacity",
            Command::DesignVoltage => "Design Voltage",
            Command::SpecificationInfo => "Specification Info",
            Command::ManufactureDate => "Manufacture Date",
            Command::SerialNumber => "Serial Number",
            Command::ManufacturerName => "Manufacturer Name",
            Command::DeviceName => "Device Name",
            Command::DeviceChemistry => "Device Chemistry",
            Command::CellVoltage4 => "Cell Voltage 4",
            Command::CellVoltage3 => "Cell Voltage 3",
            Command::CellVoltage2 => "Cell Voltage 2",
            Command::CellVoltage1 => "Cell Voltage 1",
        }
    }
}

/// Register-level access to a smart battery.
///
/// Implemented by [`Smbus`] for real hardware; tests script their own.
pub trait SmartBatteryBus {
    /// Check that a device acknowledges its address
    fn probe(&mut self) -> bool;

    /// Read a 16-bit register
    fn read_word(&mut self, command: Command) -> Result<u16, BusError>;

    /// Read a length-prefixed string register
    fn read_string(&mut self, command: Command) -> Result<String, BusError>;

    /// Read a word, answering [`SENTINEL_WORD`] on any failure
    fn read_word_or_sentinel(&mut self, command: Command) -> u16 {
        self.read_word(command).unwrap_or_else(|e| {
            debug!("Read of {} (0x{:02X}) failed: {}", command.label(), command.code(), e);
            SENTINEL_WORD
        })
    }

    /// Read a string, answering [`READ_ERROR_TEXT`] on any failure
    fn read_string_or_placeholder(&mut self, command: Command) -> String {
        self.read_string(command).unwrap_or_else(|e| {
            debug!("Read of {} (0x{:02X}) failed: {}", command.label(), command.code(), e);
            READ_ERROR_TEXT.to_string()
        })
    }
}

impl<T: SmartBatteryBus + ?Sized> SmartBatteryBus for &mut T {
    fn probe(&mut self) -> bool {
        (**self).probe()
    }

    fn read_word(&mut self, command: Command) -> Result<u16, BusError> {
        (**self).read_word(command)
    }

    fn read_string(&mut self, command: Command) -> Result<String, BusError> {
        (**self).read_string(command)
    }
}

/// Decode a little-endian register word.
pub fn decode_word(bytes: &[u8]) -> Result<u16, BusError> {
    match bytes {
        [low, high] => Ok(u16::from_le_bytes([*low, *high])),
        _ => Err(BusError::ShortRead {
            expected: 2,
            actual: bytes.len(),
        }),
    }
}

/// Validate a block length prefix.
pub fn check_string_len(len: u8) -> Result<usize, BusError> {
    if len > MAX_STRING_LEN {
        return Err(BusError::LengthOutOfRange(len));
    }
    Ok(len as usize)
}

/// Decode the payload of a block read.
///
/// Trailing NUL padding is dropped; bytes outside UTF-8 are replaced.
pub fn decode_string(expected: usize, payload: &[u8]) -> Result<String, BusError> {
    if payload.len() != expected {
        return Err(BusError::ShortRead {
            expected,
            actual: payload.len(),
        });
    }
    let text = String::from_utf8_lossy(payload);
    Ok(text.trim_end_matches('\0').to_string())
}

/// SMBus access over an `embedded-hal` I2C bus.
pub struct Smbus<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Smbus<I2C> {
    /// Talk to a battery at the standard address
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, SMBUS_ADDRESS)
    }

    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Smbus { i2c, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Give the bus back
    pub fn release(self) -> I2C {
        self.i2c
    }
}

fn transport<E: core::fmt::Debug>(e: E) -> BusError {
    BusError::Transport(format!("{:?}", e))
}

impl<I2C: I2c> SmartBatteryBus for Smbus<I2C> {
    fn probe(&mut self) -> bool {
        self.i2c.write(self.address, &[]).is_ok()
    }

    fn read_word(&mut self, command: Command) -> Result<u16, BusError> {
        let mut buffer = [0u8; 2];
        self.i2c
            .write_read(self.address, &[command.code()], &mut buffer)
            .map_err(transport)?;
        decode_word(&buffer)
    }

    fn read_string(&mut self, command: Command) -> Result<String, BusError> {
        let mut len = [0u8; 1];
        self.i2c
            .write_read(self.address, &[command.code()], &mut len)
            .map_err(transport)?;
        let len = check_string_len(len[0])?;

        let mut payload = vec![0u8; len];
        if len > 0 {
            self.i2c.read(self.address, &mut payload).map_err(transport)?;
        }
        decode_string(len, &payload)
    }
}
