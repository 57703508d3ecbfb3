use crate::i2c::I2cAddress;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when driving the bench through a CH341 bridge.
///
/// The variants fall into the broad groups reported by [`Error::kind`]:
/// bridge I/O, protocol timeouts, range violations, calibration problems,
/// device identity/verification failures, and configuration errors.
#[derive(Error, Debug)]
pub enum Error {
    /// The vendor driver library could not be loaded.
    #[error("CH341 driver library '{path}' unavailable: {message}")]
    LibraryUnavailable {
        /// Library path or name that was tried.
        path: String,
        /// Loader error text.
        message: String,
    },
    /// The vendor library lacks an entry point the operation needs.
    #[error("CH341 driver library has no entry point '{0}'")]
    MissingSymbol(&'static str),
    /// No CH341 answered at the requested index.
    #[error("CH341 device {index} not found or could not be reset")]
    DeviceNotFound {
        /// Device index passed to open.
        index: u32,
    },
    /// The bridge handle is closed.
    #[error("CH341 device is not open")]
    DeviceNotOpen,
    /// A stream transaction was not acknowledged or failed on the bus.
    #[error(
        "I2C transfer to {address} failed (write {write_len} bytes, read {read_len} bytes): no ACK, bus error, or device closed"
    )]
    I2cTransferFailed {
        /// Target of the transaction.
        address: I2cAddress,
        /// Bytes after the address byte.
        write_len: usize,
        /// Bytes requested back.
        read_len: usize,
    },
    /// A bridge command (GPIO register access, stream mode, reset, flush) was rejected.
    #[error("CH341 {operation} failed")]
    BridgeCommandFailed {
        /// Which command failed, e.g. "set_output" or "get_input".
        operation: &'static str,
    },
    /// The bridge status word could not be read.
    #[error("Bridge status unavailable")]
    StatusUnavailable,
    /// No acknowledgment or matching readback within the deadline.
    #[error("Timeout after {timeout:?} waiting for {operation}")]
    ProtocolTimeout {
        /// What was being waited for.
        operation: String,
        /// The deadline that expired.
        timeout: Duration,
    },
    /// An EEPROM access falls outside the device geometry.
    #[error("Address range 0x{address:04X}+{length} outside device of {size} bytes")]
    AddressOutOfRange {
        /// Start address.
        address: usize,
        /// Requested length.
        length: usize,
        /// Device size in bytes.
        size: usize,
    },
    /// Function argument is outside the valid range.
    #[error("Argument out of range: {0}")]
    ArgumentOutOfRange(String),
    /// The pin name is not available on this chip.
    #[error("Unsupported GPIO '{name}' (available: {available})")]
    UnknownPin {
        /// Requested pin name.
        name: String,
        /// Comma separated list of valid names.
        available: String,
    },
    /// Direction can only be changed for bits 0-15.
    #[error("Direction of GPIO '{name}' (bit {bit}) cannot be changed; only bits 0-15 support it")]
    DirectionNotSupported {
        /// Pin name.
        name: String,
        /// Bit index on the bridge.
        bit: u8,
    },
    /// Unknown EEPROM part number.
    #[error("Unsupported EEPROM type: {0}")]
    UnsupportedEepromType(String),
    /// Current or power requested before calibration.
    #[error("Power monitor is not calibrated; call initialize() or calibrate() first")]
    NotCalibrated,
    /// Calibration inputs or measurements are not physical.
    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),
    /// Identity registers do not match the expected part.
    #[error("Device at {address} is not the expected part: {message}")]
    DeviceMismatch {
        /// Probed address.
        address: I2cAddress,
        /// What did not match.
        message: String,
    },
    /// Data read back after a write differs from what was written.
    #[error(
        "Verification failed at 0x{address:04X}: wrote {expected:02X?}, read {actual:02X?} (write protect enabled or wrong address?)"
    )]
    VerifyMismatch {
        /// Start address of the verified range.
        address: usize,
        /// Bytes written.
        expected: Vec<u8>,
        /// Bytes read back.
        actual: Vec<u8>,
    },
    /// Bench configuration could not be parsed or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),
    /// General I/O error (configuration files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bridge not open, library unavailable, USB-level transaction failure.
    Io,
    /// No acknowledgment or readback match within a deadline.
    ProtocolTimeout,
    /// Address, length, pin or argument outside what the hardware supports.
    Range,
    /// Calibration missing or non-physical.
    Calibration,
    /// Wrong part or failed read-after-write check.
    Device,
    /// Configuration file problems.
    Config,
}

impl Error {
    /// Returns the broad category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::LibraryUnavailable { .. }
            | Error::MissingSymbol(_)
            | Error::DeviceNotFound { .. }
            | Error::DeviceNotOpen
            | Error::I2cTransferFailed { .. }
            | Error::BridgeCommandFailed { .. }
            | Error::StatusUnavailable => ErrorKind::Io,
            Error::ProtocolTimeout { .. } => ErrorKind::ProtocolTimeout,
            Error::AddressOutOfRange { .. }
            | Error::ArgumentOutOfRange(_)
            | Error::UnknownPin { .. }
            | Error::DirectionNotSupported { .. }
            | Error::UnsupportedEepromType(_) => ErrorKind::Range,
            Error::NotCalibrated | Error::InvalidCalibration(_) => ErrorKind::Calibration,
            Error::DeviceMismatch { .. } | Error::VerifyMismatch { .. } => ErrorKind::Device,
            Error::Config(_) | Error::Io(_) => ErrorKind::Config,
        }
    }
}

/// Result type alias for bench operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
