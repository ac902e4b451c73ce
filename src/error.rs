//! Error types for MLX90393 sensor interface

use thiserror::Error;

#[cfg(feature = "ft232h")]
use crate::ffi::{status_to_string, FT_STATUS, FT_OK};

/// Error raised by a bus transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// FTDI driver error
    #[error("FTDI error: {status} ({description})")]
    Ftdi { status: u32, description: String },

    /// No I2C channels found
    #[error("No I2C channels found")]
    NoChannelsFound,

    /// Invalid channel index
    #[error("Invalid channel index: {0}")]
    InvalidChannel(u32),

    /// Data transfer error
    #[error("Data transfer error: expected {expected} bytes, transferred {actual}")]
    TransferError { expected: u32, actual: u32 },

    /// Error reported by an embedded-hal I2C implementation
    #[error("I2C error: {0}")]
    I2c(String),

    /// Any other transport failure
    #[error("Bus error: {0}")]
    Other(String),
}

#[cfg(feature = "ft232h")]
impl From<FT_STATUS> for BusError {
    fn from(status: FT_STATUS) -> Self {
        if status == FT_OK {
            panic!("Cannot convert FT_OK to error");
        }
        BusError::Ftdi {
            status,
            description: status_to_string(status).to_string(),
        }
    }
}

/// Error type for MLX90393 operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Mlx90393Error {
    /// Configuration value outside its legal set; never reaches the bus
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Transport failure, surfaced unchanged
    #[error(transparent)]
    Bus(#[from] BusError),

    /// The chip set the error flag in its status byte
    #[error("Sensor reported an error (status 0x{status:02X})")]
    SensorError { status: u8 },

    /// Operation not allowed in the current measurement state
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// Conversion still running when the result was read
    #[error("Measurement not ready (status 0x{status:02X})")]
    NotReady { status: u8 },

    /// Register readback differs from the value just written
    #[error("Register 0x{register:02X} mismatch: wrote 0x{expected:04X}, read 0x{actual:04X}")]
    RegisterMismatch { register: u8, expected: u16, actual: u16 },

    /// Response shorter than the command requires
    #[error("Invalid response: expected {expected} bytes, got {actual}")]
    InvalidResponse { expected: usize, actual: usize },
}

/// Result type for MLX90393 operations
pub type Result<T> = std::result::Result<T, Mlx90393Error>;
