//! FT232H USB-to-I2C bridge transport (libMPSSE)

use std::ptr;

use log::debug;

use crate::error::BusError;
use crate::ffi::*;
use crate::transport::{BusTransport, DEFAULT_ADDRESS};

/// One opened libMPSSE I2C channel talking to a single device address
pub struct Ft232hTransport {
    handle: FT_HANDLE,
    address: u8,
}

impl Ft232hTransport {
    /// Open an I2C channel at 400 kHz for the sensor at the default address
    ///
    /// # Arguments
    /// * `channel_index` - Index of the I2C channel to use (usually 0)
    pub fn open(channel_index: u32) -> Result<Self, BusError> {
        Self::open_with(channel_index, DEFAULT_ADDRESS, I2C_CLOCK_FAST_MODE)
    }

    /// Open a channel with an explicit device address and bus clock in Hz
    pub fn open_with(channel_index: u32, address: u8, clock_rate: u32) -> Result<Self, BusError> {
        let mut config = ChannelConfig {
            ClockRate: clock_rate,
            ..ChannelConfig::default()
        };

        let mut num_channels: DWORD = 0;
        let status = unsafe { I2C_GetNumChannels(&mut num_channels) };
        if status != FT_OK {
            return Err(status.into());
        }

        if num_channels == 0 {
            return Err(BusError::NoChannelsFound);
        }

        if channel_index >= num_channels {
            return Err(BusError::InvalidChannel(channel_index));
        }

        let mut handle: FT_HANDLE = ptr::null_mut();
        let status = unsafe { I2C_OpenChannel(channel_index, &mut handle) };
        if status != FT_OK {
            return Err(status.into());
        }

        let status = unsafe { I2C_InitChannel(handle, &mut config) };
        if status != FT_OK {
            unsafe { I2C_CloseChannel(handle) };
            return Err(status.into());
        }

        debug!(
            "opened FT232H channel {} ({} Hz) for device 0x{:02X}",
            channel_index, config.ClockRate, address
        );

        Ok(Self { handle, address })
    }

    fn device_write(&mut self, bytes: &[u8], options: DWORD) -> Result<(), BusError> {
        let mut transferred: DWORD = 0;
        let status = unsafe {
            I2C_DeviceWrite(
                self.handle,
                self.address,
                bytes.len() as DWORD,
                bytes.as_ptr(),
                &mut transferred,
                options,
            )
        };

        if status != FT_OK {
            return Err(status.into());
        }

        // With FAST_TRANSFER_BYTES the count is in bits, so only status is meaningful
        Ok(())
    }
}

impl BusTransport for Ft232hTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        self.device_write(
            bytes,
            I2C_TRANSFER_OPTIONS_START_BIT
                | I2C_TRANSFER_OPTIONS_STOP_BIT
                | I2C_TRANSFER_OPTIONS_FAST_TRANSFER_BYTES,
        )
    }

    fn write_then_read(&mut self, bytes: &[u8], read_len: usize) -> Result<Vec<u8>, BusError> {
        // No STOP after the command: the read follows with a repeated START
        self.device_write(
            bytes,
            I2C_TRANSFER_OPTIONS_START_BIT
                | I2C_TRANSFER_OPTIONS_BREAK_ON_NACK
                | I2C_TRANSFER_OPTIONS_FAST_TRANSFER_BYTES,
        )?;

        let mut data = vec![0u8; read_len];
        let mut transferred: DWORD = 0;

        let options = I2C_TRANSFER_OPTIONS_START_BIT
            | I2C_TRANSFER_OPTIONS_STOP_BIT
            | I2C_TRANSFER_OPTIONS_NACK_LAST_BYTE;

        let status = unsafe {
            I2C_DeviceRead(
                self.handle,
                self.address,
                read_len as DWORD,
                data.as_mut_ptr(),
                &mut transferred,
                options,
            )
        };

        if status != FT_OK {
            return Err(status.into());
        }

        if transferred as usize != read_len {
            return Err(BusError::TransferError {
                expected: read_len as u32,
                actual: transferred,
            });
        }

        Ok(data)
    }
}

impl Drop for Ft232hTransport {
    fn drop(&mut self) {
        unsafe {
            I2C_CloseChannel(self.handle);
        }
    }
}
