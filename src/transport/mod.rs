//! Byte-level bus access used by the driver
//!
//! The driver only needs two blocking primitives. Anything that can move
//! bytes to and from the sensor (an embedded-hal I2C bus, the FT232H bridge,
//! a test double) implements [`BusTransport`].

use embedded_hal::i2c::{Error as _, I2c};

use crate::error::BusError;

#[cfg(feature = "ft232h")]
pub mod ft232h;
pub mod mock;

/// Default 7-bit I2C address (A1 = A0 = 0)
pub const DEFAULT_ADDRESS: u8 = 0x0C;

/// Blocking write and write-then-read primitives
pub trait BusTransport {
    /// Send bytes to the device without reading anything back
    ///
    /// The MLX90393 answers every command with a status byte, so the driver
    /// itself always goes through [`write_then_read`](Self::write_then_read).
    /// This is kept for bus-level work that must not clock out a reply, such
    /// as probing an address before the driver takes over.
    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError>;

    /// Send bytes, then read exactly `read_len` bytes back
    fn write_then_read(&mut self, bytes: &[u8], read_len: usize) -> Result<Vec<u8>, BusError>;
}

impl<T: BusTransport + ?Sized> BusTransport for &mut T {
    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        (**self).write(bytes)
    }

    fn write_then_read(&mut self, bytes: &[u8], read_len: usize) -> Result<Vec<u8>, BusError> {
        (**self).write_then_read(bytes, read_len)
    }
}

/// Adapter for any `embedded_hal::i2c::I2c` bus
pub struct I2cTransport<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> I2cTransport<I2C> {
    /// Use the default address 0x0C
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Give the bus back
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c> BusTransport for I2cTransport<I2C> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        self.i2c
            .write(self.address, bytes)
            .map_err(|e| BusError::I2c(format!("{:?}", e.kind())))
    }

    fn write_then_read(&mut self, bytes: &[u8], read_len: usize) -> Result<Vec<u8>, BusError> {
        let mut buffer = vec![0u8; read_len];
        self.i2c
            .write_read(self.address, bytes, &mut buffer)
            .map_err(|e| BusError::I2c(format!("{:?}", e.kind())))?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};

    #[test]
    fn test_i2c_transport_write_then_read() {
        let expectations = [I2cTrans::write_read(
            DEFAULT_ADDRESS,
            vec![0x50, 0x08],
            vec![0x00, 0x12, 0x34],
        )];
        let mut transport = I2cTransport::new(I2cMock::new(&expectations));

        let data = transport.write_then_read(&[0x50, 0x08], 3).unwrap();
        assert_eq!(data, vec![0x00, 0x12, 0x34]);

        transport.release().done();
    }

    #[test]
    fn test_i2c_transport_write_uses_address() {
        let expectations = [I2cTrans::write(0x0F, vec![0x80])];
        let mut transport = I2cTransport::with_address(I2cMock::new(&expectations), 0x0F);

        transport.write(&[0x80]).unwrap();
        assert_eq!(transport.address(), 0x0F);

        transport.release().done();
    }

    #[test]
    fn test_i2c_transport_maps_errors() {
        let expectations =
            [I2cTrans::write(DEFAULT_ADDRESS, vec![0xF0]).with_error(ErrorKind::Other)];
        let mut transport = I2cTransport::new(I2cMock::new(&expectations));

        let err = transport.write(&[0xF0]).unwrap_err();
        assert_eq!(err, BusError::I2c("Other".into()));

        transport.release().done();
    }

    #[test]
    fn test_mutable_reference_is_a_transport() {
        let expectations = [I2cTrans::write_read(DEFAULT_ADDRESS, vec![0x80], vec![0x00])];
        let mut transport = I2cTransport::new(I2cMock::new(&expectations));

        fn exit<B: BusTransport>(mut bus: B) -> Vec<u8> {
            bus.write_then_read(&[0x80], 1).unwrap()
        }
        assert_eq!(exit(&mut transport), vec![0x00]);

        transport.release().done();
    }
}
