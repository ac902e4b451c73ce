//! MLX90393 command encoding and response decoding
//!
//! Every transaction with the chip is a command followed by a response whose
//! first byte is the status byte. This module is pure: it turns commands into
//! bytes and bytes into status/measurement values without touching the bus.

use bitflags::bitflags;

use crate::config::Config;
use crate::error::{Mlx90393Error, Result};
use crate::measurement::RawMeasurement;

// Command opcodes (high nibble, low nibble carries zyxt or is zero)
const CMD_START_BURST: u8 = 0x10;
const CMD_START_SINGLE: u8 = 0x30;
const CMD_READ_MEASUREMENT: u8 = 0x40;
const CMD_READ_REGISTER: u8 = 0x50;
const CMD_WRITE_REGISTER: u8 = 0x60;
const CMD_EXIT: u8 = 0x80;
const CMD_MEMORY_RECALL: u8 = 0xD0;
const CMD_MEMORY_STORE: u8 = 0xE0;
const CMD_RESET: u8 = 0xF0;

// Register addresses are 6 bits wide and sent shifted left by two
const REG_ADDRESS_MAX: u8 = 0x3F;
const REG_ADDRESS_SHIFT: u8 = 2;

/// Configuration register holding HALLCONF and GAIN_SEL
pub const REG_CONF1: u8 = 0x00;
/// Configuration register holding OSR, DIG_FILT and RES_XYZ
pub const REG_CONF3: u8 = 0x02;

// Status byte bits
const STATUS_BURST_MODE: u8 = 0x80;
const STATUS_WOC_MODE: u8 = 0x40;
const STATUS_SM_MODE: u8 = 0x20;
const STATUS_ERROR: u8 = 0x10;
const STATUS_SED: u8 = 0x08;
const STATUS_RESET: u8 = 0x04;
const STATUS_D_MASK: u8 = 0x03;

bitflags! {
    /// Axis selection, laid out as the `zyxt` nibble of measurement commands
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Axes: u8 {
        const T = 0b0001;
        const X = 0b0010;
        const Y = 0b0100;
        const Z = 0b1000;
        const XYZ = Self::X.bits() | Self::Y.bits() | Self::Z.bits();
        const ALL = Self::XYZ.bits() | Self::T.bits();
    }
}

impl Axes {
    /// Number of 16-bit words the chip returns for this selection
    pub fn word_count(self) -> usize {
        self.bits().count_ones() as usize
    }
}

/// A single magnetic axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl From<Axis> for Axes {
    fn from(axis: Axis) -> Self {
        match axis {
            Axis::X => Axes::X,
            Axis::Y => Axes::Y,
            Axis::Z => Axes::Z,
        }
    }
}

/// Commands understood by the MLX90393
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// SB: start continuous conversions on the selected axes
    StartBurst(Axes),
    /// SM: start one conversion on the selected axes
    StartSingle(Axes),
    /// RM: read the latest conversion result
    ReadMeasurement(Axes),
    /// RR: read a 16-bit register
    ReadRegister(u8),
    /// WR: write a 16-bit register
    WriteRegister(u8, u16),
    /// EX: leave burst/single/wake-on-change mode
    Exit,
    /// HR: copy non-volatile memory into the registers
    MemoryRecall,
    /// HS: copy the registers into non-volatile memory
    MemoryStore,
    /// RT: reset the chip
    Reset,
}

impl Command {
    /// Number of bytes the chip sends back, status byte included
    pub fn response_len(&self) -> usize {
        match self {
            Command::ReadMeasurement(axes) => 1 + 2 * axes.word_count(),
            Command::ReadRegister(_) => 3,
            _ => 1,
        }
    }
}

fn measurement_byte(opcode: u8, axes: Axes) -> Result<u8> {
    if axes.is_empty() {
        return Err(Mlx90393Error::InvalidParameter(
            "Measurement commands need at least one axis".to_string(),
        ));
    }
    Ok(opcode | axes.bits())
}

fn register_byte(address: u8) -> Result<u8> {
    if address > REG_ADDRESS_MAX {
        return Err(Mlx90393Error::InvalidParameter(format!(
            "Register address must be 0x00-0x3F, got 0x{:02X}",
            address
        )));
    }
    Ok(address << REG_ADDRESS_SHIFT)
}

/// Encode a command into the exact byte sequence sent on the bus
pub fn encode_command(command: &Command) -> Result<Vec<u8>> {
    let bytes = match *command {
        Command::StartBurst(axes) => vec![measurement_byte(CMD_START_BURST, axes)?],
        Command::StartSingle(axes) => vec![measurement_byte(CMD_START_SINGLE, axes)?],
        Command::ReadMeasurement(axes) => vec![measurement_byte(CMD_READ_MEASUREMENT, axes)?],
        Command::ReadRegister(address) => vec![CMD_READ_REGISTER, register_byte(address)?],
        Command::WriteRegister(address, value) => {
            let [high, low] = value.to_be_bytes();
            vec![CMD_WRITE_REGISTER, high, low, register_byte(address)?]
        }
        Command::Exit => vec![CMD_EXIT],
        Command::MemoryRecall => vec![CMD_MEMORY_RECALL],
        Command::MemoryStore => vec![CMD_MEMORY_STORE],
        Command::Reset => vec![CMD_RESET],
    };
    Ok(bytes)
}

/// Decoded status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status {
    /// Chip is in burst mode
    pub burst_mode: bool,
    /// Chip is in wake-on-change mode
    pub woc_mode: bool,
    /// A single measurement is running
    pub single_mode: bool,
    /// The last command failed; any data in the response is invalid
    pub error: bool,
    /// An ECC single-bit error was detected and corrected
    pub single_error_detected: bool,
    /// The chip has been reset since the last command
    pub reset: bool,
    /// Response-pending count (D1:D0)
    pub pending: u8,
    raw: u8,
}

impl Status {
    /// The undecoded byte, kept for diagnostics
    pub fn raw(&self) -> u8 {
        self.raw
    }

    /// True while the conversion started by a single-measurement command
    /// has not finished
    pub fn measurement_in_progress(&self) -> bool {
        self.single_mode
    }

    /// Data bytes the chip announced after the status byte
    pub fn data_len(&self) -> usize {
        2 * self.pending as usize + 2
    }
}

/// Unpack a status byte; every value decodes
pub fn decode_status(byte: u8) -> Status {
    Status {
        burst_mode: byte & STATUS_BURST_MODE != 0,
        woc_mode: byte & STATUS_WOC_MODE != 0,
        single_mode: byte & STATUS_SM_MODE != 0,
        error: byte & STATUS_ERROR != 0,
        single_error_detected: byte & STATUS_SED != 0,
        reset: byte & STATUS_RESET != 0,
        pending: byte & STATUS_D_MASK,
        raw: byte,
    }
}

/// Decode a read-measurement response
///
/// The chip sends the selected words in the fixed order T, X, Y, Z, each
/// big-endian. Magnetic words are interpreted according to the resolution
/// configured for their axis.
pub fn decode_measurement(response: &[u8], axes: Axes, config: &Config) -> Result<RawMeasurement> {
    let expected = 1 + 2 * axes.word_count();
    let Some(&status_byte) = response.first() else {
        return Err(Mlx90393Error::InvalidResponse { expected, actual: 0 });
    };

    let status = decode_status(status_byte);
    if status.error {
        return Err(Mlx90393Error::SensorError { status: status_byte });
    }

    if response.len() < expected {
        return Err(Mlx90393Error::InvalidResponse {
            expected,
            actual: response.len(),
        });
    }

    let mut words = response[1..expected]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));

    let mut raw = RawMeasurement {
        status,
        ..RawMeasurement::default()
    };

    if axes.contains(Axes::T) {
        raw.t = words.next();
    }
    if axes.contains(Axes::X) {
        raw.x = words.next().map(|w| config.resolution_x.normalize(w));
    }
    if axes.contains(Axes::Y) {
        raw.y = words.next().map(|w| config.resolution_y.normalize(w));
    }
    if axes.contains(Axes::Z) {
        raw.z = words.next().map(|w| config.resolution_z.normalize(w));
    }

    Ok(raw)
}

/// A bit field inside one of the 16-bit configuration registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub register: u8,
    pub shift: u8,
    pub width: u8,
}

impl Field {
    const fn mask(&self) -> u16 {
        ((1u16 << self.width) - 1) << self.shift
    }

    /// Read this field out of a register value
    pub fn extract(&self, register_value: u16) -> u8 {
        ((register_value & self.mask()) >> self.shift) as u8
    }

    /// Replace this field in a register value, leaving other bits alone
    pub fn insert(&self, register_value: u16, field_value: u8) -> u16 {
        (register_value & !self.mask()) | (((field_value as u16) << self.shift) & self.mask())
    }
}

pub const HALLCONF: Field = Field { register: REG_CONF1, shift: 0, width: 4 };
pub const GAIN_SEL: Field = Field { register: REG_CONF1, shift: 4, width: 3 };
pub const OSR: Field = Field { register: REG_CONF3, shift: 0, width: 2 };
pub const DIG_FILT: Field = Field { register: REG_CONF3, shift: 2, width: 3 };
pub const RES_X: Field = Field { register: REG_CONF3, shift: 5, width: 2 };
pub const RES_Y: Field = Field { register: REG_CONF3, shift: 7, width: 2 };
pub const RES_Z: Field = Field { register: REG_CONF3, shift: 9, width: 2 };

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Resolution;

    #[test]
    fn test_measurement_commands_pack_axes_into_low_nibble() {
        assert_eq!(encode_command(&Command::StartSingle(Axes::XYZ)).unwrap(), vec![0x3E]);
        assert_eq!(encode_command(&Command::StartBurst(Axes::ALL)).unwrap(), vec![0x1F]);
        assert_eq!(encode_command(&Command::ReadMeasurement(Axes::Z | Axes::T)).unwrap(), vec![0x49]);
    }

    #[test]
    fn test_empty_axes_rejected() {
        let err = encode_command(&Command::StartSingle(Axes::empty())).unwrap_err();
        assert!(matches!(err, Mlx90393Error::InvalidParameter(_)));
        assert!(encode_command(&Command::ReadMeasurement(Axes::empty())).is_err());
    }

    #[test]
    fn test_read_register_shifts_address() {
        assert_eq!(encode_command(&Command::ReadRegister(0x00)).unwrap(), vec![0x50, 0x00]);
        assert_eq!(encode_command(&Command::ReadRegister(0x02)).unwrap(), vec![0x50, 0x08]);
    }

    #[test]
    fn test_write_register_layout() {
        let bytes = encode_command(&Command::WriteRegister(0x02, 0x1234)).unwrap();
        assert_eq!(bytes, vec![0x60, 0x12, 0x34, 0x08]);
    }

    #[test]
    fn test_register_address_out_of_range() {
        assert!(encode_command(&Command::ReadRegister(0x40)).is_err());
        assert!(encode_command(&Command::WriteRegister(0xFF, 0)).is_err());
    }

    #[test]
    fn test_fixed_commands() {
        assert_eq!(encode_command(&Command::Exit).unwrap(), vec![0x80]);
        assert_eq!(encode_command(&Command::Reset).unwrap(), vec![0xF0]);
        assert_eq!(encode_command(&Command::MemoryRecall).unwrap(), vec![0xD0]);
        assert_eq!(encode_command(&Command::MemoryStore).unwrap(), vec![0xE0]);
    }

    #[test]
    fn test_response_len() {
        assert_eq!(Command::ReadMeasurement(Axes::ALL).response_len(), 9);
        assert_eq!(Command::ReadMeasurement(Axes::X).response_len(), 3);
        assert_eq!(Command::ReadRegister(0).response_len(), 3);
        assert_eq!(Command::Reset.response_len(), 1);
    }

    #[test]
    fn test_decode_status_error_only() {
        let status = decode_status(STATUS_ERROR);
        assert!(status.error);
        assert!(!status.burst_mode);
        assert!(!status.woc_mode);
        assert!(!status.single_mode);
        assert!(!status.single_error_detected);
        assert!(!status.reset);
        assert_eq!(status.pending, 0);
        assert_eq!(status.raw(), 0x10);
    }

    #[test]
    fn test_decode_status_all_bits() {
        let status = decode_status(0xFF);
        assert!(status.burst_mode && status.woc_mode && status.single_mode);
        assert!(status.error && status.single_error_detected && status.reset);
        assert_eq!(status.pending, 3);
        assert_eq!(status.data_len(), 8);
    }

    #[test]
    fn test_decode_status_reset_bit() {
        let status = decode_status(0b0000_0100);
        assert!(status.reset);
        assert!(!status.error);
    }

    #[test]
    fn test_decode_measurement_orders_t_x_y_z() {
        let config = Config::default();
        let response = [0x02, 0xB4, 0xA4, 0x03, 0xE8, 0xFC, 0x18, 0x00, 0x00];
        let raw = decode_measurement(&response, Axes::ALL, &config).unwrap();
        assert_eq!(raw.t, Some(46244));
        assert_eq!(raw.x, Some(1000));
        assert_eq!(raw.y, Some(-1000));
        assert_eq!(raw.z, Some(0));
    }

    #[test]
    fn test_decode_measurement_subset() {
        let config = Config::default();
        let raw = decode_measurement(&[0x00, 0xFF, 0xFE], Axes::Y, &config).unwrap();
        assert_eq!(raw.x, None);
        assert_eq!(raw.y, Some(-2));
        assert_eq!(raw.t, None);
    }

    #[test]
    fn test_decode_measurement_applies_resolution_offsets() {
        let config = Config {
            resolution_x: Resolution::Res18,
            resolution_y: Resolution::Res19,
            ..Config::default()
        };
        let response = [0x00, 0x80, 0x10, 0x40, 0x00];
        let raw = decode_measurement(&response, Axes::X | Axes::Y, &config).unwrap();
        assert_eq!(raw.x, Some(0x10));
        assert_eq!(raw.y, Some(0));
    }

    #[test]
    fn test_decode_measurement_error_status() {
        let config = Config::default();
        let err = decode_measurement(&[STATUS_ERROR, 0, 0], Axes::X, &config).unwrap_err();
        assert_eq!(err, Mlx90393Error::SensorError { status: 0x10 });
    }

    #[test]
    fn test_decode_measurement_short_payload() {
        let config = Config::default();
        let err = decode_measurement(&[0x00, 0x01], Axes::XYZ, &config).unwrap_err();
        assert_eq!(err, Mlx90393Error::InvalidResponse { expected: 7, actual: 2 });
        assert!(decode_measurement(&[], Axes::X, &config).is_err());
    }

    #[test]
    fn test_field_insert_preserves_other_bits() {
        let reg = 0xFFFF;
        let updated = GAIN_SEL.insert(reg, 0);
        assert_eq!(updated, 0xFF8F);
        assert_eq!(GAIN_SEL.extract(0x007C), 7);
        assert_eq!(HALLCONF.extract(0x007C), 0xC);
        assert_eq!(RES_Z.insert(0, 3), 0x0600);
        assert_eq!(RES_Y.extract(RES_Y.insert(0, 2)), 2);
    }
}
