//! In-memory MLX90393 stand-in for tests
//!
//! `MockTransport` answers the chip's command set from a register file and a
//! programmable measurement, records every transaction, and can be told to
//! fail a bus call or flag the next response as a chip error. A second
//! register file stands in for the non-volatile memory that reset and recall
//! load from.

use std::collections::{HashSet, VecDeque};

use crate::error::BusError;
use crate::transport::BusTransport;

/// Register 0x00 after reset: GAIN_SEL = 7, HALLCONF = 0xC
pub const POWER_ON_CONF1: u16 = 0x007C;

const REGISTER_COUNT: usize = 64;

/// Bus transaction, as recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Write(Vec<u8>),
    WriteRead { bytes: Vec<u8>, read_len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Single,
    Burst,
}

/// Emulated sensor behind a byte-level transport
#[derive(Debug)]
pub struct MockTransport {
    registers: [u16; REGISTER_COUNT],
    stored: [u16; REGISTER_COUNT],
    stuck_registers: HashSet<u8>,
    words: [u16; 4],
    mode: Mode,
    busy_reads: u32,
    busy_reads_remaining: u32,
    pending_reset: bool,
    error_next: bool,
    failures: VecDeque<BusError>,
    scheduled_failures: Vec<(u64, BusError)>,
    calls: u64,
    transactions: Vec<Transaction>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let mut registers = [0u16; REGISTER_COUNT];
        registers[0] = POWER_ON_CONF1;
        Self {
            registers,
            stored: registers,
            stuck_registers: HashSet::new(),
            words: [0; 4],
            mode: Mode::Idle,
            busy_reads: 0,
            busy_reads_remaining: 0,
            pending_reset: false,
            error_next: false,
            failures: VecDeque::new(),
            scheduled_failures: Vec::new(),
            calls: 0,
            transactions: Vec::new(),
        }
    }

    /// Words returned by the next measurement reads, in T, X, Y, Z order
    pub fn set_measurement(&mut self, t: u16, x: u16, y: u16, z: u16) {
        self.words = [t, x, y, z];
    }

    /// Number of read-measurement commands answered with the
    /// single-measurement bit still set after each start
    pub fn set_busy_reads(&mut self, count: u32) {
        self.busy_reads = count;
    }

    /// Set the error flag in the next response
    pub fn flag_error_next(&mut self) {
        self.error_next = true;
    }

    /// Fail the next bus call with `error`
    pub fn fail_next(&mut self, error: BusError) {
        self.failures.push_back(error);
    }

    /// Fail the `n`-th bus call from now (1 is the next call) with `error`
    pub fn fail_call(&mut self, n: u64, error: BusError) {
        self.scheduled_failures.push((self.calls + n, error));
    }

    /// Ignore writes to `address`, so readback no longer matches
    pub fn stick_register(&mut self, address: u8) {
        self.stuck_registers.insert(address);
    }

    pub fn register(&self, address: u8) -> u16 {
        self.registers[address as usize]
    }

    pub fn set_register(&mut self, address: u8, value: u16) {
        self.registers[address as usize] = value;
    }

    /// Value loaded into `address` by reset and memory recall
    pub fn set_stored_register(&mut self, address: u8, value: u16) {
        self.stored[address as usize] = value;
    }

    pub fn stored_register(&self, address: u8) -> u16 {
        self.stored[address as usize]
    }

    pub fn in_burst(&self) -> bool {
        self.mode == Mode::Burst
    }

    /// Transaction log
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn clear_transactions(&mut self) {
        self.transactions.clear();
    }

    fn take_failure(&mut self) -> Option<BusError> {
        self.calls += 1;
        let calls = self.calls;
        match self.scheduled_failures.iter().position(|(at, _)| *at == calls) {
            Some(index) => Some(self.scheduled_failures.remove(index).1),
            None => self.failures.pop_front(),
        }
    }

    fn mode_bits(&self) -> u8 {
        match self.mode {
            Mode::Idle => 0x00,
            Mode::Single => 0x20,
            Mode::Burst => 0x80,
        }
    }

    fn respond(&mut self, bytes: &[u8]) -> Vec<u8> {
        let Some(&command) = bytes.first() else {
            return vec![0x10];
        };
        let zyxt = command & 0x0F;
        let mut data = Vec::new();

        match command & 0xF0 {
            0x10 => self.mode = Mode::Burst,
            0x30 => {
                self.mode = Mode::Single;
                self.busy_reads_remaining = self.busy_reads;
            }
            0x40 => {
                if self.mode == Mode::Single {
                    if self.busy_reads_remaining > 0 {
                        self.busy_reads_remaining -= 1;
                    } else {
                        self.mode = Mode::Idle;
                    }
                }
                for (bit, word) in self.words.iter().enumerate() {
                    if zyxt & (1 << bit) != 0 {
                        data.extend_from_slice(&word.to_be_bytes());
                    }
                }
            }
            0x50 => {
                let address = bytes.get(1).copied().unwrap_or(0) >> 2;
                data.extend_from_slice(&self.registers[address as usize].to_be_bytes());
            }
            0x60 => {
                if let &[_, high, low, address] = bytes {
                    let address = address >> 2;
                    if !self.stuck_registers.contains(&address) {
                        self.registers[address as usize] = u16::from_be_bytes([high, low]);
                    }
                }
            }
            0x80 => self.mode = Mode::Idle,
            0xD0 => self.registers = self.stored,
            0xE0 => self.stored = self.registers,
            0xF0 => {
                self.mode = Mode::Idle;
                self.registers = self.stored;
                self.pending_reset = true;
            }
            _ => {}
        }

        let mut status = self.mode_bits();
        if std::mem::take(&mut self.pending_reset) {
            status |= 0x04;
        }
        if std::mem::take(&mut self.error_next) {
            status |= 0x10;
        }
        status |= ((data.len().saturating_sub(2) / 2) as u8) & 0x03;

        let mut response = vec![status];
        response.extend(data);
        response
    }
}

impl BusTransport for MockTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        self.transactions.push(Transaction::Write(bytes.to_vec()));
        self.respond(bytes);
        Ok(())
    }

    fn write_then_read(&mut self, bytes: &[u8], read_len: usize) -> Result<Vec<u8>, BusError> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        self.transactions.push(Transaction::WriteRead {
            bytes: bytes.to_vec(),
            read_len,
        });
        let mut response = self.respond(bytes);
        response.resize(read_len, 0);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_write_and_read() {
        let mut mock = MockTransport::new();
        mock.write_then_read(&[0x60, 0x12, 0x34, 0x08], 1).unwrap();
        let response = mock.write_then_read(&[0x50, 0x08], 3).unwrap();
        assert_eq!(response, vec![0x00, 0x12, 0x34]);
        assert_eq!(mock.register(0x02), 0x1234);
    }

    #[test]
    fn test_measurement_words_follow_axis_selection() {
        let mut mock = MockTransport::new();
        mock.set_measurement(0x1111, 0x2222, 0x3333, 0x4444);
        mock.write_then_read(&[0x3F], 1).unwrap();
        let response = mock.write_then_read(&[0x4A], 5).unwrap();
        assert_eq!(response, vec![0x01, 0x22, 0x22, 0x44, 0x44]);
    }

    #[test]
    fn test_busy_reads_keep_single_bit() {
        let mut mock = MockTransport::new();
        mock.set_busy_reads(1);
        assert_eq!(mock.write_then_read(&[0x32], 1).unwrap(), vec![0x20]);
        assert_eq!(mock.write_then_read(&[0x42], 3).unwrap()[0], 0x20);
        assert_eq!(mock.write_then_read(&[0x42], 3).unwrap()[0], 0x00);
    }

    #[test]
    fn test_reset_restores_power_on_registers() {
        let mut mock = MockTransport::new();
        mock.set_register(0x00, 0x0000);
        let response = mock.write_then_read(&[0xF0], 1).unwrap();
        assert_eq!(response, vec![0x04]);
        assert_eq!(mock.register(0x00), POWER_ON_CONF1);
    }

    #[test]
    fn test_store_and_recall_memory() {
        let mut mock = MockTransport::new();
        mock.set_register(0x02, 0x0123);
        mock.write_then_read(&[0xE0], 1).unwrap();
        assert_eq!(mock.stored_register(0x02), 0x0123);

        mock.set_register(0x02, 0x0000);
        mock.write_then_read(&[0xD0], 1).unwrap();
        assert_eq!(mock.register(0x02), 0x0123);

        mock.set_stored_register(0x00, 0x0044);
        mock.write_then_read(&[0xF0], 1).unwrap();
        assert_eq!(mock.register(0x00), 0x0044);
    }

    #[test]
    fn test_scheduled_failure_hits_the_right_call() {
        let mut mock = MockTransport::new();
        mock.fail_call(2, BusError::Other("second".into()));
        mock.write(&[0x80]).unwrap();
        assert_eq!(mock.write(&[0x80]), Err(BusError::Other("second".into())));
        mock.write(&[0x80]).unwrap();
    }

    #[test]
    fn test_failure_injection_and_log() {
        let mut mock = MockTransport::new();
        mock.fail_next(BusError::Other("unplugged".into()));
        assert!(mock.write(&[0x80]).is_err());
        mock.write(&[0x80]).unwrap();
        assert_eq!(mock.transactions(), &[Transaction::Write(vec![0x80])]);
    }

    #[test]
    fn test_error_flag_injection() {
        let mut mock = MockTransport::new();
        mock.flag_error_next();
        assert_eq!(mock.write_then_read(&[0x80], 1).unwrap(), vec![0x10]);
        assert_eq!(mock.write_then_read(&[0x80], 1).unwrap(), vec![0x00]);
    }
}
