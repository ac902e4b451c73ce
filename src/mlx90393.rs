//! MLX90393 magnetometer driver
//!
//! The driver owns the bus transport and a mirror of the measurement
//! configuration. Every configuration change is written to the chip and read
//! back before the mirror is updated, so conversions always use the scale
//! factors the chip is actually running with.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::codec::{
    decode_measurement, decode_status, encode_command, Axes, Axis, Command, Status, HALLCONF,
    REG_CONF1, REG_CONF3,
};
use crate::config::{Config, ConfigOptions, HallConf};
use crate::error::{Mlx90393Error, Result};
use crate::measurement::{convert, MagneticReading, RawMeasurement};
use crate::transport::BusTransport;

// Reset takes up to 1.5 ms before the chip accepts commands again
const RESET_SETTLE: Duration = Duration::from_millis(2);

// Polling rate limits for stream()
const STREAM_RATE_MIN_HZ: u32 = 1;
const STREAM_RATE_MAX_HZ: u32 = 100;

/// Control flow for streaming operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamControl {
    /// Continue streaming
    Continue,
    /// Stop streaming
    Break,
}

/// Measurement lifecycle as seen by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementState {
    /// No conversion running
    Idle,
    /// A single conversion was started on these axes
    Single(Axes),
    /// Burst mode is running on these axes
    Burst(Axes),
}

/// MLX90393 sensor interface
pub struct Mlx90393<T: BusTransport> {
    transport: T,
    config: Config,
    state: MeasurementState,
    last_status: Option<Status>,
}

impl<T: BusTransport> Mlx90393<T> {
    /// Reset the sensor and apply the default configuration
    ///
    /// # Returns
    /// * `Ok(Mlx90393)` - Initialized sensor
    /// * `Err(Mlx90393Error)` - If any command fails or a register does not
    ///   read back as written
    pub fn new(transport: T) -> Result<Self> {
        Self::with_config(transport, Config::default())
    }

    /// Reset the sensor and apply `config`
    pub fn with_config(transport: T, config: Config) -> Result<Self> {
        let mut sensor = Mlx90393 {
            transport,
            config: Config::default(),
            state: MeasurementState::Idle,
            last_status: None,
        };

        sensor.init(config)?;

        Ok(sensor)
    }

    fn init(&mut self, config: Config) -> Result<()> {
        // Leave whatever mode a previous session left running
        self.command(&Command::Exit)?;
        self.command(&Command::Reset)?;
        thread::sleep(RESET_SETTLE);

        self.config = self.read_config()?;
        self.write_config(config)
    }

    /// Current measurement configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current measurement lifecycle state
    pub fn state(&self) -> MeasurementState {
        self.state
    }

    /// Status byte of the most recent response
    pub fn last_status(&self) -> Option<Status> {
        self.last_status
    }

    /// Stop any running burst and give the transport back
    pub fn release(mut self) -> T {
        if let MeasurementState::Burst(_) = self.state {
            if let Err(e) = self.stop_burst() {
                warn!("failed to leave burst mode on release: {}", e);
            }
        }
        self.transport
    }

    /// Send a command and return the full response after checking its status
    fn transact(&mut self, command: &Command) -> Result<Vec<u8>> {
        let bytes = encode_command(command)?;
        let expected = command.response_len();

        trace!("tx {:02X?}", bytes);
        let response = self.transport.write_then_read(&bytes, expected)?;
        trace!("rx {:02X?}", response);

        let Some(&status_byte) = response.first() else {
            return Err(Mlx90393Error::InvalidResponse { expected, actual: 0 });
        };

        let status = decode_status(status_byte);
        self.last_status = Some(status);
        debug!("{:?} -> status 0x{:02X}", command, status_byte);

        if status.error {
            warn!("{:?} rejected by sensor (status 0x{:02X})", command, status_byte);
            return Err(Mlx90393Error::SensorError { status: status_byte });
        }

        if response.len() < expected {
            return Err(Mlx90393Error::InvalidResponse {
                expected,
                actual: response.len(),
            });
        }

        Ok(response)
    }

    fn command(&mut self, command: &Command) -> Result<Status> {
        let response = self.transact(command)?;
        Ok(decode_status(response[0]))
    }

    /// Read a 16-bit register
    pub fn read_register(&mut self, address: u8) -> Result<u16> {
        let response = self.transact(&Command::ReadRegister(address))?;
        Ok(u16::from_be_bytes([response[1], response[2]]))
    }

    /// Write a 16-bit register
    ///
    /// Writing one of the configuration registers (0x00 or 0x02) reloads the
    /// mirrored configuration from the chip, so later conversions use the
    /// scale factors the chip is running with.
    pub fn write_register(&mut self, address: u8, value: u16) -> Result<()> {
        self.command(&Command::WriteRegister(address, value))?;

        if address == REG_CONF1 || address == REG_CONF3 {
            self.config = self.read_config()?;
        }
        Ok(())
    }

    /// Write a register and read it back
    fn write_confirmed(&mut self, address: u8, value: u16) -> Result<()> {
        self.command(&Command::WriteRegister(address, value))?;

        let actual = self.read_register(address)?;
        if actual != value {
            warn!(
                "register 0x{:02X} reads 0x{:04X} after writing 0x{:04X}",
                address, actual, value
            );
            return Err(Mlx90393Error::RegisterMismatch {
                register: address,
                expected: value,
                actual,
            });
        }

        debug!("register 0x{:02X} = 0x{:04X}", address, value);
        Ok(())
    }

    /// Rebuild the configuration from the chip registers
    ///
    /// A HALLCONF value without a sensitivity table (anything but 0x0 and
    /// 0xC, e.g. loaded from non-volatile memory) is replaced on the chip by
    /// the default 0xC before the mirror is built.
    fn read_config(&mut self) -> Result<Config> {
        let mut conf1 = self.read_register(REG_CONF1)?;
        let conf3 = self.read_register(REG_CONF3)?;

        let hall_conf = HALLCONF.extract(conf1);
        if HallConf::try_from(hall_conf).is_err() {
            let fallback = HallConf::default().bits();
            warn!(
                "unsupported HALLCONF 0x{:X} on chip, switching to 0x{:X}",
                hall_conf, fallback
            );
            conf1 = HALLCONF.insert(conf1, fallback);
            self.write_confirmed(REG_CONF1, conf1)?;
        }

        Config::from_registers(conf1, conf3)
    }

    /// Write the registers whose fields differ, then adopt `candidate`
    ///
    /// The mirror only takes a register's fields once that register has been
    /// confirmed.
    fn write_config(&mut self, candidate: Config) -> Result<()> {
        let current = self.config;

        if candidate.gain != current.gain || candidate.hall_conf != current.hall_conf {
            let register = self.read_register(REG_CONF1)?;
            self.write_confirmed(REG_CONF1, candidate.conf1_value(register))?;
            // Register 0x00 is live now even if 0x02 fails below
            self.config.gain = candidate.gain;
            self.config.hall_conf = candidate.hall_conf;
        }

        if candidate.oversampling != current.oversampling
            || candidate.digital_filter != current.digital_filter
            || candidate.resolution_x != current.resolution_x
            || candidate.resolution_y != current.resolution_y
            || candidate.resolution_z != current.resolution_z
        {
            let register = self.read_register(REG_CONF3)?;
            self.write_confirmed(REG_CONF3, candidate.conf3_value(register))?;
        }

        self.config = candidate;
        Ok(())
    }

    /// Validate a change on a copy, write it through, then commit
    fn update_config<F>(&mut self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Config) -> Result<()>,
    {
        let mut candidate = self.config;
        change(&mut candidate)?;

        if self.state != MeasurementState::Idle {
            return Err(Mlx90393Error::InvalidState(
                "configuration can only change while no measurement is running",
            ));
        }

        self.write_config(candidate)
    }

    /// Set the analog gain (GAIN_SEL 0-7, 0 = 5x ... 7 = 1x)
    pub fn set_gain(&mut self, level: u8) -> Result<()> {
        self.update_config(|config| config.set_gain(level))
    }

    /// Set the output resolution of one axis (0-3)
    pub fn set_resolution(&mut self, axis: Axis, level: u8) -> Result<()> {
        self.update_config(|config| config.set_resolution(axis, level))
    }

    /// Set the oversampling ratio (0-3)
    pub fn set_oversampling(&mut self, level: u8) -> Result<()> {
        self.update_config(|config| config.set_oversampling(level))
    }

    /// Set the digital filter (0-7)
    pub fn set_filter(&mut self, level: u8) -> Result<()> {
        self.update_config(|config| config.set_filter(level))
    }

    /// Set the hall plate configuration (0x0 or 0xC)
    pub fn set_hall_conf(&mut self, value: u8) -> Result<()> {
        self.update_config(|config| config.set_hall_conf(value))
    }

    /// Apply several settings at once
    ///
    /// # Example
    /// ```no_run
    /// use ft232_mlx90393_interface::{ConfigOptions, Gain, Mlx90393, Oversampling, Resolution};
    /// use ft232_mlx90393_interface::transport::mock::MockTransport;
    ///
    /// let mut sensor = Mlx90393::new(MockTransport::new())?;
    /// sensor.configure(
    ///     &ConfigOptions::new()
    ///         .gain(Gain::X2_5)
    ///         .resolution(Resolution::Res17)
    ///         .oversampling(Oversampling::new(2)?),
    /// )?;
    /// # Ok::<(), ft232_mlx90393_interface::Mlx90393Error>(())
    /// ```
    pub fn configure(&mut self, options: &ConfigOptions) -> Result<()> {
        self.update_config(|config| {
            config.apply(options);
            Ok(())
        })
    }

    /// Start one conversion on `axes`
    pub fn start_measurement(&mut self, axes: Axes) -> Result<()> {
        if self.state != MeasurementState::Idle {
            return Err(Mlx90393Error::InvalidState(
                "a measurement is already running",
            ));
        }

        self.command(&Command::StartSingle(axes))?;
        self.state = MeasurementState::Single(axes);
        Ok(())
    }

    /// Start continuous conversions on `axes`
    pub fn start_burst(&mut self, axes: Axes) -> Result<()> {
        if self.state != MeasurementState::Idle {
            return Err(Mlx90393Error::InvalidState(
                "a measurement is already running",
            ));
        }

        self.command(&Command::StartBurst(axes))?;
        self.state = MeasurementState::Burst(axes);
        Ok(())
    }

    /// Leave burst mode (or abandon a pending single conversion)
    ///
    /// Does nothing when idle. The driver is idle afterwards even if the
    /// exit command itself fails.
    pub fn stop_burst(&mut self) -> Result<()> {
        if self.state == MeasurementState::Idle {
            return Ok(());
        }

        self.state = MeasurementState::Idle;
        self.command(&Command::Exit)?;
        Ok(())
    }

    /// Read the result of the running measurement without converting it
    ///
    /// If the chip is still converting, the returned status has
    /// `measurement_in_progress()` set, the counts are stale and the driver
    /// stays in the single-measurement state so the read can be repeated.
    pub fn read_raw(&mut self) -> Result<RawMeasurement> {
        let axes = match self.state {
            MeasurementState::Idle => {
                return Err(Mlx90393Error::InvalidState("no measurement started"))
            }
            MeasurementState::Single(axes) | MeasurementState::Burst(axes) => axes,
        };

        let response = match self.transact(&Command::ReadMeasurement(axes)) {
            Ok(response) => response,
            Err(e @ Mlx90393Error::SensorError { .. }) => {
                if let MeasurementState::Single(_) = self.state {
                    self.state = MeasurementState::Idle;
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let raw = decode_measurement(&response, axes, &self.config)?;

        if let MeasurementState::Single(_) = self.state {
            if !raw.status.measurement_in_progress() {
                self.state = MeasurementState::Idle;
            }
        }

        Ok(raw)
    }

    /// Measure `axes` and return the result in µT and °C
    ///
    /// When idle this starts a single conversion, waits the conversion time
    /// for the current configuration and reads the result. When a burst or
    /// single measurement covering `axes` is already running, its latest
    /// result is read instead.
    pub fn read_measurement(&mut self, axes: Axes) -> Result<MagneticReading> {
        if axes.is_empty() {
            return Err(Mlx90393Error::InvalidParameter(
                "at least one axis must be selected".into(),
            ));
        }

        match self.state {
            MeasurementState::Idle => {
                self.start_measurement(axes)?;
                thread::sleep(self.config.conversion_time(axes));
            }
            MeasurementState::Single(active) | MeasurementState::Burst(active) => {
                if !active.contains(axes) {
                    return Err(Mlx90393Error::InvalidState(
                        "running measurement does not cover the requested axes",
                    ));
                }
            }
        }

        let raw = self.read_raw()?;
        if raw.status.measurement_in_progress() {
            return Err(Mlx90393Error::NotReady {
                status: raw.status.raw(),
            });
        }

        // A running measurement may cover more axes than were asked for
        Ok(convert(&raw, &self.config).select(axes))
    }

    /// Reset the chip and reload the configuration from its registers
    pub fn reset(&mut self) -> Result<()> {
        self.state = MeasurementState::Idle;
        self.command(&Command::Reset)?;
        thread::sleep(RESET_SETTLE);
        self.config = self.read_config()?;
        Ok(())
    }

    /// Copy the current registers into the chip's non-volatile memory
    pub fn memory_store(&mut self) -> Result<()> {
        if self.state != MeasurementState::Idle {
            return Err(Mlx90393Error::InvalidState(
                "memory can only be stored while idle",
            ));
        }
        self.command(&Command::MemoryStore)?;
        Ok(())
    }

    /// Reload the registers from non-volatile memory
    pub fn memory_recall(&mut self) -> Result<()> {
        if self.state != MeasurementState::Idle {
            return Err(Mlx90393Error::InvalidState(
                "memory can only be recalled while idle",
            ));
        }
        self.command(&Command::MemoryRecall)?;
        self.config = self.read_config()?;
        Ok(())
    }

    /// Stream readings at a specified rate with a callback function
    ///
    /// # Arguments
    /// * `axes` - Axes to measure on every sample
    /// * `rate_hz` - Target sample rate in Hz (1-100). The actual rate is
    ///   lower when the conversion time exceeds the sample interval.
    /// * `callback` - Function called for each sample. Return
    ///   `StreamControl::Break` to stop.
    ///
    /// # Returns
    /// * `Ok(u64)` - Number of samples delivered before stopping
    ///
    /// # Example
    /// ```no_run
    /// use ft232_mlx90393_interface::{Axes, Mlx90393, StreamControl};
    /// use ft232_mlx90393_interface::transport::mock::MockTransport;
    ///
    /// let mut sensor = Mlx90393::new(MockTransport::new())?;
    /// let mut peak = 0.0f32;
    ///
    /// sensor.stream(Axes::XYZ, 20, |reading| {
    ///     peak = peak.max(reading.magnitude().unwrap_or(0.0));
    ///     if peak > 100.0 { StreamControl::Break } else { StreamControl::Continue }
    /// })?;
    /// # Ok::<(), ft232_mlx90393_interface::Mlx90393Error>(())
    /// ```
    pub fn stream<F>(&mut self, axes: Axes, rate_hz: u32, mut callback: F) -> Result<u64>
    where
        F: FnMut(MagneticReading) -> StreamControl,
    {
        check_stream_rate(rate_hz)?;

        let interval = Duration::from_micros(1_000_000 / rate_hz as u64);
        let mut sample_count = 0u64;
        let mut next_sample_time = Instant::now();

        loop {
            let reading = self.read_measurement(axes)?;
            sample_count += 1;

            if callback(reading) == StreamControl::Break {
                break;
            }

            next_sample_time += interval;
            let now = Instant::now();
            if next_sample_time > now {
                thread::sleep(next_sample_time - now);
            }
        }

        Ok(sample_count)
    }

    /// Start burst mode on `axes`, stream from it, then leave burst mode
    ///
    /// Burst mode is left even when streaming fails. A streaming error is
    /// reported in preference to a failure of the exit command.
    pub fn stream_burst<F>(&mut self, axes: Axes, rate_hz: u32, callback: F) -> Result<u64>
    where
        F: FnMut(MagneticReading) -> StreamControl,
    {
        check_stream_rate(rate_hz)?;
        self.start_burst(axes)?;

        let streamed = self.stream(axes, rate_hz, callback);
        let stopped = self.stop_burst();

        let samples = streamed?;
        stopped?;
        Ok(samples)
    }

    /// Collect a specified number of readings at a given rate
    pub fn collect_samples(
        &mut self,
        axes: Axes,
        rate_hz: u32,
        num_samples: usize,
    ) -> Result<Vec<MagneticReading>> {
        let mut samples = Vec::with_capacity(num_samples);
        if num_samples == 0 {
            return Ok(samples);
        }

        self.stream(axes, rate_hz, |reading| {
            samples.push(reading);
            if samples.len() >= num_samples {
                StreamControl::Break
            } else {
                StreamControl::Continue
            }
        })?;

        Ok(samples)
    }
}

fn check_stream_rate(rate_hz: u32) -> Result<()> {
    if !(STREAM_RATE_MIN_HZ..=STREAM_RATE_MAX_HZ).contains(&rate_hz) {
        return Err(Mlx90393Error::InvalidParameter(format!(
            "Sample rate must be between 1-100 Hz, got {}",
            rate_hz
        )));
    }
    Ok(())
}
