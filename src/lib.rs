//! Driver library for the Melexis MLX90393 3-axis magnetometer
//!
//! The driver talks to the sensor through any [`BusTransport`]: an
//! `embedded-hal` I2C bus via [`I2cTransport`], or (with the `ft232h`
//! feature) an FTDI FT232H USB-to-I2C bridge via the libMPSSE library.
//!
//! # Quick Start
//!
//! ## Single Reading
//! ```no_run
//! use embedded_hal::i2c::I2c;
//! use ft232_mlx90393_interface::{Axes, I2cTransport, Mlx90393};
//!
//! fn read_field<I: I2c>(i2c: I) -> ft232_mlx90393_interface::Result<()> {
//!     let mut sensor = Mlx90393::new(I2cTransport::new(i2c))?;
//!     let reading = sensor.read_measurement(Axes::ALL)?;
//!
//!     if let Some((x, y, z)) = reading.xyz() {
//!         println!("B = ({:.1}, {:.1}, {:.1}) µT", x, y, z);
//!     }
//!     println!("T = {:?} °C", reading.temperature);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//! ```no_run
//! use ft232_mlx90393_interface::{ConfigOptions, Gain, Mlx90393, Oversampling, Resolution};
//! use ft232_mlx90393_interface::transport::mock::MockTransport;
//!
//! let mut sensor = Mlx90393::new(MockTransport::new())?;
//!
//! // Every change is written, read back and only then mirrored locally
//! sensor.configure(
//!     &ConfigOptions::new()
//!         .gain(Gain::X2_5)
//!         .resolution(Resolution::Res17)
//!         .oversampling(Oversampling::new(1)?),
//! )?;
//! println!("X scale: {} µT/LSB", sensor.config().scale_factor(ft232_mlx90393_interface::Axis::X));
//! # Ok::<(), ft232_mlx90393_interface::Mlx90393Error>(())
//! ```
//!
//! ## Burst Streaming
//! ```no_run
//! use ft232_mlx90393_interface::{Axes, Mlx90393, StreamControl};
//! use ft232_mlx90393_interface::transport::mock::MockTransport;
//!
//! let mut sensor = Mlx90393::new(MockTransport::new())?;
//! sensor.start_burst(Axes::XYZ)?;
//!
//! let mut count = 0;
//! sensor.stream(Axes::XYZ, 50, |reading| {
//!     println!("|B| = {:.2} µT", reading.magnitude().unwrap_or(0.0));
//!     count += 1;
//!     if count == 100 { StreamControl::Break } else { StreamControl::Continue }
//! })?;
//!
//! sensor.stop_burst()?;
//! # Ok::<(), ft232_mlx90393_interface::Mlx90393Error>(())
//! ```

pub mod codec;
pub mod common;
pub mod config;
pub mod error;
#[cfg(feature = "ft232h")]
mod ffi;
pub mod logging;
pub mod measurement;
pub mod mlx90393;
pub mod transport;

// Re-export public API
pub use codec::{decode_status, encode_command, Axes, Axis, Command, Status};
pub use common::{create_bar, format_reading, parse_address, parse_duration};
pub use config::{Config, ConfigOptions, DigitalFilter, Gain, HallConf, Oversampling, Resolution};
pub use error::{BusError, Mlx90393Error, Result};
pub use measurement::{convert, temperature_celsius, MagneticReading, RawMeasurement};
pub use mlx90393::{MeasurementState, Mlx90393, StreamControl};
#[cfg(feature = "ft232h")]
pub use transport::ft232h::Ft232hTransport;
pub use transport::{BusTransport, I2cTransport, DEFAULT_ADDRESS};
