//! Raw and converted measurement types

use crate::codec::{Axes, Axis, Status};
use crate::config::{Config, TEMP_LSB_PER_C, TEMP_OFFSET, TEMP_REF_C};

/// Counts returned by one read-measurement command
///
/// Only the axes that were requested are `Some`. Magnetic counts are already
/// signed according to the resolution the chip was configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawMeasurement {
    pub status: Status,
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub z: Option<i32>,
    pub t: Option<u16>,
}

/// Magnetic field in µT and die temperature in °C
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MagneticReading {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
    pub temperature: Option<f32>,
}

impl MagneticReading {
    /// All three field components, if they were measured
    pub fn xyz(&self) -> Option<(f32, f32, f32)> {
        Some((self.x?, self.y?, self.z?))
    }

    /// Total field strength in µT
    pub fn magnitude(&self) -> Option<f32> {
        let (x, y, z) = self.xyz()?;
        Some((x * x + y * y + z * z).sqrt())
    }

    /// Drop every component outside `axes`
    pub fn select(self, axes: Axes) -> Self {
        let keep = |value: Option<f32>, axis: Axes| value.filter(|_| axes.contains(axis));
        Self {
            x: keep(self.x, Axes::X),
            y: keep(self.y, Axes::Y),
            z: keep(self.z, Axes::Z),
            temperature: keep(self.temperature, Axes::T),
        }
    }
}

/// Convert a temperature count to °C
pub fn temperature_celsius(raw: u16) -> f32 {
    (raw as f32 - TEMP_OFFSET as f32) / TEMP_LSB_PER_C + TEMP_REF_C
}

/// Scale raw counts with the configuration they were measured under
pub fn convert(raw: &RawMeasurement, config: &Config) -> MagneticReading {
    let scale = |count: Option<i32>, axis: Axis| count.map(|c| c as f32 * config.scale_factor(axis));

    MagneticReading {
        x: scale(raw.x, Axis::X),
        y: scale(raw.y, Axis::Y),
        z: scale(raw.z, Axis::Z),
        temperature: raw.t.map(temperature_celsius),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Gain, Resolution};

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_convert_default_config() {
        let raw = RawMeasurement {
            x: Some(1000),
            y: Some(-1000),
            z: Some(0),
            ..RawMeasurement::default()
        };
        let reading = convert(&raw, &Config::default());

        // Gain 1x, 16-bit: 0.150 µT/LSB on X/Y
        assert!(approx(reading.x.unwrap(), 150.0));
        assert!(approx(reading.y.unwrap(), -150.0));
        assert_eq!(reading.z, Some(0.0));
        assert_eq!(reading.temperature, None);
    }

    #[test]
    fn test_convert_uses_z_table() {
        let config = Config {
            gain: Gain::X5,
            resolution_z: Resolution::Res17,
            ..Config::default()
        };
        let raw = RawMeasurement {
            z: Some(-100),
            ..RawMeasurement::default()
        };
        let reading = convert(&raw, &config);
        assert!(approx(reading.z.unwrap(), -242.0));
        assert_eq!(reading.x, None);
    }

    #[test]
    fn test_temperature_reference_point() {
        assert!(approx(temperature_celsius(TEMP_OFFSET), 35.0));
        assert!(approx(temperature_celsius(TEMP_OFFSET + 452), 45.0));
        assert!(approx(temperature_celsius(TEMP_OFFSET - 452), 25.0));
    }

    #[test]
    fn test_magnitude() {
        let reading = MagneticReading {
            x: Some(3.0),
            y: Some(4.0),
            z: Some(12.0),
            temperature: None,
        };
        assert!(approx(reading.magnitude().unwrap(), 13.0));

        let partial = MagneticReading {
            x: Some(1.0),
            ..MagneticReading::default()
        };
        assert_eq!(partial.magnitude(), None);
    }

    #[test]
    fn test_select_keeps_requested_axes() {
        let reading = MagneticReading {
            x: Some(1.0),
            y: Some(2.0),
            z: Some(3.0),
            temperature: Some(25.0),
        };

        let only_x = reading.select(Axes::X);
        assert_eq!(only_x.x, Some(1.0));
        assert_eq!((only_x.y, only_x.z, only_x.temperature), (None, None, None));

        assert_eq!(reading.select(Axes::ALL), reading);
        assert_eq!(reading.select(Axes::XYZ).temperature, None);
    }
}
