//! Sensor configuration: gain, resolution, oversampling, digital filter
//!
//! `Config` mirrors the measurement-related fields of registers 0x00 and 0x02.
//! It also owns the manufacturer sensitivity table, so the scale factor used
//! for a reading always comes from the same value that was written to the chip.

use std::time::Duration;

use crate::codec::{
    Axes, Axis, DIG_FILT, GAIN_SEL, HALLCONF, OSR, RES_X, RES_Y, RES_Z,
};
use crate::error::{Mlx90393Error, Result};

// Temperature transfer function: T = TEMP_REF_C + (raw - TEMP_OFFSET) / TEMP_LSB_PER_C
pub const TEMP_OFFSET: u16 = 46244;
pub const TEMP_LSB_PER_C: f32 = 45.2;
pub const TEMP_REF_C: f32 = 35.0;

// Conversion timing (microseconds)
const TCONV_BASE_US: u64 = 67;
const TCONV_MAG_STEP_US: u64 = 64;
const TCONV_TEMP_STEP_US: u64 = 192;
const STARTUP_US: u64 = 600;

/// Sensitivity in µT/LSB, indexed `[hall_conf][resolution][gain]` for X/Y
const SENSITIVITY_XY: [[[f32; 8]; 4]; 2] = [
    [
        [0.751, 0.601, 0.451, 0.376, 0.300, 0.250, 0.200, 0.150],
        [1.502, 1.202, 0.901, 0.751, 0.601, 0.501, 0.401, 0.300],
        [3.004, 2.403, 1.803, 1.502, 1.202, 1.001, 0.801, 0.601],
        [6.009, 4.840, 3.605, 3.004, 2.403, 2.003, 1.602, 1.202],
    ],
    [
        [0.787, 0.629, 0.472, 0.393, 0.315, 0.262, 0.210, 0.157],
        [1.573, 1.258, 0.944, 0.787, 0.629, 0.524, 0.419, 0.315],
        [3.146, 2.517, 1.888, 1.573, 1.258, 1.049, 0.839, 0.629],
        [6.292, 5.034, 3.775, 3.146, 2.517, 2.097, 1.678, 1.258],
    ],
];

/// Sensitivity in µT/LSB, indexed `[hall_conf][resolution][gain]` for Z
const SENSITIVITY_Z: [[[f32; 8]; 4]; 2] = [
    [
        [1.210, 0.968, 0.726, 0.605, 0.484, 0.403, 0.323, 0.242],
        [2.420, 1.936, 1.452, 1.210, 0.968, 0.807, 0.645, 0.484],
        [4.840, 3.872, 2.904, 2.420, 1.936, 1.613, 1.291, 0.968],
        [9.680, 7.744, 5.808, 4.840, 3.872, 3.227, 2.581, 1.936],
    ],
    [
        [1.267, 1.014, 0.760, 0.634, 0.507, 0.422, 0.338, 0.253],
        [2.534, 2.027, 1.521, 1.267, 1.014, 0.845, 0.676, 0.507],
        [5.068, 4.055, 3.041, 2.534, 2.027, 1.689, 1.352, 1.014],
        [10.137, 8.109, 6.082, 5.068, 4.055, 3.379, 2.703, 2.027],
    ],
];

/// Analog gain (GAIN_SEL)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gain {
    X5 = 0,
    X4 = 1,
    X3 = 2,
    X2_5 = 3,
    X2 = 4,
    X1_67 = 5,
    X1_33 = 6,
    #[default]
    X1 = 7,
}

impl Gain {
    pub const ALL: [Gain; 8] = [
        Gain::X5,
        Gain::X4,
        Gain::X3,
        Gain::X2_5,
        Gain::X2,
        Gain::X1_67,
        Gain::X1_33,
        Gain::X1,
    ];

    pub fn bits(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Gain {
    type Error = Mlx90393Error;

    fn try_from(value: u8) -> Result<Self> {
        Gain::ALL.get(value as usize).copied().ok_or_else(|| {
            Mlx90393Error::InvalidParameter(format!("Gain must be 0-7, got {}", value))
        })
    }
}

/// Output resolution of one axis (RES_X/RES_Y/RES_Z)
///
/// The chip keeps 19 bits internally and selects which 16 of them are
/// output. Settings 0 and 1 produce two's complement words, 2 and 3 produce
/// unsigned words with a fixed mid-scale offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    #[default]
    Res16 = 0,
    Res17 = 1,
    Res18 = 2,
    Res19 = 3,
}

impl Resolution {
    pub const ALL: [Resolution; 4] = [
        Resolution::Res16,
        Resolution::Res17,
        Resolution::Res18,
        Resolution::Res19,
    ];

    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Turn an output word into a signed count
    pub fn normalize(self, word: u16) -> i32 {
        match self {
            Resolution::Res16 | Resolution::Res17 => word as i16 as i32,
            Resolution::Res18 => word as i32 - 0x8000,
            Resolution::Res19 => word as i32 - 0x4000,
        }
    }
}

impl TryFrom<u8> for Resolution {
    type Error = Mlx90393Error;

    fn try_from(value: u8) -> Result<Self> {
        Resolution::ALL.get(value as usize).copied().ok_or_else(|| {
            Mlx90393Error::InvalidParameter(format!("Resolution must be 0-3, got {}", value))
        })
    }
}

/// Magnetic oversampling ratio (OSR), 0-3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Oversampling(u8);

impl Oversampling {
    pub const MAX: u8 = 3;

    pub fn new(value: u8) -> Result<Self> {
        if value > Self::MAX {
            return Err(Mlx90393Error::InvalidParameter(format!(
                "Oversampling must be 0-3, got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

/// Digital filter setting (DIG_FILT), 0-7
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DigitalFilter(u8);

impl DigitalFilter {
    pub const MAX: u8 = 7;

    pub fn new(value: u8) -> Result<Self> {
        if value > Self::MAX {
            return Err(Mlx90393Error::InvalidParameter(format!(
                "Digital filter must be 0-7, got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

/// Hall plate spinning configuration (HALLCONF)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HallConf {
    /// 0xC, power-on default
    #[default]
    Conf0C,
    /// 0x0, shorter conversion with slightly lower sensitivity
    Conf00,
}

impl HallConf {
    pub fn bits(self) -> u8 {
        match self {
            HallConf::Conf0C => 0x0C,
            HallConf::Conf00 => 0x00,
        }
    }

    fn table_index(self) -> usize {
        match self {
            HallConf::Conf0C => 0,
            HallConf::Conf00 => 1,
        }
    }
}

impl TryFrom<u8> for HallConf {
    type Error = Mlx90393Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x0C => Ok(HallConf::Conf0C),
            0x00 => Ok(HallConf::Conf00),
            other => Err(Mlx90393Error::InvalidParameter(format!(
                "Hall configuration must be 0x0 or 0xC, got 0x{:X}",
                other
            ))),
        }
    }
}

/// Measurement configuration mirrored from the chip registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    pub gain: Gain,
    pub resolution_x: Resolution,
    pub resolution_y: Resolution,
    pub resolution_z: Resolution,
    pub oversampling: Oversampling,
    pub digital_filter: DigitalFilter,
    pub hall_conf: HallConf,
}

impl Config {
    pub fn resolution(&self, axis: Axis) -> Resolution {
        match axis {
            Axis::X => self.resolution_x,
            Axis::Y => self.resolution_y,
            Axis::Z => self.resolution_z,
        }
    }

    pub fn set_gain(&mut self, level: u8) -> Result<()> {
        self.gain = Gain::try_from(level)?;
        Ok(())
    }

    pub fn set_resolution(&mut self, axis: Axis, level: u8) -> Result<()> {
        let resolution = Resolution::try_from(level)?;
        match axis {
            Axis::X => self.resolution_x = resolution,
            Axis::Y => self.resolution_y = resolution,
            Axis::Z => self.resolution_z = resolution,
        }
        Ok(())
    }

    pub fn set_oversampling(&mut self, level: u8) -> Result<()> {
        self.oversampling = Oversampling::new(level)?;
        Ok(())
    }

    pub fn set_filter(&mut self, level: u8) -> Result<()> {
        self.digital_filter = DigitalFilter::new(level)?;
        Ok(())
    }

    pub fn set_hall_conf(&mut self, value: u8) -> Result<()> {
        self.hall_conf = HallConf::try_from(value)?;
        Ok(())
    }

    /// Apply every option that is set
    pub fn apply(&mut self, options: &ConfigOptions) {
        if let Some(gain) = options.gain {
            self.gain = gain;
        }
        if let Some(res) = options.resolution_x {
            self.resolution_x = res;
        }
        if let Some(res) = options.resolution_y {
            self.resolution_y = res;
        }
        if let Some(res) = options.resolution_z {
            self.resolution_z = res;
        }
        if let Some(osr) = options.oversampling {
            self.oversampling = osr;
        }
        if let Some(filter) = options.digital_filter {
            self.digital_filter = filter;
        }
        if let Some(hall_conf) = options.hall_conf {
            self.hall_conf = hall_conf;
        }
    }

    /// µT per LSB for an axis under the current gain and resolution
    pub fn scale_factor(&self, axis: Axis) -> f32 {
        let table = match axis {
            Axis::X | Axis::Y => &SENSITIVITY_XY,
            Axis::Z => &SENSITIVITY_Z,
        };
        table[self.hall_conf.table_index()][self.resolution(axis).bits() as usize]
            [self.gain.bits() as usize]
    }

    /// Time the chip needs to convert the selected axes
    pub fn conversion_time(&self, axes: Axes) -> Duration {
        let osr = 1u64 << self.oversampling.bits();
        let filter = 1u64 << self.digital_filter.bits();
        let per_axis = TCONV_BASE_US + TCONV_MAG_STEP_US * osr * (2 + filter);

        let magnetic_axes = (axes & Axes::XYZ).word_count() as u64;
        let mut total = STARTUP_US + magnetic_axes * per_axis;
        if axes.contains(Axes::T) {
            total += TCONV_BASE_US + TCONV_TEMP_STEP_US;
        }

        Duration::from_micros(total)
    }

    /// Merge the gain and hall configuration into a register 0x00 value
    pub fn conf1_value(&self, current: u16) -> u16 {
        let value = GAIN_SEL.insert(current, self.gain.bits());
        HALLCONF.insert(value, self.hall_conf.bits())
    }

    /// Merge OSR, filter and resolutions into a register 0x02 value
    pub fn conf3_value(&self, current: u16) -> u16 {
        let mut value = OSR.insert(current, self.oversampling.bits());
        value = DIG_FILT.insert(value, self.digital_filter.bits());
        value = RES_X.insert(value, self.resolution_x.bits());
        value = RES_Y.insert(value, self.resolution_y.bits());
        RES_Z.insert(value, self.resolution_z.bits())
    }

    /// Rebuild a configuration from raw register 0x00 and 0x02 values
    pub fn from_registers(conf1: u16, conf3: u16) -> Result<Self> {
        Ok(Self {
            gain: Gain::try_from(GAIN_SEL.extract(conf1))?,
            hall_conf: HallConf::try_from(HALLCONF.extract(conf1))?,
            oversampling: Oversampling::new(OSR.extract(conf3))?,
            digital_filter: DigitalFilter::new(DIG_FILT.extract(conf3))?,
            resolution_x: Resolution::try_from(RES_X.extract(conf3))?,
            resolution_y: Resolution::try_from(RES_Y.extract(conf3))?,
            resolution_z: Resolution::try_from(RES_Z.extract(conf3))?,
        })
    }
}

/// A set of optional configuration changes applied in one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfigOptions {
    pub gain: Option<Gain>,
    pub resolution_x: Option<Resolution>,
    pub resolution_y: Option<Resolution>,
    pub resolution_z: Option<Resolution>,
    pub oversampling: Option<Oversampling>,
    pub digital_filter: Option<DigitalFilter>,
    pub hall_conf: Option<HallConf>,
}

impl ConfigOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gain(mut self, gain: Gain) -> Self {
        self.gain = Some(gain);
        self
    }

    /// Same resolution on all three axes
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution_x = Some(resolution);
        self.resolution_y = Some(resolution);
        self.resolution_z = Some(resolution);
        self
    }

    pub fn resolution_x(mut self, resolution: Resolution) -> Self {
        self.resolution_x = Some(resolution);
        self
    }

    pub fn resolution_y(mut self, resolution: Resolution) -> Self {
        self.resolution_y = Some(resolution);
        self
    }

    pub fn resolution_z(mut self, resolution: Resolution) -> Self {
        self.resolution_z = Some(resolution);
        self
    }

    pub fn oversampling(mut self, oversampling: Oversampling) -> Self {
        self.oversampling = Some(oversampling);
        self
    }

    pub fn digital_filter(mut self, filter: DigitalFilter) -> Self {
        self.digital_filter = Some(filter);
        self
    }

    pub fn hall_conf(mut self, hall_conf: HallConf) -> Self {
        self.hall_conf = Some(hall_conf);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XY_HALLCONF_C: [[f32; 8]; 4] = [
        [0.751, 0.601, 0.451, 0.376, 0.300, 0.250, 0.200, 0.150],
        [1.502, 1.202, 0.901, 0.751, 0.601, 0.501, 0.401, 0.300],
        [3.004, 2.403, 1.803, 1.502, 1.202, 1.001, 0.801, 0.601],
        [6.009, 4.840, 3.605, 3.004, 2.403, 2.003, 1.602, 1.202],
    ];

    const Z_HALLCONF_C: [[f32; 8]; 4] = [
        [1.210, 0.968, 0.726, 0.605, 0.484, 0.403, 0.323, 0.242],
        [2.420, 1.936, 1.452, 1.210, 0.968, 0.807, 0.645, 0.484],
        [4.840, 3.872, 2.904, 2.420, 1.936, 1.613, 1.291, 0.968],
        [9.680, 7.744, 5.808, 4.840, 3.872, 3.227, 2.581, 1.936],
    ];

    #[test]
    fn test_scale_factor_matches_table_for_every_pair() {
        for gain in Gain::ALL {
            for res in Resolution::ALL {
                let config = Config {
                    gain,
                    resolution_x: res,
                    resolution_y: res,
                    resolution_z: res,
                    ..Config::default()
                };
                let g = gain.bits() as usize;
                let r = res.bits() as usize;
                assert_eq!(config.scale_factor(Axis::X), XY_HALLCONF_C[r][g]);
                assert_eq!(config.scale_factor(Axis::Y), XY_HALLCONF_C[r][g]);
                assert_eq!(config.scale_factor(Axis::Z), Z_HALLCONF_C[r][g]);
            }
        }
    }

    #[test]
    fn test_scale_factor_uses_per_axis_resolution() {
        let config = Config {
            gain: Gain::X5,
            resolution_x: Resolution::Res16,
            resolution_y: Resolution::Res19,
            resolution_z: Resolution::Res17,
            ..Config::default()
        };
        assert_eq!(config.scale_factor(Axis::X), 0.751);
        assert_eq!(config.scale_factor(Axis::Y), 6.009);
        assert_eq!(config.scale_factor(Axis::Z), 2.420);
    }

    #[test]
    fn test_scale_factor_alternate_hall_conf() {
        let config = Config {
            hall_conf: HallConf::Conf00,
            ..Config::default()
        };
        assert_eq!(config.scale_factor(Axis::X), 0.157);
        assert_eq!(config.scale_factor(Axis::Z), 0.253);
    }

    #[test]
    fn test_invalid_oversampling_leaves_value_unchanged() {
        let mut config = Config::default();
        config.set_oversampling(2).unwrap();

        let err = config.set_oversampling(4).unwrap_err();
        assert!(matches!(err, Mlx90393Error::InvalidParameter(_)));
        assert_eq!(config.oversampling.bits(), 2);
    }

    #[test]
    fn test_setter_ranges() {
        let mut config = Config::default();
        assert!(config.set_gain(7).is_ok());
        assert!(config.set_gain(8).is_err());
        assert!(config.set_resolution(Axis::Z, 3).is_ok());
        assert!(config.set_resolution(Axis::Z, 4).is_err());
        assert!(config.set_filter(7).is_ok());
        assert!(config.set_filter(8).is_err());
        assert!(config.set_hall_conf(0x0C).is_ok());
        assert!(config.set_hall_conf(0x05).is_err());
        assert_eq!(config.resolution_z, Resolution::Res19);
    }

    #[test]
    fn test_register_round_trip_through_fields() {
        let config = Config {
            gain: Gain::X2_5,
            resolution_x: Resolution::Res17,
            resolution_y: Resolution::Res18,
            resolution_z: Resolution::Res19,
            oversampling: Oversampling::new(3).unwrap(),
            digital_filter: DigitalFilter::new(5).unwrap(),
            hall_conf: HallConf::Conf0C,
        };
        // Unrelated bits (Z_SERIES, BIST, OSR2) must survive
        let conf1 = config.conf1_value(0x0180);
        let conf3 = config.conf3_value(0x1800);
        assert_eq!(conf1 & 0x0180, 0x0180);
        assert_eq!(conf3 & 0x1800, 0x1800);
        assert_eq!(Config::from_registers(conf1, conf3).unwrap(), config);
    }

    #[test]
    fn test_power_on_registers_decode_to_default() {
        assert_eq!(Config::from_registers(0x007C, 0x0000).unwrap(), Config::default());
    }

    #[test]
    fn test_conversion_time() {
        let config = Config::default();
        // 600 + 3 * (67 + 64 * 1 * 3) + (67 + 192)
        assert_eq!(config.conversion_time(Axes::ALL), Duration::from_micros(1636));
        assert_eq!(config.conversion_time(Axes::T), Duration::from_micros(859));

        let slow = Config {
            oversampling: Oversampling::new(3).unwrap(),
            digital_filter: DigitalFilter::new(7).unwrap(),
            ..Config::default()
        };
        // 600 + 67 + 64 * 8 * 130
        assert_eq!(slow.conversion_time(Axes::X), Duration::from_micros(67_227));
    }

    #[test]
    fn test_apply_options() {
        let mut config = Config::default();
        let options = ConfigOptions::new()
            .gain(Gain::X3)
            .resolution(Resolution::Res17)
            .resolution_z(Resolution::Res18);
        config.apply(&options);
        assert_eq!(config.gain, Gain::X3);
        assert_eq!(config.resolution_x, Resolution::Res17);
        assert_eq!(config.resolution_z, Resolution::Res18);
        assert_eq!(config.oversampling, Oversampling::default());
    }
}
