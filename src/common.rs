//! Console and argument helpers for the reader binary

use std::time::Duration;

use crate::measurement::MagneticReading;

/// Parse a 7-bit I2C address given in decimal or `0x`-prefixed hex
pub fn parse_address(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    match parsed {
        Ok(address) if address <= 0x7F => Ok(address),
        Ok(address) => Err(format!("0x{:02X} is not a 7-bit address", address)),
        Err(e) => Err(e.to_string()),
    }
}

/// Parse a run time in seconds; negative, infinite and NaN values are rejected
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let seconds: f64 = s.trim().parse().map_err(|e| format!("{}", e))?;
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| format!("{} is not a valid number of seconds", s))
}

/// Horizontal bar centred on zero, `width` cells plus a `|` marker
///
/// Values beyond `±full_scale` are clamped to a full bar.
///
/// # Example
/// ```
/// use ft232_mlx90393_interface::create_bar;
///
/// // +25 µT on a ±50 µT scale fills half of the right side
/// let bar = create_bar(25.0, 50.0, 40);
/// assert_eq!(bar.chars().filter(|&c| c == '█').count(), 10);
/// ```
pub fn create_bar(value: f32, full_scale: f32, width: usize) -> String {
    let half = width / 2;
    let fraction = if full_scale > 0.0 {
        (value / full_scale).clamp(-1.0, 1.0)
    } else {
        0.0
    };
    let filled = ((fraction.abs() * half as f32) as usize).min(half);

    let (left, right) = if fraction < 0.0 {
        (
            format!("{}{}", " ".repeat(half - filled), "█".repeat(filled)),
            " ".repeat(half),
        )
    } else {
        (
            " ".repeat(half),
            format!("{}{}", "█".repeat(filled), " ".repeat(half - filled)),
        )
    };

    format!("{}|{}", left, right)
}

/// One display line per measured axis, `-` for axes that were not measured
pub fn format_reading(reading: &MagneticReading, full_scale: f32, width: usize) -> Vec<String> {
    [("X", reading.x), ("Y", reading.y), ("Z", reading.z)]
        .into_iter()
        .map(|(name, value)| match value {
            Some(v) => format!("  {}: {:9.2} µT [{}]", name, v, create_bar(v, full_scale, width)),
            None => format!("  {}: {:>9} µT", name, "-"),
        })
        .collect()
}
