//! Display units for distance readings.
//!
//! Distances are always stored in meters. Conversion to the display
//! unit happens only when a value is rendered, so history entries can
//! be re-rendered under either unit without accumulating error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit used when presenting a distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisplayUnit {
    /// Meters, two decimal places.
    #[default]
    #[serde(rename = "m")]
    Meters,
    /// Whole centimeters.
    #[serde(rename = "cm")]
    Centimeters,
}

impl DisplayUnit {
    /// Returns the other unit.
    pub fn toggle(self) -> Self {
        match self {
            Self::Meters => Self::Centimeters,
            Self::Centimeters => Self::Meters,
        }
    }

    /// Short symbol shown next to values.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Meters => "m",
            Self::Centimeters => "cm",
        }
    }
}

impl fmt::Display for DisplayUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Error returned when parsing an unknown unit symbol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown display unit: {0} (expected \"m\" or \"cm\")")]
pub struct UnknownUnit(pub String);

impl FromStr for DisplayUnit {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "m" | "meters" => Ok(Self::Meters),
            "cm" | "centimeters" => Ok(Self::Centimeters),
            other => Err(UnknownUnit(other.to_string())),
        }
    }
}

/// Formats a distance in meters for display in `unit`.
///
/// Meters render with two decimals, centimeters are rounded half away
/// from zero and render without decimals.
pub fn to_display(meters: f64, unit: DisplayUnit) -> String {
    match unit {
        DisplayUnit::Meters => format!("{:.2}", meters),
        DisplayUnit::Centimeters => format!("{:.0}", (meters * 100.0).round()),
    }
}

/// Converts a value expressed in `unit` back to meters.
pub fn from_display(value: f64, unit: DisplayUnit) -> f64 {
    match unit {
        DisplayUnit::Meters => value,
        DisplayUnit::Centimeters => value / 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meters_two_decimals() {
        assert_eq!(to_display(0.5, DisplayUnit::Meters), "0.50");
        assert_eq!(to_display(1.5, DisplayUnit::Meters), "1.50");
        assert_eq!(to_display(1.234, DisplayUnit::Meters), "1.23");
    }

    #[test]
    fn test_centimeters_rounded() {
        assert_eq!(to_display(1.234, DisplayUnit::Centimeters), "123");
        assert_eq!(to_display(0.456, DisplayUnit::Centimeters), "46");
        assert_eq!(to_display(0.0, DisplayUnit::Centimeters), "0");
    }

    #[test]
    fn test_toggle_twice_is_identity() {
        for unit in [DisplayUnit::Meters, DisplayUnit::Centimeters] {
            assert_ne!(unit.toggle(), unit);
            assert_eq!(unit.toggle().toggle(), unit);
        }
    }

    #[test]
    fn test_centimeter_round_trip() {
        for cm in [0.0, 45.0, 123.0, 250.0] {
            let meters = from_display(cm, DisplayUnit::Centimeters);
            assert_eq!(
                to_display(meters, DisplayUnit::Centimeters),
                format!("{:.0}", cm)
            );
        }
    }

    #[test]
    fn test_parse_symbols() {
        assert_eq!("m".parse::<DisplayUnit>(), Ok(DisplayUnit::Meters));
        assert_eq!("cm".parse::<DisplayUnit>(), Ok(DisplayUnit::Centimeters));
        assert!("ft".parse::<DisplayUnit>().is_err());
        assert_eq!(DisplayUnit::Centimeters.to_string(), "cm");
    }
}
