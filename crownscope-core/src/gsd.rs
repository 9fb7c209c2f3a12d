//! Ground sample distance (meters per pixel edge)

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scale used when the caller does not supply one.
pub const DEFAULT_GSD: f64 = 0.45;

/// A validated ground sample distance: finite and strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Gsd(f64);

impl Gsd {
    pub fn new(meters_per_pixel: f64) -> Result<Self> {
        if !meters_per_pixel.is_finite() {
            return Err(Error::Validation(format!(
                "gsd must be a finite number, got {}",
                meters_per_pixel
            )));
        }
        if meters_per_pixel <= 0.0 {
            return Err(Error::Validation(format!(
                "gsd must be greater than zero, got {}",
                meters_per_pixel
            )));
        }
        Ok(Self(meters_per_pixel))
    }

    /// Parse a form value. Blank input falls back to the default scale.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let value = trimmed
            .parse::<f64>()
            .map_err(|_| Error::Validation(format!("gsd must be a number, got '{}'", trimmed)))?;
        Self::new(value)
    }

    pub fn meters_per_pixel(self) -> f64 {
        self.0
    }

    /// Square meters covered by one pixel.
    pub fn pixel_area_m2(self) -> f64 {
        self.0 * self.0
    }
}

impl Default for Gsd {
    fn default() -> Self {
        Self(DEFAULT_GSD)
    }
}

impl TryFrom<f64> for Gsd {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Gsd> for f64 {
    fn from(gsd: Gsd) -> Self {
        gsd.0
    }
}

impl fmt::Display for Gsd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} m/px", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_045() {
        assert_eq!(Gsd::default().meters_per_pixel(), 0.45);
    }

    #[test]
    fn test_rejects_non_positive() {
        assert!(Gsd::new(0.0).is_err());
        assert!(Gsd::new(-0.45).is_err());
        assert!(Gsd::new(-0.0).is_err());
    }

    #[test]
    fn test_rejects_non_finite() {
        assert!(Gsd::new(f64::NAN).is_err());
        assert!(Gsd::new(f64::INFINITY).is_err());
        assert!(Gsd::new(f64::NEG_INFINITY).is_err());
    }

    #[test]
    fn test_parse() {
        assert_eq!(Gsd::parse("0.3").unwrap().meters_per_pixel(), 0.3);
        assert_eq!(Gsd::parse("  1.5 ").unwrap().meters_per_pixel(), 1.5);
        assert_eq!(Gsd::parse("").unwrap(), Gsd::default());
        assert_eq!(Gsd::parse("   ").unwrap(), Gsd::default());
        assert!(Gsd::parse("abc").unwrap_err().is_validation());
        assert!(Gsd::parse("-1").is_err());
        assert!(Gsd::parse("NaN").is_err());
    }

    #[test]
    fn test_pixel_area() {
        let gsd = Gsd::new(0.5).unwrap();
        assert_eq!(gsd.pixel_area_m2(), 0.25);
    }

    #[test]
    fn test_serde_validates() {
        let gsd: Gsd = serde_json::from_str("0.45").unwrap();
        assert_eq!(gsd, Gsd::default());
        assert_eq!(serde_json::to_string(&gsd).unwrap(), "0.45");
        assert!(serde_json::from_str::<Gsd>("-2.0").is_err());
    }
}
