use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::stats::StatsHelper;
use crate::prelude::{ReductionError, ReductionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanAxis {
    #[serde(rename = "RA")]
    Ra,
    Dec,
}

impl fmt::Display for ScanAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ra => write!(f, "RA"),
            Self::Dec => write!(f, "Dec"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanDirection {
    Increasing,
    Decreasing,
}

impl fmt::Display for ScanDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Increasing => write!(f, ">"),
            Self::Decreasing => write!(f, "<"),
        }
    }
}

/// Sky track of one scan, all angles in degrees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanGeometry {
    ra: Vec<f64>,
    dec: Vec<f64>,
    pub pointing_ra: f64,
    pub pointing_dec: f64,
}

impl ScanGeometry {
    pub fn new(
        ra: Vec<f64>,
        dec: Vec<f64>,
        pointing_ra: f64,
        pointing_dec: f64,
    ) -> ReductionResult<Self> {
        if ra.is_empty() || ra.len() != dec.len() {
            return Err(ReductionError::DegenerateInput(format!(
                "scan track has {} RA and {} Dec samples",
                ra.len(),
                dec.len()
            )));
        }
        Ok(Self {
            ra,
            dec,
            pointing_ra,
            pointing_dec,
        })
    }

    pub fn ra(&self) -> &[f64] {
        &self.ra
    }

    pub fn dec(&self) -> &[f64] {
        &self.dec
    }

    pub fn len(&self) -> usize {
        self.ra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ra.is_empty()
    }

    /// The coordinate spanning the larger angle; ties go to Dec.
    pub fn axis(&self) -> ScanAxis {
        let span = |values: &[f64]| {
            let (lo, hi) = StatsHelper::min_max(values);
            hi - lo
        };
        if span(&self.ra) > span(&self.dec) {
            ScanAxis::Ra
        } else {
            ScanAxis::Dec
        }
    }

    pub fn coordinate(&self) -> &[f64] {
        match self.axis() {
            ScanAxis::Ra => &self.ra,
            ScanAxis::Dec => &self.dec,
        }
    }

    pub fn direction(&self) -> ScanDirection {
        let x = self.coordinate();
        match (x.first(), x.last()) {
            (Some(first), Some(last)) if last > first => ScanDirection::Increasing,
            _ => ScanDirection::Decreasing,
        }
    }

    /// `RA>`, `RA<`, `Dec>` or `Dec<`.
    pub fn scan_type(&self) -> String {
        format!("{}{}", self.axis(), self.direction())
    }

    /// Angular distance on the sky from the pointing centre, along the scan.
    pub fn offsets(&self) -> Vec<f64> {
        match self.axis() {
            ScanAxis::Ra => self
                .ra
                .iter()
                .map(|ra| self.sky_width(ra - self.pointing_ra))
                .collect(),
            ScanAxis::Dec => self.dec.iter().map(|dec| dec - self.pointing_dec).collect(),
        }
    }

    /// Converts a width measured along the scan into an angle on the sky.
    pub fn sky_width(&self, width: f64) -> f64 {
        match self.axis() {
            ScanAxis::Ra => width * self.pointing_dec.to_radians().cos(),
            ScanAxis::Dec => width,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_axis_and_direction() {
        let ra: Vec<f64> = (0..11).map(|i| 20.0 - i as f64 * 0.1).collect();
        let geometry = ScanGeometry::new(ra, vec![45.0; 11], 19.5, 45.0).unwrap();
        assert_eq!(geometry.axis(), ScanAxis::Ra);
        assert_eq!(geometry.scan_type(), "RA<");
        assert!((geometry.sky_width(1.0) - 45f64.to_radians().cos()).abs() < 1e-12);
        let offsets = geometry.offsets();
        assert!((offsets[0] - 0.5 * 45f64.to_radians().cos()).abs() < 1e-9);
        assert!(offsets[5].abs() < 1e-9);

        let dec: Vec<f64> = (0..11).map(|i| 30.0 + i as f64 * 0.1).collect();
        let geometry = ScanGeometry::new(vec![10.0; 11], dec, 10.0, 30.5).unwrap();
        assert_eq!(geometry.scan_type(), "Dec>");
        assert_eq!(geometry.sky_width(0.2), 0.2);
    }

    #[test]
    fn mismatched_track_is_rejected() {
        assert!(ScanGeometry::new(vec![1.0, 2.0], vec![1.0], 0.0, 0.0).is_err());
    }
}
