//! Recording configuration: motion classes, orientation, geolocation,
//! and bitrate derivation.

use serde::{Deserialize, Serialize};

use crate::types::Resolution;

/// Empirical bitrate constant: bits per pixel per frame, per motion unit.
pub const BITRATE_FACTOR: f32 = 0.07;

/// Expected scene motion, which scales the target bitrate.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Motion {
    /// Mostly static content (slideshows, screen content).
    #[default]
    Low,
    /// Ordinary camera footage.
    Medium,
    /// Fast panning or sports.
    High,
    /// Worst-case motion (confetti, rapid scene cuts).
    ExtraHigh,
}

impl Motion {
    /// The bitrate multiplier this class carries.
    pub fn multiplier(self) -> u32 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::ExtraHigh => 4,
        }
    }
}

/// Playback orientation hint, stored as a composition matrix in the
/// output container. Does not rotate the encoded frames.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Orientation {
    pub fn degrees(self) -> u32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }
}

/// Geodata stored in the output file per ISO-6709.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees, in [-90, 90].
    pub latitude: f32,
    /// Longitude in degrees, in [-180, 180].
    pub longitude: f32,
}

impl Location {
    pub fn new(latitude: f32, longitude: f32) -> Option<Self> {
        if (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude) {
            Some(Self {
                latitude,
                longitude,
            })
        } else {
            None
        }
    }
}

/// Derive the target bitrate in bits per second.
///
/// A pure function of output area, frame rate, and motion class:
/// `round(area * rate * multiplier * 0.07)`. There is no adaptive
/// feedback; the encoder is configured once with this value.
pub fn bit_rate(resolution: Resolution, frame_rate: u32, motion: Motion) -> u32 {
    let area = resolution.pixel_count() as f32;
    (area * frame_rate as f32 * motion.multiplier() as f32 * BITRATE_FACTOR).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_multipliers() {
        assert_eq!(Motion::Low.multiplier(), 1);
        assert_eq!(Motion::Medium.multiplier(), 2);
        assert_eq!(Motion::High.multiplier(), 3);
        assert_eq!(Motion::ExtraHigh.multiplier(), 4);
    }

    #[test]
    fn bit_rate_formula() {
        // 352*288 * 8 fps * 1 * 0.07 = 56770.56 -> 56771
        assert_eq!(bit_rate(Resolution::CIF, 8, Motion::Low), 56_771);
        // Doubling the motion class doubles the rate (within rounding)
        let low = bit_rate(Resolution::HD, 30, Motion::Low);
        let med = bit_rate(Resolution::HD, 30, Motion::Medium);
        assert_eq!(med, low * 2);
    }

    #[test]
    fn orientation_degrees_roundtrip() {
        for o in [
            Orientation::Deg0,
            Orientation::Deg90,
            Orientation::Deg180,
            Orientation::Deg270,
        ] {
            assert_eq!(Orientation::from_degrees(o.degrees()), Some(o));
        }
        assert_eq!(Orientation::from_degrees(45), None);
    }

    #[test]
    fn location_ranges() {
        assert!(Location::new(37.422, -122.084).is_some());
        assert!(Location::new(90.0, 180.0).is_some());
        assert!(Location::new(-90.0, -180.0).is_some());
        assert!(Location::new(90.1, 0.0).is_none());
        assert!(Location::new(0.0, -180.5).is_none());
    }
}
