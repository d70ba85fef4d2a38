//! Beacon targets and great-circle navigation.

use libm::{atan2, cos, sin, sqrt};

use crate::error::{Error, Result};

/// Mean Earth radius (m).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A position in signed decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Target {
    /// `XXXX#XXXX`, as advertised by the beacon.
    pub code: &'static str,
    pub label: &'static str,
    pub position: Coord,
}

pub static TARGETS: [Target; 7] = [
    Target {
        code: "0000#CCCC",
        label: "Home",
        position: Coord::new(42.040545, -86.435835),
    },
    Target {
        code: "A08D#6CDD",
        label: "Substation",
        position: Coord::new(42.039323, -86.435976),
    },
    Target {
        code: "CB69#A409",
        label: "EP Clark Elementary",
        position: Coord::new(42.044174, -86.446875),
    },
    Target {
        code: "D694#734A",
        label: "Upton Middle School",
        position: Coord::new(42.048659, -86.473342),
    },
    Target {
        code: "B2A5#55BD",
        label: "Lakeshore High School",
        position: Coord::new(42.013209, -86.492442),
    },
    Target {
        code: "60C3#6748",
        label: "Lake Michigan College",
        position: Coord::new(42.094203, -86.391581),
    },
    Target {
        code: "5DC3#154D",
        label: "Lincoln Twp Library",
        position: Coord::new(42.015690, -86.504157),
    },
];

pub fn find_target(code: &str) -> Result<&'static Target> {
    TARGETS
        .iter()
        .find(|t| t.code == code)
        .ok_or(Error::UnknownTarget)
}

/// Haversine distance in metres, or `None` without both fixes.
pub fn distance_m(from: Option<Coord>, to: Option<Coord>) -> Option<f64> {
    let (a, b) = (from?, to?);
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = sin(dlat / 2.0) * sin(dlat / 2.0)
        + cos(lat1) * cos(lat2) * sin(dlon / 2.0) * sin(dlon / 2.0);
    let c = 2.0 * atan2(sqrt(h), sqrt(1.0 - h));
    Some(EARTH_RADIUS_M * c)
}

/// Initial bearing in degrees clockwise from north, `[0, 360)`.
pub fn bearing_deg(from: Option<Coord>, to: Option<Coord>) -> Option<f64> {
    let (a, b) = (from?, to?);
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let y = cos(lat2) * sin(dlon);
    let x = cos(lat1) * sin(lat2) - sin(lat1) * cos(lat2) * cos(dlon);
    let deg = atan2(y, x).to_degrees();
    Some((deg + 360.0) % 360.0)
}

/// Needle tip for a compass of `radius` centred on `(cx, cy)`, north up.
pub fn needle_tip(cx: i32, cy: i32, radius: i32, bearing: f64) -> (i32, i32) {
    let rad = bearing.to_radians();
    let r = radius as f64;
    let dx = libm::round(r * sin(rad)) as i32;
    let dy = libm::round(r * cos(rad)) as i32;
    (cx + dx, cy - dy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn home() -> Option<Coord> {
        Some(find_target("0000#CCCC").unwrap().position)
    }

    fn substation() -> Option<Coord> {
        Some(find_target("A08D#6CDD").unwrap().position)
    }

    #[test]
    fn lookup() {
        assert_eq!(find_target("A08D#6CDD").unwrap().label, "Substation");
        assert_eq!(find_target("FFFF#FFFF"), Err(Error::UnknownTarget));
        assert!(TARGETS.iter().all(|t| crate::ble::adv::is_beacon_code(t.code.as_bytes())));
    }

    #[test]
    fn home_to_substation() {
        let d = distance_m(home(), substation()).unwrap();
        assert!((d - 136.0).abs() < 2.0, "distance {}", d);
        let b = bearing_deg(home(), substation()).unwrap();
        // Almost due south, slightly west.
        assert!(b > 180.0 && b < 190.0, "bearing {}", b);
    }

    #[test]
    fn no_fix_is_none() {
        assert_eq!(distance_m(None, substation()), None);
        assert_eq!(bearing_deg(home(), None), None);
    }

    #[test]
    fn same_point() {
        assert_eq!(distance_m(home(), home()), Some(0.0));
    }

    #[test]
    fn needle_points_at_bearing() {
        assert_eq!(needle_tip(106, 30, 20, 0.0), (106, 10));
        assert_eq!(needle_tip(106, 30, 20, 90.0), (126, 30));
        assert_eq!(needle_tip(106, 30, 20, 180.0), (106, 50));
        assert_eq!(needle_tip(106, 30, 20, 270.0), (86, 30));
    }
}
