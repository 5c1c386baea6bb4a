//! World cell grid anchored to a geographic origin.
//!
//! The world is an infinite grid of square cells, `tile_degrees` on a side.
//! Cell `(0, 0)` has its south-west corner at the origin; `x` grows with
//! latitude and `y` grows with longitude.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters (same constant Leaflet uses for `distanceTo`).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A real-world position in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Offset by a delta in degrees.
    pub fn offset(&self, dlat: f64, dlng: f64) -> Self {
        Self::new(self.lat + dlat, self.lng + dlng)
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlng = (other.lng - self.lng).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }

    pub fn as_array(&self) -> [f64; 2] {
        [self.lat, self.lng]
    }

    /// Finite and within lat [-90, 90], lng [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite() && self.lat.abs() <= 90.0 && self.lng.abs() <= 180.0
    }
}

impl From<[f64; 2]> for GeoPoint {
    fn from(pair: [f64; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }
}

/// Integer address of one grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
}

impl CellCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Canonical map key, `"x,y"`.
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Chebyshev (king-move) distance to another cell.
    pub fn chebyshev(&self, other: &CellCoord) -> u32 {
        let dx = (self.x as i64 - other.x as i64).unsigned_abs();
        let dy = (self.y as i64 - other.y as i64).unsigned_abs();
        dx.max(dy) as u32
    }

    /// All cells within Chebyshev distance `radius`, row by row.
    ///
    /// The window is clipped at the edges of the `i32` address space.
    pub fn window(&self, radius: u32) -> impl Iterator<Item = CellCoord> {
        let r = radius.min(i32::MAX as u32) as i32;
        let (x0, x1) = (self.x.saturating_sub(r), self.x.saturating_add(r));
        let (y0, y1) = (self.y.saturating_sub(r), self.y.saturating_add(r));
        (x0..=x1).flat_map(move |x| (y0..=y1).map(move |y| CellCoord::new(x, y)))
    }

    pub fn as_array(&self) -> [i32; 2] {
        [self.x, self.y]
    }
}

impl From<[i32; 2]> for CellCoord {
    fn from(pair: [i32; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Error parsing a `"x,y"` cell key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cell key {0:?}")]
pub struct ParseCellKeyError(pub String);

impl FromStr for CellCoord {
    type Err = ParseCellKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s.split_once(',').ok_or_else(|| ParseCellKeyError(s.to_string()))?;
        let x = x.trim().parse().map_err(|_| ParseCellKeyError(s.to_string()))?;
        let y = y.trim().parse().map_err(|_| ParseCellKeyError(s.to_string()))?;
        Ok(Self::new(x, y))
    }
}

/// Axis-aligned cell extent in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellBounds {
    pub south_west: GeoPoint,
    pub north_east: GeoPoint,
}

/// Mapping between geographic points and grid cells.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldGrid {
    pub origin: GeoPoint,
    pub tile_degrees: f64,
}

impl WorldGrid {
    pub fn new(origin: GeoPoint, tile_degrees: f64) -> Self {
        debug_assert!(tile_degrees > 0.0, "tile size must be positive");
        Self { origin, tile_degrees }
    }

    /// Cell containing a point: `floor((p - origin) / tile)` on each axis.
    pub fn cell_at(&self, point: GeoPoint) -> CellCoord {
        let x = ((point.lat - self.origin.lat) / self.tile_degrees).floor();
        let y = ((point.lng - self.origin.lng) / self.tile_degrees).floor();
        CellCoord::new(x as i32, y as i32)
    }

    pub fn cell_bounds(&self, cell: CellCoord) -> CellBounds {
        let t = self.tile_degrees;
        CellBounds {
            south_west: self.origin.offset(cell.x as f64 * t, cell.y as f64 * t),
            north_east: self.origin.offset((cell.x as f64 + 1.0) * t, (cell.y as f64 + 1.0) * t),
        }
    }

    pub fn cell_center(&self, cell: CellCoord) -> GeoPoint {
        let t = self.tile_degrees;
        self.origin.offset((cell.x as f64 + 0.5) * t, (cell.y as f64 + 0.5) * t)
    }
}
