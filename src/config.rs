//! Configuration for world generation and gameplay.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::grid::{GeoPoint, WorldGrid};

/// Smallest accepted tile edge. Any valid point then lies within about
/// 3.6e8 cells of the origin, well inside the `i32` cell address space.
pub const MIN_TILE_DEGREES: f64 = 1.0e-6;

/// Largest accepted view radius, in cells.
pub const MAX_VIEW_RADIUS: u32 = 1000;

/// What happens to cache data once its cell scrolls out of the view window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Keep the cache for the whole session; only its rendering is removed.
    #[default]
    Persist,
    /// Delete cache data when it leaves the window. Revisiting the cell
    /// re-rolls it from the hash, discarding merge progress.
    DiscardOffscreen,
}

/// Tunable gameplay parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Geo-point of cell (0, 0); also the fallback player position.
    pub origin: GeoPoint,

    /// Cell edge length in degrees (~11 m at 0.0001).
    pub tile_degrees: f64,

    /// Probability that an unvisited cell hosts a cache.
    pub spawn_probability: f64,

    /// Half-width of the square view window, in cells.
    pub view_radius: u32,

    /// Maximum interaction distance in meters (exclusive).
    pub proximity_radius_m: f64,

    /// Highest value that triggers the celebration.
    pub achievement_target: u32,

    /// How long the celebration stays on screen.
    pub celebration_secs: u64,

    /// Fraction of a tile moved per key press.
    pub move_speed: f64,

    pub retention: RetentionPolicy,

    /// Draw cache values from a salted key so they are independent of the
    /// spawn draw.
    pub salt_value_draw: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            // Kona, Hawaii
            origin: GeoPoint::new(19.63, -155.99),
            tile_degrees: 0.0001,
            spawn_probability: 0.1,
            view_radius: 10,
            proximity_radius_m: 60.0,
            achievement_target: 64,
            celebration_secs: 5,
            move_speed: 0.1,
            retention: RetentionPolicy::Persist,
            salt_value_draw: false,
        }
    }
}

/// Error loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl GameConfig {
    /// Load a JSON config file. Fields left out keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.origin.is_valid() {
            return Err(ConfigError::Invalid(format!(
                "origin must be a valid lat/lng, got {}, {}",
                self.origin.lat, self.origin.lng
            )));
        }
        if !(MIN_TILE_DEGREES..=1.0).contains(&self.tile_degrees) {
            return Err(ConfigError::Invalid(format!(
                "tile_degrees must be within [{}, 1], got {}",
                MIN_TILE_DEGREES, self.tile_degrees
            )));
        }
        if self.view_radius > MAX_VIEW_RADIUS {
            return Err(ConfigError::Invalid(format!(
                "view_radius must be at most {}, got {}",
                MAX_VIEW_RADIUS, self.view_radius
            )));
        }
        if !(self.proximity_radius_m >= 0.0 && self.proximity_radius_m.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "proximity_radius_m must be a finite distance, got {}",
                self.proximity_radius_m
            )));
        }
        if !(0.0..=1.0).contains(&self.spawn_probability) {
            return Err(ConfigError::Invalid(format!(
                "spawn_probability must be within [0, 1], got {}",
                self.spawn_probability
            )));
        }
        Ok(())
    }

    pub fn grid(&self) -> WorldGrid {
        WorldGrid::new(self.origin, self.tile_degrees)
    }

    /// Degrees moved by one WASD step.
    pub fn step_degrees(&self) -> f64 {
        self.tile_degrees * self.move_speed
    }
}
