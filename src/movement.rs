//! Movement sources that drive the player position.
//!
//! Two sources exist: WASD key steps and a location feed (GEO). The facade
//! owns both but keeps exactly one running, and always stops the running one
//! before starting the other so they never race over the player position.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::grid::GeoPoint;

/// Which source drives the player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MovementMode {
    #[default]
    #[serde(rename = "WASD")]
    Wasd,
    #[serde(rename = "GEO")]
    Geo,
}

impl MovementMode {
    pub fn name(&self) -> &'static str {
        match self {
            MovementMode::Wasd => "WASD",
            MovementMode::Geo => "GEO",
        }
    }

    pub fn other(&self) -> MovementMode {
        match self {
            MovementMode::Wasd => MovementMode::Geo,
            MovementMode::Geo => MovementMode::Wasd,
        }
    }

    /// Label for the toggle button while this mode is active.
    pub fn toggle_label(&self) -> String {
        format!("Switch to {} Mode", self.other().name())
    }
}

impl fmt::Display for MovementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A position change produced by a source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Movement {
    /// Relative step in degrees.
    Step { dlat: f64, dlng: f64 },
    /// Absolute position fix.
    Fix(GeoPoint),
}

#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    #[error("location source unavailable: {0}")]
    Unavailable(String),
    #[error("malformed track line {line}: {text:?}")]
    Malformed { line: usize, text: String },
    #[error("invalid position fix ({lat}, {lng})")]
    InvalidFix { lat: f64, lng: f64 },
    #[error("failed to read track: {0}")]
    Io(#[from] io::Error),
}

/// Something that delivers absolute positions (device GPS, a recorded track).
pub trait LocationFeed {
    fn start(&mut self) -> Result<(), LocationError>;
    fn stop(&mut self);
    /// Next position if one is due. Never blocks.
    fn poll(&mut self) -> Option<Result<GeoPoint, LocationError>>;
}

/// A movement source with start/stop capability.
pub trait MovementSource {
    fn mode(&self) -> MovementMode;
    fn start(&mut self);
    fn stop(&mut self);
    fn is_active(&self) -> bool;

    /// Translate a key press.
    fn key(&mut self, _key: char) -> Option<Movement> {
        None
    }

    /// Poll for a position update.
    fn poll(&mut self) -> Option<Movement> {
        None
    }
}

/// Keyboard steps: `w`/`s` move along latitude, `a`/`d` along longitude.
pub struct WasdSource {
    step: f64,
    active: bool,
}

impl WasdSource {
    pub fn new(step: f64) -> Self {
        Self { step, active: false }
    }
}

impl MovementSource for WasdSource {
    fn mode(&self) -> MovementMode {
        MovementMode::Wasd
    }

    fn start(&mut self) {
        self.active = true;
    }

    fn stop(&mut self) {
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn key(&mut self, key: char) -> Option<Movement> {
        if !self.active {
            return None;
        }
        let (dlat, dlng) = match key.to_ascii_lowercase() {
            'w' => (self.step, 0.0),
            's' => (-self.step, 0.0),
            'a' => (0.0, -self.step),
            'd' => (0.0, self.step),
            _ => return None,
        };
        Some(Movement::Step { dlat, dlng })
    }
}

/// Location-driven movement with a fallback position.
///
/// With no feed, or once the feed fails, the source reports the fallback
/// position once and then stays quiet until restarted.
pub struct GeoSource {
    feed: Option<Box<dyn LocationFeed>>,
    fallback: GeoPoint,
    active: bool,
    fallback_pending: bool,
}

impl GeoSource {
    pub fn new(feed: Option<Box<dyn LocationFeed>>, fallback: GeoPoint) -> Self {
        Self { feed, fallback, active: false, fallback_pending: false }
    }

    fn fall_back(&mut self, reason: &dyn fmt::Display) {
        log::warn!("Location unavailable ({}), using default position", reason);
        self.fallback_pending = true;
    }
}

impl MovementSource for GeoSource {
    fn mode(&self) -> MovementMode {
        MovementMode::Geo
    }

    fn start(&mut self) {
        self.active = true;
        self.fallback_pending = false;
        let started = self.feed.as_mut().map(|feed| feed.start());
        match started {
            Some(Ok(())) => log::info!("Location feed started"),
            Some(Err(e)) => self.fall_back(&e),
            None => self.fall_back(&"no location feed configured"),
        }
    }

    fn stop(&mut self) {
        if let Some(feed) = self.feed.as_mut() {
            feed.stop();
        }
        self.active = false;
        self.fallback_pending = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn poll(&mut self) -> Option<Movement> {
        if !self.active {
            return None;
        }
        if self.fallback_pending {
            self.fallback_pending = false;
            return Some(Movement::Fix(self.fallback));
        }
        let next = self.feed.as_mut()?.poll()?.and_then(|point| {
            if point.is_valid() {
                Ok(point)
            } else {
                Err(LocationError::InvalidFix { lat: point.lat, lng: point.lng })
            }
        });
        match next {
            Ok(point) => Some(Movement::Fix(point)),
            Err(e) => {
                if let Some(feed) = self.feed.as_mut() {
                    feed.stop();
                }
                self.fall_back(&e);
                self.fallback_pending = false;
                Some(Movement::Fix(self.fallback))
            }
        }
    }
}

/// Replays a recorded track, one position per `interval`.
///
/// Track files hold one `lat,lng` pair per line; blank lines and lines
/// starting with `#` are skipped.
pub struct TrackFeed {
    points: Vec<GeoPoint>,
    next: usize,
    interval: Duration,
    last_emit: Option<Instant>,
    running: bool,
}

impl TrackFeed {
    pub fn new(points: Vec<GeoPoint>, interval: Duration) -> Self {
        Self { points, next: 0, interval, last_emit: None, running: false }
    }

    pub fn load(path: &Path, interval: Duration) -> Result<Self, LocationError> {
        let text = fs::read_to_string(path)?;
        Ok(Self::new(parse_track(&text)?, interval))
    }

    pub fn remaining(&self) -> usize {
        self.points.len() - self.next
    }
}

/// Parse `lat,lng` lines. Non-finite or off-globe positions are malformed.
pub fn parse_track(text: &str) -> Result<Vec<GeoPoint>, LocationError> {
    let mut points = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let malformed = || LocationError::Malformed { line: i + 1, text: line.to_string() };
        let (lat, lng) = line.split_once(',').ok_or_else(malformed)?;
        let lat: f64 = lat.trim().parse().map_err(|_| malformed())?;
        let lng: f64 = lng.trim().parse().map_err(|_| malformed())?;
        let point = GeoPoint::new(lat, lng);
        if !point.is_valid() {
            return Err(malformed());
        }
        points.push(point);
    }
    Ok(points)
}

impl LocationFeed for TrackFeed {
    fn start(&mut self) -> Result<(), LocationError> {
        if self.points.is_empty() {
            return Err(LocationError::Unavailable("track is empty".to_string()));
        }
        self.running = true;
        self.last_emit = None;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn poll(&mut self) -> Option<Result<GeoPoint, LocationError>> {
        if !self.running || self.next >= self.points.len() {
            return None;
        }
        let now = Instant::now();
        if let Some(last) = self.last_emit {
            if now.duration_since(last) < self.interval {
                return None;
            }
        }
        self.last_emit = Some(now);
        let point = self.points[self.next];
        self.next += 1;
        Some(Ok(point))
    }
}

/// Owns both movement sources and keeps exactly one of them running.
pub struct MovementFacade {
    current: Box<dyn MovementSource>,
    standby: Box<dyn MovementSource>,
}

impl MovementFacade {
    /// Build the facade and start the source for `mode`.
    pub fn new(wasd: Box<dyn MovementSource>, geo: Box<dyn MovementSource>, mode: MovementMode) -> Self {
        let (mut current, standby) = match mode {
            MovementMode::Wasd => (wasd, geo),
            MovementMode::Geo => (geo, wasd),
        };
        current.start();
        Self { current, standby }
    }

    pub fn mode(&self) -> MovementMode {
        self.current.mode()
    }

    /// Switch to `mode`, stopping the running source first. No-op if already
    /// in that mode.
    pub fn set_mode(&mut self, mode: MovementMode) {
        if self.current.mode() == mode {
            return;
        }
        self.current.stop();
        std::mem::swap(&mut self.current, &mut self.standby);
        self.current.start();
        log::info!("Movement mode: {}", self.current.mode());
    }

    pub fn toggle(&mut self) -> MovementMode {
        self.set_mode(self.mode().other());
        self.mode()
    }

    pub fn key(&mut self, key: char) -> Option<Movement> {
        self.current.key(key)
    }

    pub fn poll(&mut self) -> Option<Movement> {
        self.current.poll()
    }

    /// Stop whichever source is running (teardown).
    pub fn stop(&mut self) {
        self.current.stop();
    }

    /// Restart the running source (after a reset).
    pub fn restart(&mut self) {
        self.current.stop();
        self.current.start();
    }
}
