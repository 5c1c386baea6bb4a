//! Save/load of the world snapshot.
//!
//! The whole world is written as one JSON record into a single named slot.
//! Every write is a full overwrite. A missing or unreadable record is a fresh
//! game, never an error, and failed writes are logged and skipped.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::grid::GeoPoint;
use crate::movement::MovementMode;

/// Name of the storage slot.
pub const SLOT_NAME: &str = "worldOfBits";

/// Plain cache record inside a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub pos: [i32; 2],
    pub value: u32,
}

/// Persisted world and player state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldSnapshot {
    pub player_pos: [f64; 2],
    pub player_holding: u32,
    /// Keyed by `"x,y"`; the record's `pos` is authoritative on load.
    pub caches: BTreeMap<String, CacheRecord>,
    pub highest_value: u32,
    pub movement_mode: MovementMode,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to encode world: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("storage error: {0}")]
    Io(#[from] io::Error),
}

pub fn serialize(snapshot: &WorldSnapshot) -> Result<String, PersistenceError> {
    Ok(serde_json::to_string(snapshot)?)
}

/// Decode a snapshot. Corrupt content, or a player position off the globe,
/// yields `None` (fresh game).
pub fn deserialize(text: &str) -> Option<WorldSnapshot> {
    match serde_json::from_str::<WorldSnapshot>(text) {
        Ok(snapshot) if GeoPoint::from(snapshot.player_pos).is_valid() => Some(snapshot),
        Ok(snapshot) => {
            log::warn!("Ignoring saved game with invalid player position {:?}", snapshot.player_pos);
            None
        }
        Err(e) => {
            log::warn!("Failed to load game state: {}", e);
            None
        }
    }
}

/// A single named storage location for the snapshot.
pub trait SaveSlot {
    /// Stored text, or `None` if nothing was saved.
    fn read(&self) -> io::Result<Option<String>>;
    fn write(&mut self, text: &str) -> io::Result<()>;
    fn clear(&mut self) -> io::Result<()>;
}

/// Write a snapshot, logging instead of failing.
pub fn save(slot: &mut dyn SaveSlot, snapshot: &WorldSnapshot) -> bool {
    let result = serialize(snapshot).and_then(|text| slot.write(&text).map_err(PersistenceError::from));
    match result {
        Ok(()) => {
            log::debug!("Game state saved.");
            true
        }
        Err(e) => {
            log::warn!("Failed to save game state: {}", e);
            false
        }
    }
}

/// Read a snapshot, treating every failure as "no saved game".
pub fn load(slot: &dyn SaveSlot) -> Option<WorldSnapshot> {
    match slot.read() {
        Ok(Some(text)) => deserialize(&text),
        Ok(None) => None,
        Err(e) => {
            log::warn!("Failed to load game state: {}", e);
            None
        }
    }
}

/// Slot backed by one JSON file in a directory.
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(dir: &Path) -> Self {
        Self { path: dir.join(format!("{}.json", SLOT_NAME)) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SaveSlot for FileSlot {
    fn read(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, text: &str) -> io::Result<()> {
        // Write then rename so a crash never leaves a half-written save
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)
    }

    fn clear(&mut self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// In-memory slot that counts writes.
#[derive(Default)]
pub struct MemorySlot {
    text: Option<String>,
    writes: usize,
    fail_writes: bool,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: &str) -> Self {
        Self { text: Some(text.to_string()), ..Self::default() }
    }

    /// A slot whose writes always fail (full storage).
    pub fn failing() -> Self {
        Self { fail_writes: true, ..Self::default() }
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

impl SaveSlot for MemorySlot {
    fn read(&self) -> io::Result<Option<String>> {
        Ok(self.text.clone())
    }

    fn write(&mut self, text: &str) -> io::Result<()> {
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::Other, "storage quota exceeded"));
        }
        self.writes += 1;
        self.text = Some(text.to_string());
        Ok(())
    }

    fn clear(&mut self) -> io::Result<()> {
        self.text = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorldSnapshot {
        let mut caches = BTreeMap::new();
        caches.insert("3,-4".to_string(), CacheRecord { pos: [3, -4], value: 8 });
        caches.insert("0,0".to_string(), CacheRecord { pos: [0, 0], value: 0 });
        WorldSnapshot {
            player_pos: [19.63012, -155.98991],
            player_holding: 2,
            caches,
            highest_value: 8,
            movement_mode: MovementMode::Geo,
        }
    }

    #[test]
    fn test_round_trip() {
        let s = sample();
        let text = serialize(&s).unwrap();
        assert_eq!(deserialize(&text), Some(s));
    }

    #[test]
    fn test_field_names() {
        let text = serialize(&sample()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["playerHolding"], 2);
        assert_eq!(v["highestValue"], 8);
        assert_eq!(v["movementMode"], "GEO");
        assert_eq!(v["caches"]["3,-4"]["pos"], serde_json::json!([3, -4]));
        assert!(v["playerPos"].is_array());
    }

    #[test]
    fn test_reads_browser_record() {
        let text = r#"{"playerPos":[19.63,-155.99],"playerHolding":0,
            "caches":{"1,2":{"pos":[1,2],"value":4}},"highestValue":4,"movementMode":"WASD"}"#;
        let s = deserialize(text).unwrap();
        assert_eq!(s.caches["1,2"].value, 4);
        assert_eq!(s.movement_mode, MovementMode::Wasd);
    }

    #[test]
    fn test_corrupt_is_fresh_game() {
        assert_eq!(deserialize("{not json"), None);
        assert_eq!(deserialize(r#"{"playerPos":[1,2]}"#), None);
        assert_eq!(load(&MemorySlot::with_text("garbage")), None);
        assert_eq!(load(&MemorySlot::new()), None);
    }

    #[test]
    fn test_off_globe_position_is_fresh_game() {
        for pos in ["[1000000.0,0.0]", "[19.63,-181.0]", "[-90.5,0.0]", "[null,null]"] {
            let text = format!(
                r#"{{"playerPos":{},"playerHolding":0,"caches":{{}},"highestValue":0,"movementMode":"WASD"}}"#,
                pos
            );
            assert_eq!(deserialize(&text), None, "{} accepted", pos);
        }
    }

    #[test]
    fn test_failed_write_is_not_fatal() {
        let mut slot = MemorySlot::failing();
        assert!(!save(&mut slot, &sample()));
        assert_eq!(slot.writes(), 0);
    }

    #[test]
    fn test_file_slot() {
        let dir = tempfile::tempdir().unwrap();
        let mut slot = FileSlot::new(dir.path());
        assert_eq!(load(&slot), None);

        assert!(save(&mut slot, &sample()));
        assert!(slot.path().ends_with("worldOfBits.json"));
        assert_eq!(load(&slot), Some(sample()));

        slot.clear().unwrap();
        assert_eq!(load(&slot), None);
        slot.clear().unwrap();
    }
}
