//! Game session: the single owner of world and player state
//!
//! Every event (key press, location fix, cache selection, mode toggle, reset,
//! teardown) is one method call that runs to completion and returns the render
//! intents the front end should apply. Persistence happens here and nowhere
//! else, and is suppressed while a saved game is being restored.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::achievement::Achievement;
use crate::cache::CacheField;
use crate::config::GameConfig;
use crate::grid::{CellCoord, GeoPoint, WorldGrid};
use crate::interaction::{self, Hand, InteractionError, InteractionOutcome};
use crate::movement::{GeoSource, LocationFeed, Movement, MovementFacade, MovementMode, WasdSource};
use crate::persistence::{self, CacheRecord, SaveSlot, WorldSnapshot};
use crate::render::RenderIntent;

/// Player position and carried value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Player {
    pub position: GeoPoint,
    /// 0 means empty-handed.
    pub holding: u32,
    /// Never decreases.
    pub highest_value: u32,
}

impl Player {
    fn new(position: GeoPoint) -> Self {
        Self { position, holding: 0, highest_value: 0 }
    }
}

pub struct GameSession<S: SaveSlot> {
    config: GameConfig,
    grid: WorldGrid,
    player: Player,
    caches: CacheField,
    movement: MovementFacade,
    achievement: Achievement,
    slot: S,
    /// Set while rebuilding from a snapshot; blocks writes
    restoring: bool,
}

impl<S: SaveSlot> GameSession<S> {
    /// Fresh session at the origin, ignoring any saved game.
    pub fn new(config: GameConfig, slot: S, feed: Option<Box<dyn LocationFeed>>) -> Self {
        let grid = config.grid();
        let movement = MovementFacade::new(
            Box::new(WasdSource::new(config.step_degrees())),
            Box::new(GeoSource::new(feed, config.origin)),
            MovementMode::Wasd,
        );
        Self {
            grid,
            player: Player::new(config.origin),
            caches: CacheField::new(&config),
            movement,
            achievement: Achievement::new(config.achievement_target, Duration::from_secs(config.celebration_secs)),
            slot,
            restoring: false,
            config,
        }
    }

    /// Session restored from the slot if it holds a readable save, fresh
    /// otherwise.
    pub fn open(config: GameConfig, slot: S, feed: Option<Box<dyn LocationFeed>>) -> Self {
        let saved = persistence::load(&slot);
        let mut session = Self::new(config, slot, feed);
        match saved {
            Some(snapshot) => {
                session.restore(&snapshot);
                log::info!("Restored saved game.");
            }
            None => log::info!("Starting a new game."),
        }
        session
    }

    /// Rebuild state from a snapshot without writing to storage.
    pub fn restore(&mut self, snapshot: &WorldSnapshot) {
        self.restoring = true;

        self.player = Player {
            position: GeoPoint::from(snapshot.player_pos),
            holding: snapshot.player_holding,
            highest_value: snapshot.highest_value,
        };
        for (key, record) in &snapshot.caches {
            let cell = CellCoord::from(record.pos);
            if cell.key() != *key {
                log::warn!("Cache record {} stored under key {}", cell, key);
            }
            self.caches.spawn_from_data(cell, record.value);
        }
        self.set_mode(snapshot.movement_mode);

        self.restoring = false;
    }

    /// Pure-data projection of the current world.
    pub fn snapshot(&self) -> WorldSnapshot {
        let caches: BTreeMap<String, CacheRecord> = self
            .caches
            .iter()
            .map(|c| (c.pos.key(), CacheRecord { pos: c.pos.as_array(), value: c.value }))
            .collect();
        WorldSnapshot {
            player_pos: self.player.position.as_array(),
            player_holding: self.player.holding,
            caches,
            highest_value: self.player.highest_value,
            movement_mode: self.movement.mode(),
        }
    }

    fn persist(&mut self) {
        if self.restoring {
            log::debug!("Skipping save while restoring");
            return;
        }
        let snapshot = self.snapshot();
        persistence::save(&mut self.slot, &snapshot);
    }

    /// Whether a cell's center is within interaction range of the player.
    pub fn in_range(&self, cell: CellCoord) -> bool {
        interaction::within_reach(&self.grid, self.player.position, cell, self.config.proximity_radius_m).is_ok()
    }

    /// Recompute the render window around `center`.
    pub fn recompute_visible(&mut self, center: GeoPoint, radius: u32) -> Vec<RenderIntent> {
        let tile = self.grid.cell_at(center);
        let grid = self.grid;
        let player = self.player.position;
        let reach = self.config.proximity_radius_m;
        self.caches.recompute_window(tile, radius, |cell| {
            interaction::within_reach(&grid, player, cell, reach).is_ok()
        })
    }

    /// The view settled on the player; refresh the window.
    pub fn viewport_settled(&mut self) -> Vec<RenderIntent> {
        self.recompute_visible(self.player.position, self.config.view_radius)
    }

    /// Feed a key press to the active movement source.
    pub fn handle_key(&mut self, key: char) -> Vec<RenderIntent> {
        match self.movement.key(key) {
            Some(movement) => self.apply_movement(movement),
            None => Vec::new(),
        }
    }

    /// Poll the active movement source for a location update.
    pub fn poll_location(&mut self) -> Vec<RenderIntent> {
        match self.movement.poll() {
            Some(movement) => self.apply_movement(movement),
            None => Vec::new(),
        }
    }

    /// Move the player, follow with the view, recompute and save.
    ///
    /// A move that would leave the globe (or is not a number) is dropped.
    pub fn apply_movement(&mut self, movement: Movement) -> Vec<RenderIntent> {
        let position = match movement {
            Movement::Step { dlat, dlng } => self.player.position.offset(dlat, dlng),
            Movement::Fix(point) => point,
        };
        if !position.is_valid() {
            log::warn!("Ignoring move to invalid position {:?}", position.as_array());
            return Vec::new();
        }
        self.player.position = position;

        let mut intents = vec![
            RenderIntent::MovePlayer { position },
            RenderIntent::SetView { center: position },
        ];
        intents.extend(self.viewport_settled());
        self.persist();
        intents
    }

    /// Player selected the cache at `cell`.
    pub fn select_cache(&mut self, cell: CellCoord, now: Instant) -> Result<(InteractionOutcome, Vec<RenderIntent>), InteractionError> {
        interaction::within_reach(&self.grid, self.player.position, cell, self.config.proximity_radius_m)?;
        if !self.caches.is_rendered(cell) {
            return Err(InteractionError::NoCache(cell));
        }
        let cache = self.caches.get_mut(cell).ok_or(InteractionError::NoCache(cell))?;

        let mut hand = Hand { holding: self.player.holding, highest_value: self.player.highest_value };
        let (outcome, raised) = interaction::apply(&mut hand, cache)?;
        let value = cache.value;

        self.player.holding = hand.holding;
        self.player.highest_value = hand.highest_value;
        if raised && self.achievement.check(self.player.highest_value, now) {
            log::info!("Reached {}!", self.player.highest_value);
        }

        self.persist();
        Ok((outcome, vec![RenderIntent::Relabel { cell, value }]))
    }

    /// Switch to `mode`, stopping the current source first.
    pub fn set_mode(&mut self, mode: MovementMode) {
        if self.movement.mode() == mode {
            return;
        }
        self.movement.set_mode(mode);
        self.persist();
    }

    pub fn toggle_mode(&mut self) -> MovementMode {
        self.set_mode(self.movement.mode().other());
        self.movement.mode()
    }

    /// Wipe storage and start over at the origin in WASD mode.
    pub fn reset(&mut self) -> Vec<RenderIntent> {
        if let Err(e) = self.slot.clear() {
            log::warn!("Failed to clear saved game: {}", e);
        }
        let mut intents = self.caches.clear();

        self.restoring = true;
        self.player = Player::new(self.config.origin);
        self.achievement.dismiss();
        self.set_mode(MovementMode::Wasd);
        self.movement.restart();
        self.restoring = false;
        log::info!("Game reset.");

        let position = self.player.position;
        intents.push(RenderIntent::MovePlayer { position });
        intents.push(RenderIntent::SetView { center: position });
        intents.extend(self.viewport_settled());
        intents
    }

    /// Final save before the session goes away.
    pub fn teardown(&mut self) {
        self.persist();
        self.movement.stop();
    }

    pub fn status_text(&self) -> String {
        format!(
            "Points: {}, Highest Value: {}, Move with {}",
            self.player.holding,
            self.player.highest_value,
            self.movement.mode()
        )
    }

    pub fn toggle_label(&self) -> String {
        self.movement.mode().toggle_label()
    }

    pub fn celebrating(&self, now: Instant) -> bool {
        self.achievement.is_visible(now)
    }

    pub fn mode(&self) -> MovementMode {
        self.movement.mode()
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn caches(&self) -> &CacheField {
        &self.caches
    }

    pub fn grid(&self) -> &WorldGrid {
        &self.grid
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn slot(&self) -> &S {
        &self.slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemorySlot;

    fn session() -> GameSession<MemorySlot> {
        GameSession::new(GameConfig::default(), MemorySlot::new(), None)
    }

    /// Session with the player on the center of cell (0, 0).
    fn centered() -> GameSession<MemorySlot> {
        let mut s = session();
        s.player.position = s.grid.cell_center(CellCoord::new(0, 0));
        s
    }

    /// Put a cache with `value` at `cell` and bring it on screen.
    fn place(s: &mut GameSession<MemorySlot>, cell: CellCoord, value: u32) {
        s.caches.spawn_from_data(cell, value);
        s.caches.get_mut(cell).unwrap().value = value;
        s.viewport_settled();
    }

    #[test]
    fn test_merge_algebra() {
        let now = Instant::now();
        let mut s = centered();
        let cell = CellCoord::new(0, 1);

        place(&mut s, cell, 2);
        s.player.holding = 2;
        let (outcome, intents) = s.select_cache(cell, now).unwrap();
        assert_eq!(outcome, InteractionOutcome::Merged { value: 4 });
        assert_eq!(intents, vec![RenderIntent::Relabel { cell, value: 4 }]);
        assert_eq!(s.player.holding, 0);

        place(&mut s, cell, 2);
        s.player.holding = 1;
        let err = s.select_cache(cell, now).unwrap_err();
        assert!(matches!(err, InteractionError::NonPairValues { .. }));
        assert_eq!((s.player.holding, s.caches.get(cell).unwrap().value), (1, 2));

        place(&mut s, cell, 3);
        s.player.holding = 0;
        s.select_cache(cell, now).unwrap();
        assert_eq!((s.player.holding, s.caches.get(cell).unwrap().value), (3, 0));
    }

    #[test]
    fn test_proximity_gate() {
        let now = Instant::now();
        let mut s = centered();
        // 6 cells north is ~67 m away
        let far = CellCoord::new(6, 0);
        for (holding, value) in [(0, 2), (2, 2), (2, 0), (1, 2)] {
            place(&mut s, far, value);
            s.player.holding = holding;
            let writes = s.slot.writes();
            let err = s.select_cache(far, now).unwrap_err();
            assert!(matches!(err, InteractionError::OutOfRange { .. }));
            assert_eq!(s.player.holding, holding);
            assert_eq!(s.caches.get(far).unwrap().value, value);
            assert_eq!(s.slot.writes(), writes);
        }
    }

    #[test]
    fn test_select_empty_cell() {
        let mut s = centered();
        let cell = CellCoord::new(1, 1);
        assert_eq!(s.select_cache(cell, Instant::now()).unwrap_err(), InteractionError::NoCache(cell));
        assert_eq!(s.slot.writes(), 0);
    }

    #[test]
    fn test_offscreen_cache_not_selectable() {
        let config = GameConfig { view_radius: 2, proximity_radius_m: 10_000.0, ..GameConfig::default() };
        let mut s = GameSession::new(config, MemorySlot::new(), None);
        s.player.position = s.grid.cell_center(CellCoord::new(0, 0));
        s.viewport_settled();

        let cell = CellCoord::new(5, 0);
        assert!(s.caches.spawn_from_data(cell, 2));
        assert!(s.in_range(cell));
        assert_eq!(s.select_cache(cell, Instant::now()).unwrap_err(), InteractionError::NoCache(cell));
        assert_eq!(s.caches.get(cell).unwrap().value, 2);
        assert_eq!(s.player.holding, 0);
        assert_eq!(s.slot.writes(), 0);
    }

    #[test]
    fn test_overflowing_merge_from_restored_save() {
        let big = 1u32 << 31;
        let mut s = centered();
        let cell = CellCoord::new(0, 0);
        place(&mut s, cell, big);
        s.player.holding = big;
        let text = persistence::serialize(&s.snapshot()).unwrap();

        let mut restored = GameSession::open(GameConfig::default(), MemorySlot::with_text(&text), None);
        restored.viewport_settled();
        let err = restored.select_cache(cell, Instant::now()).unwrap_err();
        assert_eq!(err, InteractionError::Overflow { value: big });
        assert_eq!(restored.player.holding, big);
        assert_eq!(restored.caches.get(cell).unwrap().value, big);
        assert_eq!(restored.slot.writes(), 0);
    }

    #[test]
    fn test_successful_interaction_saves() {
        let mut s = centered();
        let cell = CellCoord::new(0, 0);
        place(&mut s, cell, 1);
        s.select_cache(cell, Instant::now()).unwrap();
        assert_eq!(s.slot.writes(), 1);
        let saved = persistence::load(&s.slot).unwrap();
        assert_eq!(saved.player_holding, 1);
        assert_eq!(saved.caches["0,0"].value, 0);
    }

    #[test]
    fn test_achievement_on_reaching_target() {
        let now = Instant::now();
        let mut s = centered();
        let cell = CellCoord::new(0, 0);
        place(&mut s, cell, 32);
        s.player.holding = 32;
        s.player.highest_value = 32;
        s.select_cache(cell, now).unwrap();
        assert_eq!(s.player.highest_value, 64);
        assert!(s.celebrating(now));
        assert!(!s.celebrating(now + Duration::from_secs(5)));
    }

    #[test]
    fn test_highest_never_decreases() {
        let now = Instant::now();
        let mut s = centered();
        let cells: Vec<_> = CellCoord::new(0, 0).window(1).collect();
        for (i, &cell) in cells.iter().enumerate() {
            place(&mut s, cell, [1, 2, 2, 4, 0, 8, 8, 1, 2][i]);
        }
        let mut last = s.player.highest_value;
        for round in 0..50 {
            let cell = cells[(round * 7) % cells.len()];
            let _ = s.select_cache(cell, now);
            assert!(s.player.highest_value >= last);
            last = s.player.highest_value;
        }
    }

    #[test]
    fn test_movement_recomputes_and_saves() {
        let mut s = session();
        s.viewport_settled();
        assert_eq!(s.slot.writes(), 0, "window recompute alone does not save");

        let intents = s.handle_key('w');
        assert!(matches!(intents[0], RenderIntent::MovePlayer { .. }));
        assert_eq!(s.slot.writes(), 1);
        let expected = s.config.origin.lat + s.config.step_degrees();
        assert!((s.player.position.lat - expected).abs() < 1e-12);

        let tile = s.grid.cell_at(s.player.position);
        assert!(s.caches.rendered().all(|c| c.chebyshev(&tile) <= s.config.view_radius));
    }

    #[test]
    fn test_invalid_fix_keeps_progress() {
        let mut s = centered();
        let start = s.player.position;
        place(&mut s, CellCoord::new(1, 1), 32);

        for bad in [GeoPoint::new(f64::NAN, f64::NAN), GeoPoint::new(1.0e6, 0.0)] {
            assert!(s.apply_movement(Movement::Fix(bad)).is_empty());
            assert_eq!(s.player.position, start);
        }
        assert_eq!(s.slot.writes(), 0);

        s.handle_key('d');
        let saved = persistence::load(&s.slot).unwrap();
        assert_eq!(saved.caches["1,1"].value, 32);
    }

    #[test]
    fn test_off_globe_save_starts_fresh() {
        let text = r#"{"playerPos":[1000000.0,0.0],"playerHolding":2,
            "caches":{"1,1":{"pos":[1,1],"value":8}},"highestValue":8,"movementMode":"GEO"}"#;
        let mut s = GameSession::open(GameConfig::default(), MemorySlot::with_text(text), None);
        s.viewport_settled();
        assert_eq!(s.player, Player::new(s.config.origin));
        assert_eq!(s.mode(), MovementMode::Wasd);
        assert!(s.caches.rendered().all(|c| c.chebyshev(&CellCoord::new(0, 0)) <= s.config.view_radius));
    }

    #[test]
    fn test_geo_mode_ignores_keys_and_falls_back() {
        let mut s = session();
        s.player.position = GeoPoint::new(0.0, 0.0);
        assert_eq!(s.toggle_mode(), MovementMode::Geo);
        assert!(s.handle_key('w').is_empty());

        // No feed configured: first poll snaps to the default position
        s.poll_location();
        assert_eq!(s.player.position, s.config.origin);
        assert_eq!(s.toggle_label(), "Switch to WASD Mode");
    }

    #[test]
    fn test_round_trip_through_session() {
        let mut s = centered();
        s.viewport_settled();
        place(&mut s, CellCoord::new(0, 0), 16);
        s.player.holding = 4;
        s.player.highest_value = 16;
        s.set_mode(MovementMode::Geo);
        let snap = s.snapshot();

        let text = persistence::serialize(&snap).unwrap();
        let restored = GameSession::open(GameConfig::default(), MemorySlot::with_text(&text), None);
        assert_eq!(restored.snapshot(), snap);
        assert_eq!(restored.mode(), MovementMode::Geo);
    }

    #[test]
    fn test_restore_does_not_write() {
        let mut s = centered();
        place(&mut s, CellCoord::new(2, 2), 4);
        s.set_mode(MovementMode::Geo);
        let text = persistence::serialize(&s.snapshot()).unwrap();

        let mut restored = GameSession::open(GameConfig::default(), MemorySlot::with_text(&text), None);
        assert_eq!(restored.slot.writes(), 0);
        restored.viewport_settled();
        assert_eq!(restored.slot.writes(), 0);

        restored.toggle_mode();
        assert_eq!(restored.slot.writes(), 1);
    }

    #[test]
    fn test_corrupt_save_starts_fresh() {
        let s = GameSession::open(GameConfig::default(), MemorySlot::with_text("{oops"), None);
        assert_eq!(s.player.position, s.config.origin);
        assert!(s.caches.is_empty());
        assert_eq!(s.mode(), MovementMode::Wasd);
    }

    #[test]
    fn test_reset() {
        let mut s = centered();
        s.viewport_settled();
        s.player.holding = 8;
        s.set_mode(MovementMode::Geo);
        assert!(s.slot.text().is_some());

        let writes = s.slot.writes();
        s.reset();
        assert!(s.slot.text().is_none());
        assert_eq!(s.slot.writes(), writes);
        assert_eq!(s.player, Player::new(s.config.origin));
        assert_eq!(s.mode(), MovementMode::Wasd);
        assert_eq!(s.status_text(), "Points: 0, Highest Value: 0, Move with WASD");
    }

    #[test]
    fn test_teardown_saves() {
        let mut s = session();
        s.teardown();
        assert_eq!(s.slot.writes(), 1);
    }
}
