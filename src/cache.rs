//! Cache field with deterministic lazy spawning and a render window
//!
//! Caches are spawned on demand as the view window sweeps over the grid. Whether
//! a cell hosts a cache, and its starting value, come from the cell's luck value,
//! so the world never needs to be generated ahead of time. The field tracks
//! which caches are currently rendered and reports changes as render intents.

use std::collections::{BTreeSet, HashMap};

use crate::config::{GameConfig, RetentionPolicy};
use crate::grid::CellCoord;
use crate::luck::{luck, luck_salted};
use crate::render::RenderIntent;

/// A value-holding cache bound to one cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cache {
    pub pos: CellCoord,
    /// 0 means empty: it can be dropped into but yields nothing.
    pub value: u32,
}

impl Cache {
    pub fn is_empty(&self) -> bool {
        self.value == 0
    }
}

/// Lifecycle state of a single cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellState {
    Unvisited,
    Spawned(Cache),
}

/// All known caches plus the set currently on screen.
pub struct CacheField {
    /// Known caches by cell (the persisted set)
    caches: HashMap<CellCoord, Cache>,
    /// Cells currently materialized on screen
    rendered: BTreeSet<CellCoord>,
    spawn_probability: f64,
    salt_value_draw: bool,
    retention: RetentionPolicy,
}

impl CacheField {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            caches: HashMap::new(),
            rendered: BTreeSet::new(),
            spawn_probability: config.spawn_probability,
            salt_value_draw: config.salt_value_draw,
            retention: config.retention,
        }
    }

    /// Whether the luck draw places a cache at this cell.
    pub fn rolls_cache(&self, cell: CellCoord) -> bool {
        luck(&cell.key()) < self.spawn_probability
    }

    /// Starting value for a cache at this cell: 1 or 2.
    pub fn spawn_value(&self, cell: CellCoord) -> u32 {
        let key = cell.key();
        let draw = if self.salt_value_draw {
            luck_salted(&key, "value")
        } else {
            luck(&key)
        };
        1 + ((draw * 100.0).floor() as u32) % 2
    }

    /// Create a cache at `cell` with its generated value.
    ///
    /// Returns false (and changes nothing) if the cell already has one.
    pub fn spawn(&mut self, cell: CellCoord) -> bool {
        let value = self.spawn_value(cell);
        self.spawn_from_data(cell, value)
    }

    /// Create a cache with a known value, e.g. from a saved game.
    pub fn spawn_from_data(&mut self, cell: CellCoord, value: u32) -> bool {
        if self.caches.contains_key(&cell) {
            return false;
        }
        self.caches.insert(cell, Cache { pos: cell, value });
        true
    }

    pub fn state(&self, cell: CellCoord) -> CellState {
        match self.caches.get(&cell) {
            Some(cache) => CellState::Spawned(*cache),
            None => CellState::Unvisited,
        }
    }

    pub fn get(&self, cell: CellCoord) -> Option<&Cache> {
        self.caches.get(&cell)
    }

    pub fn get_mut(&mut self, cell: CellCoord) -> Option<&mut Cache> {
        self.caches.get_mut(&cell)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cache> {
        self.caches.values()
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    pub fn is_rendered(&self, cell: CellCoord) -> bool {
        self.rendered.contains(&cell)
    }

    /// Rendered cells in coordinate order.
    pub fn rendered(&self) -> impl Iterator<Item = CellCoord> + '_ {
        self.rendered.iter().copied()
    }

    /// Forget everything, including what is on screen.
    pub fn clear(&mut self) -> Vec<RenderIntent> {
        let intents = self.rendered.iter().map(|&cell| RenderIntent::Hide { cell }).collect();
        self.rendered.clear();
        self.caches.clear();
        intents
    }

    /// Recompute the render window around `tile`.
    ///
    /// The required set is every cell within Chebyshev distance `radius` of
    /// `tile`. Unvisited cells in it get their spawn roll, known caches in it are
    /// shown, and rendered caches outside it are hidden. `in_range` decides the
    /// proximity styling of every cache left on screen.
    pub fn recompute_window<F>(&mut self, tile: CellCoord, radius: u32, in_range: F) -> Vec<RenderIntent>
    where
        F: Fn(CellCoord) -> bool,
    {
        let mut intents = Vec::new();
        let mut next = BTreeSet::new();

        for cell in tile.window(radius) {
            if !self.caches.contains_key(&cell) {
                if !self.rolls_cache(cell) {
                    continue;
                }
                self.spawn(cell);
            }

            let Some(cache) = self.caches.get(&cell) else { continue };
            if self.rendered.contains(&cell) {
                intents.push(RenderIntent::Restyle { cell, in_range: in_range(cell) });
            } else {
                intents.push(RenderIntent::Show { cell, value: cache.value, in_range: in_range(cell) });
            }
            next.insert(cell);
        }

        for &cell in self.rendered.difference(&next) {
            intents.push(RenderIntent::Hide { cell });
            if self.retention == RetentionPolicy::DiscardOffscreen {
                self.caches.remove(&cell);
            }
        }

        self.rendered = next;
        intents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> CacheField {
        CacheField::new(&GameConfig::default())
    }

    fn rendered_set(f: &CacheField) -> BTreeSet<CellCoord> {
        f.rendered().collect()
    }

    #[test]
    fn test_spawn_is_idempotent() {
        let mut f = field();
        let cell = CellCoord::new(3, 4);
        assert!(f.spawn_from_data(cell, 7));
        assert!(!f.spawn(cell));
        assert!(!f.spawn_from_data(cell, 9));
        assert_eq!(f.len(), 1);
        assert_eq!(f.get(cell).map(|c| c.value), Some(7));
    }

    #[test]
    fn test_spawn_value_is_one_or_two() {
        let f = field();
        for cell in CellCoord::new(0, 0).window(15) {
            let v = f.spawn_value(cell);
            assert!(v == 1 || v == 2);
        }
    }

    #[test]
    fn test_deterministic_worlds() {
        let mut a = field();
        let mut b = field();
        let path = [CellCoord::new(0, 0), CellCoord::new(5, -3), CellCoord::new(40, 40)];
        for &tile in &path {
            a.recompute_window(tile, 6, |_| true);
            b.recompute_window(tile, 6, |_| true);
        }
        assert_eq!(a.len(), b.len());
        for cache in a.iter() {
            assert_eq!(b.get(cache.pos), Some(cache));
        }
    }

    #[test]
    fn test_window_matches_spawned_cells() {
        let mut f = field();
        let tile = CellCoord::new(-2, 9);
        f.recompute_window(tile, 4, |_| false);

        let expected: BTreeSet<_> = tile
            .window(4)
            .filter(|&c| matches!(f.state(c), CellState::Spawned(_)))
            .collect();
        assert_eq!(rendered_set(&f), expected);
        assert!(tile.window(4).all(|c| f.is_rendered(c) == expected.contains(&c)));
        assert!(expected.iter().all(|&c| f.rolls_cache(c)));
    }

    #[test]
    fn test_moving_window_hides_and_keeps_data() {
        let mut f = field();
        let start = CellCoord::new(0, 0);
        f.recompute_window(start, 3, |_| true);
        let before = rendered_set(&f);

        let far = CellCoord::new(100, 100);
        let intents = f.recompute_window(far, 3, |_| true);

        let hidden: BTreeSet<_> = intents
            .iter()
            .filter_map(|i| match i {
                RenderIntent::Hide { cell } => Some(*cell),
                _ => None,
            })
            .collect();
        assert_eq!(hidden, before);
        assert!(before.iter().all(|&c| f.get(c).is_some()));
        assert!(rendered_set(&f).iter().all(|c| c.chebyshev(&far) <= 3));
    }

    #[test]
    fn test_revisit_shows_mutated_value() {
        let mut f = field();
        let start = CellCoord::new(0, 0);
        f.recompute_window(start, 10, |_| true);
        let cell = f.rendered().next().expect("window around the origin spawns caches");
        f.get_mut(cell).unwrap().value = 32;

        f.recompute_window(CellCoord::new(500, 500), 10, |_| true);
        let intents = f.recompute_window(start, 10, |_| true);
        assert!(intents.contains(&RenderIntent::Show { cell, value: 32, in_range: true }));
    }

    #[test]
    fn test_discard_offscreen_drops_data() {
        let config = GameConfig { retention: RetentionPolicy::DiscardOffscreen, ..GameConfig::default() };
        let mut f = CacheField::new(&config);
        f.recompute_window(CellCoord::new(0, 0), 10, |_| true);
        let cell = f.rendered().next().expect("window around the origin spawns caches");
        f.get_mut(cell).unwrap().value = 32;

        f.recompute_window(CellCoord::new(500, 500), 10, |_| true);
        assert!(f.get(cell).is_none());

        // Coming back re-rolls the generated value
        f.recompute_window(CellCoord::new(0, 0), 10, |_| true);
        assert_eq!(f.get(cell).map(|c| c.value), Some(f.spawn_value(cell)));
    }

    #[test]
    fn test_restyle_on_stay() {
        let mut f = field();
        let tile = CellCoord::new(0, 0);
        f.recompute_window(tile, 10, |_| false);
        let intents = f.recompute_window(tile, 10, |_| true);
        assert_eq!(intents.len(), f.rendered().count());
        assert!(intents.iter().all(|i| matches!(i, RenderIntent::Restyle { in_range: true, .. })));
    }

    #[test]
    fn test_salted_values_still_in_range() {
        let config = GameConfig { salt_value_draw: true, ..GameConfig::default() };
        let f = CacheField::new(&config);
        for cell in CellCoord::new(0, 0).window(10) {
            assert!(matches!(f.spawn_value(cell), 1 | 2));
        }
    }
}
