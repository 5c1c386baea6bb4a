//! Presentation commands emitted by the game core.
//!
//! The core never owns visual objects. It describes what should change on
//! screen and the front end keeps its own cell -> visual mapping.

use crate::grid::{CellCoord, GeoPoint};

#[derive(Clone, Debug, PartialEq)]
pub enum RenderIntent {
    /// Materialize a cache rectangle and its value label.
    Show { cell: CellCoord, value: u32, in_range: bool },
    /// Remove a cache's visuals (its data may still exist).
    Hide { cell: CellCoord },
    /// Recolor a visible cache: blue when reachable, grey otherwise.
    Restyle { cell: CellCoord, in_range: bool },
    /// Update a visible cache's label.
    Relabel { cell: CellCoord, value: u32 },
    MovePlayer { position: GeoPoint },
    SetView { center: GeoPoint },
}

impl RenderIntent {
    /// Cell this intent targets, if any.
    pub fn cell(&self) -> Option<CellCoord> {
        match self {
            RenderIntent::Show { cell, .. }
            | RenderIntent::Hide { cell }
            | RenderIntent::Restyle { cell, .. }
            | RenderIntent::Relabel { cell, .. } => Some(*cell),
            RenderIntent::MovePlayer { .. } | RenderIntent::SetView { .. } => None,
        }
    }
}

/// Something that can apply render intents (the map surface).
pub trait RenderSurface {
    fn apply(&mut self, intent: &RenderIntent);

    fn apply_all(&mut self, intents: &[RenderIntent]) {
        for intent in intents {
            self.apply(intent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<RenderIntent>);

    impl RenderSurface for Recorder {
        fn apply(&mut self, intent: &RenderIntent) {
            self.0.push(intent.clone());
        }
    }

    #[test]
    fn test_apply_all_keeps_order() {
        let cell = CellCoord::new(1, -1);
        let intents = vec![
            RenderIntent::Show { cell, value: 1, in_range: true },
            RenderIntent::MovePlayer { position: GeoPoint::new(0.0, 0.0) },
            RenderIntent::Hide { cell },
        ];
        let mut r = Recorder::default();
        r.apply_all(&intents);
        assert_eq!(r.0, intents);
        assert_eq!(intents[0].cell(), Some(cell));
        assert_eq!(intents[1].cell(), None);
    }
}
