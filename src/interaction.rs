//! Pickup, drop and merge rules for caches.
//!
//! Works on plain values so the rules can be checked without a session.
//! The proximity gate is evaluated first; no state changes on any error.

use crate::cache::Cache;
use crate::grid::{CellCoord, GeoPoint, WorldGrid};

/// Why an interaction was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InteractionError {
    #[error("Too far away! ({distance_m:.0} m)")]
    OutOfRange { distance_m: f64 },
    #[error("Non-pair numbers cannot be combined ({holding} vs {cache})")]
    NonPairValues { holding: u32, cache: u32 },
    #[error("Value too large to combine ({value} + {value})")]
    Overflow { value: u32 },
    #[error("No cache at {0}")]
    NoCache(CellCoord),
}

/// What a successful interaction did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionOutcome {
    PickedUp { value: u32 },
    Dropped { value: u32 },
    Merged { value: u32 },
}

impl InteractionOutcome {
    /// Value now in the cache.
    pub fn cache_value(&self) -> u32 {
        match *self {
            InteractionOutcome::PickedUp { .. } => 0,
            InteractionOutcome::Dropped { value } | InteractionOutcome::Merged { value } => value,
        }
    }
}

/// Player side of an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hand {
    pub holding: u32,
    pub highest_value: u32,
}

/// Whether `cell`'s center is strictly closer than `radius_m` to `player`.
pub fn within_reach(grid: &WorldGrid, player: GeoPoint, cell: CellCoord, radius_m: f64) -> Result<(), InteractionError> {
    let distance_m = player.distance_to(&grid.cell_center(cell));
    if distance_m < radius_m {
        Ok(())
    } else {
        Err(InteractionError::OutOfRange { distance_m })
    }
}

/// Apply the merge rules to a cache. Returns the outcome and whether the
/// highest value was raised by this call.
///
/// Exactly one rule runs: pick up into an empty hand, drop into an empty
/// cache, merge equal values, or refuse. On success `hand.highest_value`
/// also catches up with the value that was held.
pub fn apply(hand: &mut Hand, cache: &mut Cache) -> Result<(InteractionOutcome, bool), InteractionError> {
    let merged = if hand.holding != 0 && cache.value != 0 {
        if cache.value != hand.holding {
            return Err(InteractionError::NonPairValues { holding: hand.holding, cache: cache.value });
        }
        let sum = cache.value.checked_add(hand.holding);
        Some(sum.ok_or(InteractionError::Overflow { value: cache.value })?)
    } else {
        None
    };

    let mut raised = false;
    if hand.holding > hand.highest_value {
        hand.highest_value = hand.holding;
        raised = true;
    }

    let outcome = if hand.holding == 0 {
        let value = cache.value;
        hand.holding = value;
        cache.value = 0;
        InteractionOutcome::PickedUp { value }
    } else if let Some(value) = merged {
        cache.value = value;
        hand.holding = 0;
        if cache.value > hand.highest_value {
            hand.highest_value = cache.value;
            raised = true;
        }
        InteractionOutcome::Merged { value }
    } else {
        cache.value = hand.holding;
        hand.holding = 0;
        InteractionOutcome::Dropped { value: cache.value }
    };

    Ok((outcome, raised))
}
