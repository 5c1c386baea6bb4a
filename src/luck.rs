//! Deterministic luck values for world generation
//!
//! Maps a string key (usually a cell key like `"3,-7"`) to a float in `[0, 1)`.
//! The same key always yields the same value, across restarts and platforms,
//! so spawn decisions can be recomputed instead of stored.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Get the luck value for a key, in `[0, 1)`.
pub fn luck(key: &str) -> f64 {
    let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(key));
    rng.gen::<f64>()
}

/// Luck value for a key combined with a salt.
///
/// Different salts give independent draws for the same key.
pub fn luck_salted(key: &str, salt: &str) -> f64 {
    luck(&format!("{}:{}", key, salt))
}

/// Fold a key into a 64-bit seed.
///
/// FNV-1a rather than `DefaultHasher`: the std hasher's algorithm may change
/// between toolchains and saved worlds must keep their layout.
fn derive_seed(key: &str) -> u64 {
    key.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
    })
}
