//! World of Bits game library
//!
//! Deterministic cache world over a geographic grid, the merge rules, and
//! save/restore. The terminal front end lives in `explorer`.

pub mod achievement;
pub mod cache;
pub mod config;
pub mod explorer;
pub mod grid;
pub mod interaction;
pub mod luck;
pub mod movement;
pub mod persistence;
pub mod render;
pub mod session;
