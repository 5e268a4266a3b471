#![allow(clippy::needless_range_loop, clippy::manual_range_contains)]
// Shared math, on-disk level formats and console variables

pub mod q_shared;
pub mod qfiles;
pub mod cvar;
