//! Manifest-driven verification runs for the texel harness
//!
//! A scenario manifest is a YAML list of identity runs. Each run names its
//! extent, texel format, fill and expected values, and how many mismatches it
//! is expected to produce.

pub mod runner;
pub mod scenario;
