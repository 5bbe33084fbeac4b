//! Shared test utilities for datakit integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated engines backed by temp directories and a manual clock
//! - `Gate` plus gated parser and deduplicator doubles for holding tasks in `running`

pub mod gates;
pub mod harness;

pub use gates::{Gate, GatedDeduplicator, GatedParser};
pub use harness::TestHarness;
