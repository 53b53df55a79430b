//! Shared test utilities for flipbook integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated pipeline runs with temp directories
//! - Builders for PDFs, PNG pages and fake converter backends

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
