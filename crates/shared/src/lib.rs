// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Meterline Shared Types and Utilities
//!
//! This crate contains the platform vocabulary shared across the Meterline
//! workspace: status enums and their transition rules, pricing-model and
//! rating-source enums, and database utilities.

pub mod db;
pub mod types;

pub use db::*;
pub use types::*;
