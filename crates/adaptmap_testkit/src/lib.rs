//! # AdaptMap Testkit
//!
//! Test utilities for AdaptMap.
//!
//! This crate provides:
//! - Engine fixtures over in-memory and fault-injecting stores
//! - Property-based test generators using proptest
//! - A reference model that tracks what every map should contain
//! - Stress testing utilities for concurrent writers and readers
//!
//! ## Usage
//!
//! ```rust
//! use adaptmap_testkit::prelude::*;
//! use adaptmap_store::Value;
//!
//! with_engine(10, AddressingMode::ValueKey, |engine| {
//!     engine.put("k", 1, None, Value::Int(1)).unwrap();
//!     check_partition(engine, "k", 10);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod model;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::model::*;
    pub use crate::stress::*;
    pub use adaptmap_core::{AdaptiveMap, AddressingMode};
}

pub use fixtures::*;
pub use generators::*;
pub use model::*;
pub use stress::*;
