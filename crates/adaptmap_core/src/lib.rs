//! # AdaptMap Core
//!
//! Sharding engine that presents one unbounded ordered map per base key
//! on top of a record store whose records have a bounded size.
//!
//! This crate provides:
//! - [`KeyCodec`] - physical record keys in value or digest form
//! - Segment index - finds the segment owning a sub-key
//! - [`SplitPolicy`] - when a segment splits, and where
//! - [`AdaptiveMapEngine`] - get, put and batch reads with optimistic
//!   concurrency on the store's record generations
//! - [`AdaptiveMap`] - the contract callers program against
//!
//! ## Example
//!
//! ```rust
//! use adaptmap_core::{AdaptiveMap, AdaptiveMapEngine, AddressingMode, MapConfig};
//! use adaptmap_store::{InMemoryStore, Value};
//! use std::sync::Arc;
//!
//! let config = MapConfig::new("test", "txns", "mapBin")
//!     .with_addressing(AddressingMode::DigestKey)
//!     .with_split_threshold(100);
//! let engine = AdaptiveMapEngine::new(Arc::new(InMemoryStore::new()), config).unwrap();
//!
//! engine.put("12345:1583001000000", 1583001000000, None, Value::from("tx")).unwrap();
//! let maps = engine.get_all(None, &["12345:1583001000000", "absent"]);
//! assert_eq!(maps[0].as_ref().unwrap().as_ref().map(|m| m.len()), Some(1));
//! assert!(matches!(maps[1], Ok(None)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod deadline;
mod engine;
mod error;
mod key;
mod map;
mod segment;
mod split;
mod stats;

pub use config::{BatchPolicy, MapConfig, RetryConfig, DEFAULT_SPLIT_THRESHOLD};
pub use engine::AdaptiveMapEngine;
pub use error::{CoreError, CoreResult};
pub use key::{check_base_key, AddressingMode, KeyCodec};
pub use map::{AdaptiveMap, BatchResult};
pub use segment::{PendingSplit, SegmentInfo, SegmentRecord, RESERVED_BINS};
pub use split::{SplitPolicy, SplitStrategy};
pub use stats::{EngineStats, StatsSnapshot};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
