//! # AdaptMap Store
//!
//! The record store collaborator consumed by the AdaptMap engine.
//!
//! A record store is a remote key-value service holding records made of
//! named bins. Every record carries a **generation** that the store bumps
//! on each mutation; writers may make a write conditional on the
//! generation they last observed (optimistic concurrency).
//!
//! ## Design Principles
//!
//! - Stores know nothing about segments, splits or logical maps
//! - All mutation is conditional on generations, never on client locks
//! - Must be `Send + Sync` so one client can serve many callers
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - In-process store for tests and the CLI harness
//! - [`FaultInjectingStore`] - Wrapper that injects latency and failures
//!
//! ## Example
//!
//! ```rust
//! use adaptmap_store::{InMemoryStore, ReadPolicy, RecordKey, RecordStore, Value, WritePolicy};
//!
//! let store = InMemoryStore::new();
//! let key = RecordKey::text("test", "demo", "customer:1");
//! let generation = store
//!     .put_map_entry(&key, "map", 7, Value::from("seven"), &WritePolicy::default())
//!     .unwrap();
//! assert_eq!(generation, 1);
//!
//! let record = store.get(&key, &ReadPolicy::default()).unwrap().unwrap();
//! assert_eq!(record.map("map").unwrap().get(&7), Some(&Value::from("seven")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod faulty;
mod memory;
mod policy;
mod record;
mod store;

pub use error::{StoreError, StoreResult};
pub use faulty::FaultInjectingStore;
pub use memory::InMemoryStore;
pub use policy::{
    GenerationPolicy, MapPolicy, MapWriteMode, ReadPolicy, RecordExistsAction, WritePolicy,
};
pub use record::{Record, RecordId, RecordKey, SubKey, Value, DIGEST_SIZE};
pub use store::RecordStore;
