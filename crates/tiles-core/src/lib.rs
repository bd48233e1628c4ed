//! Dispatch engine for the tiles classifier.
//!
//! # Architecture
//!
//! - [`key`] derives a stable [`CacheKey`] per descriptor
//! - [`cache`] is the durable label store with TTL and LRU policy
//! - [`coordinator`] runs single-flight, epoch-scoped dispatches
//! - [`messages`] decodes the JSON protocol and routes it to the coordinator
//! - [`server`] drives the router over newline-delimited JSON streams
//! - [`config_loader`] discovers and reads the config file
//! - [`bootstrap`] wires all of the above from a [`TilesConfig`]
//!
//! [`TilesConfig`]: tiles_types::config::TilesConfig

pub mod bootstrap;
pub mod cache;
pub mod config_loader;
pub mod coordinator;
pub mod key;
pub mod messages;
pub mod server;

pub use bootstrap::{Engine, StoreKind};
pub use cache::{CacheEntry, CacheError, CacheStats, CacheStore, DurableCache, JsonFileStore, MemoryStore, PurgeReport};
pub use config_loader::{ConfigLoader, FileSettingsSource};
pub use coordinator::{DispatchCoordinator, DispatchOutcome, ProviderSet};
pub use key::{CacheKey, derive_key};
pub use messages::{MessageError, MessageRouter, Request};
