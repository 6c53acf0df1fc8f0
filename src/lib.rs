#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                             Cache (facade)                           │
//! │                                                                      │
//! │  get/put ──▶ ┌─────────────┐     record     ┌────────────────────┐   │
//! │              │ EntryStore  │ ─────────────▶ │   AccessBuffer     │   │
//! │              │ (sharded)   │                │ (striped rings)    │   │
//! │              └─────────────┘                └─────────┬──────────┘   │
//! │                     ▲                                 │ drain        │
//! │                     │ evict                           ▼              │
//! │              ┌──────┴──────┐   admission    ┌────────────────────┐   │
//! │              │   Policy    │ ◀───────────── │  FrequencySketch   │   │
//! │              │ (W-TinyLFU) │                │ (4-bit counters)   │   │
//! │              └─────────────┘                └────────────────────┘   │
//! │                                                                      │
//! │  MaintenanceWorker: expiration sweep · refresh fan-out · drains      │
//! │  StatsCounter: hit/miss/eviction/load atomics                        │
//! │  ListenerSet: put/remove/evict/expire/load callbacks                 │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module map
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`config`] | configuration value object and validation |
//! | [`error`] | configuration and load error types |
//! | [`events`] | listener trait and eviction reasons |
//! | [`profile`] | workload presets and the runtime registry |
//! | [`stats`] | statistics counters and snapshots |
//! | `cache` (root re-export) | the facade orchestrating everything |
//! | internal | intrusive list, policies, sketch, buffer, store, scheduler |

/// Cache configuration value object and loader/weigher type aliases.
pub mod config;

/// Error taxonomy: builder-time configuration errors and load failures.
pub mod error;

/// Event listener contract and eviction reasons.
pub mod events;

/// Workload profiles and the custom preset registry.
pub mod profile;

/// Statistics counters and the snapshot type.
pub mod stats;

mod buffer;
mod builder;
mod cache;
mod clock;
mod entry;
mod fifo;
mod lfu;
mod list;
mod lru;
mod policy;
mod scheduler;
mod sketch;
mod store;
mod tinylfu;

pub use builder::CacheBuilder;
pub use cache::Cache;
pub use config::CacheConfig;
pub use error::{ConfigurationError, LoadError};
pub use events::{EventListener, EvictionReason};
pub use policy::EvictionStrategy;
pub use profile::{Profile, ProfileRegistry, ProfileSettings};
pub use sketch::SketchVariant;
pub use stats::CacheStats;
