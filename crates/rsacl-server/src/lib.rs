//! rsacl-server: Closure cache orchestration and request handlers
//!
//! This crate wires the domain and storage layers together:
//! - Configuration management
//! - Storage to domain adapters
//! - Closure cache build orchestrator with worker pool and periodic tick
//! - Check handler with cache fallback
//! - Write handler that triggers rebuilds
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rsacl-server                   │
//! ├─────────────────────────────────────────────┤
//! │  config.rs        - Configuration           │
//! │  observability.rs - Logging & metrics       │
//! │  adapters.rs      - DataStore bridges       │
//! │  builder/         - Cache build scheduling  │
//! │  handlers/        - Check & write           │
//! └─────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod builder;
pub mod config;
pub mod handlers;
pub mod observability;

// Re-exports for convenience
pub use adapters::{DataStoreClosureCache, DataStoreTupleReader};
pub use builder::{BuilderConfig, CacheBuildOrchestrator};
pub use config::{ConfigLoadError, ServerConfig};
pub use handlers::{
    CheckHandler, CheckRequest, CheckResponse, CheckSource, RebuildTrigger, WriteHandler,
    WriteOutcome,
};
