//! Closure cache build orchestration.
//!
//! Keeps per-user closure records fresh under tuple mutations:
//!
//! 1. **Per-user builds**: at most one build per user is ever in flight.
//!    A request for a user already being built is deferred to the
//!    `scheduled` set instead of running twice.
//! 2. **Periodic tick**: drains `scheduled`, so every deferred request is
//!    followed by exactly one later build.
//! 3. **Full rebuilds**: page through every namespace and end user and
//!    rewrite each user's record unconditionally. Only one full rebuild
//!    runs or waits in the queue at a time.
//!
//! Asynchronous requests go through an unbounded job queue consumed by a
//! fixed pool of worker tasks; see [`CacheBuildOrchestrator::start`].

mod orchestrator;
mod tracker;


use std::time::Duration;

pub use orchestrator::CacheBuildOrchestrator;
pub use tracker::{BuildTracker, InProgressGuard};

use crate::config::UserRelationSettings;

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderConfig {
    /// Master switch; when false every operation is a no-op.
    pub enabled: bool,
    /// Rebuild on tuple mutation.
    pub update_on_acl_change: bool,
    /// Period of the deferred-build tick.
    pub scheduled_period: Duration,
    /// Page size for full rebuild listings.
    pub page_size: u32,
    /// Number of worker tasks.
    pub workers: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self::from(&UserRelationSettings::default())
    }
}

impl From<&UserRelationSettings> for BuilderConfig {
    fn from(settings: &UserRelationSettings) -> Self {
        Self {
            enabled: settings.enabled,
            update_on_acl_change: settings.update_on_acl_change,
            scheduled_period: settings.scheduled_period(),
            page_size: settings.page_size,
            workers: settings.workers,
        }
    }
}

impl BuilderConfig {
    /// A disabled configuration.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}
