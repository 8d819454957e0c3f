//! Per-user build state.
//!
//! All check-and-set operations go through `DashSet::insert`/`remove`, which
//! are atomic per key, so two tasks can never both believe they own a user.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashSet;

/// Tracks which users are being built, waiting for the tick, or queued.
#[derive(Debug, Default)]
pub struct BuildTracker {
    in_progress: DashSet<String>,
    scheduled: DashSet<String>,
    /// Users with a `BuildJob::User` sitting in the job queue.
    queued: DashSet<String>,
    full_rebuild: Arc<AtomicBool>,
    /// A full rebuild was requested while the slot was held.
    rerun_requested: AtomicBool,
}

impl BuildTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `user` in progress. Returns `None` if it already was.
    pub fn try_begin(&self, user: &str) -> Option<InProgressGuard<'_>> {
        if self.in_progress.insert(user.to_string()) {
            Some(InProgressGuard {
                tracker: self,
                user: user.to_string(),
            })
        } else {
            None
        }
    }

    pub fn is_in_progress(&self, user: &str) -> bool {
        self.in_progress.contains(user)
    }

    /// Adds `user` to the scheduled set. Returns false if already there.
    pub fn schedule(&self, user: &str) -> bool {
        self.scheduled.insert(user.to_string())
    }

    /// Removes `user` from the scheduled set. Returns false if it was not
    /// there (another drain took it first).
    pub fn unschedule(&self, user: &str) -> bool {
        self.scheduled.remove(user).is_some()
    }

    pub fn is_scheduled(&self, user: &str) -> bool {
        self.scheduled.contains(user)
    }

    /// Point-in-time copy of the scheduled set.
    pub fn scheduled_snapshot(&self) -> Vec<String> {
        self.scheduled.iter().map(|user| user.key().clone()).collect()
    }

    /// Marks `user` queued. Returns false if a job for it is already queued.
    pub fn mark_queued(&self, user: &str) -> bool {
        self.queued.insert(user.to_string())
    }

    pub fn unmark_queued(&self, user: &str) {
        self.queued.remove(user);
    }

    pub fn is_queued(&self, user: &str) -> bool {
        self.queued.contains(user)
    }

    /// Claims the single full rebuild slot.
    pub fn try_begin_full_rebuild(&self) -> Option<FullRebuildGuard> {
        self.full_rebuild
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| FullRebuildGuard {
                flag: Arc::clone(&self.full_rebuild),
            })
    }

    /// True while a full rebuild is queued or running.
    pub fn is_full_rebuild_active(&self) -> bool {
        self.full_rebuild.load(Ordering::SeqCst)
    }

    /// Records that another full rebuild must follow the active one.
    pub fn request_rerun(&self) {
        self.rerun_requested.store(true, Ordering::SeqCst);
    }

    /// Clears a pending rerun. Returns whether one was pending.
    pub fn take_rerun(&self) -> bool {
        self.rerun_requested.swap(false, Ordering::SeqCst)
    }

    pub fn is_rerun_requested(&self) -> bool {
        self.rerun_requested.load(Ordering::SeqCst)
    }
}

/// RAII guard that clears a user's in-progress mark on drop.
///
/// Dropping covers every exit path: success, error return and unwinding.
#[derive(Debug)]
pub struct InProgressGuard<'a> {
    tracker: &'a BuildTracker,
    user: String,
}

impl InProgressGuard<'_> {
    pub fn user(&self) -> &str {
        &self.user
    }
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.tracker.in_progress.remove(&self.user);
    }
}

/// Owned guard for the full rebuild slot.
///
/// Travels inside the queued job, so the slot stays claimed from
/// scheduling until the rebuild finishes (or the job is dropped unsent).
#[derive(Debug)]
pub struct FullRebuildGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for FullRebuildGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
