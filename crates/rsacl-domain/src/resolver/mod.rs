//! Relation closure resolution and direct relation checks.
//!
//! # Architecture Decisions
//!
//! - **Explicit work list**: the closure walk uses a queue plus a visited set
//!   of `(namespace, object, relation)` positions instead of call-depth
//!   recursion. Termination comes from the visited set, not from config depth.
//!
//! - **Config snapshots**: each walk reads one immutable [`RelationTable`]
//!   snapshot, so configuration can be hot-swapped mid-flight.
//!
//! - **Scratch memo**: a [`RequestScratch`] shared across one build keeps the
//!   "which tags does this user hold directly" lookup to one query per user.
//!
//! [`RelationTable`]: crate::model::RelationTable

mod checker;
mod closure;
mod scratch;
mod traits;

#[cfg(test)]
pub(crate) mod tests;

pub use checker::TupleRelationChecker;
pub use closure::RelationClosureResolver;
pub use scratch::RequestScratch;
pub use traits::{DirectRelationChecker, Page, PageRequest, TupleReader};
