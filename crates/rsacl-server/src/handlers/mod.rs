//! Transport-agnostic request handlers.
//!
//! - [`CheckHandler`]: permission checks answered from the closure cache
//!   when it is usable for the user, otherwise resolved live
//! - [`WriteHandler`]: tuple writes and deletes that trigger cache rebuilds

mod check;
mod write;

pub use check::{CheckHandler, CheckRequest, CheckResponse, CheckSource};
pub use write::{RebuildTrigger, WriteHandler, WriteOutcome};
