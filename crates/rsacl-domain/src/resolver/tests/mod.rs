//! Tests for the resolver module.
//!
//! Organized by functionality:
//! - Closure expansion (nesting, leaves, cycles, order independence)
//! - Direct relation checks (users, wildcards, usersets)
