//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Application-relative path
//!     → router.rs (cache lookup, then pattern scan)
//!     → pattern.rs (evaluate each URL pattern)
//!     → Return: servlet name + applicable filter names, or NoMatch
//!
//! Route tables (at install):
//!     descriptor mappings
//!     → compile UrlPatterns
//!     → publish as an immutable snapshot
//! ```
//!
//! # Design Decisions
//! - Longest pattern string wins; ties go to the first declared
//! - Snapshots are swapped, never mutated, so lookups take no locks
//! - Deterministic: same tables and path always resolve the same way

pub mod pattern;
pub mod router;

pub use pattern::UrlPattern;
pub use router::PatternRouter;
