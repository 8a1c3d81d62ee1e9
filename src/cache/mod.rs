//! Reuse of transformed data across plan rows
//!
//! Consecutive plan rows usually share their leading stage choices. The
//! [`PrefixCache`] keeps the transformed data for the current leading run so
//! that only the stages after the first differing choice are refitted.

mod prefix;

pub use prefix::{CacheStats, PrefixCache};
