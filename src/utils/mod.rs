//! Utility functions and types

mod parallel;
pub mod data_loader;

pub use data_loader::{DataLoader, Dataset};
pub use parallel::{try_parallel_map, ParallelConfig};
