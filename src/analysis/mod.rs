//! Analysis modules.
//!
//! Turns fetched statistics into chart-ready series.

pub mod aggregator;

pub use aggregator::*;
