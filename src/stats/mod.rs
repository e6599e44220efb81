//! Per-round statistics aggregation.
//!
//! Timelines from every client are scanned as an unordered set; a request
//! counts as successful only when all three of its timestamps are set.

mod aggregator;

pub use aggregator::{Aggregator, RoundData, RoundMetrics};
