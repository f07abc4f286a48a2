//! Analysis modules.
//!
//! Classification of rating columns, cohort partitioning, and rating
//! aggregation. Everything here is synchronous and deterministic except the
//! external classifier call, which goes through the guarded summarizer.

pub mod aggregator;
pub mod classifier;
pub mod cohort;

pub use aggregator::aggregate_all;
pub use classifier::{classify, feedback_columns};
pub use cohort::{find_grouping_column, partition};
