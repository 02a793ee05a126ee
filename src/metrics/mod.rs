//! Counter discovery, sampling and utilization derivation.
//!
//! Discovery (`topology`, `hwmon`) runs once at startup. Each tick the
//! `reader` re-reads the counter sources, `usage` diffs them against the
//! previous samples held in the `store`, and the `collector` assembles the
//! resulting snapshot.

pub mod collector;
pub mod data;
pub mod hwmon;
pub mod reader;
pub mod store;
pub mod topology;
pub mod traits;
pub mod usage;

// Re-export commonly used items
pub use collector::{discover, Discovery, SystemCollector};
pub use data::SystemSnapshot;
pub use traits::MetricsProvider;
