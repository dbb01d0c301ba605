pub mod aggregator;
pub mod countmin;
pub mod db;
pub mod hll;
pub mod registry;

pub use aggregator::{Slot, StatsAggregator};
pub use countmin::CountMinSketch;
pub use db::WindowedStatsDB;
pub use hll::Hll;
pub use registry::StatsRegistry;
