pub mod arena;
pub mod compaction;
pub mod eviction;
pub mod tiers;

pub use arena::RecordArena;
pub use compaction::{
    CompressionConfig, CompressionEngine, CompressionPass, CompressionReport, MergeStrategy,
};
pub use eviction::EvictionPolicy;
pub use tiers::{Admission, Tier, TierConfig};
