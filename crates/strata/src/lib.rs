//! Strata - tiered memory store for agents and applications
//!
//! Records live in one canonical arena and are placed into several
//! overlapping tiers with their own capacity and eviction policy. Useful
//! records are promoted, near duplicates are consolidated, and similarity
//! comes from a pluggable `SimilarityPort`.

pub mod config;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod storage;
pub mod testing;

pub use error::StrataError;
pub use memory::MemoryManager;
