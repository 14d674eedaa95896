//! Domain types shared by strategies, the selection policy and the engine.

pub mod candidate;
pub mod result;

pub use candidate::{BoundingBox, Candidate, RegionMask, StrategyKind};
pub use result::{CandidateSummary, DetectionResult, PageOutcome, StampCrop};
