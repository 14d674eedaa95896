//! Error handling for stamp detection.

mod constructors;
mod types;

pub use constructors::SimpleError;
pub use types::{ProcessingStage, StampError, StampResult, StrategyFailure};
