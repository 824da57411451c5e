pub mod error;
pub mod tracker;

pub use error::{Result, StateError};
pub use tracker::{ActionTag, NextAction, StateSummary, StateTracker};
