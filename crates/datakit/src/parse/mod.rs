//! Parse task tracking: drives a file from uploaded to parsed.

pub mod task;
pub mod tracker;

pub use task::{ParseSubmission, ParseTask};
pub use tracker::ParseTaskTracker;
