//! Asynchronous, cancellable code-review jobs.

pub mod engine;
pub mod tracker;

pub use engine::{HttpReviewEngine, ReviewEngine};
pub use tracker::ReviewTracker;

/// Everything the external analysis backend needs for one review.
#[derive(Debug, Clone)]
pub struct ReviewInput {
    pub project_id: String,
    pub code: String,
    pub language: String,
    pub file_path: Option<String>,
    pub context: Option<String>,
}
