// フィードバック機能モジュール

pub mod models;
pub mod service;

pub use models::{FeedbackEntry, MAX_FEEDBACK_CHARS};
pub use service::{submit_feedback, validate_feedback};
