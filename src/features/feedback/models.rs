use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// フィードバック本文の最大文字数
pub const MAX_FEEDBACK_CHARS: usize = 1000;

/// `feedback` テーブルの行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub user_id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
