use super::models::{FeedbackEntry, MAX_FEEDBACK_CHARS};
use crate::features::receipts::repository::RemoteDatabase;
use crate::shared::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};

/// フィードバック本文を検証する
///
/// # 戻り値
/// 前後の空白を除いた本文
pub fn validate_feedback(message: &str) -> AppResult<String> {
    let message = message.trim();
    if message.is_empty() {
        return Err(AppError::validation("フィードバックを入力してください"));
    }
    if message.chars().count() > MAX_FEEDBACK_CHARS {
        return Err(AppError::validation(format!(
            "フィードバックは{MAX_FEEDBACK_CHARS}文字以内で入力してください"
        )));
    }
    Ok(message.to_string())
}

/// フィードバックを送信する
pub async fn submit_feedback(
    database: &dyn RemoteDatabase,
    user_id: &str,
    message: &str,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let message = validate_feedback(message)?;
    let entry = FeedbackEntry {
        user_id: user_id.to_string(),
        message,
        created_at: now,
    };
    database.insert_feedback(&entry).await
}
