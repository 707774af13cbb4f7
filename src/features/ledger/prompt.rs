use async_trait::async_trait;
use std::time::Duration;

/// ユーザーの判断を待つ境界（モーダルダイアログ）
///
/// 呼び出し元の処理だけを中断し、イベントループは止めない
#[async_trait]
pub trait UserPrompt: Send + Sync {
    /// はい／いいえを尋ねる
    async fn confirm(&self, message: &str) -> bool;

    /// 通知を表示し、閉じられるまで待つ
    async fn alert(&self, message: &str);

    /// 寄付のお願いを遅延表示する（待たない）
    fn schedule_donation_prompt(&self, delay: Duration);
}
