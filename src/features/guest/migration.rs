//! ゲストデータ移行
//!
//! ログイン時に、端末内に残っているゲストのレシートをアカウントへ移す。
//! 成功件数を確定させるため、1件ずつ順番に処理する。

use super::local_store::LocalStore;
use crate::features::ledger::prompt::UserPrompt;
use crate::features::receipts::models::Receipt;
use crate::features::receipts::repository::RemoteDatabase;
use crate::features::receipts::storage::ObjectStorage;
use crate::features::receipts::store::sync_new_receipt;
use crate::shared::errors::AppResult;
use chrono::Utc;
use log::{error, info, warn};
use std::time::{Duration, Instant};

/// 移行結果
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationResult {
    /// 総アイテム数
    pub total_items: usize,
    /// 成功数
    pub success_count: usize,
    /// エラー詳細（レシートIDとメッセージ）
    pub errors: Vec<(String, String)>,
    /// 実行時間
    pub duration: Duration,
}

impl MigrationResult {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// ユーザーに表示する結果メッセージ
    pub fn summary_message(&self) -> String {
        if self.success_count > 0 {
            format!("{}件のレシートを同期しました", self.success_count)
        } else {
            "レシートの同期に失敗しました".to_string()
        }
    }
}

/// 移行の提案結果
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationOffer {
    /// ゲストデータがない
    NothingToMigrate,
    /// 同期が承認された
    Accepted(Vec<Receipt>),
    /// 同期を断った（`discarded` は端末内データを削除したか）
    Declined { discarded: bool },
}

/// 端末内にゲストデータがあれば移行を提案する
pub async fn offer_migration(
    local_store: &dyn LocalStore,
    prompt: &dyn UserPrompt,
) -> AppResult<MigrationOffer> {
    let receipts = local_store.guest_receipts()?;
    if receipts.is_empty() {
        return Ok(MigrationOffer::NothingToMigrate);
    }

    info!("ゲストデータが見つかりました: count={}", receipts.len());
    let message = format!(
        "ゲストセッションのレシートが{}件あります。\n\nアカウントに保存しますか？",
        receipts.len()
    );
    if prompt.confirm(&message).await {
        return Ok(MigrationOffer::Accepted(receipts));
    }

    // 断られた場合は端末内データを消すか尋ねる
    let discard = prompt
        .confirm(
            "ゲストのレシートを削除しますか？\n\nキャンセルすると端末内に残ります（アカウントからは見えません）。",
        )
        .await;
    if discard {
        local_store.clear_guest_receipts()?;
        info!("ゲストデータを破棄しました");
    } else {
        info!("ゲストデータを端末内に残しました");
    }
    Ok(MigrationOffer::Declined { discarded: discard })
}

/// レシートを1件ずつアカウントへ保存する
///
/// 1件の失敗で全体を中断しない
pub async fn migrate_receipts(
    database: &dyn RemoteDatabase,
    storage: &dyn ObjectStorage,
    owner_id: &str,
    receipts: &[Receipt],
) -> MigrationResult {
    let start_time = Instant::now();
    let mut success_count = 0;
    let mut errors = Vec::new();
    let mut last_timestamp = 0_i64;

    info!("ゲストデータの移行を開始します: count={}", receipts.len());

    for receipt in receipts {
        // 同一ミリ秒でもオブジェクトキーが重複しないようにする
        let timestamp = Utc::now().timestamp_millis().max(last_timestamp + 1);
        last_timestamp = timestamp;

        match sync_new_receipt(database, storage, owner_id, receipt, timestamp).await {
            Ok(_) => success_count += 1,
            Err(e) => {
                error!(
                    "レシートの移行に失敗しました: id={}, merchant={}, error={e}",
                    receipt.id, receipt.merchant_name
                );
                errors.push((receipt.id.clone(), e.to_string()));
            }
        }
    }

    let result = MigrationResult {
        total_items: receipts.len(),
        success_count,
        errors,
        duration: start_time.elapsed(),
    };
    info!(
        "ゲストデータの移行が完了しました: 成功={}, 失敗={}, duration={:?}",
        result.success_count,
        result.error_count(),
        result.duration
    );
    result
}

/// 移行結果を通知し、1件でも成功していれば端末内データを消す
///
/// # 戻り値
/// 一覧の再読み込みが必要な場合はtrue
pub async fn report_migration(
    result: &MigrationResult,
    local_store: &dyn LocalStore,
    prompt: &dyn UserPrompt,
) -> AppResult<bool> {
    prompt.alert(&result.summary_message()).await;
    if result.success_count > 0 {
        local_store.clear_guest_receipts()?;
        Ok(true)
    } else {
        warn!("移行に成功したレシートがありません。端末内データを残します");
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::guest::local_store::MemoryLocalStore;
    use crate::shared::test_support::{
        sample_receipt, FakeObjectStorage, FakeRemoteDatabase, ScriptedPrompt,
    };

    #[tokio::test]
    async fn test_no_guest_data() {
        let store = MemoryLocalStore::new();
        let prompt = ScriptedPrompt::new(vec![]);

        let offer = offer_migration(&store, &prompt).await.unwrap();
        assert_eq!(offer, MigrationOffer::NothingToMigrate);
        assert!(prompt.confirmations().is_empty());
    }

    #[tokio::test]
    async fn test_decline_then_keep() {
        let store = MemoryLocalStore::new();
        store
            .save_guest_receipts(&[sample_receipt("g-1", 1.0)])
            .unwrap();
        let prompt = ScriptedPrompt::new(vec![false, false]);

        let offer = offer_migration(&store, &prompt).await.unwrap();
        assert_eq!(offer, MigrationOffer::Declined { discarded: false });
        assert_eq!(store.guest_receipts().unwrap().len(), 1);
        assert_eq!(prompt.confirmations().len(), 2);
    }

    #[tokio::test]
    async fn test_decline_then_discard() {
        let store = MemoryLocalStore::new();
        store
            .save_guest_receipts(&[sample_receipt("g-1", 1.0)])
            .unwrap();
        let prompt = ScriptedPrompt::new(vec![false, true]);

        let offer = offer_migration(&store, &prompt).await.unwrap();
        assert_eq!(offer, MigrationOffer::Declined { discarded: true });
        assert!(store.guest_receipts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_loop() {
        let database = FakeRemoteDatabase::new();
        database.fail_inserts_for("g-1");
        let storage = FakeObjectStorage::new();
        let receipts = vec![
            sample_receipt("g-1", 1.0),
            sample_receipt("g-2", 2.0),
            sample_receipt("g-3", 3.0),
        ];

        let result = migrate_receipts(&database, &storage, "u-1", &receipts).await;

        assert_eq!(result.total_items, 3);
        assert_eq!(result.success_count, 2);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors[0].0, "g-1");

        // 順番に処理され、キーは重複しない
        let keys = storage.uploaded_keys();
        assert_eq!(keys.len(), 3);
        let mut unique = keys.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);
        assert!(keys.iter().all(|k| k.starts_with("u-1/")));
    }

    #[tokio::test]
    async fn test_report_keeps_store_when_nothing_succeeded() {
        let store = MemoryLocalStore::new();
        store
            .save_guest_receipts(&[sample_receipt("g-1", 1.0)])
            .unwrap();
        let prompt = ScriptedPrompt::new(vec![]);
        let result = MigrationResult {
            total_items: 1,
            success_count: 0,
            errors: vec![("g-1".to_string(), "boom".to_string())],
            duration: Duration::ZERO,
        };

        let reload = report_migration(&result, &store, &prompt).await.unwrap();

        assert!(!reload);
        assert_eq!(store.guest_receipts().unwrap().len(), 1);
        assert_eq!(prompt.alerts(), vec!["レシートの同期に失敗しました".to_string()]);
    }

    #[tokio::test]
    async fn test_report_clears_store_on_success() {
        let store = MemoryLocalStore::new();
        store
            .save_guest_receipts(&[sample_receipt("g-1", 1.0)])
            .unwrap();
        let prompt = ScriptedPrompt::new(vec![]);
        let result = MigrationResult {
            total_items: 1,
            success_count: 1,
            errors: vec![],
            duration: Duration::ZERO,
        };

        assert!(report_migration(&result, &store, &prompt).await.unwrap());
        assert!(store.guest_receipts().unwrap().is_empty());
        assert_eq!(prompt.alerts(), vec!["1件のレシートを同期しました".to_string()]);
    }
}
