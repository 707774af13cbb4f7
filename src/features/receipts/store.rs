//! レシート一覧の保持と表示用リストの導出
//!
//! 正本の一覧は変換せずに保持し、表示用リストは表示通貨とレート表から毎回導出する。

use super::models::{Receipt, ReceiptRow};
use super::repository::RemoteDatabase;
use super::storage::{receipt_object_key, ObjectStorage};
use crate::features::currency::{convert, exchange_rate_for, RateTable};
use crate::features::guest::local_store::{GuestReceipts, LocalStore};
use crate::shared::errors::AppResult;
use crate::shared::utils::decode_data_url;
use futures::future::join_all;
use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// アップロード時のContent-Type
const RECEIPT_CONTENT_TYPE: &str = "image/jpeg";

/// 現在のセッションのレシート一覧（正本）
#[derive(Debug, Clone, Default)]
pub struct ReceiptStore {
    receipts: Vec<Receipt>,
}

impl ReceiptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&Receipt> {
        self.receipts.iter().find(|r| r.id == id)
    }

    /// 一覧を丸ごと置き換える
    pub fn replace(&mut self, receipts: Vec<Receipt>) {
        debug!("レシート一覧を置き換えます: count={}", receipts.len());
        self.receipts = receipts;
    }

    pub fn clear(&mut self) {
        self.receipts.clear();
    }

    /// 先頭に追加する（新しい順）
    pub fn prepend(&mut self, receipt: Receipt) {
        self.receipts.insert(0, receipt);
    }

    /// IDが一致するレシートを置き換える
    ///
    /// # 戻り値
    /// 置き換えた場合はtrue
    pub fn update(&mut self, receipt: Receipt) -> bool {
        match self.receipts.iter_mut().find(|r| r.id == receipt.id) {
            Some(slot) => {
                *slot = receipt;
                true
            }
            None => false,
        }
    }

    /// IDが一致するレシートを取り除く
    pub fn remove(&mut self, id: &str) -> Option<Receipt> {
        let index = self.receipts.iter().position(|r| r.id == id)?;
        Some(self.receipts.remove(index))
    }

    /// 保存パスを反映する（再読み込み時と同じ状態にそろえる）
    pub fn set_storage_path(&mut self, id: &str, storage_path: Option<String>) {
        if let Some(receipt) = self.receipts.iter_mut().find(|r| r.id == id) {
            receipt.storage_path = storage_path;
        }
    }
}

/// 端末内ストアからゲストのレシートを読み込む
pub fn load_local(local_store: &dyn LocalStore) -> AppResult<GuestReceipts> {
    let loaded = local_store.load_guest_receipts()?;
    info!(
        "端末内のレシートを読み込みました: count={}, unreadable={}",
        loaded.receipts.len(),
        loaded.unreadable
    );
    Ok(loaded)
}

/// リモートからレシートを読み込み、画像の閲覧URLを並列で解決する
///
/// すべての解決が終わってから結果を返す。解決に失敗したレシートは画像なしのまま残す。
pub async fn load_remote(
    database: &dyn RemoteDatabase,
    storage: &dyn ObjectStorage,
    signed_url_ttl: Duration,
) -> AppResult<Vec<Receipt>> {
    let rows = database.list_receipts().await?;
    let start_time = Instant::now();

    let tasks = rows
        .into_iter()
        .map(ReceiptRow::into_receipt)
        .map(|mut receipt| async move {
            if let Some(path) = receipt.storage_path.as_deref() {
                match storage.signed_url(path, signed_url_ttl).await {
                    Ok(url) => receipt.image_base64 = url,
                    Err(e) => warn!("画像URLの解決に失敗しました: id={}, error={e}", receipt.id),
                }
            }
            receipt
        });
    let receipts = join_all(tasks).await;

    info!(
        "リモートのレシートを読み込みました: count={}, duration={:?}",
        receipts.len(),
        start_time.elapsed()
    );
    Ok(receipts)
}

/// 新規レシートをリモートに保存する（画像アップロード → 行の作成）
///
/// 画像のアップロード失敗は致命的ではなく、保存パスなしで行を作成する。
///
/// # 戻り値
/// 保存できた画像のパス
pub async fn sync_new_receipt(
    database: &dyn RemoteDatabase,
    storage: &dyn ObjectStorage,
    owner_id: &str,
    receipt: &Receipt,
    timestamp_ms: i64,
) -> AppResult<Option<String>> {
    let storage_path = match decode_data_url(&receipt.image_base64) {
        Some(image) => {
            let key = receipt_object_key(owner_id, timestamp_ms);
            match storage.upload(&key, image.bytes, RECEIPT_CONTENT_TYPE).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(
                        "画像のアップロードに失敗しました。画像なしで保存します: id={}, error={e}",
                        receipt.id
                    );
                    None
                }
            }
        }
        None => {
            debug!("アップロードするインライン画像がありません: id={}", receipt.id);
            None
        }
    };

    let mut persisted = receipt.clone();
    persisted.storage_path = storage_path.clone();
    database
        .insert_receipt(&ReceiptRow::from_receipt(&persisted, owner_id))
        .await?;

    Ok(storage_path)
}

/// 表示用リストを導出する
///
/// 正本は変更しない。レート表がない場合は正本と同じ内容を返す。
pub fn display_receipts(
    receipts: &[Receipt],
    target_currency: &str,
    rates: Option<&RateTable>,
) -> Vec<Receipt> {
    let Some(rates) = rates else {
        return receipts.to_vec();
    };

    receipts
        .iter()
        .map(|receipt| {
            let mut shown = receipt.clone();
            shown.converted_amount =
                convert(receipt.amount, &receipt.currency, target_currency, Some(rates));
            shown.exchange_rate =
                exchange_rate_for(&receipt.currency, target_currency, Some(rates));
            shown.target_currency = target_currency.to_string();
            shown
        })
        .collect()
}

/// 表示用リストから詳細表示中のレシートを引く
pub fn select_receipt<'a>(display: &'a [Receipt], id: &str) -> Option<&'a Receipt> {
    display.iter().find(|r| r.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_support::{sample_receipt, FakeRemoteDatabase, FakeObjectStorage};

    fn rates() -> RateTable {
        [("EUR", 1.0), ("USD", 1.1), ("SEK", 11.0)]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_display_conversion_scenario() {
        let mut receipt = sample_receipt("r-1", 10.0);
        receipt.currency = "USD".to_string();
        let display = display_receipts(&[receipt.clone()], "SEK", Some(&rates()));

        assert!((display[0].converted_amount - 100.0).abs() < 1e-9);
        assert_eq!(display[0].target_currency, "SEK");
        // 正本は変わらない
        assert_eq!(receipt.target_currency, "EUR");
    }

    #[test]
    fn test_display_without_rates_is_identical() {
        let receipts = vec![sample_receipt("a", 1.0), sample_receipt("b", 2.0)];
        assert_eq!(display_receipts(&receipts, "SEK", None), receipts);
    }

    #[test]
    fn test_display_is_idempotent() {
        let receipts = vec![sample_receipt("a", 12.5), sample_receipt("b", 7.0)];
        let table = rates();
        let first = display_receipts(&receipts, "USD", Some(&table));
        let second = display_receipts(&receipts, "USD", Some(&table));
        assert_eq!(first, second);
    }

    #[test]
    fn test_same_currency_keeps_amount() {
        let receipt = sample_receipt("a", 42.0);
        let display = display_receipts(&[receipt], "EUR", Some(&rates()));
        assert_eq!(display[0].converted_amount, 42.0);
        assert_eq!(display[0].exchange_rate, 1.0);
    }

    #[test]
    fn test_selection_is_derived_from_display() {
        let mut receipt = sample_receipt("r-1", 10.0);
        receipt.currency = "USD".to_string();
        let display = display_receipts(&[receipt], "SEK", Some(&rates()));

        let selected = select_receipt(&display, "r-1").unwrap();
        assert_eq!(selected.target_currency, "SEK");
        assert!(select_receipt(&display, "missing").is_none());
    }

    #[test]
    fn test_store_mutations() {
        let mut store = ReceiptStore::new();
        store.replace(vec![sample_receipt("a", 1.0)]);
        store.prepend(sample_receipt("b", 2.0));
        assert_eq!(store.receipts()[0].id, "b");

        let mut edited = sample_receipt("a", 5.0);
        edited.merchant_name = "Edited".to_string();
        assert!(store.update(edited));
        assert_eq!(store.find("a").unwrap().merchant_name, "Edited");
        assert!(!store.update(sample_receipt("zzz", 1.0)));

        store.set_storage_path("b", Some("u/1_receipt.jpg".to_string()));
        assert_eq!(
            store.find("b").unwrap().storage_path.as_deref(),
            Some("u/1_receipt.jpg")
        );

        assert!(store.remove("a").is_some());
        assert!(store.remove("a").is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_load_remote_resolves_urls_and_keeps_failures() {
        let database = FakeRemoteDatabase::new();
        let mut with_path = sample_receipt("ok", 1.0);
        with_path.storage_path = Some("u/1_receipt.jpg".to_string());
        let mut broken = sample_receipt("broken", 2.0);
        broken.storage_path = Some("u/missing.jpg".to_string());
        database.seed_receipts("u", &[with_path, broken, sample_receipt("none", 3.0)]);

        let storage = FakeObjectStorage::new();
        storage.fail_signing_for("u/missing.jpg");

        let receipts = load_remote(&database, &storage, Duration::from_secs(3600))
            .await
            .unwrap();

        assert_eq!(receipts.len(), 3);
        let by_id = |id: &str| receipts.iter().find(|r| r.id == id).unwrap().clone();
        assert!(by_id("ok").image_base64.starts_with("https://signed.example/"));
        assert_eq!(by_id("broken").image_base64, "");
        assert_eq!(by_id("none").image_base64, "");
    }

    #[tokio::test]
    async fn test_sync_new_receipt_tolerates_upload_failure() {
        let database = FakeRemoteDatabase::new();
        let storage = FakeObjectStorage::new();
        storage.fail_uploads(true);

        let receipt = sample_receipt("r-1", 9.0);
        let path = sync_new_receipt(&database, &storage, "u", &receipt, 1_000)
            .await
            .unwrap();

        assert_eq!(path, None);
        let rows = database.receipt_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].image_path, None);
    }

    #[tokio::test]
    async fn test_sync_new_receipt_uploads_under_owner_key() {
        let database = FakeRemoteDatabase::new();
        let storage = FakeObjectStorage::new();

        let receipt = sample_receipt("r-1", 9.0);
        let path = sync_new_receipt(&database, &storage, "u", &receipt, 1_000)
            .await
            .unwrap();

        assert_eq!(path.as_deref(), Some("u/1000_receipt.jpg"));
        assert_eq!(
            database.receipt_rows()[0].image_path.as_deref(),
            Some("u/1000_receipt.jpg")
        );
        assert_eq!(storage.uploaded_keys(), vec!["u/1000_receipt.jpg".to_string()]);
    }
}
