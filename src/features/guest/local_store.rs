/// 端末内ストレージモジュール
///
/// ゲストフラグ・ゲストのレシート・接続情報の上書き・認証セッションを
/// 小さなキーバリュー形式で保存します。
use crate::features::auth::models::Session;
use crate::features::receipts::models::Receipt;
use crate::shared::config::environment::BackendCredentials;
use crate::shared::errors::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// 端末内ストレージのキー定義
pub struct LocalStoreKeys;

impl LocalStoreKeys {
    /// ゲストモードフラグのキー
    pub const GUEST_FLAG: &'static str = "isGuest";
    /// ゲストのレシート一覧のキー
    pub const GUEST_RECEIPTS: &'static str = "guest_receipts";
    /// バックエンド接続情報（上書き）のキー
    pub const BACKEND_CREDENTIALS: &'static str = "backend_credentials";
    /// 認証セッションのキー
    pub const AUTH_SESSION: &'static str = "auth_session";
    /// 解析できなかったゲストのレシート（生のJSON）の退避キー
    pub const GUEST_RECEIPTS_UNREADABLE: &'static str = "guest_receipts_unreadable";
}

/// ゲストのレシート読み込み結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuestReceipts {
    pub receipts: Vec<Receipt>,
    /// 今回の読み込みで退避したレコード数
    pub unreadable: usize,
}

/// 端末内のキーバリューストア
///
/// 型付きのアクセサはデフォルト実装で提供し、実装側は生の値の読み書きだけを持つ
pub trait LocalStore: Send + Sync {
    /// 値を取得する
    fn get_value(&self, key: &str) -> AppResult<Option<Value>>;

    /// 値を保存する
    fn set_value(&self, key: &str, value: Value) -> AppResult<()>;

    /// 値を削除する
    fn remove_value(&self, key: &str) -> AppResult<()>;

    /// ゲストモードか
    fn is_guest(&self) -> AppResult<bool> {
        Ok(matches!(
            self.get_value(LocalStoreKeys::GUEST_FLAG)?,
            Some(Value::Bool(true))
        ))
    }

    /// ゲストフラグを設定する（falseならキーごと削除）
    fn set_guest(&self, guest: bool) -> AppResult<()> {
        if guest {
            self.set_value(LocalStoreKeys::GUEST_FLAG, Value::Bool(true))
        } else {
            self.remove_value(LocalStoreKeys::GUEST_FLAG)
        }
    }

    /// ゲストのレシート一覧を1件ずつ読み込む
    ///
    /// 解析できないレコードは退避キーへ移してから、読めた分だけを書き戻す。
    /// 次回の保存で上書きされて失われることはない。
    fn load_guest_receipts(&self) -> AppResult<GuestReceipts> {
        let Some(raw) = self.get_value(LocalStoreKeys::GUEST_RECEIPTS)? else {
            return Ok(GuestReceipts::default());
        };
        let (receipts, unreadable) = split_guest_records(raw);
        if unreadable.is_empty() {
            return Ok(GuestReceipts {
                receipts,
                unreadable: 0,
            });
        }

        let count = unreadable.len();
        let mut backup = self.unreadable_guest_receipts()?;
        backup.extend(unreadable);
        // 退避が成功してから一覧を書き戻す
        self.set_value(LocalStoreKeys::GUEST_RECEIPTS_UNREADABLE, Value::Array(backup))?;
        self.save_guest_receipts(&receipts)?;
        log::warn!(
            "解析できないゲストのレシートを退避しました: count={count}, key={}",
            LocalStoreKeys::GUEST_RECEIPTS_UNREADABLE
        );

        Ok(GuestReceipts {
            receipts,
            unreadable: count,
        })
    }

    /// ゲストのレシート一覧（未保存なら空）
    fn guest_receipts(&self) -> AppResult<Vec<Receipt>> {
        Ok(self.load_guest_receipts()?.receipts)
    }

    /// 退避済みのゲストのレシート（生のJSON）
    fn unreadable_guest_receipts(&self) -> AppResult<Vec<Value>> {
        Ok(
            match self.get_value(LocalStoreKeys::GUEST_RECEIPTS_UNREADABLE)? {
                Some(Value::Array(items)) => items,
                Some(other) => vec![other],
                None => Vec::new(),
            },
        )
    }

    /// ゲストのレシート一覧を丸ごと保存する
    fn save_guest_receipts(&self, receipts: &[Receipt]) -> AppResult<()> {
        self.set_value(LocalStoreKeys::GUEST_RECEIPTS, to_value(receipts)?)
    }

    fn clear_guest_receipts(&self) -> AppResult<()> {
        self.remove_value(LocalStoreKeys::GUEST_RECEIPTS)
    }

    /// 手動設定されたバックエンド接続情報
    fn backend_credentials(&self) -> AppResult<Option<BackendCredentials>> {
        read_typed(self, LocalStoreKeys::BACKEND_CREDENTIALS)
    }

    fn save_backend_credentials(&self, credentials: &BackendCredentials) -> AppResult<()> {
        self.set_value(LocalStoreKeys::BACKEND_CREDENTIALS, to_value(credentials)?)
    }

    /// 保存済みの認証セッション
    fn stored_session(&self) -> AppResult<Option<Session>> {
        read_typed(self, LocalStoreKeys::AUTH_SESSION)
    }

    fn save_session(&self, session: &Session) -> AppResult<()> {
        self.set_value(LocalStoreKeys::AUTH_SESSION, to_value(session)?)
    }

    fn clear_session(&self) -> AppResult<()> {
        self.remove_value(LocalStoreKeys::AUTH_SESSION)
    }
}

/// 壊れた値は警告を出して未保存として扱う
fn read_typed<T, S>(store: &S, key: &str) -> AppResult<Option<T>>
where
    T: DeserializeOwned,
    S: LocalStore + ?Sized,
{
    let Some(value) = store.get_value(key)? else {
        return Ok(None);
    };
    match serde_json::from_value(value) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => {
            log::warn!("端末内データの解析に失敗しました。無視します: key={key}, error={e}");
            Ok(None)
        }
    }
}

/// ゲストのレシートを読めたものと読めないものに分ける
fn split_guest_records(raw: Value) -> (Vec<Receipt>, Vec<Value>) {
    let items = match raw {
        Value::Array(items) => items,
        other => {
            log::warn!("ゲストのレシート一覧の形式が不正です");
            return (Vec::new(), vec![other]);
        }
    };

    let mut receipts = Vec::with_capacity(items.len());
    let mut unreadable = Vec::new();
    for item in items {
        match serde_json::from_value::<Receipt>(item.clone()) {
            Ok(receipt) => receipts.push(receipt),
            Err(e) => {
                let id = item.get("id").and_then(Value::as_str).unwrap_or("-");
                log::warn!("ゲストのレシートを解析できません: id={id}, error={e}");
                unreadable.push(item);
            }
        }
    }
    (receipts, unreadable)
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> AppResult<Value> {
    Ok(serde_json::to_value(value)?)
}

fn lock_error<E: std::fmt::Display>(e: E) -> AppError {
    AppError::local_storage(format!("ストアのロックに失敗しました: {e}"))
}

/// JSONファイル1つに保存するストア
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// ストアファイル名
    pub const FILE_NAME: &'static str = "local_store.json";

    /// 指定したパスのストアを開く（存在しなければ空）
    ///
    /// 壊れたファイルは別名で残して空のストアから始める
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let entries = match Self::read_file(&path) {
            Ok(entries) => entries,
            Err(AppError::Io(e)) => return Err(AppError::Io(e)),
            Err(e) => {
                let aside = Self::set_aside(&path)?;
                log::warn!(
                    "ストアファイルを読み込めません。退避して空で開始します: path={}, moved_to={}, error={e}",
                    path.display(),
                    aside.display()
                );
                Map::new()
            }
        };
        log::debug!("端末内ストアを開きました: path={}", path.display());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// プラットフォームのデータディレクトリにストアを開く
    pub fn open_default() -> AppResult<Self> {
        let dir = dirs::data_dir()
            .ok_or_else(|| AppError::local_storage("データディレクトリを特定できません"))?
            .join("tally-lens");
        fs::create_dir_all(&dir)?;
        Self::open(dir.join(Self::FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(path: &Path) -> AppResult<Map<String, Value>> {
        if !path.exists() {
            return Ok(Map::new());
        }
        let raw = fs::read_to_string(path)?;
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(AppError::local_storage(format!(
                "ストアファイルの形式が不正です: {}",
                path.display()
            ))),
        }
    }

    /// 壊れたストアファイルを別名に移す
    fn set_aside(path: &Path) -> AppResult<PathBuf> {
        let aside = path.with_extension(format!(
            "corrupt-{}.json",
            chrono::Utc::now().timestamp_millis()
        ));
        fs::rename(path, &aside)?;
        Ok(aside)
    }

    /// 一時ファイルに書いてから置き換える（途中で落ちても元のファイルは壊れない）
    fn persist(&self, entries: &Map<String, Value>) -> AppResult<()> {
        let raw = serde_json::to_string_pretty(entries)?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, raw)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl LocalStore for JsonFileStore {
    fn get_value(&self, key: &str) -> AppResult<Option<Value>> {
        let entries = self.entries.lock().map_err(lock_error)?;
        Ok(entries.get(key).cloned())
    }

    fn set_value(&self, key: &str, value: Value) -> AppResult<()> {
        let mut entries = self.entries.lock().map_err(lock_error)?;
        // ファイルへの書き込みが成功してからメモリに反映する
        let mut updated = entries.clone();
        updated.insert(key.to_string(), value);
        self.persist(&updated)?;
        *entries = updated;
        log::debug!("端末内ストアに保存しました: key={key}");
        Ok(())
    }

    fn remove_value(&self, key: &str) -> AppResult<()> {
        let mut entries = self.entries.lock().map_err(lock_error)?;
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut updated = entries.clone();
        updated.remove(key);
        self.persist(&updated)?;
        *entries = updated;
        log::debug!("端末内ストアから削除しました: key={key}");
        Ok(())
    }
}

/// メモリ上のストア
#[derive(Default)]
pub struct MemoryLocalStore {
    entries: Mutex<Map<String, Value>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryLocalStore {
    fn get_value(&self, key: &str) -> AppResult<Option<Value>> {
        let entries = self.entries.lock().map_err(lock_error)?;
        Ok(entries.get(key).cloned())
    }

    fn set_value(&self, key: &str, value: Value) -> AppResult<()> {
        let mut entries = self.entries.lock().map_err(lock_error)?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove_value(&self, key: &str) -> AppResult<()> {
        let mut entries = self.entries.lock().map_err(lock_error)?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_support::sample_receipt;
    use tempfile::TempDir;

    #[test]
    fn test_guest_flag() {
        let store = MemoryLocalStore::new();
        assert!(!store.is_guest().unwrap());

        store.set_guest(true).unwrap();
        assert!(store.is_guest().unwrap());

        store.set_guest(false).unwrap();
        assert!(!store.is_guest().unwrap());
        assert_eq!(store.get_value(LocalStoreKeys::GUEST_FLAG).unwrap(), None);
    }

    #[test]
    fn test_guest_receipts_keep_inline_images() {
        let store = MemoryLocalStore::new();
        let receipts = vec![sample_receipt("g-1", 10.0), sample_receipt("g-2", 20.0)];
        store.save_guest_receipts(&receipts).unwrap();

        let raw = store
            .get_value(LocalStoreKeys::GUEST_RECEIPTS)
            .unwrap()
            .unwrap();
        assert_eq!(raw[0]["imageBase64"], receipts[0].image_base64.as_str());

        assert_eq!(store.guest_receipts().unwrap(), receipts);

        store.clear_guest_receipts().unwrap();
        assert!(store.guest_receipts().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_list_is_set_aside() {
        let store = MemoryLocalStore::new();
        store
            .set_value(LocalStoreKeys::GUEST_RECEIPTS, Value::String("oops".into()))
            .unwrap();

        assert!(store.guest_receipts().unwrap().is_empty());
        assert_eq!(
            store.unreadable_guest_receipts().unwrap(),
            vec![Value::String("oops".into())]
        );
    }

    #[test]
    fn test_one_bad_record_does_not_drop_the_rest() {
        let store = MemoryLocalStore::new();
        let good = to_value(&sample_receipt("g-1", 1.0)).unwrap();
        let mut drifted = to_value(&sample_receipt("g-2", 2.0)).unwrap();
        drifted.as_object_mut().unwrap().remove("targetCurrency");
        store
            .set_value(
                LocalStoreKeys::GUEST_RECEIPTS,
                Value::Array(vec![good, drifted.clone()]),
            )
            .unwrap();

        let loaded = store.load_guest_receipts().unwrap();
        assert_eq!(loaded.unreadable, 1);
        assert_eq!(loaded.receipts.len(), 1);
        assert_eq!(loaded.receipts[0].id, "g-1");
        assert_eq!(store.unreadable_guest_receipts().unwrap(), vec![drifted]);

        // 退避後の再読み込みでは何も退避しない
        let again = store.load_guest_receipts().unwrap();
        assert_eq!(again.unreadable, 0);
        assert_eq!(store.unreadable_guest_receipts().unwrap().len(), 1);

        // 保存し直しても退避分は残る
        store
            .save_guest_receipts(&[sample_receipt("g-1", 1.0), sample_receipt("g-3", 3.0)])
            .unwrap();
        assert_eq!(store.unreadable_guest_receipts().unwrap().len(), 1);
    }

    #[test]
    fn test_json_file_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(JsonFileStore::FILE_NAME);

        {
            let store = JsonFileStore::open(&path).unwrap();
            store.set_guest(true).unwrap();
            store
                .save_backend_credentials(&BackendCredentials {
                    url: "https://example.supabase.co".to_string(),
                    anon_key: "anon".to_string(),
                })
                .unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        assert!(reopened.is_guest().unwrap());
        assert_eq!(
            reopened.backend_credentials().unwrap().unwrap().anon_key,
            "anon"
        );
        assert_eq!(reopened.path(), path.as_path());
    }

    #[test]
    fn test_json_file_store_sets_aside_broken_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(JsonFileStore::FILE_NAME);
        fs::write(&path, "{\"isGuest\": tr").unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert!(!store.is_guest().unwrap());

        let kept: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().contains("corrupt-"))
            .collect();
        assert_eq!(kept.len(), 1);
        assert_eq!(
            fs::read_to_string(kept[0].path()).unwrap(),
            "{\"isGuest\": tr"
        );

        // 新しいファイルとして使い続けられる
        store.set_guest(true).unwrap();
        assert!(JsonFileStore::open(&path).unwrap().is_guest().unwrap());
    }

    #[test]
    fn test_json_file_store_non_object_is_set_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(JsonFileStore::FILE_NAME);
        fs::write(&path, "[1,2,3]").unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get_value(LocalStoreKeys::GUEST_FLAG).unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_write_leaves_memory_unchanged() {
        let dir = TempDir::new().unwrap();
        let store_dir = dir.path().join("store");
        fs::create_dir_all(&store_dir).unwrap();
        let store = JsonFileStore::open(store_dir.join(JsonFileStore::FILE_NAME)).unwrap();
        store.set_guest(true).unwrap();

        fs::remove_dir_all(&store_dir).unwrap();

        assert!(store
            .save_guest_receipts(&[sample_receipt("g-1", 1.0)])
            .is_err());
        assert_eq!(store.get_value(LocalStoreKeys::GUEST_RECEIPTS).unwrap(), None);
        assert!(store.set_guest(false).is_err());
        assert!(store.is_guest().unwrap());
    }

    #[test]
    fn test_persist_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(JsonFileStore::FILE_NAME);
        let store = JsonFileStore::open(&path).unwrap();
        store.set_guest(true).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![JsonFileStore::FILE_NAME.to_string()]);
    }
}
