//! テスト用の共通データと、各ポートのメモリ実装
//!
//! 呼び出しを記録するので「リモート呼び出しがないこと」を検証できる。

use crate::features::auth::models::{AuthEvent, AuthUser, Session};
use crate::features::auth::service::AuthProvider;
use crate::features::currency::{RateSource, RateTable};
use crate::features::feedback::models::FeedbackEntry;
use crate::features::ledger::prompt::UserPrompt;
use crate::features::receipts::extraction::{ExtractedReceipt, ReceiptExtractor};
use crate::features::receipts::models::{ExpenseCategory, ExpenseType, Receipt, ReceiptRow};
use crate::features::receipts::repository::RemoteDatabase;
use crate::features::receipts::storage::{ensure_payload, ObjectStorage};
use crate::features::settings::models::UserSettings;
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

/// 小さなJPEG風のdata URL
pub const SAMPLE_IMAGE: &str = "data:image/jpeg;base64,/9j/4AAQ";

pub fn sample_receipt(id: &str, amount: f64) -> Receipt {
    Receipt {
        id: id.to_string(),
        merchant_name: format!("Shop {id}"),
        merchant_address: String::new(),
        date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
        time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        amount,
        currency: "EUR".to_string(),
        vat: 0.0,
        exchange_rate: 1.0,
        converted_amount: amount,
        target_currency: "EUR".to_string(),
        category: ExpenseCategory::Other,
        expense_type: ExpenseType::Business,
        image_base64: SAMPLE_IMAGE.to_string(),
        storage_path: None,
        created_at: 1_700_000_000_000,
        latitude: None,
        longitude: None,
    }
}

pub fn sample_rates() -> RateTable {
    [("EUR", 1.0), ("USD", 1.1), ("SEK", 11.0)]
        .into_iter()
        .collect()
}

pub fn auth_user(id: &str, full_name: Option<&str>) -> AuthUser {
    AuthUser {
        id: id.to_string(),
        email: Some(format!("{id}@example.com")),
        full_name: full_name.map(str::to_string),
        provider: Some("email".to_string()),
    }
}

pub fn session_for(user_id: &str) -> Session {
    Session {
        access_token: format!("access-{user_id}"),
        refresh_token: format!("refresh-{user_id}"),
        expires_at: None,
        user: auth_user(user_id, Some("Test User")),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// テーブル操作の記録
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    ListReceipts,
    InsertReceipt(String),
    UpdateReceipt(String),
    DeleteReceipt(String),
    FetchSettings(String),
    UpsertSettings(String),
    InsertSettings(String),
    InsertFeedback(String),
}

#[derive(Default)]
struct DatabaseState {
    rows: Vec<ReceiptRow>,
    settings: HashMap<String, UserSettings>,
    feedback: Vec<FeedbackEntry>,
    calls: Vec<RemoteCall>,
    failing_inserts: HashSet<String>,
    missing_column: bool,
    fail_writes: bool,
    fail_list: bool,
}

/// メモリ上のテーブル
#[derive(Default)]
pub struct FakeRemoteDatabase {
    state: Mutex<DatabaseState>,
}

impl FakeRemoteDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_receipts(&self, owner_id: &str, receipts: &[Receipt]) {
        let mut state = lock(&self.state);
        state
            .rows
            .extend(receipts.iter().map(|r| ReceiptRow::from_receipt(r, owner_id)));
    }

    pub fn seed_settings(&self, settings: UserSettings) {
        lock(&self.state)
            .settings
            .insert(settings.user_id.clone(), settings);
    }

    pub fn fail_inserts_for(&self, receipt_id: &str) {
        lock(&self.state)
            .failing_inserts
            .insert(receipt_id.to_string());
    }

    /// 書き込みをカラム欠落エラーにする
    pub fn fail_with_missing_column(&self) {
        lock(&self.state).missing_column = true;
    }

    pub fn fail_writes(&self) {
        lock(&self.state).fail_writes = true;
    }

    pub fn fail_list(&self) {
        lock(&self.state).fail_list = true;
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    pub fn receipt_rows(&self) -> Vec<ReceiptRow> {
        lock(&self.state).rows.clone()
    }

    pub fn settings(&self, user_id: &str) -> Option<UserSettings> {
        lock(&self.state).settings.get(user_id).cloned()
    }

    pub fn feedback(&self) -> Vec<FeedbackEntry> {
        lock(&self.state).feedback.clone()
    }

    fn write_failure(state: &DatabaseState) -> Option<AppError> {
        if state.missing_column {
            Some(AppError::missing_column("receipts", "image_path"))
        } else if state.fail_writes {
            Some(AppError::remote("write failed"))
        } else {
            None
        }
    }
}

#[async_trait]
impl RemoteDatabase for FakeRemoteDatabase {
    async fn list_receipts(&self) -> AppResult<Vec<ReceiptRow>> {
        let mut state = lock(&self.state);
        state.calls.push(RemoteCall::ListReceipts);
        if state.fail_list {
            return Err(AppError::remote("list failed"));
        }
        let mut rows = state.rows.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert_receipt(&self, row: &ReceiptRow) -> AppResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(RemoteCall::InsertReceipt(row.id.clone()));
        if state.failing_inserts.contains(&row.id) {
            return Err(AppError::remote("insert failed"));
        }
        if let Some(error) = Self::write_failure(&state) {
            return Err(error);
        }
        state.rows.push(row.clone());
        Ok(())
    }

    async fn update_receipt(&self, row: &ReceiptRow) -> AppResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(RemoteCall::UpdateReceipt(row.id.clone()));
        if let Some(error) = Self::write_failure(&state) {
            return Err(error);
        }
        if let Some(slot) = state.rows.iter_mut().find(|r| r.id == row.id) {
            *slot = row.clone();
        }
        Ok(())
    }

    async fn delete_receipt(&self, id: &str) -> AppResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(RemoteCall::DeleteReceipt(id.to_string()));
        if let Some(error) = Self::write_failure(&state) {
            return Err(error);
        }
        state.rows.retain(|r| r.id != id);
        Ok(())
    }

    async fn fetch_settings(&self, user_id: &str) -> AppResult<Option<UserSettings>> {
        let mut state = lock(&self.state);
        state.calls.push(RemoteCall::FetchSettings(user_id.to_string()));
        Ok(state.settings.get(user_id).cloned())
    }

    async fn upsert_settings(&self, settings: &UserSettings) -> AppResult<()> {
        let mut state = lock(&self.state);
        state
            .calls
            .push(RemoteCall::UpsertSettings(settings.user_id.clone()));
        state
            .settings
            .insert(settings.user_id.clone(), settings.clone());
        Ok(())
    }

    async fn insert_settings(&self, settings: &UserSettings) -> AppResult<()> {
        let mut state = lock(&self.state);
        state
            .calls
            .push(RemoteCall::InsertSettings(settings.user_id.clone()));
        state
            .settings
            .insert(settings.user_id.clone(), settings.clone());
        Ok(())
    }

    async fn insert_feedback(&self, entry: &FeedbackEntry) -> AppResult<()> {
        let mut state = lock(&self.state);
        state
            .calls
            .push(RemoteCall::InsertFeedback(entry.user_id.clone()));
        state.feedback.push(entry.clone());
        Ok(())
    }
}

#[derive(Default)]
struct StorageState {
    uploaded_keys: Vec<String>,
    signed_paths: Vec<String>,
    fail_uploads: bool,
    failing_signs: HashSet<String>,
}

/// メモリ上のオブジェクトストレージ
#[derive(Default)]
pub struct FakeObjectStorage {
    state: Mutex<StorageState>,
}

impl FakeObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_uploads(&self, fail: bool) {
        lock(&self.state).fail_uploads = fail;
    }

    pub fn fail_signing_for(&self, path: &str) {
        lock(&self.state).failing_signs.insert(path.to_string());
    }

    pub fn uploaded_keys(&self) -> Vec<String> {
        lock(&self.state).uploaded_keys.clone()
    }

    pub fn signed_paths(&self) -> Vec<String> {
        lock(&self.state).signed_paths.clone()
    }
}

#[async_trait]
impl ObjectStorage for FakeObjectStorage {
    async fn upload(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> AppResult<String> {
        ensure_payload(&bytes)?;
        let mut state = lock(&self.state);
        state.uploaded_keys.push(key.to_string());
        if state.fail_uploads {
            return Err(AppError::upload("bucket missing"));
        }
        Ok(key.to_string())
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> AppResult<String> {
        let mut state = lock(&self.state);
        state.signed_paths.push(path.to_string());
        if state.failing_signs.contains(path) {
            return Err(AppError::upload("object not found"));
        }
        Ok(format!("https://signed.example/{path}?ttl={}", ttl.as_secs()))
    }
}

#[derive(Default)]
struct PromptState {
    answers: VecDeque<bool>,
    confirmations: Vec<String>,
    alerts: Vec<String>,
    donation_prompts: Vec<Duration>,
}

/// 答えをあらかじめ決めておくダイアログ（尽きたら「いいえ」）
#[derive(Default)]
pub struct ScriptedPrompt {
    state: Mutex<PromptState>,
}

impl ScriptedPrompt {
    pub fn new(answers: Vec<bool>) -> Self {
        Self {
            state: Mutex::new(PromptState {
                answers: answers.into(),
                ..PromptState::default()
            }),
        }
    }

    pub fn push_answers(&self, answers: &[bool]) {
        lock(&self.state).answers.extend(answers.iter().copied());
    }

    pub fn confirmations(&self) -> Vec<String> {
        lock(&self.state).confirmations.clone()
    }

    pub fn alerts(&self) -> Vec<String> {
        lock(&self.state).alerts.clone()
    }

    pub fn donation_prompts(&self) -> Vec<Duration> {
        lock(&self.state).donation_prompts.clone()
    }
}

#[async_trait]
impl UserPrompt for ScriptedPrompt {
    async fn confirm(&self, message: &str) -> bool {
        let mut state = lock(&self.state);
        state.confirmations.push(message.to_string());
        state.answers.pop_front().unwrap_or(false)
    }

    async fn alert(&self, message: &str) {
        lock(&self.state).alerts.push(message.to_string());
    }

    fn schedule_donation_prompt(&self, delay: Duration) {
        lock(&self.state).donation_prompts.push(delay);
    }
}

struct AuthState {
    session: Option<Session>,
    unreachable: bool,
    sign_in_user: String,
    sign_out_calls: usize,
    get_session_calls: usize,
    refresh_fails: bool,
}

/// メモリ上の認証プロバイダー
pub struct FakeAuthProvider {
    state: Mutex<AuthState>,
    events: broadcast::Sender<AuthEvent>,
}

impl Default for FakeAuthProvider {
    fn default() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(AuthState {
                session: None,
                unreachable: false,
                sign_in_user: "user-1".to_string(),
                sign_out_calls: 0,
                get_session_calls: 0,
                refresh_fails: false,
            }),
            events,
        }
    }
}

impl FakeAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        let provider = Self::default();
        lock(&provider.state).session = Some(session);
        provider
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        lock(&self.state).unreachable = unreachable;
    }

    /// サーバー側から認証状態の変化を通知する
    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    pub fn sign_out_calls(&self) -> usize {
        lock(&self.state).sign_out_calls
    }

    /// サーバーに確認した回数
    pub fn get_session_calls(&self) -> usize {
        lock(&self.state).get_session_calls
    }

    /// 期限切れトークンの更新を失敗させる
    pub fn fail_refresh(&self) {
        lock(&self.state).refresh_fails = true;
    }

    fn sign_in(&self) -> Session {
        let session = {
            let mut state = lock(&self.state);
            let session = session_for(&state.sign_in_user);
            state.session = Some(session.clone());
            session
        };
        self.emit(AuthEvent::SignedIn(session.clone()));
        session
    }
}

#[async_trait]
impl AuthProvider for FakeAuthProvider {
    async fn get_session(&self) -> AppResult<Option<Session>> {
        let mut state = lock(&self.state);
        state.get_session_calls += 1;
        if state.unreachable {
            return Err(AppError::backend_unreachable("connection refused"));
        }

        let expired = state
            .session
            .as_ref()
            .is_some_and(|s| s.is_expired(Utc::now().timestamp()));
        if expired {
            if state.refresh_fails {
                state.session = None;
            } else if let Some(session) = state.session.as_mut() {
                session.access_token = format!("refreshed-{}", session.user.id);
                session.expires_at = None;
            }
        }
        Ok(state.session.clone())
    }

    async fn cached_session(&self) -> AppResult<Option<Session>> {
        Ok(lock(&self.state).session.clone())
    }

    async fn current_user(&self) -> AppResult<Option<AuthUser>> {
        Ok(self.get_session().await?.map(|s| s.user))
    }

    async fn sign_in_with_password(&self, _email: &str, password: &str) -> AppResult<Session> {
        if password == "wrong" {
            return Err(AppError::auth("Invalid login credentials"));
        }
        Ok(self.sign_in())
    }

    async fn sign_in_with_id_token(&self, _provider: &str, _id_token: &str) -> AppResult<Session> {
        Ok(self.sign_in())
    }

    fn oauth_authorize_url(&self, provider: &str, redirect_to: &str) -> AppResult<String> {
        Ok(format!(
            "https://auth.example/authorize?provider={provider}&redirect_to={redirect_to}"
        ))
    }

    async fn complete_oauth_redirect(&self, _redirect_url: &str) -> AppResult<Session> {
        Ok(self.sign_in())
    }

    /// "confirm" を含むアドレスはメール確認待ちになる
    async fn sign_up(
        &self,
        email: &str,
        _password: &str,
        _full_name: Option<&str>,
    ) -> AppResult<Option<Session>> {
        if email.contains("confirm") {
            return Ok(None);
        }
        Ok(Some(self.sign_in()))
    }

    async fn sign_out(&self) -> AppResult<()> {
        {
            let mut state = lock(&self.state);
            state.session = None;
            state.sign_out_calls += 1;
        }
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

/// 固定のレート表を返す取得元
#[derive(Default)]
pub struct FakeRateSource {
    table: Mutex<Option<RateTable>>,
}

impl FakeRateSource {
    pub fn new(table: Option<RateTable>) -> Self {
        Self {
            table: Mutex::new(table),
        }
    }
}

#[async_trait]
impl RateSource for FakeRateSource {
    async fn fetch_rates(&self) -> Option<RateTable> {
        lock(&self.table).clone()
    }
}

/// 固定の解析結果を返す画像解析
#[derive(Default)]
pub struct FakeExtractor {
    result: Mutex<Option<ExtractedReceipt>>,
}

impl FakeExtractor {
    pub fn new(result: Option<ExtractedReceipt>) -> Self {
        Self {
            result: Mutex::new(result),
        }
    }
}

#[async_trait]
impl ReceiptExtractor for FakeExtractor {
    async fn extract(&self, _image_data_url: &str) -> AppResult<ExtractedReceipt> {
        lock(&self.result)
            .clone()
            .ok_or_else(|| AppError::remote("extraction failed"))
    }
}
