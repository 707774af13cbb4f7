//! 経費台帳
//!
//! 認証状態・レシート一覧・表示通貨をまとめて管理し、画面からの操作を
//! ローカル（ゲスト）またはリモート（ログイン中）へ振り分ける。
//! 変更は楽観的に反映し、リモートの失敗は通知するだけで巻き戻さない。

use super::prompt::UserPrompt;
use crate::features::auth::models::{AuthEvent, AuthUser, Session, SessionMode};
use crate::features::auth::service::{AuthProvider, GoTrueAuthClient};
use crate::features::auth::session::{ensure_transition, resolve_mode};
use crate::features::currency::{
    convert, exchange_rate_for, ExchangeRateApiClient, RateSource, RateTable, DEFAULT_CURRENCY,
};
use crate::features::feedback::service::submit_feedback;
use crate::features::guest::local_store::{JsonFileStore, LocalStore};
use crate::features::guest::migration::{
    migrate_receipts, offer_migration, report_migration, MigrationOffer,
};
use crate::features::receipts::extraction::{GeoPoint, ManualEntry, ReceiptExtractor};
use crate::features::receipts::models::{Receipt, ReceiptRow};
use crate::features::receipts::repository::{PostgrestClient, RemoteDatabase};
use crate::features::receipts::storage::{ObjectStorage, S3ObjectStorage};
use crate::features::receipts::store::{
    display_receipts, load_local, load_remote, select_receipt, sync_new_receipt, ReceiptStore,
};
use crate::features::settings::models::{NamePrompt, UserSettings};
use crate::features::settings::service::{bootstrap_settings, validate_settings};
use crate::shared::api_client::{ApiClient, ApiClientConfig};
use crate::shared::config::{BackendConfig, RatesConfig, StorageConfig};
use crate::shared::errors::{AppError, AppResult};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};

/// 寄付のお願いを表示するレシート件数
pub const DONATION_PROMPT_AT: usize = 3;

/// 寄付のお願いを表示するまでの遅延
pub const DONATION_PROMPT_DELAY: Duration = Duration::from_millis(1500);

/// 台帳が利用する外部サービス
#[derive(Clone)]
pub struct LedgerPorts {
    pub auth: Arc<dyn AuthProvider>,
    pub database: Arc<dyn RemoteDatabase>,
    pub storage: Arc<dyn ObjectStorage>,
    pub rate_source: Arc<dyn RateSource>,
    pub extractor: Arc<dyn ReceiptExtractor>,
    pub local_store: Arc<dyn LocalStore>,
    pub prompt: Arc<dyn UserPrompt>,
}

impl LedgerPorts {
    /// 環境設定から本番用の外部サービスを組み立てる
    ///
    /// 画像解析とダイアログは呼び出し側が用意する
    pub async fn connect(
        extractor: Arc<dyn ReceiptExtractor>,
        prompt: Arc<dyn UserPrompt>,
        storage_config: StorageConfig,
    ) -> AppResult<Self> {
        let local_store: Arc<dyn LocalStore> = Arc::new(JsonFileStore::open_default()?);
        let backend = BackendConfig::resolve(local_store.backend_credentials()?)?;
        let api = ApiClient::new_with_config(ApiClientConfig::from_env())?;

        let auth: Arc<dyn AuthProvider> = Arc::new(GoTrueAuthClient::new(
            api.clone(),
            backend.clone(),
            Arc::clone(&local_store),
        ));
        let database = Arc::new(PostgrestClient::new(api, backend, Arc::clone(&auth)));
        let storage = Arc::new(S3ObjectStorage::new(storage_config).await?);
        let rate_source = Arc::new(ExchangeRateApiClient::new(RatesConfig::from_env())?);

        info!("外部サービスの初期化が完了しました");
        Ok(Self {
            auth,
            database,
            storage,
            rate_source,
            extractor,
            local_store,
            prompt,
        })
    }
}

/// ユーザーへの通知
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Info(String),
    Error(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::Info(message) | Notice::Error(message) => message,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Notice::Error(_))
    }
}

/// 経費台帳
pub struct ExpenseLedger {
    ports: LedgerPorts,
    signed_url_ttl: Duration,
    auth_events: Option<broadcast::Receiver<AuthEvent>>,
    mode: SessionMode,
    store: ReceiptStore,
    rates: Option<RateTable>,
    target_currency: String,
    display: Vec<Receipt>,
    selected_id: Option<String>,
    user_name: Option<String>,
    name_prompt: NamePrompt,
    capture_open: bool,
    settings_open: bool,
    uploading: bool,
    loading: bool,
    last_notice: Option<Notice>,
}

impl ExpenseLedger {
    pub fn new(ports: LedgerPorts) -> Self {
        Self {
            ports,
            signed_url_ttl: Duration::from_secs(StorageConfig::DEFAULT_SIGNED_URL_TTL_SECS),
            auth_events: None,
            mode: SessionMode::Unauthenticated,
            store: ReceiptStore::new(),
            rates: None,
            target_currency: DEFAULT_CURRENCY.to_string(),
            display: Vec::new(),
            selected_id: None,
            user_name: None,
            name_prompt: NamePrompt::None,
            capture_open: false,
            settings_open: false,
            uploading: false,
            loading: true,
            last_notice: None,
        }
    }

    /// 環境設定から台帳を組み立てる
    pub async fn connect(
        extractor: Arc<dyn ReceiptExtractor>,
        prompt: Arc<dyn UserPrompt>,
    ) -> AppResult<Self> {
        let storage_config = StorageConfig::from_env()?;
        let ttl = Duration::from_secs(storage_config.signed_url_ttl_secs);
        let ports = LedgerPorts::connect(extractor, prompt, storage_config).await?;
        Ok(Self::new(ports).with_signed_url_ttl(ttl))
    }

    /// 画像の閲覧URLの有効期限を変更する
    pub fn with_signed_url_ttl(mut self, ttl: Duration) -> Self {
        self.signed_url_ttl = ttl;
        self
    }

    // ---- 起動と認証 ----

    /// 起動処理
    ///
    /// 認証イベントの購読を開始し、為替レートとセッションを並行して取得する。
    /// 認証サーバーに到達できない場合は接続エラー状態になる。
    pub async fn startup(&mut self) -> AppResult<()> {
        self.loading = true;
        if self.auth_events.is_none() {
            self.auth_events = Some(self.ports.auth.subscribe());
        }

        let rate_source = Arc::clone(&self.ports.rate_source);
        let auth = Arc::clone(&self.ports.auth);
        let (rates, session) = tokio::join!(rate_source.fetch_rates(), auth.get_session());

        if rates.is_some() {
            self.rates = rates;
        } else {
            warn!("為替レートを取得できませんでした。換算せずに表示します");
        }

        match session {
            Ok(session) => self.route(session, true).await,
            Err(e) => {
                error!("認証状態の確認に失敗しました: {e}");
                self.mode = SessionMode::BackendUnreachable;
                self.reset_session_state();
                self.loading = false;
                self.last_notice = Some(Notice::Error(
                    AppError::backend_unreachable(e.to_string())
                        .user_message()
                        .to_string(),
                ));
                Ok(())
            }
        }
    }

    /// 接続エラー状態から起動処理をやり直す
    pub async fn retry_connection(&mut self) -> AppResult<()> {
        if self.mode != SessionMode::BackendUnreachable {
            debug!("接続エラー状態ではないため再試行しません: mode={:?}", self.mode);
            return Ok(());
        }
        info!("バックエンドへの接続を再試行します");
        self.mode = SessionMode::Unauthenticated;
        self.last_notice = None;
        self.startup().await
    }

    /// 為替レートを再取得する（失敗時は現在の表を維持）
    pub async fn load_rates(&mut self) {
        match self.ports.rate_source.fetch_rates().await {
            Some(rates) => {
                self.rates = Some(rates);
                self.recompute_display();
            }
            None => warn!("為替レートの再取得に失敗しました"),
        }
    }

    /// 認証状態の変化を反映する
    pub async fn handle_auth_event(&mut self, event: AuthEvent) -> AppResult<()> {
        debug!("認証イベントを受信しました: {event:?}");
        match event {
            AuthEvent::InitialSession(session) => self.route(session, true).await,
            AuthEvent::SignedIn(session) => self.route(Some(session), true).await,
            // トークン更新では移行を提案しない
            AuthEvent::TokenRefreshed(session) => self.route(Some(session), false).await,
            AuthEvent::SignedOut => self.route(None, false).await,
        }
    }

    /// 溜まっている認証イベントをすべて処理する
    ///
    /// # 戻り値
    /// 処理したイベント数
    pub async fn drain_auth_events(&mut self) -> AppResult<usize> {
        let mut events = Vec::new();
        if let Some(receiver) = self.auth_events.as_mut() {
            loop {
                match receiver.try_recv() {
                    Ok(event) => events.push(event),
                    Err(TryRecvError::Lagged(skipped)) => {
                        warn!("認証イベントを取りこぼしました: skipped={skipped}");
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
        }

        let count = events.len();
        for event in events {
            self.handle_auth_event(event).await?;
        }
        Ok(count)
    }

    pub async fn sign_in_with_password(&mut self, email: &str, password: &str) -> AppResult<()> {
        self.ensure_reachable()?;
        let session = self
            .ports
            .auth
            .sign_in_with_password(email, password)
            .await?;
        self.after_sign_in(session).await
    }

    pub async fn sign_in_with_id_token(&mut self, provider: &str, id_token: &str) -> AppResult<()> {
        self.ensure_reachable()?;
        let session = self
            .ports
            .auth
            .sign_in_with_id_token(provider, id_token)
            .await?;
        self.after_sign_in(session).await
    }

    /// OAuthログイン画面のURL（ブラウザで開く）
    pub fn oauth_authorize_url(&self, provider: &str, redirect_to: &str) -> AppResult<String> {
        self.ensure_reachable()?;
        self.ports.auth.oauth_authorize_url(provider, redirect_to)
    }

    /// 新規登録
    ///
    /// # 戻り値
    /// そのままログインした場合はtrue、メール確認待ちの場合はfalse
    pub async fn sign_up(
        &mut self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> AppResult<bool> {
        self.ensure_reachable()?;
        let full_name = full_name.map(str::trim).filter(|name| !name.is_empty());
        match self.ports.auth.sign_up(email, password, full_name).await? {
            Some(session) => {
                self.after_sign_in(session).await?;
                Ok(true)
            }
            None => {
                info!("確認メールを送信しました。メール確認後にログインしてください");
                self.notify(Notice::Info(
                    "確認メールを送信しました。メールのリンクから登録を完了してください".to_string(),
                ))
                .await;
                Ok(false)
            }
        }
    }

    /// OAuthのリダイレクトURLからログインを完了する
    pub async fn complete_oauth_redirect(&mut self, redirect_url: &str) -> AppResult<()> {
        self.ensure_reachable()?;
        let session = self
            .ports
            .auth
            .complete_oauth_redirect(redirect_url)
            .await?;
        self.after_sign_in(session).await
    }

    /// ゲストとして続行する
    pub async fn continue_as_guest(&mut self) -> AppResult<()> {
        ensure_transition(&self.mode, &SessionMode::Guest)?;
        self.ports.local_store.set_guest(true)?;
        self.mode = SessionMode::Guest;
        self.enter_guest().await;
        info!("ゲストモードを開始しました: count={}", self.store.len());
        Ok(())
    }

    /// ログアウト
    ///
    /// ゲストの場合はゲストフラグだけを消して未ログインに戻る
    pub async fn logout(&mut self) -> AppResult<()> {
        match self.mode.clone() {
            SessionMode::Guest => {
                // 端末内のレシートは残す（次回ログイン時に移行を提案する）
                self.ports.local_store.set_guest(false)?;
                info!("ゲストモードを終了しました");
            }
            SessionMode::Authenticated(user_id) => {
                if let Err(e) = self.ports.auth.sign_out().await {
                    warn!("ログアウト要求に失敗しました: user_id={user_id}, error={e}");
                }
                info!("ログアウトしました: user_id={user_id}");
            }
            SessionMode::Unauthenticated | SessionMode::BackendUnreachable => {
                debug!("ログアウト対象のセッションがありません");
                return Ok(());
            }
        }

        self.mode = SessionMode::Unauthenticated;
        self.reset_session_state();
        self.drain_auth_events().await?;
        Ok(())
    }

    // ---- レシート操作 ----

    /// 撮影画像からレシートを作成する
    pub async fn create_from_image(
        &mut self,
        image_data_url: &str,
        device_location: Option<GeoPoint>,
    ) -> AppResult<()> {
        self.require_active()?;
        let extracted = match self.ports.extractor.extract(image_data_url).await {
            Ok(extracted) => extracted,
            Err(e) => {
                error!("レシート画像の解析に失敗しました: {e}");
                self.notify(Notice::Error("レシート画像の解析に失敗しました".to_string()))
                    .await;
                return Err(e);
            }
        };

        let receipt = extracted.into_receipt(
            image_data_url.to_string(),
            &self.target_currency,
            device_location,
            Utc::now(),
        );
        self.create_receipt(receipt).await
    }

    /// 手入力からレシートを作成する
    pub async fn create_manual_entry(&mut self, entry: ManualEntry) -> AppResult<()> {
        self.require_active()?;
        let receipt = entry.into_receipt(&self.target_currency, Utc::now())?;
        self.create_receipt(receipt).await
    }

    /// レシートを作成する
    ///
    /// 一覧の先頭に即座に追加してから保存する。リモート保存の失敗は通知のみ。
    pub async fn create_receipt(&mut self, mut receipt: Receipt) -> AppResult<()> {
        let owner_id = self.require_active()?;

        receipt.exchange_rate =
            exchange_rate_for(&receipt.currency, &self.target_currency, self.rates.as_ref());
        receipt.converted_amount = convert(
            receipt.amount,
            &receipt.currency,
            &self.target_currency,
            self.rates.as_ref(),
        );
        receipt.target_currency = self.target_currency.clone();

        let id = receipt.id.clone();
        self.store.prepend(receipt.clone());
        self.capture_open = false;
        self.selected_id = Some(id.clone());
        self.recompute_display();

        if self.store.len() == DONATION_PROMPT_AT {
            self.ports
                .prompt
                .schedule_donation_prompt(DONATION_PROMPT_DELAY);
        }

        let Some(owner_id) = owner_id else {
            self.persist_guest().await;
            return Ok(());
        };

        self.uploading = true;
        let database = Arc::clone(&self.ports.database);
        let storage = Arc::clone(&self.ports.storage);
        let result = sync_new_receipt(
            database.as_ref(),
            storage.as_ref(),
            &owner_id,
            &receipt,
            Utc::now().timestamp_millis(),
        )
        .await;
        self.uploading = false;

        match result {
            Ok(storage_path) => {
                self.store.set_storage_path(&id, storage_path);
                self.recompute_display();
                info!("レシートを保存しました: id={id}");
            }
            Err(e) if e.is_missing_column() => {
                error!("スキーマ不整合のためレシートを保存できません: id={id}, error={e}");
                self.notify(Notice::Error(e.user_message().to_string()))
                    .await;
            }
            Err(e) => {
                error!("レシートの保存に失敗しました: id={id}, error={e}");
                self.notify(Notice::Error(
                    "レシートのクラウド保存に失敗しました".to_string(),
                ))
                .await;
            }
        }
        Ok(())
    }

    /// レシートを更新する（詳細表示は閉じる）
    pub async fn update_receipt(&mut self, updated: Receipt) -> AppResult<()> {
        let owner_id = self.require_active()?;
        if !self.store.update(updated.clone()) {
            return Err(AppError::not_found(format!("レシート（id={}）", updated.id)));
        }
        self.selected_id = None;
        self.recompute_display();

        match owner_id {
            None => self.persist_guest().await,
            Some(owner_id) => {
                let row = ReceiptRow::from_receipt(&updated, &owner_id);
                if let Err(e) = self.ports.database.update_receipt(&row).await {
                    error!("レシートの更新に失敗しました: id={}, error={e}", updated.id);
                    self.notify(Notice::Error(
                        "レシートの更新に失敗しました".to_string(),
                    ))
                    .await;
                }
            }
        }
        Ok(())
    }

    /// 確認のうえレシートを削除する
    ///
    /// # 戻り値
    /// 削除した場合はtrue
    pub async fn delete_receipt(&mut self, id: &str) -> AppResult<bool> {
        let owner_id = self.require_active()?;
        if !self
            .ports
            .prompt
            .confirm("このレシートを削除しますか？")
            .await
        {
            debug!("レシートの削除がキャンセルされました: id={id}");
            return Ok(false);
        }

        if self.store.remove(id).is_none() {
            warn!("削除対象のレシートが一覧にありません: id={id}");
        }
        self.selected_id = None;
        self.recompute_display();

        match owner_id {
            None => self.persist_guest().await,
            Some(_) => {
                // 失敗はログのみ（一覧からは消したまま）
                if let Err(e) = self.ports.database.delete_receipt(id).await {
                    error!("レシートの削除に失敗しました: id={id}, error={e}");
                }
            }
        }
        Ok(true)
    }

    // ---- 設定・フィードバック ----

    /// 表示通貨と表示名を保存する
    pub async fn save_settings(&mut self, currency: &str, full_name: &str) -> AppResult<()> {
        let (currency, full_name) = validate_settings(currency, full_name, self.name_prompt)?;

        self.target_currency = currency.clone();
        self.user_name = full_name.clone();
        self.name_prompt = NamePrompt::None;
        self.settings_open = false;
        self.recompute_display();

        if let SessionMode::Authenticated(user_id) = &self.mode {
            let settings = UserSettings {
                user_id: user_id.clone(),
                preferred_currency: currency,
                full_name,
            };
            if let Err(e) = self.ports.database.upsert_settings(&settings).await {
                error!("ユーザー設定の保存に失敗しました: user_id={}, error={e}", settings.user_id);
                self.notify(Notice::Error("設定の保存に失敗しました".to_string()))
                    .await;
            }
        }
        Ok(())
    }

    /// フィードバックを送信する（ログイン中のみ）
    pub async fn submit_feedback(&mut self, message: &str) -> AppResult<()> {
        let SessionMode::Authenticated(user_id) = &self.mode else {
            return Err(AppError::validation(
                "フィードバックを送信するにはログインしてください",
            ));
        };
        submit_feedback(self.ports.database.as_ref(), user_id, message, Utc::now()).await?;
        self.last_notice = Some(Notice::Info("フィードバックを送信しました".to_string()));
        Ok(())
    }

    // ---- 画面状態 ----

    pub fn open_capture(&mut self) -> AppResult<()> {
        self.require_active()?;
        self.capture_open = true;
        Ok(())
    }

    pub fn close_capture(&mut self) {
        self.capture_open = false;
    }

    /// 設定ダイアログを開く（名前は任意入力）
    pub fn open_settings(&mut self) {
        self.settings_open = true;
        if self.name_prompt != NamePrompt::Forced {
            self.name_prompt = NamePrompt::Optional;
        }
    }

    /// 設定ダイアログを閉じる
    ///
    /// 名前入力が必須の間は閉じられない
    pub fn close_settings(&mut self) -> bool {
        if self.name_prompt == NamePrompt::Forced {
            return false;
        }
        self.settings_open = false;
        self.name_prompt = NamePrompt::None;
        true
    }

    pub fn select_receipt(&mut self, id: &str) -> bool {
        if select_receipt(&self.display, id).is_some() {
            self.selected_id = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected_id = None;
    }

    // ---- 参照 ----

    pub fn mode(&self) -> &SessionMode {
        &self.mode
    }

    /// 保存されている内容そのまま（換算前）
    pub fn receipts(&self) -> &[Receipt] {
        self.store.receipts()
    }

    /// 現在の表示通貨で換算した一覧
    pub fn display_receipts(&self) -> &[Receipt] {
        &self.display
    }

    /// 詳細表示中のレシート（表示用の値）
    pub fn selected_receipt(&self) -> Option<&Receipt> {
        self.selected_id
            .as_deref()
            .and_then(|id| select_receipt(&self.display, id))
    }

    pub fn target_currency(&self) -> &str {
        &self.target_currency
    }

    pub fn rates(&self) -> Option<&RateTable> {
        self.rates.as_ref()
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn name_prompt(&self) -> NamePrompt {
        self.name_prompt
    }

    pub fn is_capture_open(&self) -> bool {
        self.capture_open
    }

    pub fn is_settings_open(&self) -> bool {
        self.settings_open || self.name_prompt == NamePrompt::Forced
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_notice(&self) -> Option<&Notice> {
        self.last_notice.as_ref()
    }

    // ---- 内部処理 ----

    async fn after_sign_in(&mut self, session: Session) -> AppResult<()> {
        // 認証イベント経由で処理されなかった場合だけ直接振り分ける
        if self.drain_auth_events().await? == 0 {
            self.route(Some(session), true).await?;
        }
        Ok(())
    }

    /// セッションに応じて画面とデータを切り替える
    async fn route(&mut self, session: Option<Session>, offer_migration: bool) -> AppResult<()> {
        let mode = resolve_mode(session.as_ref(), self.ports.local_store.as_ref())?;
        self.mode = mode.clone();

        match (mode, session) {
            (SessionMode::Authenticated(_), Some(session)) => {
                self.enter_authenticated(session.user, offer_migration)
                    .await
            }
            (SessionMode::Guest, _) => {
                self.enter_guest().await;
                Ok(())
            }
            _ => {
                self.reset_session_state();
                self.loading = false;
                Ok(())
            }
        }
    }

    /// 端末内のレシートを読み込んでゲスト画面に切り替える
    ///
    /// 読めなかったレコードは退避済みなので、件数だけ通知する
    async fn enter_guest(&mut self) {
        let (receipts, unreadable) = match load_local(self.ports.local_store.as_ref()) {
            Ok(loaded) => (loaded.receipts, loaded.unreadable),
            Err(e) => {
                warn!("端末内のレシートを読み込めませんでした: {e}");
                (Vec::new(), 0)
            }
        };
        self.store.replace(receipts);
        self.loading = false;
        self.recompute_display();

        if unreadable > 0 {
            self.notify(Notice::Error(format!(
                "端末内のレシート{unreadable}件を読み込めませんでした。データは別に保存してあります"
            )))
            .await;
        }
    }

    /// ログイン後の読み込み
    ///
    /// 設定の取得・レシートの読み込み・移行の提案を並行して行い、
    /// 移行が承認された場合はその後で順番に移す。
    async fn enter_authenticated(&mut self, user: AuthUser, propose: bool) -> AppResult<()> {
        self.loading = true;
        let database = Arc::clone(&self.ports.database);
        let storage = Arc::clone(&self.ports.storage);
        let local_store = Arc::clone(&self.ports.local_store);
        let prompt = Arc::clone(&self.ports.prompt);

        let offer_future = async {
            if propose {
                offer_migration(local_store.as_ref(), prompt.as_ref()).await
            } else {
                Ok(MigrationOffer::NothingToMigrate)
            }
        };
        let (settings, receipts, offer) = futures::join!(
            bootstrap_settings(database.as_ref(), &user),
            load_remote(database.as_ref(), storage.as_ref(), self.signed_url_ttl),
            offer_future
        );

        match settings {
            Ok(settings) => {
                if let Some(currency) = settings.preferred_currency {
                    self.target_currency = currency;
                }
                self.user_name = settings.full_name;
                self.name_prompt = settings.name_prompt;
            }
            Err(e) => error!("ユーザー設定の取得に失敗しました: user_id={}, error={e}", user.id),
        }

        match receipts {
            Ok(receipts) => self.store.replace(receipts),
            Err(e) => {
                error!("レシートの読み込みに失敗しました: user_id={}, error={e}", user.id);
                self.store.clear();
                self.last_notice = Some(Notice::Error(e.user_message().to_string()));
            }
        }
        self.loading = false;
        self.recompute_display();

        match offer {
            Ok(MigrationOffer::Accepted(guest_receipts)) => {
                self.migrate_guest_receipts(&user.id, guest_receipts)
                    .await?;
            }
            Ok(_) => {}
            Err(e) => error!("ゲストデータの確認に失敗しました: {e}"),
        }
        Ok(())
    }

    async fn migrate_guest_receipts(
        &mut self,
        owner_id: &str,
        guest_receipts: Vec<Receipt>,
    ) -> AppResult<()> {
        self.uploading = true;
        let result = migrate_receipts(
            self.ports.database.as_ref(),
            self.ports.storage.as_ref(),
            owner_id,
            &guest_receipts,
        )
        .await;
        self.uploading = false;

        let reload = report_migration(
            &result,
            self.ports.local_store.as_ref(),
            self.ports.prompt.as_ref(),
        )
        .await?;
        self.last_notice = Some(if reload {
            Notice::Info(result.summary_message())
        } else {
            Notice::Error(result.summary_message())
        });

        if reload {
            match load_remote(
                self.ports.database.as_ref(),
                self.ports.storage.as_ref(),
                self.signed_url_ttl,
            )
            .await
            {
                Ok(receipts) => {
                    self.store.replace(receipts);
                    self.recompute_display();
                }
                Err(e) => error!("移行後の再読み込みに失敗しました: {e}"),
            }
        }
        Ok(())
    }

    /// 操作可能なモードか確認し、ログイン中ならユーザーIDを返す
    fn require_active(&self) -> AppResult<Option<String>> {
        match &self.mode {
            SessionMode::Authenticated(user_id) => Ok(Some(user_id.clone())),
            SessionMode::Guest => Ok(None),
            SessionMode::BackendUnreachable => Err(AppError::backend_unreachable(
                "接続を再試行してください",
            )),
            SessionMode::Unauthenticated => Err(AppError::validation(
                "ログインするかゲストとして続行してください",
            )),
        }
    }

    fn ensure_reachable(&self) -> AppResult<()> {
        if self.mode == SessionMode::BackendUnreachable {
            return Err(AppError::backend_unreachable("接続を再試行してください"));
        }
        Ok(())
    }

    async fn persist_guest(&mut self) {
        if let Err(e) = self
            .ports
            .local_store
            .save_guest_receipts(self.store.receipts())
        {
            error!("端末内へのレシート保存に失敗しました: {e}");
            self.notify(Notice::Error(e.user_message().to_string()))
                .await;
        }
    }

    async fn notify(&mut self, notice: Notice) {
        self.ports.prompt.alert(notice.message()).await;
        self.last_notice = Some(notice);
    }

    fn reset_session_state(&mut self) {
        self.store.clear();
        self.selected_id = None;
        self.user_name = None;
        self.name_prompt = NamePrompt::None;
        self.capture_open = false;
        self.settings_open = false;
        self.uploading = false;
        self.recompute_display();
    }

    fn recompute_display(&mut self) {
        self.display = display_receipts(
            self.store.receipts(),
            &self.target_currency,
            self.rates.as_ref(),
        );
    }
}
