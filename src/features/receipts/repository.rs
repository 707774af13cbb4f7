use super::models::ReceiptRow;
use crate::features::auth::service::AuthProvider;
use crate::features::feedback::models::FeedbackEntry;
use crate::features::settings::models::UserSettings;
use crate::shared::api_client::{ApiClient, HttpFailure, SendFailure};
use crate::shared::config::environment::BackendConfig;
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use chrono::Utc;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::sync::Arc;

/// テーブル名
pub const RECEIPTS_TABLE: &str = "receipts";
pub const USER_SETTINGS_TABLE: &str = "user_settings";
pub const FEEDBACK_TABLE: &str = "feedback";

/// リモートのテーブルストレージ
///
/// 行アクセスはバックエンド側で所有者に制限されている
#[async_trait]
pub trait RemoteDatabase: Send + Sync {
    /// 自分のレシートを作成日時の降順で取得する
    async fn list_receipts(&self) -> AppResult<Vec<ReceiptRow>>;

    async fn insert_receipt(&self, row: &ReceiptRow) -> AppResult<()>;

    /// IDが一致する行を丸ごと更新する
    async fn update_receipt(&self, row: &ReceiptRow) -> AppResult<()>;

    async fn delete_receipt(&self, id: &str) -> AppResult<()>;

    async fn fetch_settings(&self, user_id: &str) -> AppResult<Option<UserSettings>>;

    async fn upsert_settings(&self, settings: &UserSettings) -> AppResult<()>;

    async fn insert_settings(&self, settings: &UserSettings) -> AppResult<()>;

    async fn insert_feedback(&self, entry: &FeedbackEntry) -> AppResult<()>;
}

/// PostgRESTのエラーメッセージからカラム名を取り出す
static COLUMN_PATTERNS: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        // PGRST204: Could not find the 'image_path' column of 'receipts' in the schema cache
        Regex::new(r"the '([^']+)' column of '([^']+)'").expect("カラム検出の正規表現が不正です"),
        // 42703: column "image_path" of relation "receipts" does not exist
        Regex::new(r#"column "?([A-Za-z0-9_.]+)"?(?: of relation "([^"]+)")? does not exist"#)
            .expect("カラム検出の正規表現が不正です"),
    ]
});

/// エラーレスポンスを分類する
///
/// カラム欠落（スキーマ不整合）は汎用エラーと区別する
pub(crate) fn classify_failure(table: &str, failure: &HttpFailure) -> AppError {
    let message = failure.body.best_message();
    let code = failure.body.code_str().unwrap_or_default();

    if code == "PGRST204" || code == "42703" || message.contains("does not exist") {
        for pattern in COLUMN_PATTERNS.iter() {
            if let Some(caps) = pattern.captures(&message) {
                let raw_column = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                // "receipts.image_path" 形式はカラム名だけにする
                let column = raw_column.rsplit('.').next().unwrap_or(raw_column);
                let table = caps.get(2).map(|m| m.as_str()).unwrap_or(table);
                return AppError::missing_column(table.to_string(), column.to_string());
            }
        }
    }

    AppError::remote(format!(
        "{table}: status={}, code={code}, message={message}",
        failure.status
    ))
}

/// PostgRESTクライアント
pub struct PostgrestClient {
    api: ApiClient,
    config: BackendConfig,
    auth: Arc<dyn AuthProvider>,
}

impl PostgrestClient {
    pub fn new(api: ApiClient, config: BackendConfig, auth: Arc<dyn AuthProvider>) -> Self {
        log::info!("テーブルクライアントを初期化しました: url={}", config.rest_url());
        Self { api, config, auth }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.config.rest_url(), table)
    }

    /// リクエストに使うトークン
    ///
    /// 保存済みセッションが有効ならそのまま使い、サーバーには問い合わせない。
    /// 期限切れなら更新し、更新できなければanonキーに落とさずエラーにする。
    async fn access_token(&self) -> AppResult<String> {
        match self.auth.cached_session().await? {
            None => Ok(self.config.anon_key.clone()),
            Some(session) if !session.is_expired(Utc::now().timestamp()) => {
                Ok(session.access_token)
            }
            Some(_) => self.refreshed_token().await,
        }
    }

    async fn refreshed_token(&self) -> AppResult<String> {
        match self.auth.get_session().await? {
            Some(session) => Ok(session.access_token),
            None => Err(AppError::auth(
                "セッションの有効期限が切れました。再度ログインしてください",
            )),
        }
    }

    fn authorized(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token)
    }

    /// 認証ヘッダーを付けて送信する
    ///
    /// ユーザーのトークンが401で拒否された場合は、セッションを確認し直して1回だけ再送する
    async fn send_authorized(
        &self,
        table: &str,
        request: RequestBuilder,
        label: &str,
    ) -> AppResult<Response> {
        let retry = request.try_clone();
        let token = self.access_token().await?;
        let result = match self.api.send(self.authorized(request, &token), label).await {
            Err(SendFailure::Status(failure))
                if failure.status == StatusCode::UNAUTHORIZED && token != self.config.anon_key =>
            {
                match retry {
                    Some(retry) => {
                        log::warn!("トークンが拒否されました。セッションを確認して再送します: {label}");
                        let token = self.refreshed_token().await?;
                        self.api.send(self.authorized(retry, &token), label).await
                    }
                    None => Err(SendFailure::Status(failure)),
                }
            }
            other => other,
        };

        match result {
            Ok(response) => Ok(response),
            Err(SendFailure::Status(failure)) => Err(classify_failure(table, &failure)),
            Err(SendFailure::Transport(e)) => Err(e),
        }
    }

    async fn execute(&self, table: &str, request: RequestBuilder, label: &str) -> AppResult<()> {
        self.send_authorized(table, request, label).await?;
        Ok(())
    }

    async fn fetch_rows<T>(
        &self,
        table: &str,
        request: RequestBuilder,
        label: &str,
    ) -> AppResult<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        self.send_authorized(table, request, label)
            .await?
            .json::<Vec<T>>()
            .await
            .map_err(|e| AppError::remote(format!("{table}: レスポンス解析エラー: {e}")))
    }
}

/// PostgRESTの等価フィルター
fn eq_filter(value: &str) -> String {
    format!("eq.{}", urlencoding::encode(value))
}

#[async_trait]
impl RemoteDatabase for PostgrestClient {
    async fn list_receipts(&self) -> AppResult<Vec<ReceiptRow>> {
        let request = self
            .api
            .http()
            .get(self.table_url(RECEIPTS_TABLE))
            .query(&[("select", "*"), ("order", "created_at.desc")]);
        let rows: Vec<ReceiptRow> = self
            .fetch_rows(RECEIPTS_TABLE, request, "レシート一覧取得")
            .await?;
        log::info!("レシート一覧を取得しました: count={}", rows.len());
        Ok(rows)
    }

    async fn insert_receipt(&self, row: &ReceiptRow) -> AppResult<()> {
        let request = self
            .api
            .http()
            .post(self.table_url(RECEIPTS_TABLE))
            .header("Prefer", "return=minimal")
            .json(&[row]);
        self.execute(RECEIPTS_TABLE, request, "レシート作成").await?;
        log::info!("レシートを作成しました: id={}", row.id);
        Ok(())
    }

    async fn update_receipt(&self, row: &ReceiptRow) -> AppResult<()> {
        // 更新は差分ではなく行全体を送る
        let url = format!("{}?id={}", self.table_url(RECEIPTS_TABLE), eq_filter(&row.id));
        let request = self
            .api
            .http()
            .patch(url)
            .header("Prefer", "return=minimal")
            .json(row);
        self.execute(RECEIPTS_TABLE, request, "レシート更新").await?;
        log::info!("レシートを更新しました: id={}", row.id);
        Ok(())
    }

    async fn delete_receipt(&self, id: &str) -> AppResult<()> {
        let url = format!("{}?id={}", self.table_url(RECEIPTS_TABLE), eq_filter(id));
        let request = self.api.http().delete(url);
        self.execute(RECEIPTS_TABLE, request, "レシート削除").await?;
        log::info!("レシートを削除しました: id={id}");
        Ok(())
    }

    async fn fetch_settings(&self, user_id: &str) -> AppResult<Option<UserSettings>> {
        let url = format!(
            "{}?select=*&user_id={}&limit=1",
            self.table_url(USER_SETTINGS_TABLE),
            eq_filter(user_id)
        );
        let request = self.api.http().get(url);
        let rows: Vec<UserSettings> = self
            .fetch_rows(USER_SETTINGS_TABLE, request, "ユーザー設定取得")
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_settings(&self, settings: &UserSettings) -> AppResult<()> {
        let request = self
            .api
            .http()
            .post(self.table_url(USER_SETTINGS_TABLE))
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[settings]);
        self.execute(USER_SETTINGS_TABLE, request, "ユーザー設定保存")
            .await?;
        log::info!("ユーザー設定を保存しました: user_id={}", settings.user_id);
        Ok(())
    }

    async fn insert_settings(&self, settings: &UserSettings) -> AppResult<()> {
        let request = self
            .api
            .http()
            .post(self.table_url(USER_SETTINGS_TABLE))
            .header("Prefer", "return=minimal")
            .json(&[settings]);
        self.execute(USER_SETTINGS_TABLE, request, "ユーザー設定作成")
            .await?;
        log::info!("ユーザー設定を作成しました: user_id={}", settings.user_id);
        Ok(())
    }

    async fn insert_feedback(&self, entry: &FeedbackEntry) -> AppResult<()> {
        let request = self
            .api
            .http()
            .post(self.table_url(FEEDBACK_TABLE))
            .header("Prefer", "return=minimal")
            .json(&[entry]);
        self.execute(FEEDBACK_TABLE, request, "フィードバック送信")
            .await?;
        log::info!("フィードバックを送信しました: user_id={}", entry.user_id);
        Ok(())
    }
}
