/// バックエンドHTTPクライアント
///
/// テーブルAPI（PostgREST）と認証API（GoTrue）の両方で使う薄いクライアント。
/// 接続失敗時は指数バックオフでリトライする。
use crate::shared::config::environment::ApiConfig;
use crate::shared::errors::{AppError, AppResult};
use log::{debug, info, warn};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// APIクライアント設定
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        let api = ApiConfig::default();
        Self {
            timeout_seconds: api.timeout_seconds,
            max_retries: api.max_retries,
        }
    }
}

impl ApiClientConfig {
    /// 環境設定からAPIクライアント設定を作成
    pub fn from_env() -> Self {
        let api_config = ApiConfig::from_env();
        Self {
            timeout_seconds: api_config.timeout_seconds,
            max_retries: api_config.max_retries,
        }
    }
}

/// バックエンドからのエラーレスポンス
///
/// PostgRESTは `code`/`message`、GoTrueは `error`/`error_description` や `msg` を返す
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl ErrorBody {
    /// エラーコードを文字列で取得
    pub fn code_str(&self) -> Option<String> {
        match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    /// 最も具体的なメッセージを取得
    pub fn best_message(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.error_description.clone())
            .or_else(|| self.msg.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "不明なエラー".to_string())
    }
}

/// 非成功レスポンスの内容
#[derive(Debug, Clone)]
pub struct HttpFailure {
    pub status: StatusCode,
    pub body: ErrorBody,
    pub raw: String,
}

/// 送信失敗の種類
#[derive(Debug)]
pub enum SendFailure {
    /// サーバーが非成功ステータスを返した
    Status(HttpFailure),
    /// 接続できなかった・タイムアウトした
    Transport(AppError),
}

/// 汎用APIクライアント
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: ApiClientConfig,
}

impl ApiClient {
    /// 設定を指定してAPIクライアントを作成
    pub fn new_with_config(config: ApiClientConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AppError::configuration(format!("HTTPクライアント初期化失敗: {e}")))?;

        Ok(Self { client, config })
    }

    /// 内部のreqwestクライアント（リクエスト組み立て用）
    pub fn http(&self) -> &Client {
        &self.client
    }

    /// リトライ付きでリクエストを送信し、レスポンスを返す
    ///
    /// # 戻り値
    /// 成功ステータスのレスポンス、または失敗の種類
    pub async fn send(
        &self,
        request: RequestBuilder,
        label: &str,
    ) -> Result<Response, SendFailure> {
        let mut attempts = 0;
        loop {
            let Some(cloned) = request.try_clone() else {
                return Err(SendFailure::Transport(AppError::remote(
                    "リクエストのクローンに失敗しました",
                )));
            };

            let request_to_send = cloned
                .build()
                .map_err(|e| SendFailure::Transport(AppError::from(e)))?;
            let method = request_to_send.method().clone();

            match self.client.execute(request_to_send).await {
                Ok(response) if response.status().is_success() => {
                    debug!("リクエスト成功: {label}, status={}", response.status());
                    return Ok(response);
                }
                Ok(response) => {
                    return Err(SendFailure::Status(Self::read_failure(response, label).await));
                }
                Err(e) => {
                    if attempts < self.config.max_retries
                        && Self::should_retry(e.is_connect(), e.is_timeout(), &method)
                    {
                        attempts += 1;
                        let delay = Duration::from_millis(250 * 2_u64.pow(attempts));
                        warn!(
                            "リクエスト失敗、リトライします: {label}, attempt={attempts}/{}, delay={delay:?}",
                            self.config.max_retries
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(SendFailure::Transport(AppError::from(e)));
                }
            }
        }
    }

    /// 送信エラーをリトライしてよいか
    ///
    /// 接続できなかった場合は常にリトライする。タイムアウトはサーバー側で処理済みの
    /// 可能性があるため、冪等なメソッド（GET/PUT/DELETEなど）に限る。
    fn should_retry(connect_failed: bool, timed_out: bool, method: &Method) -> bool {
        connect_failed || (timed_out && method.is_idempotent())
    }

    /// JSONレスポンスを期待してリクエストを送信
    pub async fn send_json<T>(&self, request: RequestBuilder, label: &str) -> AppResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        match self.send(request, label).await {
            Ok(response) => {
                let body = response
                    .json::<T>()
                    .await
                    .map_err(|e| AppError::remote(format!("レスポンス解析エラー: {e}")))?;
                info!("リクエスト完了: {label}");
                Ok(body)
            }
            Err(SendFailure::Status(failure)) => Err(AppError::remote(format!(
                "{label}: status={}, message={}",
                failure.status,
                failure.body.best_message()
            ))),
            Err(SendFailure::Transport(e)) => Err(e),
        }
    }

    async fn read_failure(response: Response, label: &str) -> HttpFailure {
        let status = response.status();
        let raw = response
            .text()
            .await
            .unwrap_or_else(|_| "レスポンス読み取り失敗".to_string());
        let body = serde_json::from_str::<ErrorBody>(&raw).unwrap_or_default();

        warn!("APIエラーレスポンス: {label}, status={status}, body={raw}");
        HttpFailure { status, body, raw }
    }
}
