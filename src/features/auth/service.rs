use crate::features::auth::models::{AuthEvent, AuthUser, Session};
use crate::features::guest::local_store::LocalStore;
use crate::shared::api_client::{ApiClient, SendFailure};
use crate::shared::config::environment::BackendConfig;
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use url::Url;

/// 認証状態通知チャネルの容量
const AUTH_EVENT_CAPACITY: usize = 16;

/// 認証・セッションの提供元
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// 現在のセッションを取得する（期限切れなら一度だけ更新を試みる）
    ///
    /// # 戻り値
    /// セッション（未ログインならNone）。到達不能な場合は BackendUnreachable
    async fn get_session(&self) -> AppResult<Option<Session>>;

    /// 端末内に保存済みのセッション（サーバーへの確認はしない）
    async fn cached_session(&self) -> AppResult<Option<Session>>;

    /// 現在のユーザー
    async fn current_user(&self) -> AppResult<Option<AuthUser>>;

    /// メールアドレスとパスワードでログイン
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AppResult<Session>;

    /// IDプロバイダーのIDトークンでログイン
    async fn sign_in_with_id_token(&self, provider: &str, id_token: &str) -> AppResult<Session>;

    /// OAuthリダイレクト認証のURLを生成する
    fn oauth_authorize_url(&self, provider: &str, redirect_to: &str) -> AppResult<String>;

    /// OAuthリダイレクト先のURL（フラグメントにトークンを含む）からログインを完了する
    async fn complete_oauth_redirect(&self, redirect_url: &str) -> AppResult<Session>;

    /// 新規登録
    ///
    /// # 戻り値
    /// メール確認が不要な場合はセッション、必要な場合はNone
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> AppResult<Option<Session>>;

    /// ログアウト
    async fn sign_out(&self) -> AppResult<()>;

    /// 認証状態の変化を購読する
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// トークンエンドポイントのレスポンス
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserResponse,
}

/// ユーザーエンドポイントのレスポンス
#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    app_metadata: Value,
    #[serde(default)]
    user_metadata: Value,
}

impl From<UserResponse> for AuthUser {
    fn from(user: UserResponse) -> Self {
        let full_name = ["full_name", "name"]
            .iter()
            .find_map(|key| user.user_metadata.get(key).and_then(Value::as_str))
            .map(str::to_string);
        let provider = user
            .app_metadata
            .get("provider")
            .and_then(Value::as_str)
            .map(str::to_string);

        AuthUser {
            id: user.id,
            email: user.email,
            full_name,
            provider,
        }
    }
}

impl TokenResponse {
    fn into_session(self, now: i64) -> Session {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| now + secs));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.into(),
        }
    }
}

/// GoTrue互換の認証APIクライアント
///
/// セッションは端末内ストアに保存し、再起動後に復元する
pub struct GoTrueAuthClient {
    api: ApiClient,
    config: BackendConfig,
    local_store: Arc<dyn LocalStore>,
    events: broadcast::Sender<AuthEvent>,
}

impl GoTrueAuthClient {
    pub fn new(api: ApiClient, config: BackendConfig, local_store: Arc<dyn LocalStore>) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        log::info!("認証クライアントを初期化しました: url={}", config.auth_url());
        Self {
            api,
            config,
            local_store,
            events,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.auth_url(), path)
    }

    fn publish(&self, event: AuthEvent) {
        // 購読者がいない場合の送信失敗は無視する
        let _ = self.events.send(event);
    }

    async fn request_token(&self, grant_type: &str, body: Value) -> AppResult<Session> {
        let request = self
            .api
            .http()
            .post(self.endpoint("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.config.anon_key)
            .json(&body);

        let label = format!("トークン取得 (grant_type={grant_type})");
        let response = self
            .api
            .send(request, &label)
            .await
            .map_err(into_auth_error)?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::auth(format!("トークンレスポンスの解析に失敗しました: {e}")))?;

        Ok(token.into_session(Utc::now().timestamp()))
    }

    async fn fetch_user(&self, access_token: &str) -> AppResult<AuthUser> {
        let request = self
            .api
            .http()
            .get(self.endpoint("user"))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(access_token);

        let response = self
            .api
            .send(request, "ユーザー取得")
            .await
            .map_err(into_auth_error)?;
        let user: UserResponse = response
            .json()
            .await
            .map_err(|e| AppError::auth(format!("ユーザー情報の解析に失敗しました: {e}")))?;
        Ok(user.into())
    }

    fn store_session(&self, session: &Session) -> AppResult<()> {
        self.local_store.save_session(session)?;
        log::info!("セッションを保存しました: user_id={}", session.user.id);
        Ok(())
    }

    async fn refresh(&self, stale: &Session) -> AppResult<Option<Session>> {
        log::info!("アクセストークンを更新します: user_id={}", stale.user.id);
        match self
            .request_token(
                "refresh_token",
                json!({ "refresh_token": stale.refresh_token }),
            )
            .await
        {
            Ok(session) => {
                self.store_session(&session)?;
                self.publish(AuthEvent::TokenRefreshed(session.clone()));
                Ok(Some(session))
            }
            Err(AppError::BackendUnreachable(message)) => {
                Err(AppError::BackendUnreachable(message))
            }
            Err(e) => {
                // 更新トークンが無効ならログアウト扱い
                log::warn!("トークン更新に失敗しました。セッションを破棄します: {e}");
                self.local_store.clear_session()?;
                self.publish(AuthEvent::SignedOut);
                Ok(None)
            }
        }
    }

    fn signed_in(&self, session: Session) -> AppResult<Session> {
        self.store_session(&session)?;
        self.publish(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }
}

/// 送信失敗を認証エラーへ変換（接続失敗は到達不能のまま）
fn into_auth_error(failure: SendFailure) -> AppError {
    match failure {
        SendFailure::Status(failure) => AppError::auth(failure.body.best_message()),
        SendFailure::Transport(e) => e,
    }
}

/// リダイレクトURLのフラグメントからトークンを取り出す
///
/// # 戻り値
/// (access_token, refresh_token, expires_at)
pub(crate) fn parse_redirect_fragment(
    redirect_url: &str,
    now: i64,
) -> AppResult<(String, String, Option<i64>)> {
    let url = Url::parse(redirect_url)
        .map_err(|e| AppError::auth(format!("リダイレクトURLが不正です: {e}")))?;
    let fragment = url
        .fragment()
        .ok_or_else(|| AppError::auth("リダイレクトURLにトークンが含まれていません"))?;

    let mut access_token = None;
    let mut refresh_token = None;
    let mut expires_at = None;
    let mut expires_in = None;
    let mut error = None;
    for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
        match key.as_ref() {
            "access_token" => access_token = Some(value.into_owned()),
            "refresh_token" => refresh_token = Some(value.into_owned()),
            "expires_at" => expires_at = value.parse::<i64>().ok(),
            "expires_in" => expires_in = value.parse::<i64>().ok(),
            "error_description" => error = Some(value.into_owned()),
            "error" if error.is_none() => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(AppError::auth(error));
    }

    match (access_token, refresh_token) {
        (Some(access), Some(refresh)) => Ok((
            access,
            refresh,
            expires_at.or_else(|| expires_in.map(|secs| now + secs)),
        )),
        _ => Err(AppError::auth("リダイレクトURLにトークンが含まれていません")),
    }
}

#[async_trait]
impl AuthProvider for GoTrueAuthClient {
    async fn get_session(&self) -> AppResult<Option<Session>> {
        let Some(session) = self.local_store.stored_session()? else {
            log::debug!("保存済みセッションはありません");
            return Ok(None);
        };

        if session.is_expired(Utc::now().timestamp()) {
            return self.refresh(&session).await;
        }

        // トークンがまだ有効かサーバーに確認する
        match self.fetch_user(&session.access_token).await {
            Ok(user) => Ok(Some(Session { user, ..session })),
            Err(AppError::BackendUnreachable(message)) => {
                Err(AppError::BackendUnreachable(message))
            }
            Err(_) => self.refresh(&session).await,
        }
    }

    async fn cached_session(&self) -> AppResult<Option<Session>> {
        self.local_store.stored_session()
    }

    async fn current_user(&self) -> AppResult<Option<AuthUser>> {
        Ok(self.get_session().await?.map(|s| s.user))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AppResult<Session> {
        log::info!("パスワードでログインします");
        let session = self
            .request_token("password", json!({ "email": email, "password": password }))
            .await?;
        self.signed_in(session)
    }

    async fn sign_in_with_id_token(&self, provider: &str, id_token: &str) -> AppResult<Session> {
        log::info!("IDトークンでログインします: provider={provider}");
        let session = self
            .request_token(
                "id_token",
                json!({ "provider": provider, "id_token": id_token }),
            )
            .await?;
        self.signed_in(session)
    }

    fn oauth_authorize_url(&self, provider: &str, redirect_to: &str) -> AppResult<String> {
        let mut url = Url::parse(&self.endpoint("authorize"))
            .map_err(|e| AppError::configuration(format!("認証URLが不正です: {e}")))?;
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to);

        log::debug!("OAuth認証URLを生成しました: provider={provider}");
        Ok(url.to_string())
    }

    async fn complete_oauth_redirect(&self, redirect_url: &str) -> AppResult<Session> {
        let (access_token, refresh_token, expires_at) =
            parse_redirect_fragment(redirect_url, Utc::now().timestamp())?;
        let user = self.fetch_user(&access_token).await?;

        log::info!("OAuthログインが完了しました: user_id={}", user.id);
        self.signed_in(Session {
            access_token,
            refresh_token,
            expires_at,
            user,
        })
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> AppResult<Option<Session>> {
        let mut body = json!({ "email": email, "password": password });
        if let Some(name) = full_name {
            body["data"] = json!({ "full_name": name });
        }

        let request = self
            .api
            .http()
            .post(self.endpoint("signup"))
            .header("apikey", &self.config.anon_key)
            .json(&body);
        let response = self
            .api
            .send(request, "新規登録")
            .await
            .map_err(into_auth_error)?;
        let raw: Value = response
            .json()
            .await
            .map_err(|e| AppError::auth(format!("登録レスポンスの解析に失敗しました: {e}")))?;

        // メール確認が必要な場合はユーザーのみが返る
        if raw.get("access_token").is_none() {
            log::info!("新規登録を受け付けました（メール確認待ち）");
            return Ok(None);
        }

        let token: TokenResponse = serde_json::from_value(raw)?;
        let session = token.into_session(Utc::now().timestamp());
        self.signed_in(session).map(Some)
    }

    async fn sign_out(&self) -> AppResult<()> {
        if let Some(session) = self.local_store.stored_session()? {
            let request = self
                .api
                .http()
                .post(self.endpoint("logout"))
                .header("apikey", &self.config.anon_key)
                .bearer_auth(&session.access_token);

            // サーバー側の失効に失敗しても端末からは消す
            if let Err(failure) = self.api.send(request, "ログアウト").await {
                log::warn!(
                    "サーバー側のログアウトに失敗しました: {}",
                    into_auth_error(failure)
                );
            }
        }

        self.local_store.clear_session()?;
        self.publish(AuthEvent::SignedOut);
        log::info!("ログアウトしました");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
