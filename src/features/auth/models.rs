use serde::{Deserialize, Serialize};

/// 認証済みユーザー
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    /// ユーザーID（行の所有者ID）
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// IDプロバイダーが提供する表示名
    #[serde(default)]
    pub full_name: Option<String>,
    /// 認証プロバイダー（email, google など）
    #[serde(default)]
    pub provider: Option<String>,
}

impl AuthUser {
    /// 空白でないプロバイダー提供名
    pub fn provider_name(&self) -> Option<&str> {
        self.full_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

/// 認証セッション
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// アクセストークンの有効期限（エポック秒）
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl Session {
    /// アクセストークンが期限切れか（`now` はエポック秒）
    ///
    /// 期限不明のセッションは有効とみなす
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// 認証状態の変化通知
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    /// 起動時のセッション復元
    InitialSession(Option<Session>),
    SignedIn(Session),
    TokenRefreshed(Session),
    SignedOut,
}

impl AuthEvent {
    /// 通知が運ぶセッション
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthEvent::InitialSession(session) => session.as_ref(),
            AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => Some(session),
            AuthEvent::SignedOut => None,
        }
    }
}

/// アプリの動作モード
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// ログイン済み（リモートが正本）
    Authenticated(String),
    /// アカウントなし（端末内のみ）
    Guest,
    /// ログイン画面
    #[default]
    Unauthenticated,
    /// 起動時にバックエンドへ到達できなかった
    BackendUnreachable,
}

impl SessionMode {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            SessionMode::Authenticated(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, SessionMode::Guest)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionMode::Authenticated(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session(expires_at: Option<i64>) -> Session {
        Session {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at,
            user: AuthUser {
                id: "u-1".to_string(),
                email: Some("a@example.com".to_string()),
                full_name: None,
                provider: Some("email".to_string()),
            },
        }
    }

    #[test]
    fn test_session_expiry() {
        assert!(!sample_session(None).is_expired(1_000));
        assert!(!sample_session(Some(2_000)).is_expired(1_000));
        assert!(sample_session(Some(1_000)).is_expired(1_000));
    }

    #[test]
    fn test_event_session() {
        let session = sample_session(None);
        assert_eq!(
            AuthEvent::SignedIn(session.clone()).session(),
            Some(&session)
        );
        assert_eq!(AuthEvent::InitialSession(None).session(), None);
        assert_eq!(AuthEvent::SignedOut.session(), None);
    }

    #[test]
    fn test_mode_accessors() {
        let mode = SessionMode::Authenticated("u-1".to_string());
        assert_eq!(mode.user_id(), Some("u-1"));
        assert!(mode.is_authenticated());
        assert!(!mode.is_guest());
        assert_eq!(SessionMode::default(), SessionMode::Unauthenticated);
    }
}
