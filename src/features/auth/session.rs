use crate::features::auth::models::{Session, SessionMode};
use crate::features::guest::local_store::LocalStore;
use crate::shared::errors::{AppError, AppResult};

/// セッションの有無と端末内のゲストフラグから動作モードを決める
///
/// セッションがあればゲストフラグは消す。起動時と認証状態の変化時の両方で使う。
pub fn resolve_mode(
    session: Option<&Session>,
    local_store: &dyn LocalStore,
) -> AppResult<SessionMode> {
    if let Some(session) = session {
        local_store.set_guest(false)?;
        log::info!("ログイン済みセッションを検出しました: user_id={}", session.user.id);
        return Ok(SessionMode::Authenticated(session.user.id.clone()));
    }

    if local_store.is_guest()? {
        log::info!("ゲストモードで起動します");
        Ok(SessionMode::Guest)
    } else {
        log::info!("未ログインです。ログイン画面を表示します");
        Ok(SessionMode::Unauthenticated)
    }
}

/// 手動でのモード切り替えを検証する
///
/// ログイン中からゲストへの切り替えは認めない（ログアウトは未ログインに戻る）
pub fn ensure_transition(from: &SessionMode, to: &SessionMode) -> AppResult<()> {
    match (from, to) {
        (SessionMode::Authenticated(_), SessionMode::Guest) => Err(AppError::validation(
            "ログイン中はゲストモードに切り替えられません",
        )),
        (SessionMode::BackendUnreachable, SessionMode::Guest) => Err(AppError::backend_unreachable(
            "接続を再試行してください",
        )),
        _ => Ok(()),
    }
}
