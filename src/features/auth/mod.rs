// 認証機能モジュール

pub mod models;
pub mod service;
pub mod session;

pub use models::{AuthEvent, AuthUser, Session, SessionMode};
pub use service::{AuthProvider, GoTrueAuthClient};
pub use session::{ensure_transition, resolve_mode};
