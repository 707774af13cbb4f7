// ユーザー設定機能モジュール

pub mod models;
pub mod service;

pub use models::{NamePrompt, UserSettings};
pub use service::{bootstrap_settings, validate_settings, SettingsBootstrap};
