//! 経費レシート台帳の同期コア
//!
//! レシートの一覧をゲスト（端末内）またはアカウント（リモート）に保存し、
//! 表示通貨への換算・ゲストデータの移行・ユーザー設定を扱う。

pub mod features;
pub mod shared;

use log::info;

pub use features::auth::{AuthEvent, AuthProvider, AuthUser, Session, SessionMode};
pub use features::currency::{convert, RateSource, RateTable};
pub use features::guest::{JsonFileStore, LocalStore, MemoryLocalStore, MigrationResult};
pub use features::ledger::{ExpenseLedger, LedgerPorts, Notice, UserPrompt};
pub use features::receipts::{
    ExpenseCategory, ExpenseType, ExtractedReceipt, GeoPoint, ManualEntry, ObjectStorage, Receipt,
    ReceiptExtractor, RemoteDatabase,
};
pub use features::settings::{NamePrompt, UserSettings};
pub use shared::errors::{AppError, AppResult, ErrorSeverity};

/// 環境変数とログを初期化する
///
/// 台帳を組み立てる前に一度だけ呼ぶ
pub fn initialize() {
    shared::config::load_environment_variables();
    shared::config::initialize_logging_system();

    let env_config = shared::config::EnvironmentConfig::from_env();
    info!(
        "初期化が完了しました: environment={}, version={}",
        env_config.environment,
        env!("CARGO_PKG_VERSION")
    );
}
