/// 共有エラー型とエラーハンドリング
pub mod errors;

/// 共有設定管理
pub mod config;

/// 共有ユーティリティ関数
pub mod utils;

/// HTTP APIクライアント
pub mod api_client;

#[cfg(test)]
pub mod test_support;

// 便利な再エクスポート
pub use config::{
    get_environment, initialize_logging_system, load_environment_variables, Environment,
    EnvironmentConfig,
};
pub use errors::{AppError, AppResult, ErrorSeverity};
