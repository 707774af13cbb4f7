/// 環境変数・接続設定・ログ初期化
pub mod environment;

pub use environment::{
    get_environment, initialize_logging_system, load_environment_variables, ApiConfig,
    BackendConfig, BackendCredentials, Environment, EnvironmentConfig, RatesConfig,
    StorageConfig,
};
