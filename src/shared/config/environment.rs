use serde::{Deserialize, Serialize};

/// アプリケーションの実行環境を表す列挙型
#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    /// 開発環境
    Development,
    /// プロダクション環境
    Production,
}

/// 環境変数取得エラー
#[derive(Debug, Clone)]
pub struct EnvVarError {
    /// 変数名
    pub var_name: String,
    /// エラーメッセージ
    pub message: String,
}

impl std::fmt::Display for EnvVarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "環境変数 {} が見つかりません: {}",
            self.var_name, self.message
        )
    }
}

impl std::error::Error for EnvVarError {}

/// 環境変数を取得する（優先順位: 起動時 > コンパイル時 > エラー）
///
/// # 引数
/// * `var_name` - 環境変数名（リテラル）
///
/// # 戻り値
/// 環境変数の値、または見つからない場合はエラー
#[macro_export]
macro_rules! get_env_var {
    ($var_name:expr) => {{
        if let Ok(value) = std::env::var($var_name) {
            log::debug!("環境変数 {} を起動時の環境変数から取得しました", $var_name);
            Ok(value)
        } else if let Some(value) = option_env!($var_name) {
            log::debug!("環境変数 {} をコンパイル時の環境変数から取得しました", $var_name);
            Ok(value.to_string())
        } else {
            Err($crate::shared::config::environment::EnvVarError {
                var_name: $var_name.to_string(),
                message: format!(
                    "起動時の環境変数 {} もコンパイル時の環境変数も見つかりませんでした",
                    $var_name
                ),
            })
        }
    }};
}

/// 環境変数を取得する（オプション版）
#[macro_export]
macro_rules! get_env_var_optional {
    ($var_name:expr) => {{
        $crate::get_env_var!($var_name).ok()
    }};
}

/// 環境変数を取得する（デフォルト値付き）
///
/// # 引数
/// * `var_name` - 環境変数名
/// * `default_value` - デフォルト値
#[macro_export]
macro_rules! get_env_var_or_default {
    ($var_name:expr, $default_value:expr) => {{
        $crate::get_env_var!($var_name).unwrap_or_else(|_| {
            log::debug!(
                "環境変数 {} が見つからないため、デフォルト値を使用します: {}",
                $var_name,
                $default_value
            );
            $default_value.to_string()
        })
    }};
}

/// 環境設定を管理する構造体
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// 実行環境
    pub environment: String,
    /// デバッグモードの有効/無効
    pub debug_mode: bool,
    /// ログレベル
    pub log_level: String,
}

impl EnvironmentConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Self {
        let environment = get_environment();
        let debug_mode = environment == Environment::Development;
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
            if debug_mode {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

        Self {
            environment: format!("{environment:?}").to_lowercase(),
            debug_mode,
            log_level,
        }
    }

    /// プロダクション環境かどうかを判定
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 開発環境かどうかを判定
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

/// 現在の実行環境を判定する
///
/// # 判定ロジック
/// 1. 実行時環境変数 ENVIRONMENT を確認
/// 2. デバッグビルドの場合は Development
/// 3. リリースビルドの場合は Production
pub fn get_environment() -> Environment {
    if let Ok(env_var) = std::env::var("ENVIRONMENT") {
        let env = match env_var.as_str() {
            "production" => Environment::Production,
            _ => Environment::Development,
        };
        log::debug!("環境判定: 実行時環境変数を使用 -> {env_var} -> {env:?}");
        return env;
    }

    let env = if cfg!(debug_assertions) {
        Environment::Development
    } else {
        Environment::Production
    };
    log::debug!(
        "環境判定: ビルド設定を使用 -> debug_assertions={} -> {env:?}",
        cfg!(debug_assertions)
    );
    env
}

/// 環境変数の読み込みを確認する
///
/// 開発ビルドの場合のみ.envファイルを読み込む。
/// 本番ビルドでは環境変数は実行時に設定されていることを前提とする。
pub fn load_environment_variables() {
    // ログシステム初期化前に呼ばれるため eprintln を使う
    if cfg!(debug_assertions) {
        match dotenv::dotenv() {
            Ok(path) => {
                eprintln!("環境ファイルを読み込みました: {}", path.display());
            }
            Err(e) => {
                eprintln!("環境ファイルの読み込みに失敗: {e}");
            }
        }
    } else {
        eprintln!("本番環境: 環境変数は実行時に設定されます");
    }
}

/// ログシステムを初期化する
///
/// 二重初期化は警告のみで無視する
pub fn initialize_logging_system() {
    let env_config = EnvironmentConfig::from_env();

    let log_level = match env_config.log_level.to_lowercase().as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };

    let result = env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(false)
        .try_init();

    if let Err(e) = result {
        log::warn!("ログシステムは既に初期化されています: {e}");
        return;
    }

    log::info!(
        "ログシステムを初期化しました: level={}, environment={}",
        env_config.log_level,
        env_config.environment
    );
}

/// 端末内に保存されたバックエンド接続情報（セットアップ画面で入力されたもの）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendCredentials {
    pub url: String,
    pub anon_key: String,
}

/// バックエンド（認証・テーブル）接続設定
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    /// バックエンドのベースURL
    pub url: String,
    /// 公開（anon）キー
    pub anon_key: String,
}

impl BackendConfig {
    /// 接続設定を解決する
    ///
    /// # 引数
    /// * `overrides` - ローカルストアに保存された接続情報
    ///
    /// # 取得順序
    /// 1. 環境変数 SUPABASE_URL / SUPABASE_KEY（プレースホルダーは無視）
    /// 2. ローカルストアの接続情報
    /// 3. どちらもなければ設定エラー
    pub fn resolve(
        overrides: Option<BackendCredentials>,
    ) -> crate::shared::errors::AppResult<Self> {
        let env_url = crate::get_env_var_optional!("SUPABASE_URL");
        let env_key = crate::get_env_var_optional!("SUPABASE_KEY");
        Self::resolve_from(env_url, env_key, overrides)
    }

    /// 値を明示して接続設定を解決する
    pub fn resolve_from(
        env_url: Option<String>,
        env_key: Option<String>,
        overrides: Option<BackendCredentials>,
    ) -> crate::shared::errors::AppResult<Self> {
        if let Some(url) = env_url.filter(|u| is_usable_url(u)) {
            log::info!("バックエンド接続先を環境変数から取得しました: url={url}");
            return Ok(Self {
                url: trim_base_url(&url),
                anon_key: env_key.unwrap_or_default(),
            });
        }

        if let Some(creds) = overrides.filter(|c| is_usable_url(&c.url)) {
            log::info!(
                "バックエンド接続先をローカルストアから取得しました: url={}",
                creds.url
            );
            return Ok(Self {
                url: trim_base_url(&creds.url),
                anon_key: creds.anon_key,
            });
        }

        Err(crate::shared::errors::AppError::configuration(
            "バックエンドの接続先が設定されていません (SUPABASE_URL)",
        ))
    }

    /// REST（テーブル）エンドポイント
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.url)
    }

    /// 認証エンドポイント
    pub fn auth_url(&self) -> String {
        format!("{}/auth/v1", self.url)
    }
}

fn is_usable_url(url: &str) -> bool {
    !url.is_empty() && url != "undefined" && !url.contains("placeholder")
}

fn trim_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// S3互換オブジェクトストレージ設定
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub region: String,
    /// 署名付きURLの有効期間（秒）
    pub signed_url_ttl_secs: u64,
}

impl StorageConfig {
    /// 署名付きURLのデフォルト有効期間（1時間）
    pub const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 3600;

    /// 環境変数からストレージ設定を読み込む
    pub fn from_env() -> crate::shared::errors::AppResult<Self> {
        let endpoint_url = crate::get_env_var!("STORAGE_ENDPOINT_URL").map_err(|e| {
            crate::shared::errors::AppError::configuration(e.to_string())
        })?;
        let access_key_id = crate::get_env_var!("STORAGE_ACCESS_KEY_ID").map_err(|e| {
            crate::shared::errors::AppError::configuration(e.to_string())
        })?;
        let secret_access_key = crate::get_env_var!("STORAGE_SECRET_ACCESS_KEY").map_err(|e| {
            crate::shared::errors::AppError::configuration(e.to_string())
        })?;
        let bucket_name = crate::get_env_var_or_default!("STORAGE_BUCKET", "receipts");
        let region = crate::get_env_var_or_default!("STORAGE_REGION", "auto");
        let signed_url_ttl_secs = crate::get_env_var_or_default!("STORAGE_SIGNED_URL_TTL", "3600")
            .parse()
            .unwrap_or_else(|_| {
                log::warn!("STORAGE_SIGNED_URL_TTLのパースに失敗しました。デフォルト値3600秒を使用します");
                Self::DEFAULT_SIGNED_URL_TTL_SECS
            });

        let config = Self {
            endpoint_url,
            access_key_id,
            secret_access_key,
            bucket_name,
            region,
            signed_url_ttl_secs,
        };
        config.validate()?;

        log::info!(
            "ストレージ設定: endpoint={}, bucket={}, region={}",
            config.endpoint_url,
            config.bucket_name,
            config.region
        );
        Ok(config)
    }

    /// 設定を検証する
    pub fn validate(&self) -> crate::shared::errors::AppResult<()> {
        if self.endpoint_url.is_empty() {
            return Err(crate::shared::errors::AppError::configuration(
                "ストレージのエンドポイントが設定されていません",
            ));
        }
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            return Err(crate::shared::errors::AppError::configuration(
                "ストレージの認証情報が設定されていません",
            ));
        }
        if self.bucket_name.is_empty() {
            return Err(crate::shared::errors::AppError::configuration(
                "ストレージのバケット名が設定されていません",
            ));
        }
        if self.signed_url_ttl_secs == 0 {
            return Err(crate::shared::errors::AppError::configuration(
                "署名付きURLの有効期間は0より大きい値である必要があります",
            ));
        }
        Ok(())
    }
}

/// 為替レートAPI設定
#[derive(Debug, Clone)]
pub struct RatesConfig {
    pub api_url: String,
}

impl RatesConfig {
    /// 基準通貨EURのレート表を返す公開API
    pub const DEFAULT_API_URL: &'static str = "https://open.er-api.com/v6/latest/EUR";

    pub fn from_env() -> Self {
        Self {
            api_url: crate::get_env_var_or_default!(
                "EXCHANGE_RATE_API_URL",
                Self::DEFAULT_API_URL
            ),
        }
    }
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            api_url: Self::DEFAULT_API_URL.to_string(),
        }
    }
}

/// HTTP API設定
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// APIリクエストのタイムアウト（秒）
    pub timeout_seconds: u64,
    /// APIリクエストの最大リトライ回数
    pub max_retries: u32,
}

impl ApiConfig {
    /// 環境変数からAPI設定を読み込む
    pub fn from_env() -> Self {
        let timeout_seconds = crate::get_env_var_or_default!("API_TIMEOUT_SECONDS", "30")
            .parse()
            .unwrap_or_else(|_| {
                log::warn!(
                    "API_TIMEOUT_SECONDSのパースに失敗しました。デフォルト値30秒を使用します"
                );
                30
            });

        let max_retries = crate::get_env_var_or_default!("API_MAX_RETRIES", "3")
            .parse()
            .unwrap_or_else(|_| {
                log::warn!("API_MAX_RETRIESのパースに失敗しました。デフォルト値3回を使用します");
                3
            });

        log::info!("API設定: timeout={timeout_seconds}s, max_retries={max_retries}");

        Self {
            timeout_seconds,
            max_retries,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            max_retries: 3,
        }
    }
}
