use thiserror::Error;

/// アプリケーション全体で使用される統一エラー型
#[derive(Debug, Error)]
pub enum AppError {
    /// 起動時にバックエンドへ到達できない場合のエラー
    #[error("バックエンドに接続できません: {0}")]
    BackendUnreachable(String),

    /// リモートテーブルに期待するカラムが存在しない場合のエラー
    #[error("スキーマエラー: テーブル {table} にカラム {column} がありません")]
    MissingColumn { table: String, column: String },

    /// リモートストレージ（テーブル操作）関連のエラー
    #[error("リモートエラー: {0}")]
    Remote(String),

    /// オブジェクトストレージへのアップロード関連のエラー
    #[error("アップロードエラー: {0}")]
    Upload(String),

    /// 認証関連のエラー
    #[error("認証エラー: {0}")]
    Auth(String),

    /// バリデーション関連のエラー
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// リソースが見つからない場合のエラー
    #[error("リソースが見つかりません: {0}")]
    NotFound(String),

    /// 設定関連のエラー
    #[error("設定エラー: {0}")]
    Configuration(String),

    /// ローカルストレージ関連のエラー
    #[error("ローカルストレージエラー: {0}")]
    LocalStorage(String),

    /// I/O関連のエラー
    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    /// JSON解析エラー
    #[error("JSON解析エラー: {0}")]
    Json(#[from] serde_json::Error),
}

/// エラーの重要度を表す列挙型
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorSeverity {
    /// 低重要度（ユーザー入力エラーなど）
    Low,
    /// 中重要度（外部サービス一時的エラーなど）
    Medium,
    /// 高重要度（スキーマ不整合など）
    High,
    /// 最重要（バックエンド到達不能など）
    Critical,
}

impl AppError {
    /// ユーザーに表示するためのフレンドリーなメッセージを取得
    ///
    /// # 戻り値
    /// ユーザーに表示可能なエラーメッセージ
    pub fn user_message(&self) -> &str {
        match self {
            AppError::BackendUnreachable(_) => {
                "サーバーに接続できません。再読み込みしてください"
            }
            AppError::MissingColumn { .. } => {
                "データベースのスキーマが古いため保存できません。管理者に修復を依頼してください"
            }
            AppError::Remote(_) => "クラウドとの同期でエラーが発生しました",
            AppError::Upload(_) => "画像のアップロードに失敗しました",
            AppError::Auth(_) => "認証に失敗しました。再度ログインしてください",
            AppError::Validation(msg) => msg,
            AppError::NotFound(msg) => msg,
            AppError::Configuration(_) => "設定エラーが発生しました",
            AppError::LocalStorage(_) => "端末内データの保存でエラーが発生しました",
            AppError::Io(_) => "ファイル操作でエラーが発生しました",
            AppError::Json(_) => "データ形式の解析でエラーが発生しました",
        }
    }

    /// エラーの詳細情報を取得
    ///
    /// # 戻り値
    /// エラーの詳細情報（ログ出力用）
    pub fn details(&self) -> String {
        format!("{self}")
    }

    /// エラーの重要度を取得
    ///
    /// # 戻り値
    /// エラーの重要度レベル
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AppError::BackendUnreachable(_) => ErrorSeverity::Critical,
            AppError::MissingColumn { .. } => ErrorSeverity::High,
            AppError::Remote(_) => ErrorSeverity::Medium,
            AppError::Upload(_) => ErrorSeverity::Medium,
            AppError::Auth(_) => ErrorSeverity::Medium,
            AppError::Validation(_) => ErrorSeverity::Low,
            AppError::NotFound(_) => ErrorSeverity::Low,
            AppError::Configuration(_) => ErrorSeverity::High,
            AppError::LocalStorage(_) => ErrorSeverity::Medium,
            AppError::Io(_) => ErrorSeverity::Medium,
            AppError::Json(_) => ErrorSeverity::Medium,
        }
    }

    /// スキーマ不整合（カラム欠落）かどうかを判定
    pub fn is_missing_column(&self) -> bool {
        matches!(self, AppError::MissingColumn { .. })
    }

    /// バリデーションエラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `message` - バリデーションエラーメッセージ
    ///
    /// # 戻り値
    /// バリデーションエラー
    pub fn validation<S: Into<String>>(message: S) -> Self {
        AppError::Validation(message.into())
    }

    /// リソース未発見エラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `resource` - 見つからなかったリソース名
    ///
    /// # 戻り値
    /// リソース未発見エラー
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        AppError::NotFound(format!("{}が見つかりません", resource.into()))
    }

    /// カラム欠落エラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `table` - テーブル名
    /// * `column` - 欠落しているカラム名
    ///
    /// # 戻り値
    /// カラム欠落エラー
    pub fn missing_column<S: Into<String>>(table: S, column: S) -> Self {
        AppError::MissingColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// リモートエラーを作成するヘルパー関数
    pub fn remote<S: Into<String>>(message: S) -> Self {
        AppError::Remote(message.into())
    }

    /// アップロードエラーを作成するヘルパー関数
    pub fn upload<S: Into<String>>(message: S) -> Self {
        AppError::Upload(message.into())
    }

    /// 認証エラーを作成するヘルパー関数
    pub fn auth<S: Into<String>>(message: S) -> Self {
        AppError::Auth(message.into())
    }

    /// 設定エラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `message` - 設定エラーメッセージ
    ///
    /// # 戻り値
    /// 設定エラー
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        AppError::Configuration(message.into())
    }

    /// ローカルストレージエラーを作成するヘルパー関数
    pub fn local_storage<S: Into<String>>(message: S) -> Self {
        AppError::LocalStorage(message.into())
    }

    /// 接続不能エラーを作成するヘルパー関数
    pub fn backend_unreachable<S: Into<String>>(message: S) -> Self {
        AppError::BackendUnreachable(message.into())
    }
}

/// AppErrorからStringへの変換（UIへの通知用）
impl From<AppError> for String {
    fn from(error: AppError) -> Self {
        error.user_message().to_string()
    }
}

/// reqwest::ErrorからAppErrorへの変換
///
/// 接続・タイムアウト系は到達不能として扱う
impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() {
            AppError::BackendUnreachable(error.to_string())
        } else {
            AppError::Remote(error.to_string())
        }
    }
}

/// Result型のエイリアス（アプリケーション全体で使用）
pub type AppResult<T> = Result<T, AppError>;
