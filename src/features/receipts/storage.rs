// レシート画像のオブジェクトストレージ

use crate::shared::config::environment::StorageConfig;
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::{Credentials, SharedCredentialsProvider};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::{Client, Config};
use log::{debug, error, info};
use std::time::{Duration, Instant};

/// オブジェクトストレージ
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// バイナリをアップロードし、保存パスを返す
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> AppResult<String>;

    /// 保存パスから期限付きの閲覧URLを生成する
    async fn signed_url(&self, path: &str, ttl: Duration) -> AppResult<String>;
}

/// レシート画像のオブジェクトキー（`{ownerId}/{timestamp}_receipt.jpg`）
pub fn receipt_object_key(owner_id: &str, timestamp_ms: i64) -> String {
    format!("{owner_id}/{timestamp_ms}_receipt.jpg")
}

/// S3互換ストレージクライアント
#[derive(Clone)]
pub struct S3ObjectStorage {
    client: Client,
    bucket_name: String,
}

impl S3ObjectStorage {
    /// クライアントを初期化
    pub async fn new(config: StorageConfig) -> AppResult<Self> {
        info!("ストレージクライアントを初期化しています...");

        config.validate().map_err(|e| {
            error!("ストレージ設定の検証に失敗しました: {e}");
            e
        })?;

        // 認証情報はログに出さない
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "tally-lens",
        );

        debug!("AWS設定を構築中... エンドポイント: {}", config.endpoint_url);
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(config.endpoint_url.clone())
            .region(Region::new(config.region.clone()))
            .credentials_provider(SharedCredentialsProvider::new(credentials))
            .load()
            .await;

        let s3_config = Config::from(&aws_config);
        let client = Client::from_conf(s3_config);

        info!(
            "ストレージクライアントの初期化が完了しました。バケット: {}",
            config.bucket_name
        );

        Ok(Self {
            client,
            bucket_name: config.bucket_name,
        })
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> AppResult<String> {
        ensure_payload(&bytes)?;

        let file_size = bytes.len();
        info!("ファイルアップロード開始: key={key}, size={file_size} bytes, content_type={content_type}");
        let start_time = Instant::now();

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(bytes.into())
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                error!(
                    "ファイルアップロード失敗: key={key}, bucket={}, error={e}",
                    self.bucket_name
                );
                AppError::upload(format!("アップロードに失敗しました: {e}"))
            })?;

        info!(
            "ファイルアップロード成功: key={key}, duration={:?}",
            start_time.elapsed()
        );

        // テーブルにはURLではなくキーを保存する
        Ok(key.to_string())
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> AppResult<String> {
        let presigning_config = PresigningConfig::expires_in(ttl)
            .map_err(|e| AppError::upload(format!("署名付きURL設定エラー: {e}")))?;

        let presigned_request = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(path)
            .presigned(presigning_config)
            .await
            .map_err(|e| AppError::upload(format!("署名付きURL生成エラー: {e}")))?;

        debug!("署名付きURLを生成しました: path={path}, ttl={ttl:?}");
        Ok(presigned_request.uri().to_string())
    }
}

/// 空のペイロードはネットワークに出す前に拒否する
pub(crate) fn ensure_payload(bytes: &[u8]) -> AppResult<()> {
    if bytes.is_empty() {
        return Err(AppError::upload("アップロードする画像が空です"));
    }
    Ok(())
}
