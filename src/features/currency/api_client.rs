use super::models::RateTable;
use crate::shared::config::environment::RatesConfig;
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// 為替レートの取得元
#[async_trait]
pub trait RateSource: Send + Sync {
    /// レート表を取得する
    ///
    /// # 戻り値
    /// 取得できなかった場合はNone（換算なしで続行する）
    async fn fetch_rates(&self) -> Option<RateTable>;
}

/// 為替レートAPIのレスポンス
#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    rates: Option<HashMap<String, f64>>,
}

/// 公開為替レートAPIクライアント（認証不要・パラメータなし）
pub struct ExchangeRateApiClient {
    client: reqwest::Client,
    config: RatesConfig,
}

impl ExchangeRateApiClient {
    pub fn new(config: RatesConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AppError::configuration(format!("HTTPクライアント初期化失敗: {e}")))?;
        Ok(Self { client, config })
    }

    async fn request_rates(&self) -> AppResult<RateTable> {
        let response = self.client.get(&self.config.api_url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::remote(format!(
                "為替レートAPIがエラーを返しました: status={}",
                response.status()
            )));
        }

        let body: RatesResponse = response
            .json()
            .await
            .map_err(|e| AppError::remote(format!("為替レートの解析に失敗しました: {e}")))?;

        parse_rates(body)
    }
}

fn parse_rates(body: RatesResponse) -> AppResult<RateTable> {
    if let Some(result) = body.result.as_deref() {
        if result != "success" {
            return Err(AppError::remote(format!("為替レートAPIの結果: {result}")));
        }
    }

    match body.rates {
        Some(rates) if !rates.is_empty() => Ok(RateTable::new(rates)),
        _ => Err(AppError::remote("為替レートが含まれていません")),
    }
}

#[async_trait]
impl RateSource for ExchangeRateApiClient {
    async fn fetch_rates(&self) -> Option<RateTable> {
        log::info!("為替レートを取得します: url={}", self.config.api_url);
        match self.request_rates().await {
            Ok(table) => {
                log::info!("為替レートを取得しました: currencies={}", table.len());
                Some(table)
            }
            Err(e) => {
                log::error!("為替レートの取得に失敗しました: {e}");
                None
            }
        }
    }
}
