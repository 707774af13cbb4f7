//! レシートの作成元（画像解析結果・手入力）からレシートを組み立てる
//!
//! 画像解析APIの出力は信頼できない入力として扱い、欠損値には既定値を入れる。

use super::models::{ExpenseCategory, ExpenseType, Receipt};
use crate::features::currency::{is_valid_currency_code, normalize_currency_code, DEFAULT_CURRENCY};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::encode_data_url;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// 加盟店名が読み取れなかった場合の表示名
pub const UNKNOWN_MERCHANT: &str = "Unknown Merchant";

/// 画像解析APIが返す推定値（すべて任意）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractedReceipt {
    pub merchant_name: Option<String>,
    pub merchant_address: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub vat: Option<f64>,
    pub exchange_rate: Option<f64>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub expense_type: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// 端末の現在地
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// 画像解析（OCR）サービス
#[async_trait]
pub trait ReceiptExtractor: Send + Sync {
    /// 画像（data URL）からレシート情報を推定する
    async fn extract(&self, image_data_url: &str) -> AppResult<ExtractedReceipt>;
}

impl ExtractedReceipt {
    /// 推定値からレシートを組み立てる
    ///
    /// # 引数
    /// * `image_data_url` - 表示用のインライン画像
    /// * `target_currency` - 現在の表示通貨
    /// * `device_location` - 端末の現在地（解析結果に座標がない場合に使う）
    /// * `now` - 作成日時
    pub fn into_receipt(
        self,
        image_data_url: String,
        target_currency: &str,
        device_location: Option<GeoPoint>,
        now: DateTime<Utc>,
    ) -> Receipt {
        let amount = sanitize_amount(self.amount);
        let exchange_rate = self
            .exchange_rate
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(1.0);

        let currency = self
            .currency
            .map(|c| normalize_currency_code(&c))
            .filter(|c| is_valid_currency_code(c))
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        let date = self
            .date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
            .unwrap_or_else(|| now.date_naive());

        let time = self
            .time
            .as_deref()
            .and_then(super::models::clock_time::parse)
            .unwrap_or_else(default_time);

        let latitude = self
            .latitude
            .filter(|v| v.is_finite() && *v != 0.0)
            .or(device_location.map(|p| p.latitude));
        let longitude = self
            .longitude
            .filter(|v| v.is_finite() && *v != 0.0)
            .or(device_location.map(|p| p.longitude));

        Receipt {
            id: Receipt::new_id(),
            merchant_name: self
                .merchant_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| UNKNOWN_MERCHANT.to_string()),
            merchant_address: self.merchant_address.unwrap_or_default(),
            date,
            time,
            amount,
            currency,
            vat: sanitize_amount(self.vat),
            exchange_rate,
            converted_amount: amount * exchange_rate,
            target_currency: target_currency.to_string(),
            category: self
                .category
                .as_deref()
                .and_then(ExpenseCategory::parse)
                .unwrap_or(ExpenseCategory::Other),
            expense_type: self
                .expense_type
                .as_deref()
                .and_then(ExpenseType::parse)
                .unwrap_or(ExpenseType::Business),
            image_base64: image_data_url,
            storage_path: None,
            created_at: now.timestamp_millis(),
            latitude,
            longitude,
        }
    }
}

/// 手入力フォームの内容
#[derive(Debug, Clone, PartialEq)]
pub struct ManualEntry {
    pub merchant_name: String,
    pub amount: f64,
    pub currency: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub category: ExpenseCategory,
    pub expense_type: ExpenseType,
    /// メモ（住所欄に保存する）
    pub note: String,
}

impl ManualEntry {
    /// 入力を検証してレシートを組み立てる
    pub fn into_receipt(self, target_currency: &str, now: DateTime<Utc>) -> AppResult<Receipt> {
        let merchant_name = self.merchant_name.trim().to_string();
        if merchant_name.is_empty() {
            return Err(AppError::validation("加盟店名を入力してください"));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(AppError::validation("金額を正しく入力してください"));
        }
        let currency = normalize_currency_code(&self.currency);
        if !is_valid_currency_code(&currency) {
            return Err(AppError::validation(format!(
                "通貨コードが不正です: {}",
                self.currency
            )));
        }

        Ok(Receipt {
            id: Receipt::new_id(),
            merchant_name,
            merchant_address: self.note,
            date: self.date,
            time: self.time,
            amount: self.amount,
            currency,
            vat: 0.0,
            exchange_rate: 1.0,
            converted_amount: self.amount,
            target_currency: target_currency.to_string(),
            category: self.category,
            expense_type: self.expense_type,
            image_base64: manual_entry_placeholder(),
            storage_path: None,
            created_at: now.timestamp_millis(),
            latitude: None,
            longitude: None,
        })
    }
}

/// 手入力レシート用のプレースホルダー画像（SVGのdata URL）
pub fn manual_entry_placeholder() -> String {
    let svg = concat!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="600" viewBox="0 0 400 600" style="background-color: #f3f4f6;">"##,
        r##"<text x="50%" y="50%" dominant-baseline="middle" text-anchor="middle" font-family="sans-serif" font-size="24" fill="#9ca3af">Manual Entry</text>"##,
        r##"</svg>"##
    );
    encode_data_url("image/svg+xml", svg.as_bytes())
}

fn sanitize_amount(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite() && *v >= 0.0).unwrap_or(0.0)
}

fn default_time() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN)
}
