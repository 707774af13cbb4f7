use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// 経費カテゴリ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExpenseCategory {
    FoodAndDining,
    Transportation,
    Accommodation,
    Supplies,
    Services,
    Entertainment,
    Health,
    Shopping,
    Utilities,
    Other,
}

impl ExpenseCategory {
    pub const ALL: [ExpenseCategory; 10] = [
        ExpenseCategory::FoodAndDining,
        ExpenseCategory::Transportation,
        ExpenseCategory::Accommodation,
        ExpenseCategory::Supplies,
        ExpenseCategory::Services,
        ExpenseCategory::Entertainment,
        ExpenseCategory::Health,
        ExpenseCategory::Shopping,
        ExpenseCategory::Utilities,
        ExpenseCategory::Other,
    ];

    /// 保存・表示に使うラベル
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseCategory::FoodAndDining => "Food & Dining",
            ExpenseCategory::Transportation => "Transportation",
            ExpenseCategory::Accommodation => "Accommodation",
            ExpenseCategory::Supplies => "Supplies",
            ExpenseCategory::Services => "Services",
            ExpenseCategory::Entertainment => "Entertainment",
            ExpenseCategory::Health => "Health",
            ExpenseCategory::Shopping => "Shopping",
            ExpenseCategory::Utilities => "Utilities",
            ExpenseCategory::Other => "Other",
        }
    }

    /// ラベルから解析する（大文字小文字・前後空白は無視）
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(label))
    }
}

/// 未知のカテゴリは Other として扱う
impl From<String> for ExpenseCategory {
    fn from(value: String) -> Self {
        Self::parse(&value).unwrap_or(ExpenseCategory::Other)
    }
}

impl From<ExpenseCategory> for String {
    fn from(value: ExpenseCategory) -> Self {
        value.as_str().to_string()
    }
}

/// 経費区分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExpenseType {
    Business,
    Private,
}

impl ExpenseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseType::Business => "Business",
            ExpenseType::Private => "Private",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "business" => Some(ExpenseType::Business),
            "private" => Some(ExpenseType::Private),
            _ => None,
        }
    }
}

/// 未知の区分は Business として扱う
impl From<String> for ExpenseType {
    fn from(value: String) -> Self {
        Self::parse(&value).unwrap_or(ExpenseType::Business)
    }
}

impl From<ExpenseType> for String {
    fn from(value: ExpenseType) -> Self {
        value.as_str().to_string()
    }
}

/// 時刻を "HH:MM" 形式で入出力する
///
/// テーブル側の time 型は "HH:MM:SS" を返すため、読み込みは両方を受け付ける
pub mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("不正な時刻です: {raw}")))
    }

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .ok()
    }
}

/// レシート（経費1件）
///
/// 端末内（ゲストモード）ではこの形のまま画像込みでシリアライズされる。
/// `image_base64` は表示用（data URL か署名付きURL）で、正本は `storage_path`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: String,
    pub merchant_name: String,
    #[serde(default)]
    pub merchant_address: String,
    pub date: NaiveDate,
    #[serde(with = "clock_time")]
    pub time: NaiveTime,
    pub amount: f64,
    pub currency: String,
    #[serde(default)]
    pub vat: f64,
    pub exchange_rate: f64,
    pub converted_amount: f64,
    pub target_currency: String,
    pub category: ExpenseCategory,
    #[serde(rename = "type")]
    pub expense_type: ExpenseType,
    #[serde(default)]
    pub image_base64: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    /// 作成日時（エポックミリ秒）
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl Receipt {
    /// 新しいレシートIDを採番する
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// 位置情報を持っているか
    pub fn has_location(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// `receipts` テーブルの行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptRow {
    pub id: String,
    pub user_id: String,
    pub merchant_name: String,
    #[serde(default)]
    pub merchant_address: Option<String>,
    pub date: NaiveDate,
    #[serde(with = "clock_time")]
    pub time: NaiveTime,
    pub amount: f64,
    pub currency: String,
    #[serde(default)]
    pub vat: Option<f64>,
    #[serde(default)]
    pub exchange_rate: Option<f64>,
    #[serde(default)]
    pub converted_amount: Option<f64>,
    #[serde(default)]
    pub target_currency: Option<String>,
    pub category: ExpenseCategory,
    #[serde(rename = "type")]
    pub expense_type: ExpenseType,
    #[serde(default)]
    pub image_path: Option<String>,
    pub created_at: i64,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl ReceiptRow {
    /// レシートを行へ変換する（画像本体ではなく保存パスを書き込む）
    pub fn from_receipt(receipt: &Receipt, owner_id: &str) -> Self {
        Self {
            id: receipt.id.clone(),
            user_id: owner_id.to_string(),
            merchant_name: receipt.merchant_name.clone(),
            merchant_address: Some(receipt.merchant_address.clone()),
            date: receipt.date,
            time: receipt.time,
            amount: receipt.amount,
            currency: receipt.currency.clone(),
            vat: Some(receipt.vat),
            exchange_rate: Some(receipt.exchange_rate),
            converted_amount: Some(receipt.converted_amount),
            target_currency: Some(receipt.target_currency.clone()),
            category: receipt.category,
            expense_type: receipt.expense_type,
            image_path: receipt.storage_path.clone(),
            created_at: receipt.created_at,
            latitude: receipt.latitude,
            longitude: receipt.longitude,
        }
    }

    /// 行をレシートへ変換する
    ///
    /// 表示用画像は空のまま返し、署名付きURLは後から解決する
    pub fn into_receipt(self) -> Receipt {
        let exchange_rate = self.exchange_rate.unwrap_or(1.0);
        let converted_amount = self
            .converted_amount
            .unwrap_or(self.amount * exchange_rate);
        let target_currency = self.target_currency.unwrap_or_else(|| self.currency.clone());

        Receipt {
            id: self.id,
            merchant_name: self.merchant_name,
            merchant_address: self.merchant_address.unwrap_or_default(),
            date: self.date,
            time: self.time,
            amount: self.amount,
            currency: self.currency,
            vat: self.vat.unwrap_or(0.0),
            exchange_rate,
            converted_amount,
            target_currency,
            category: self.category,
            expense_type: self.expense_type,
            image_base64: String::new(),
            storage_path: self.image_path.filter(|p| !p.is_empty()),
            created_at: self.created_at,
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}
