use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 既定の表示通貨
pub const DEFAULT_CURRENCY: &str = "EUR";

/// 設定画面で選択できる通貨
pub const SUPPORTED_CURRENCIES: [&str; 11] = [
    "EUR", "USD", "SEK", "GBP", "JPY", "CAD", "AUD", "CHF", "CNY", "NOK", "DKK",
];

/// 基準通貨に対する各通貨のレート表
///
/// 値は「基準通貨1単位あたりのその通貨の量」（EUR基準ならEUR=1, USD=1.1など）。
/// セッションごとに一度だけ取得し、永続化しない。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateTable {
    rates: HashMap<String, f64>,
}

impl RateTable {
    /// レート表を作成する
    ///
    /// 0以下・非有限のレートは使えないため取り除く
    pub fn new(rates: HashMap<String, f64>) -> Self {
        let rates = rates
            .into_iter()
            .filter(|(code, rate)| {
                let usable = rate.is_finite() && *rate > 0.0;
                if !usable {
                    log::warn!("使用できない為替レートを除外しました: {code}={rate}");
                }
                usable
            })
            .map(|(code, rate)| (normalize_currency_code(&code), rate))
            .collect();
        Self { rates }
    }

    /// 通貨コードに対するレートを取得
    pub fn rate(&self, currency: &str) -> Option<f64> {
        self.rates.get(currency).copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for RateTable {
    fn from_iter<T: IntoIterator<Item = (S, f64)>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// 通貨コードを正規化（前後空白除去・大文字化）
pub fn normalize_currency_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// 3文字の英字コードかどうかを判定
pub fn is_valid_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic())
}
