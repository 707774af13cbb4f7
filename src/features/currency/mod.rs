// 通貨換算機能モジュール

pub mod api_client;
pub mod models;
pub mod service;

pub use api_client::{ExchangeRateApiClient, RateSource};
pub use models::{
    is_valid_currency_code, normalize_currency_code, RateTable, DEFAULT_CURRENCY,
    SUPPORTED_CURRENCIES,
};
pub use service::{convert, exchange_rate_for, try_convert, ConversionWarning};
