//! 通貨換算
//!
//! 換算は常に基準通貨を経由する（`amount / rate[source] * rate[target]`）。
//! 通貨ペアを直接換算するレートは持たない。

use super::models::RateTable;
use thiserror::Error;

/// 換算できなかった理由
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionWarning {
    /// レート表が未取得
    #[error("為替レートが未取得です")]
    RatesUnavailable,

    /// レート表に通貨が存在しない
    #[error("為替レートがありません: {0}")]
    MissingRate(String),
}

/// 換算を試みる
///
/// # 戻り値
/// 換算後の金額。同一通貨なら元の金額をそのまま返す。
/// レートが足りない場合は警告を返す（呼び出し側は元の金額で続行できる）。
pub fn try_convert(
    amount: f64,
    source: &str,
    target: &str,
    rates: Option<&RateTable>,
) -> Result<f64, ConversionWarning> {
    // 同一通貨は浮動小数点の誤差を避けるため計算しない
    if source == target {
        return Ok(amount);
    }

    let rates = rates.ok_or(ConversionWarning::RatesUnavailable)?;
    let source_rate = rates
        .rate(source)
        .ok_or_else(|| ConversionWarning::MissingRate(source.to_string()))?;
    let target_rate = rates
        .rate(target)
        .ok_or_else(|| ConversionWarning::MissingRate(target.to_string()))?;

    Ok(amount / source_rate * target_rate)
}

/// 金額を換算する
///
/// レートが足りない場合は警告ログを出して元の金額を返す。失敗はしない。
pub fn convert(amount: f64, source: &str, target: &str, rates: Option<&RateTable>) -> f64 {
    match try_convert(amount, source, target, rates) {
        Ok(converted) => converted,
        Err(ConversionWarning::RatesUnavailable) => amount,
        Err(warning) => {
            log::warn!("換算をスキップしました: {source} -> {target}: {warning}");
            amount
        }
    }
}

/// レシートに記録する換算レート（source → target）
///
/// どちらかのレートが欠けている場合は1を返すため、
/// `convert(amount) == amount * exchange_rate_for(...)` が常に成り立つ。
pub fn exchange_rate_for(source: &str, target: &str, rates: Option<&RateTable>) -> f64 {
    if source == target {
        return 1.0;
    }

    match rates.and_then(|r| Some((r.rate(source)?, r.rate(target)?))) {
        Some((source_rate, target_rate)) => target_rate / source_rate,
        None => 1.0,
    }
}
