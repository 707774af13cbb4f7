//! インライン画像（data URL）のエンコード・デコード
//!
//! ゲストモードのレシートは画像を `data:<mime>;base64,<payload>` 形式で保持する。
//! アップロード時にはバイナリへ戻す必要がある。

use base64::{engine::general_purpose, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;

/// MIMEが読み取れない場合の既定値
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

static DATA_URL_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data:([^;,]*)(;[^,]*)?$").expect("data URLヘッダーの正規表現が不正です")
});

/// デコード済みのインライン画像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// data URL かどうかを判定する
pub fn is_data_url(source: &str) -> bool {
    source.starts_with("data:")
}

/// data URL をバイナリへ戻す
///
/// # 戻り値
/// インライン画像でない（署名付きURL・空文字など）またはデコードできない場合はNone
pub fn decode_data_url(source: &str) -> Option<InlineImage> {
    if !is_data_url(source) {
        return None;
    }

    let (header, payload) = source.split_once(',')?;
    let captures = DATA_URL_HEADER.captures(header)?;

    let mime_type = captures
        .get(1)
        .map(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_IMAGE_MIME)
        .to_string();

    let is_base64 = captures
        .get(2)
        .map(|m| m.as_str().split(';').any(|p| p == "base64"))
        .unwrap_or(false);

    let bytes = if is_base64 {
        match general_purpose::STANDARD.decode(payload.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("インライン画像のBase64デコードに失敗しました: {e}");
                return None;
            }
        }
    } else {
        payload.as_bytes().to_vec()
    };

    Some(InlineImage { mime_type, bytes })
}

/// バイナリを data URL へエンコードする
pub fn encode_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime_type};base64,{}",
        general_purpose::STANDARD.encode(bytes)
    )
}
