/// インライン画像（data URL）ユーティリティ
pub mod data_url;

pub use data_url::{decode_data_url, encode_data_url, is_data_url, InlineImage};
