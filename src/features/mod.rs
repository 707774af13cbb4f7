/// 機能別モジュール
///
/// 各機能モジュールは、その機能に関連するモデル・外部サービスの境界・処理を含む。
/// `ledger` がそれらを束ねて画面からの操作を受け付ける。
pub mod auth;
pub mod currency;
pub mod feedback;
pub mod guest;
pub mod ledger;
pub mod receipts;
pub mod settings;
