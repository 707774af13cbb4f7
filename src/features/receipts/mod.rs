// レシート機能モジュール

pub mod extraction;
pub mod models;
pub mod repository;
pub mod storage;
pub mod store;

pub use extraction::{
    manual_entry_placeholder, ExtractedReceipt, GeoPoint, ManualEntry, ReceiptExtractor,
    UNKNOWN_MERCHANT,
};
pub use models::{ExpenseCategory, ExpenseType, Receipt, ReceiptRow};
pub use repository::{PostgrestClient, RemoteDatabase};
pub use storage::{receipt_object_key, ObjectStorage, S3ObjectStorage};
pub use store::{display_receipts, select_receipt, ReceiptStore};
