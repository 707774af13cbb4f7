// ゲストモード機能モジュール

pub mod local_store;
pub mod migration;

pub use local_store::{GuestReceipts, JsonFileStore, LocalStore, LocalStoreKeys, MemoryLocalStore};
pub use migration::{migrate_receipts, offer_migration, report_migration, MigrationOffer, MigrationResult};
