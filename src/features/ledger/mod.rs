// 経費台帳モジュール

pub mod prompt;
pub mod service;

pub use prompt::UserPrompt;
pub use service::{
    ExpenseLedger, LedgerPorts, Notice, DONATION_PROMPT_AT, DONATION_PROMPT_DELAY,
};
