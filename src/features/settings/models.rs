use crate::features::currency::DEFAULT_CURRENCY;
use serde::{Deserialize, Serialize};

/// `user_settings` テーブルの行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: String,
    #[serde(default = "default_currency")]
    pub preferred_currency: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl UserSettings {
    /// 既定通貨で新しい設定を作成
    pub fn new(user_id: impl Into<String>, full_name: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            preferred_currency: default_currency(),
            full_name,
        }
    }

    /// 空白でない表示名
    pub fn display_name(&self) -> Option<&str> {
        self.full_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

/// 名前入力ダイアログの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamePrompt {
    /// 表示しない
    #[default]
    None,
    /// 通常の設定ダイアログ（閉じられる）
    Optional,
    /// 名前が未設定のため閉じられない
    Forced,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_defaults() {
        let settings: UserSettings = serde_json::from_str(r#"{"user_id":"u-1"}"#).unwrap();
        assert_eq!(settings.preferred_currency, "EUR");
        assert_eq!(settings.display_name(), None);
    }

    #[test]
    fn test_blank_name_is_not_a_name() {
        let settings = UserSettings::new("u-1", Some("   ".to_string()));
        assert_eq!(settings.display_name(), None);

        let named = UserSettings::new("u-1", Some(" Alice ".to_string()));
        assert_eq!(named.display_name(), Some("Alice"));
    }
}
