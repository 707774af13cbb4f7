use super::models::{NamePrompt, UserSettings};
use crate::features::auth::models::AuthUser;
use crate::features::currency::{is_valid_currency_code, normalize_currency_code};
use crate::features::receipts::repository::RemoteDatabase;
use crate::shared::errors::{AppError, AppResult};
use log::{info, warn};

/// ログイン直後の設定解決結果
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsBootstrap {
    /// 表示通貨（設定行がなければNone）
    pub preferred_currency: Option<String>,
    /// 表示名
    pub full_name: Option<String>,
    /// 名前入力ダイアログの状態
    pub name_prompt: NamePrompt,
}

/// ユーザー設定を取得し、表示通貨と表示名を確定させる
///
/// 設定行がない場合は作成する。名前が決まらない場合は名前入力を強制する。
pub async fn bootstrap_settings(
    database: &dyn RemoteDatabase,
    user: &AuthUser,
) -> AppResult<SettingsBootstrap> {
    let provider_name = user.provider_name().map(str::to_string);

    match database.fetch_settings(&user.id).await? {
        Some(settings) => {
            if let Some(name) = settings.display_name() {
                info!("ユーザー設定を読み込みました: user_id={}", user.id);
                return Ok(SettingsBootstrap {
                    preferred_currency: Some(settings.preferred_currency.clone()),
                    full_name: Some(name.to_string()),
                    name_prompt: NamePrompt::None,
                });
            }

            match provider_name {
                Some(name) => {
                    let updated = UserSettings {
                        full_name: Some(name.clone()),
                        ..settings
                    };
                    // 保存に失敗しても表示名は採用する
                    if let Err(e) = database.upsert_settings(&updated).await {
                        warn!("プロバイダー名の保存に失敗しました: user_id={}, error={e}", user.id);
                    }
                    Ok(SettingsBootstrap {
                        preferred_currency: Some(updated.preferred_currency),
                        full_name: Some(name),
                        name_prompt: NamePrompt::None,
                    })
                }
                None => {
                    info!("表示名が未設定です。名前入力を求めます: user_id={}", user.id);
                    Ok(SettingsBootstrap {
                        preferred_currency: Some(settings.preferred_currency),
                        full_name: None,
                        name_prompt: NamePrompt::Forced,
                    })
                }
            }
        }
        None => match provider_name {
            Some(name) => {
                let created = UserSettings::new(user.id.clone(), Some(name.clone()));
                if let Err(e) = database.insert_settings(&created).await {
                    warn!("ユーザー設定の作成に失敗しました: user_id={}, error={e}", user.id);
                }
                info!("ユーザー設定を作成しました: user_id={}", user.id);
                Ok(SettingsBootstrap {
                    preferred_currency: Some(created.preferred_currency),
                    full_name: Some(name),
                    name_prompt: NamePrompt::None,
                })
            }
            None => {
                info!("ユーザー設定がありません。名前入力を求めます: user_id={}", user.id);
                Ok(SettingsBootstrap {
                    preferred_currency: None,
                    full_name: None,
                    name_prompt: NamePrompt::Forced,
                })
            }
        },
    }
}

/// 設定ダイアログの入力を検証する
///
/// # 戻り値
/// 正規化した通貨コードと表示名
pub fn validate_settings(
    currency: &str,
    full_name: &str,
    name_prompt: NamePrompt,
) -> AppResult<(String, Option<String>)> {
    let currency = normalize_currency_code(currency);
    if !is_valid_currency_code(&currency) {
        return Err(AppError::validation(format!(
            "通貨コードが不正です: {currency}"
        )));
    }

    let name = full_name.trim();
    if name.is_empty() && name_prompt == NamePrompt::Forced {
        return Err(AppError::validation("名前を入力してください"));
    }

    let name = (!name.is_empty()).then(|| name.to_string());
    Ok((currency, name))
}
