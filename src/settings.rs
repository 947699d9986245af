use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

use crate::api::DashboardApi;
use crate::error::ApiError;

/// Dashboard settings as stored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    pub sms_phone: Option<String>,
    pub violation_threshold: i64,
    /// Minutes
    pub auto_logout_time: i64,
    pub notification_sound: bool,
    pub ai_sensitivity: String,
    pub auto_ai_enable: bool,
    pub sms_notification: bool,
    pub email_notification: bool,
    pub person_detection: bool,
    pub helmet_detection: bool,
    pub ppe_detection: bool,
    pub danger_zone_detection: bool,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            sms_phone: None,
            violation_threshold: 3,
            auto_logout_time: 30,
            notification_sound: true,
            ai_sensitivity: "medium".to_string(),
            auto_ai_enable: false,
            sms_notification: false,
            email_notification: false,
            person_detection: true,
            helmet_detection: true,
            ppe_detection: false,
            danger_zone_detection: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

impl DashboardSettings {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if let Some(phone) = &self.sms_phone {
            let digits_only = phone.chars().all(|c| c.is_ascii_digit());
            if !digits_only || !(10..=11).contains(&phone.len()) {
                errors.push(FieldError {
                    field: "sms_phone",
                    message: "phone number must be 10-11 digits",
                });
            }
        }
        if !(1..=10).contains(&self.violation_threshold) {
            errors.push(FieldError {
                field: "violation_threshold",
                message: "violation threshold must be between 1 and 10",
            });
        }
        if !(1..=120).contains(&self.auto_logout_time) {
            errors.push(FieldError {
                field: "auto_logout_time",
                message: "auto logout time must be between 1 and 120 minutes",
            });
        }

        errors
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("invalid settings: {}", describe(.0))]
    Invalid(Vec<FieldError>),
    #[error("unexpected settings format: {0}")]
    Malformed(String),
}

fn describe(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Accepts the settings object at the top level or nested under `settings`.
fn extract_settings(value: Value) -> Result<DashboardSettings, SettingsError> {
    let object = match value {
        Value::Object(map) if map.contains_key("auto_logout_time") => Value::Object(map),
        Value::Object(mut map) => match map.remove("settings") {
            Some(nested @ Value::Object(_)) => nested,
            _ => return Err(SettingsError::Malformed("no settings object in response".to_string())),
        },
        other => {
            return Err(SettingsError::Malformed(format!(
                "expected an object, got {}",
                other
            )))
        }
    };
    serde_json::from_value(object).map_err(|e| SettingsError::Malformed(e.to_string()))
}

/// Keeps the current settings and notifies subscribers when they change
pub struct SettingsManager {
    api: DashboardApi,
    current: watch::Sender<Option<DashboardSettings>>,
}

impl SettingsManager {
    pub fn new(api: DashboardApi) -> Self {
        let (current, _) = watch::channel(None);
        Self { api, current }
    }

    #[allow(dead_code)]
    pub fn current(&self) -> Option<DashboardSettings> {
        self.current.borrow().clone()
    }

    #[allow(dead_code)]
    pub fn subscribe(&self) -> watch::Receiver<Option<DashboardSettings>> {
        self.current.subscribe()
    }

    pub async fn load(&self) -> Result<DashboardSettings, SettingsError> {
        let value = self.api.get_settings().await?;
        let settings = extract_settings(value)?;
        info!("⚙️ Settings loaded (auto logout {} min)", settings.auto_logout_time);
        self.current.send_replace(Some(settings.clone()));
        Ok(settings)
    }

    pub async fn save(&self, settings: DashboardSettings) -> Result<(), SettingsError> {
        let errors = settings.validate();
        if !errors.is_empty() {
            return Err(SettingsError::Invalid(errors));
        }

        let body = serde_json::to_value(&settings).map_err(|e| SettingsError::Malformed(e.to_string()))?;
        if let Err(e) = self.api.save_settings(body).await {
            error!("❌ Failed to save settings: {}", e);
            return Err(e.into());
        }
        info!("⚙️ Settings saved");
        self.current.send_replace(Some(settings));
        Ok(())
    }

    #[allow(dead_code)]
    pub async fn reset_to_defaults(&self) -> Result<DashboardSettings, SettingsError> {
        self.api.reset_settings().await?;
        self.load().await
    }
}
