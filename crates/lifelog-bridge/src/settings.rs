//! User settings edited through the configuration UI.
//!
//! Each setting is persisted individually under its own store key and is
//! independently optional: a setting that was never submitted stays unset
//! rather than taking a default. The [`ConfigStore`] is loaded once at
//! startup and then only changes through [`ConfigStore::apply_update`].
//!
//! # Round trip with the configuration page
//!
//! Opening the page: [`ConfigStore::build_outbound_query_string`] serializes
//! every set value as a query parameter.
//!
//! | Setting | Store key | Query param | Result key |
//! |---------|-----------|-------------|------------|
//! | event list | `event-list` | `ev` | `event-list` |
//! | begin prefix | `begin-prefix` | `bpre` | `begin-prefix` |
//! | end prefix | `end-prefix` | `epre` | `end-prefix` |
//! | endpoint | `url` | `url` | `url` |
//! | data field | `data-field` | `data_field` | `data-field` |
//! | extra fields | `extra-fields` | `extra` | `extra-fields` |
//! | algorithm | `sign-algorithm` | `s_algo` | `signAlgorithm` |
//! | signature field | `sign-field-name` | `s_field` | `signFieldName` |
//! | signature format | `sign-field-format` | `s_fieldf` | `signFieldFormat` |
//! | key | `sign-key` | `s_key` | `signKey` |
//! | key format | `sign-key-format` | `s_keyf` | `signKeyFormat` |
//!
//! Closing the page: the result JSON is handed to
//! [`ConfigStore::apply_update`]; keys that are absent or `null` leave the
//! current value untouched.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use lifelog_store::{Store, setting_keys};
use lifelog_types::{Configuration, EventListSettings, ExtraField, SigningConfig};

use crate::encoding::{decode_component, encode_component};

/// A user-editable setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Setting {
    EventList,
    BeginPrefix,
    EndPrefix,
    Url,
    DataField,
    ExtraFields,
    SignAlgorithm,
    SignFieldName,
    SignFieldFormat,
    SignKey,
    SignKeyFormat,
}

impl Setting {
    /// All settings, in query string order.
    pub const ALL: [Setting; 11] = [
        Setting::EventList,
        Setting::BeginPrefix,
        Setting::EndPrefix,
        Setting::Url,
        Setting::DataField,
        Setting::ExtraFields,
        Setting::SignAlgorithm,
        Setting::SignFieldName,
        Setting::SignFieldFormat,
        Setting::SignKey,
        Setting::SignKeyFormat,
    ];

    /// Key in the configuration UI result payload.
    pub fn payload_key(&self) -> &'static str {
        match self {
            Setting::EventList => "event-list",
            Setting::BeginPrefix => "begin-prefix",
            Setting::EndPrefix => "end-prefix",
            Setting::Url => "url",
            Setting::DataField => "data-field",
            Setting::ExtraFields => "extra-fields",
            Setting::SignAlgorithm => "signAlgorithm",
            Setting::SignFieldName => "signFieldName",
            Setting::SignFieldFormat => "signFieldFormat",
            Setting::SignKey => "signKey",
            Setting::SignKeyFormat => "signKeyFormat",
        }
    }

    /// Key under which the value is persisted.
    pub fn storage_key(&self) -> &'static str {
        match self {
            Setting::EventList => setting_keys::EVENT_LIST,
            Setting::BeginPrefix => setting_keys::BEGIN_PREFIX,
            Setting::EndPrefix => setting_keys::END_PREFIX,
            Setting::Url => setting_keys::URL,
            Setting::DataField => setting_keys::DATA_FIELD,
            Setting::ExtraFields => setting_keys::EXTRA_FIELDS,
            Setting::SignAlgorithm => setting_keys::SIGN_ALGORITHM,
            Setting::SignFieldName => setting_keys::SIGN_FIELD_NAME,
            Setting::SignFieldFormat => setting_keys::SIGN_FIELD_FORMAT,
            Setting::SignKey => setting_keys::SIGN_KEY,
            Setting::SignKeyFormat => setting_keys::SIGN_KEY_FORMAT,
        }
    }

    /// Query parameter used when opening the configuration UI.
    pub fn query_param(&self) -> &'static str {
        match self {
            Setting::EventList => "ev",
            Setting::BeginPrefix => "bpre",
            Setting::EndPrefix => "epre",
            Setting::Url => "url",
            Setting::DataField => "data_field",
            Setting::ExtraFields => "extra",
            Setting::SignAlgorithm => "s_algo",
            Setting::SignFieldName => "s_field",
            Setting::SignFieldFormat => "s_fieldf",
            Setting::SignKey => "s_key",
            Setting::SignKeyFormat => "s_keyf",
        }
    }

    /// Whether the setting is part of what the device displays.
    pub fn is_event_list(&self) -> bool {
        matches!(
            self,
            Setting::EventList | Setting::BeginPrefix | Setting::EndPrefix
        )
    }
}

/// Errors from applying a configuration submission.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Configuration payload is not valid percent-encoded UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("Configuration payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Configuration payload must be a JSON object")]
    NotAnObject,
    #[error("Failed to persist setting: {0}")]
    Store(#[from] lifelog_store::Error),
}

/// What a configuration submission changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigUpdate {
    /// Settings whose value differs from before.
    pub changed: Vec<Setting>,
    /// Whether the payload carried any event-list setting, in which case the
    /// device must be sent the settings message.
    pub event_list_touched: bool,
}

/// In-memory view of the persisted settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigStore {
    values: BTreeMap<Setting, String>,
}

impl ConfigStore {
    /// Read every persisted setting once. Missing settings stay unset.
    pub fn load(store: &Store) -> lifelog_store::Result<Self> {
        let mut values = BTreeMap::new();
        for setting in Setting::ALL {
            if let Some(value) = store.get_setting(setting.storage_key())? {
                values.insert(setting, value);
            }
        }
        debug!("Loaded {} setting(s)", values.len());
        Ok(Self { values })
    }

    /// Current raw value of a setting.
    pub fn get(&self, setting: Setting) -> Option<&str> {
        self.values.get(&setting).map(String::as_str)
    }

    /// Apply a configuration UI result.
    ///
    /// `response` is the JSON object returned by the page, either as-is or
    /// percent-encoded. Every recognized key holding a string is persisted
    /// and then applied in memory; absent and `null` keys are left alone.
    pub fn apply_update(
        &mut self,
        store: &Store,
        response: &str,
    ) -> Result<ConfigUpdate, SettingsError> {
        let trimmed = response.trim();
        let json = if trimmed.starts_with('{') {
            trimmed.to_string()
        } else {
            decode_component(trimmed)?
        };

        let payload: serde_json::Value = serde_json::from_str(&json)?;
        let object = payload.as_object().ok_or(SettingsError::NotAnObject)?;

        let mut update = ConfigUpdate::default();

        for setting in Setting::ALL {
            let value = match object.get(setting.payload_key()) {
                None | Some(serde_json::Value::Null) => continue,
                Some(serde_json::Value::String(s)) => s,
                Some(other) => {
                    warn!(
                        "Ignoring non-string value for {}: {}",
                        setting.payload_key(),
                        other
                    );
                    continue;
                }
            };

            if setting.is_event_list() {
                update.event_list_touched = true;
            }

            if self.get(setting) == Some(value.as_str()) {
                continue;
            }

            store.set_setting(setting.storage_key(), value)?;
            self.values.insert(setting, value.clone());
            update.changed.push(setting);
        }

        info!("Applied configuration update: {:?}", update.changed);

        if self.has_partial_signing() {
            warn!("Signing is partially configured or invalid; uploads will be unsigned");
        }

        Ok(update)
    }

    /// Upload configuration derived from the current settings.
    pub fn configuration(&self) -> Configuration {
        Configuration {
            endpoint: self.non_empty(Setting::Url).map(str::to_string),
            data_field: self.non_empty(Setting::DataField).map(str::to_string),
            extra_fields: self
                .get(Setting::ExtraFields)
                .map(decode_extra_fields)
                .unwrap_or_default(),
            signing: self.signing(),
        }
    }

    /// Signing parameters, when all five are set and valid.
    pub fn signing(&self) -> Option<SigningConfig> {
        let algorithm = self.non_empty(Setting::SignAlgorithm)?;
        let field_name = self.non_empty(Setting::SignFieldName)?;
        let field_format = self.non_empty(Setting::SignFieldFormat)?;
        let key = self.non_empty(Setting::SignKey)?;
        let key_format = self.non_empty(Setting::SignKeyFormat)?;

        let parsed = (|| {
            Ok::<_, lifelog_types::ParseError>(SigningConfig {
                algorithm: algorithm.parse()?,
                field_name: field_name.to_string(),
                field_format: field_format.parse()?,
                key: key.to_string(),
                key_format: key_format.parse()?,
            })
        })();

        match parsed {
            Ok(config) => Some(config),
            Err(e) => {
                debug!("Signing disabled: {}", e);
                None
            }
        }
    }

    /// Settings shown on and synchronized to the device.
    pub fn event_list_settings(&self) -> EventListSettings {
        EventListSettings {
            events: EventListSettings::parse_event_list(
                self.get(Setting::EventList).unwrap_or_default(),
            ),
            begin_prefix: self.get(Setting::BeginPrefix).map(str::to_string),
            end_prefix: self.get(Setting::EndPrefix).map(str::to_string),
            extra_fields: self
                .get(Setting::ExtraFields)
                .filter(|raw| !raw.is_empty())
                .map(|raw| raw.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
            signing: self.signing(),
        }
    }

    /// Query string for opening the configuration UI, starting with `?`.
    ///
    /// Unset settings are omitted; every value is percent-encoded.
    pub fn build_outbound_query_string(&self) -> String {
        let mut query = format!("?v={}", env!("CARGO_PKG_VERSION"));
        for setting in Setting::ALL {
            if let Some(value) = self.get(setting) {
                query.push('&');
                query.push_str(setting.query_param());
                query.push('=');
                query.push_str(&encode_component(value));
            }
        }
        query
    }

    /// Full configuration UI URL.
    pub fn configuration_url(&self, base_url: &str) -> String {
        format!("{}{}", base_url, self.build_outbound_query_string())
    }

    fn non_empty(&self, setting: Setting) -> Option<&str> {
        self.get(setting).filter(|v| !v.is_empty())
    }

    fn has_partial_signing(&self) -> bool {
        let any_set = [
            Setting::SignAlgorithm,
            Setting::SignFieldName,
            Setting::SignFieldFormat,
            Setting::SignKey,
            Setting::SignKeyFormat,
        ]
        .iter()
        .any(|s| self.non_empty(*s).is_some());
        any_set && self.signing().is_none()
    }
}

/// Decode a stored extra-field list.
///
/// The list is comma-joined; each item is a percent-encoded `name=value`
/// pair. Items without `=` or with invalid encoding are skipped.
///
/// # Example
///
/// ```
/// use lifelog_bridge::settings::decode_extra_fields;
///
/// let fields = decode_extra_fields("source%3Dwatch,tz%3DUTC%2B1");
/// assert_eq!(fields[0].name, "source");
/// assert_eq!(fields[1].value, "UTC+1");
/// ```
pub fn decode_extra_fields(raw: &str) -> Vec<ExtraField> {
    if raw.is_empty() {
        return Vec::new();
    }

    raw.split(',')
        .filter_map(|item| {
            let decoded = match decode_component(item) {
                Ok(d) => d,
                Err(e) => {
                    warn!("Skipping undecodable extra field {:?}: {}", item, e);
                    return None;
                }
            };
            match decoded.split_once('=') {
                Some((name, value)) => Some(ExtraField::new(name, value)),
                None => {
                    warn!("Skipping extra field without '=': {:?}", decoded);
                    None
                }
            }
        })
        .collect()
}
