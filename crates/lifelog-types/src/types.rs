//! Core types for queued records and bridge settings.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// A single device-originated event waiting to be uploaded.
///
/// `key` is the identifier assigned by the device (its record timestamp),
/// `line` is the payload text. Records are immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QueueRecord {
    /// Opaque device-assigned identifier.
    pub key: String,
    /// Payload line sent as the upload data field.
    pub line: String,
}

impl QueueRecord {
    /// Create a new record.
    pub fn new(key: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            line: line.into(),
        }
    }
}

/// Hash function used for the HMAC signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SignAlgorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl SignAlgorithm {
    /// Canonical name as used by the configuration UI (e.g. `SHA-256`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SignAlgorithm::Sha1 => "SHA-1",
            SignAlgorithm::Sha224 => "SHA-224",
            SignAlgorithm::Sha256 => "SHA-256",
            SignAlgorithm::Sha384 => "SHA-384",
            SignAlgorithm::Sha512 => "SHA-512",
        }
    }
}

impl FromStr for SignAlgorithm {
    type Err = ParseError;

    /// Parse an algorithm name, case-insensitively, with or without the dash.
    ///
    /// # Examples
    ///
    /// ```
    /// use lifelog_types::SignAlgorithm;
    ///
    /// assert_eq!("SHA-256".parse(), Ok(SignAlgorithm::Sha256));
    /// assert_eq!("sha1".parse(), Ok(SignAlgorithm::Sha1));
    /// assert!("MD5".parse::<SignAlgorithm>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "");
        match normalized.as_str() {
            "SHA1" => Ok(SignAlgorithm::Sha1),
            "SHA224" => Ok(SignAlgorithm::Sha224),
            "SHA256" => Ok(SignAlgorithm::Sha256),
            "SHA384" => Ok(SignAlgorithm::Sha384),
            "SHA512" => Ok(SignAlgorithm::Sha512),
            _ => Err(ParseError::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for SignAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoding of the signing key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum KeyFormat {
    /// Raw UTF-8 text.
    Text,
    /// Hexadecimal digits.
    Hex,
    /// Standard base64.
    Base64,
}

impl KeyFormat {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyFormat::Text => "TEXT",
            KeyFormat::Hex => "HEX",
            KeyFormat::Base64 => "B64",
        }
    }
}

impl FromStr for KeyFormat {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TEXT" => Ok(KeyFormat::Text),
            "HEX" => Ok(KeyFormat::Hex),
            "B64" | "BASE64" => Ok(KeyFormat::Base64),
            _ => Err(ParseError::UnknownKeyFormat(s.to_string())),
        }
    }
}

impl fmt::Display for KeyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoding of the computed signature in the upload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OutputFormat {
    /// Lowercase hexadecimal.
    Hex,
    /// Standard padded base64.
    Base64,
}

impl OutputFormat {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Hex => "HEX",
            OutputFormat::Base64 => "B64",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HEX" => Ok(OutputFormat::Hex),
            "B64" | "BASE64" => Ok(OutputFormat::Base64),
            _ => Err(ParseError::UnknownOutputFormat(s.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully specified signing parameters.
///
/// Only built when every sub-field is set; a partially configured signer
/// means uploads go out unsigned.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SigningConfig {
    /// Hash function for the HMAC.
    pub algorithm: SignAlgorithm,
    /// Name of the multipart field carrying the signature.
    pub field_name: String,
    /// Encoding of the signature value.
    pub field_format: OutputFormat,
    /// Key material, encoded according to `key_format`.
    pub key: String,
    /// Encoding of `key`.
    pub key_format: KeyFormat,
}

/// A static `(name, value)` pair appended to every upload.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExtraField {
    pub name: String,
    pub value: String,
}

impl ExtraField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Upload configuration as seen by the dispatcher.
///
/// `endpoint` and `data_field` are `None` until the user configures them;
/// uploads are skipped while either is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Configuration {
    /// Destination URL of the multipart POST.
    pub endpoint: Option<String>,
    /// Name of the field carrying the record line.
    pub data_field: Option<String>,
    /// Static fields appended in order after the data and signature fields.
    pub extra_fields: Vec<ExtraField>,
    /// Signing parameters, when fully configured.
    pub signing: Option<SigningConfig>,
}

impl Configuration {
    /// Whether both the endpoint and the data field are set.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some() && self.data_field.is_some()
    }
}

/// User-facing event settings synchronized to the device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventListSettings {
    /// Event names in menu order. Names starting with `+` are long events
    /// which the device splits into begin/end entries.
    pub events: Vec<String>,
    /// Prefix the device puts in front of a long event's begin entry.
    pub begin_prefix: Option<String>,
    /// Prefix the device puts in front of a long event's end entry.
    pub end_prefix: Option<String>,
    /// Extra fields as stored (percent-encoded `name=value` items).
    pub extra_fields: Vec<String>,
    /// Signing parameters, when fully configured.
    pub signing: Option<SigningConfig>,
}

impl EventListSettings {
    /// Parse a comma-joined event list. An empty string means no events.
    ///
    /// # Examples
    ///
    /// ```
    /// use lifelog_types::EventListSettings;
    ///
    /// assert_eq!(EventListSettings::parse_event_list("Coffee,+Sleep"), vec!["Coffee", "+Sleep"]);
    /// assert!(EventListSettings::parse_event_list("").is_empty());
    /// ```
    #[must_use]
    pub fn parse_event_list(list: &str) -> Vec<String> {
        if list.is_empty() {
            Vec::new()
        } else {
            list.split(',').map(str::to_string).collect()
        }
    }
}
