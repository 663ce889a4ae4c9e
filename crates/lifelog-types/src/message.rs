//! Numeric-keyed messages exchanged with the device.
//!
//! The device link carries dictionaries of small integer keys mapped to
//! integer or string values. In JSON they appear as objects whose keys are
//! decimal strings:
//!
//! ```json
//! {"500": 1476000000, "510": "2016-10-09T08:00:00Z,3,Coffee"}
//! ```

use std::collections::BTreeMap;
use std::collections::btree_map;

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Well-known message keys.
pub mod keys {
    /// Inbound record key (integer or string).
    pub const RECORD_KEY: u32 = 500;
    /// Inbound record line (string).
    pub const RECORD_LINE: u32 = 510;
    /// Outbound begin prefix for long events.
    pub const BEGIN_PREFIX: u32 = 901;
    /// Outbound end prefix for long events.
    pub const END_PREFIX: u32 = 902;
    /// Outbound number of events.
    pub const EVENT_COUNT: u32 = 1000;
    /// Outbound key of the first event name; the rest follow sequentially.
    pub const FIRST_EVENT: u32 = 1001;
}

/// A single value in a device message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Tuple {
    Int(i64),
    Str(String),
}

impl Tuple {
    /// The string value, if this is a string tuple.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tuple::Str(s) => Some(s),
            Tuple::Int(_) => None,
        }
    }

    /// The integer value, if this is an integer tuple.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Tuple::Int(v) => Some(*v),
            Tuple::Str(_) => None,
        }
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tuple::Int(v) => write!(f, "{}", v),
            Tuple::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Tuple {
    fn from(value: i64) -> Self {
        Tuple::Int(value)
    }
}

impl From<i32> for Tuple {
    fn from(value: i32) -> Self {
        Tuple::Int(i64::from(value))
    }
}

impl From<String> for Tuple {
    fn from(value: String) -> Self {
        Tuple::Str(value)
    }
}

impl From<&str> for Tuple {
    fn from(value: &str) -> Self {
        Tuple::Str(value.to_string())
    }
}

/// A dictionary message, ordered by key.
///
/// When decoding, values that are neither integers nor strings (byte
/// arrays, booleans, floats) are skipped so the remaining keys stay usable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct DeviceMessage {
    entries: BTreeMap<u32, Tuple>,
}

impl DeviceMessage {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, replacing any previous value.
    pub fn insert(&mut self, key: u32, value: impl Into<Tuple>) {
        self.entries.insert(key, value.into());
    }

    /// Builder-style variant of [`DeviceMessage::insert`].
    #[must_use]
    pub fn with(mut self, key: u32, value: impl Into<Tuple>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: u32) -> Option<&Tuple> {
        self.entries.get(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in ascending key order.
    pub fn iter(&self) -> btree_map::Iter<'_, u32, Tuple> {
        self.entries.iter()
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for DeviceMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Value {
            Tuple(Tuple),
            Unsupported(serde::de::IgnoredAny),
        }

        let raw = BTreeMap::<u32, Value>::deserialize(deserializer)?;
        let entries = raw
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::Tuple(tuple) => Some((key, tuple)),
                Value::Unsupported(_) => None,
            })
            .collect();
        Ok(Self { entries })
    }
}
