//! Translation between device messages and queue records.
//!
//! Inbound, the device sends one message per logged event, carrying the
//! record key and the formatted line. Outbound, the bridge sends the event
//! list and long-event prefixes whenever the user changes them.

use lifelog_types::{DeviceMessage, EventListSettings, QueueRecord, Tuple, keys};

/// Why an inbound message could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedMessage {
    #[error("Missing key {0}")]
    MissingKey(u32),
    #[error("Key {key} has the wrong type, expected {expected}")]
    WrongType { key: u32, expected: &'static str },
}

/// Extract the record carried by an inbound device message.
///
/// The key may be sent as an integer or a string; the line must be a
/// string. Other keys are ignored.
///
/// # Example
///
/// ```
/// use lifelog_bridge::bridge::parse_inbound;
/// use lifelog_types::{DeviceMessage, keys};
///
/// let msg = DeviceMessage::new()
///     .with(keys::RECORD_KEY, 1476000000)
///     .with(keys::RECORD_LINE, "2016-10-09T08:00:00Z,3,Coffee");
/// let record = parse_inbound(&msg).unwrap();
/// assert_eq!(record.key, "1476000000");
/// ```
pub fn parse_inbound(msg: &DeviceMessage) -> Result<QueueRecord, MalformedMessage> {
    let key = match msg.get(keys::RECORD_KEY) {
        Some(tuple) => tuple.to_string(),
        None => return Err(MalformedMessage::MissingKey(keys::RECORD_KEY)),
    };

    let line = match msg.get(keys::RECORD_LINE) {
        Some(Tuple::Str(line)) => line.clone(),
        Some(Tuple::Int(_)) => {
            return Err(MalformedMessage::WrongType {
                key: keys::RECORD_LINE,
                expected: "string",
            });
        }
        None => return Err(MalformedMessage::MissingKey(keys::RECORD_LINE)),
    };

    Ok(QueueRecord::new(key, line))
}

/// Build the settings message for the device.
///
/// The event count goes under [`keys::EVENT_COUNT`] with the names
/// following it one key each; prefixes are only included when set.
pub fn settings_message(settings: &EventListSettings) -> DeviceMessage {
    let mut msg = DeviceMessage::new().with(keys::EVENT_COUNT, settings.events.len() as i64);

    for (key, event) in (keys::FIRST_EVENT..).zip(&settings.events) {
        msg.insert(key, event.as_str());
    }

    if let Some(prefix) = &settings.begin_prefix {
        msg.insert(keys::BEGIN_PREFIX, prefix.as_str());
    }
    if let Some(prefix) = &settings.end_prefix {
        msg.insert(keys::END_PREFIX, prefix.as_str());
    }

    msg
}
