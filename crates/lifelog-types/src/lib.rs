//! Platform-agnostic types for the Life-Log companion bridge.
//!
//! This crate provides the shared vocabulary used by the persistence layer
//! (lifelog-store) and the bridge service (lifelog-bridge).
//!
//! # Features
//!
//! - Queued record type
//! - Upload configuration and signing parameters
//! - Event list settings synchronized to the device
//! - Numeric-keyed device messages and their well-known keys
//!
//! # Example
//!
//! ```
//! use lifelog_types::{DeviceMessage, keys};
//!
//! let msg = DeviceMessage::new()
//!     .with(keys::RECORD_KEY, 1476000000)
//!     .with(keys::RECORD_LINE, "2016-10-09T08:00:00Z,3,Coffee");
//! assert_eq!(msg.len(), 2);
//! ```

pub mod error;
pub mod message;
pub mod types;

pub use error::ParseError;
pub use message::{DeviceMessage, Tuple, keys};
pub use types::{
    Configuration, EventListSettings, ExtraField, KeyFormat, OutputFormat, QueueRecord,
    SignAlgorithm, SigningConfig,
};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // --- Signing parameter parsing ---

    #[test]
    fn test_sign_algorithm_names() {
        for algo in [
            SignAlgorithm::Sha1,
            SignAlgorithm::Sha224,
            SignAlgorithm::Sha256,
            SignAlgorithm::Sha384,
            SignAlgorithm::Sha512,
        ] {
            assert_eq!(algo.as_str().parse::<SignAlgorithm>(), Ok(algo));
        }
        assert_eq!("sha-512".parse(), Ok(SignAlgorithm::Sha512));
        assert_eq!(" SHA256 ".parse(), Ok(SignAlgorithm::Sha256));
    }

    #[test]
    fn test_sign_algorithm_unknown() {
        let err = "SHA3-256".parse::<SignAlgorithm>().unwrap_err();
        assert_eq!(err, ParseError::UnknownAlgorithm("SHA3-256".to_string()));
        assert!(err.to_string().contains("SHA3-256"));
    }

    #[test]
    fn test_key_format_parsing() {
        assert_eq!("TEXT".parse(), Ok(KeyFormat::Text));
        assert_eq!("hex".parse(), Ok(KeyFormat::Hex));
        assert_eq!("B64".parse(), Ok(KeyFormat::Base64));
        assert!("BYTES".parse::<KeyFormat>().is_err());
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("HEX".parse(), Ok(OutputFormat::Hex));
        assert_eq!("b64".parse(), Ok(OutputFormat::Base64));
        assert!("TEXT".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Base64.to_string(), "B64");
    }

    // --- Configuration ---

    #[test]
    fn test_configuration_is_configured() {
        let mut config = Configuration::default();
        assert!(!config.is_configured());

        config.endpoint = Some("https://e".to_string());
        assert!(!config.is_configured());

        config.data_field = Some("d".to_string());
        assert!(config.is_configured());
    }

    #[test]
    fn test_parse_event_list() {
        assert_eq!(
            EventListSettings::parse_event_list("Coffee,Tea,+Sleep"),
            vec!["Coffee", "Tea", "+Sleep"]
        );
        assert_eq!(EventListSettings::parse_event_list("One"), vec!["One"]);
        assert!(EventListSettings::parse_event_list("").is_empty());
    }

    // --- Device messages ---

    #[test]
    fn test_device_message_from_json() {
        let json = r#"{"500": 1476000000, "510": "2016-10-09T08:00:00Z,3,Coffee"}"#;
        let msg: DeviceMessage = serde_json::from_str(json).unwrap();

        assert_eq!(msg.get(keys::RECORD_KEY), Some(&Tuple::Int(1476000000)));
        assert_eq!(
            msg.get(keys::RECORD_LINE).and_then(Tuple::as_str),
            Some("2016-10-09T08:00:00Z,3,Coffee")
        );
    }

    #[test]
    fn test_device_message_to_json() {
        let msg = DeviceMessage::new()
            .with(keys::EVENT_COUNT, 1)
            .with(keys::FIRST_EVENT, "Coffee")
            .with(keys::BEGIN_PREFIX, "Start ");

        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["1000"], 1);
        assert_eq!(json["1001"], "Coffee");
        assert_eq!(json["901"], "Start ");
    }

    #[test]
    fn test_device_message_rejects_non_numeric_keys() {
        let json = r#"{"record": "x"}"#;
        assert!(serde_json::from_str::<DeviceMessage>(json).is_err());
    }

    #[test]
    fn test_device_message_skips_unsupported_values() {
        let json = r#"{"500": 7, "510": "line", "600": [1, 2], "601": true, "602": 1.5, "603": null}"#;
        let msg: DeviceMessage = serde_json::from_str(json).unwrap();

        assert_eq!(msg.len(), 2);
        assert_eq!(msg.get(keys::RECORD_KEY), Some(&Tuple::Int(7)));
        assert_eq!(msg.get(keys::RECORD_LINE), Some(&Tuple::from("line")));
        assert_eq!(msg.get(600), None);
    }

    #[test]
    fn test_tuple_display() {
        assert_eq!(Tuple::Int(-4).to_string(), "-4");
        assert_eq!(Tuple::from("abc").to_string(), "abc");
        assert_eq!(Tuple::Int(3).as_str(), None);
        assert_eq!(Tuple::from("x").as_int(), None);
    }

    proptest! {
        #[test]
        fn prop_event_list_join_split(events in proptest::collection::vec("[^,]{1,12}", 1..10)) {
            let joined = events.join(",");
            prop_assert_eq!(EventListSettings::parse_event_list(&joined), events);
        }
    }
}
