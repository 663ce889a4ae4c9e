//! HMAC signing of upload payloads.
//!
//! The signature is computed over the record line and sent in its own
//! multipart field, so the receiving endpoint can authenticate uploads
//! with a shared secret.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};

use lifelog_types::{KeyFormat, OutputFormat, SignAlgorithm, SigningConfig};

/// Errors that can occur while signing.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("Invalid hex key: {0}")]
    InvalidHexKey(#[from] hex::FromHexError),
    #[error("Invalid base64 key: {0}")]
    InvalidBase64Key(#[from] base64::DecodeError),
    #[error("Key rejected by {0} HMAC")]
    InvalidKeyLength(SignAlgorithm),
}

macro_rules! hmac_with {
    ($digest:ty, $algorithm:expr, $key:expr, $payload:expr) => {{
        let mut mac = <Hmac<$digest> as Mac>::new_from_slice($key)
            .map_err(|_| SignError::InvalidKeyLength($algorithm))?;
        mac.update($payload);
        mac.finalize().into_bytes().to_vec()
    }};
}

/// Compute the raw HMAC of `payload` under `key`.
pub fn hmac(algorithm: SignAlgorithm, key: &[u8], payload: &[u8]) -> Result<Vec<u8>, SignError> {
    let tag = match algorithm {
        SignAlgorithm::Sha1 => hmac_with!(Sha1, algorithm, key, payload),
        SignAlgorithm::Sha224 => hmac_with!(Sha224, algorithm, key, payload),
        SignAlgorithm::Sha256 => hmac_with!(Sha256, algorithm, key, payload),
        SignAlgorithm::Sha384 => hmac_with!(Sha384, algorithm, key, payload),
        SignAlgorithm::Sha512 => hmac_with!(Sha512, algorithm, key, payload),
    };
    Ok(tag)
}

/// Decode key material according to its declared format.
pub fn decode_key(key: &str, format: KeyFormat) -> Result<Vec<u8>, SignError> {
    match format {
        KeyFormat::Text => Ok(key.as_bytes().to_vec()),
        KeyFormat::Hex => Ok(hex::decode(key.trim())?),
        KeyFormat::Base64 => Ok(STANDARD.decode(key.trim())?),
    }
}

/// Encode a computed tag for the signature field.
pub fn encode_tag(tag: &[u8], format: OutputFormat) -> String {
    match format {
        OutputFormat::Hex => hex::encode(tag),
        OutputFormat::Base64 => STANDARD.encode(tag),
    }
}

/// Sign `payload` with the configured parameters, returning the encoded
/// value for the signature field.
///
/// # Example
///
/// ```
/// use lifelog_bridge::signer::sign;
/// use lifelog_types::{KeyFormat, OutputFormat, SignAlgorithm, SigningConfig};
///
/// let config = SigningConfig {
///     algorithm: SignAlgorithm::Sha256,
///     field_name: "sig".to_string(),
///     field_format: OutputFormat::Hex,
///     key: "secret".to_string(),
///     key_format: KeyFormat::Text,
/// };
/// let sig = sign(&config, "hello").unwrap();
/// assert_eq!(sig.len(), 64);
/// ```
pub fn sign(config: &SigningConfig, payload: &str) -> Result<String, SignError> {
    let key = decode_key(&config.key, config.key_format)?;
    let tag = hmac(config.algorithm, &key, payload.as_bytes())?;
    Ok(encode_tag(&tag, config.field_format))
}
