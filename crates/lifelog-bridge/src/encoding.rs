//! URI component encoding shared by the configuration UI round trip.
//!
//! The configuration page uses JavaScript's `encodeURIComponent` and
//! `decodeURIComponent`, so the same unreserved set is used here.

use std::borrow::Cow;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Characters left unescaped by `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode a value the way `encodeURIComponent` does.
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Percent-decode a value. Invalid UTF-8 after decoding is an error.
pub fn decode_component(value: &str) -> Result<String, std::str::Utf8Error> {
    percent_decode_str(value).decode_utf8().map(Cow::into_owned)
}
