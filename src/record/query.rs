//! # Query String Encoder
//!
//! Encodes a stored row into numbered endpoint fields.
//!
//! The i-th row field (1-indexed) becomes `field{i}=value`, fields joined by
//! `&`. Values are trimmed and percent-escaped; anything outside the RFC 3986
//! unreserved set (so at least spaces, `+`, `&` and quotes) becomes `%XX`.

use super::sample::Delimiter;

/// Number of fields a row splits into.
pub fn field_count(row: &str, delimiter: Delimiter) -> usize {
    row.split(delimiter.as_char()).count()
}

/// Encode up to `max_fields` row fields as `field1=..&field2=..`.
///
/// Fields beyond `max_fields` are not sent.
///
/// # Examples
///
/// ```
/// use field_telemetry_node::record::query::encode_fields;
/// use field_telemetry_node::record::Delimiter;
///
/// let qs = encode_fields("27.3\t41.8\t500.12", Delimiter::Tab, 8);
/// assert_eq!(qs, "field1=27.3&field2=41.8&field3=500.12");
/// ```
pub fn encode_fields(row: &str, delimiter: Delimiter, max_fields: usize) -> String {
    row.trim_end_matches(['\r', '\n'])
        .split(delimiter.as_char())
        .take(max_fields)
        .enumerate()
        .map(|(i, value)| format!("field{}={}", i + 1, urlencoding::encode(value.trim())))
        .collect::<Vec<_>>()
        .join("&")
}

/// `api_key=<key>&field1=..` as sent in a GET query or POST body.
pub fn encode_request(api_key: &str, row: &str, delimiter: Delimiter, max_fields: usize) -> String {
    let fields = encode_fields(row, delimiter, max_fields);
    let key = urlencoding::encode(api_key);
    if fields.is_empty() {
        format!("api_key={}", key)
    } else {
        format!("api_key={}&{}", key, fields)
    }
}
