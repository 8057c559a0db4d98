//! Deterministic serialization of a [`ParameterSet`] into the byte string that
//! gets signed.
//!
//! ```text
//! drop empty values -> sort keys byte-wise -> key=value joined by '&'
//! ```
//!
//! The value encoding switches in [`CanonicalizationOptions`] must match the
//! counterparty's documented rules exactly; a mismatch here makes every
//! signature fail to verify.

mod params;

pub use params::{ParameterSet, RESERVED_KEYS};

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{PaysignError, Result};

/// Characters left untouched by form URL encoding (`application/x-www-form-urlencoded`).
const FORM_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// How nested (array or object) values are treated during canonicalization.
///
/// Gateways disagree on this, so there is no implicit default: a nested value
/// under [`ArrayPolicy::Undeclared`] is rejected rather than silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayPolicy {
    #[default]
    Undeclared,
    /// Leave nested values out of the canonical string.
    Skip,
    /// Emit nested values as their compact JSON text.
    Flatten,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CanonicalizationOptions {
    /// Form-URL-encode each value before emission.
    pub url_encode: bool,
    /// URL-decode raw values before emission. Ignored when `url_encode` is set.
    pub url_decode: bool,
    pub array_policy: ArrayPolicy,
}

impl CanonicalizationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_array_policy(mut self, array_policy: ArrayPolicy) -> Self {
        self.array_policy = array_policy;
        self
    }

    pub fn url_encoded(mut self) -> Self {
        self.url_encode = true;
        self
    }

    pub fn url_decoded(mut self) -> Self {
        self.url_decode = true;
        self
    }
}

/// The canonical form of a parameter set. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalString(String);

impl CanonicalString {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<[u8]> for CanonicalString {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Display for CanonicalString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize `params` into its canonical string.
///
/// Pure: equal parameter sets (in any insertion order) and equal options
/// always produce byte-identical output. An empty set yields an empty string.
///
/// Only the empty string counts as empty. Values are trimmed after that check,
/// so a whitespace-only value is kept and emitted as `key=`, the same way the
/// gateways build their own strings.
///
/// # Errors
/// [`PaysignError::Validation`] if a reserved key (`sign`, `signature`) is
/// present, or a non-empty nested value is met under
/// [`ArrayPolicy::Undeclared`].
pub fn canonicalize(
    params: &ParameterSet,
    options: &CanonicalizationOptions,
) -> Result<CanonicalString> {
    if let Some(key) = params.reserved_key() {
        return Err(PaysignError::Validation(format!(
            "reserved key `{key}` must be removed before canonicalization"
        )));
    }

    let mut entries: Vec<(&str, String)> = Vec::with_capacity(params.len());
    for (key, value) in params.iter() {
        let Some(text) = canonical_value(key, value, options.array_policy)? else {
            continue;
        };
        entries.push((key, encode_value(&text, options)));
    }
    entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    let canonical = entries
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    debug!(
        fields = entries.len(),
        dropped = params.len() - entries.len(),
        "canonicalized parameter set"
    );
    Ok(CanonicalString(canonical))
}

/// Text to emit for one value, or `None` when the value is left out.
fn canonical_value(key: &str, value: &Value, policy: ArrayPolicy) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) if text.is_empty() => Ok(None),
        Value::String(text) => Ok(Some(text.trim().to_string())),
        Value::Number(number) => Ok(Some(number.to_string())),
        Value::Bool(flag) => Ok(Some(flag.to_string())),
        Value::Array(items) if items.is_empty() => Ok(None),
        Value::Object(fields) if fields.is_empty() => Ok(None),
        Value::Array(_) | Value::Object(_) => match policy {
            ArrayPolicy::Skip => Ok(None),
            ArrayPolicy::Flatten => serde_json::to_string(value)
                .map(Some)
                .map_err(|e| PaysignError::Validation(format!("cannot flatten `{key}`: {e}"))),
            ArrayPolicy::Undeclared => Err(PaysignError::Validation(format!(
                "nested value under `{key}` needs an explicit array policy"
            ))),
        },
    }
}

fn encode_value(text: &str, options: &CanonicalizationOptions) -> String {
    if options.url_encode {
        form_urlencode(text)
    } else if options.url_decode {
        form_urldecode(text)
    } else {
        text.to_string()
    }
}

/// Form URL encoding: unreserved characters pass through, spaces become `+`.
pub(crate) fn form_urlencode(text: &str) -> String {
    utf8_percent_encode(text, FORM_ENCODE_SET)
        .to_string()
        .replace("%20", "+")
}

pub(crate) fn form_urldecode(text: &str) -> String {
    percent_decode_str(&text.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options() -> CanonicalizationOptions {
        CanonicalizationOptions::new().with_array_policy(ArrayPolicy::Skip)
    }

    #[test]
    fn sorts_and_joins() {
        let params = ParameterSet::new()
            .with("total_amount", "10.00")
            .with("appid", "2017")
            .with("out_trade_no", "A1");
        let canonical = canonicalize(&params, &options()).unwrap();
        assert_eq!(canonical.as_str(), "appid=2017&out_trade_no=A1&total_amount=10.00");
    }

    #[test]
    fn empty_set_is_empty_string() {
        let canonical = canonicalize(&ParameterSet::new(), &options()).unwrap();
        assert!(canonical.is_empty());
    }

    #[test]
    fn drops_empty_and_null_values() {
        let params = ParameterSet::new()
            .with("a", "1")
            .with("b", "")
            .with("c", Value::Null)
            .with("d", json!([]))
            .with("e", json!({}));
        let canonical = canonicalize(&params, &CanonicalizationOptions::new()).unwrap();
        assert_eq!(canonical.as_str(), "a=1");
    }

    #[test]
    fn sorting_is_bytewise_not_case_folded() {
        let params = ParameterSet::new().with("b", "1").with("B", "2").with("a", "3");
        let canonical = canonicalize(&params, &options()).unwrap();
        assert_eq!(canonical.as_str(), "B=2&a=3&b=1");
    }

    #[test]
    fn trims_values() {
        let params = ParameterSet::new().with("body", "  coffee \n");
        let canonical = canonicalize(&params, &options()).unwrap();
        assert_eq!(canonical.as_str(), "body=coffee");
    }

    #[test]
    fn whitespace_only_value_is_kept_as_empty() {
        let params = ParameterSet::new().with("a", "1").with("memo", "   ");
        let canonical = canonicalize(&params, &options()).unwrap();
        assert_eq!(canonical.as_str(), "a=1&memo=");
    }

    #[test]
    fn undeclared_policy_rejects_nested_values() {
        let params = ParameterSet::new().with("a", "1").with("list", json!(["x"]));
        let error = canonicalize(&params, &CanonicalizationOptions::new()).unwrap_err();
        assert!(matches!(error, PaysignError::Validation(_)));
    }

    #[test]
    fn skip_policy_leaves_out_nested_values() {
        let params = ParameterSet::new().with("a", "1").with("list", json!(["x"]));
        let canonical = canonicalize(&params, &options()).unwrap();
        assert_eq!(canonical.as_str(), "a=1");
    }

    #[test]
    fn flatten_policy_emits_compact_json() {
        let params = ParameterSet::new()
            .with("scene_info", json!({"store_info": {"id": "S1"}}))
            .with("a", "1");
        let options = CanonicalizationOptions::new().with_array_policy(ArrayPolicy::Flatten);
        let canonical = canonicalize(&params, &options).unwrap();
        assert_eq!(canonical.as_str(), r#"a=1&scene_info={"store_info":{"id":"S1"}}"#);
    }

    #[test]
    fn rejects_reserved_keys() {
        for key in RESERVED_KEYS {
            let params = ParameterSet::new().with("a", "1").with(key, "abc");
            assert!(matches!(
                canonicalize(&params, &options()),
                Err(PaysignError::Validation(_))
            ));
        }
    }

    #[test]
    fn url_encode_switch() {
        let params = ParameterSet::new().with("url", "https://a.b/c?d=e f");
        let encoded = canonicalize(&params, &options().url_encoded()).unwrap();
        assert_eq!(encoded.as_str(), "url=https%3A%2F%2Fa.b%2Fc%3Fd%3De+f");

        let raw = canonicalize(&params, &options()).unwrap();
        assert_eq!(raw.as_str(), "url=https://a.b/c?d=e f");
    }

    #[test]
    fn url_decode_switch() {
        let params = ParameterSet::new().with("return_param", "a%3Db+c");
        let decoded = canonicalize(&params, &options().url_decoded()).unwrap();
        assert_eq!(decoded.as_str(), "return_param=a=b c");
    }

    #[test]
    fn numbers_and_booleans_render_as_text() {
        let params = ParameterSet::new()
            .with("total_fee", json!(100))
            .with("credit", json!(false));
        let canonical = canonicalize(&params, &options()).unwrap();
        assert_eq!(canonical.as_str(), "credit=false&total_fee=100");
    }
}
