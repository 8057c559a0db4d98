use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names that are derived from a signature and never signed themselves.
pub const RESERVED_KEYS: [&str; 2] = ["sign", "signature"];

/// An insertion-ordered set of named parameters making up one signable payload.
///
/// Values are JSON values so gateway callers can pass strings, numbers or
/// nested structures straight through; keys are unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(Map<String, Value>);

impl ParameterSet {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Insert a parameter, returning the previous value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Scalar text of a parameter, as it would appear in a canonical string.
    ///
    /// Returns `None` for absent keys, nulls and nested structures.
    pub fn text(&self, key: &str) -> Option<String> {
        self.0.get(key).and_then(scalar_text)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// First reserved key present in the set, if any.
    pub fn reserved_key(&self) -> Option<&'static str> {
        RESERVED_KEYS.into_iter().find(|key| self.0.contains_key(*key))
    }
}

/// Render a scalar JSON value the way gateways expect it in a canonical string.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

impl From<Map<String, Value>> for ParameterSet {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<ParameterSet> for Map<String, Value> {
    fn from(params: ParameterSet) -> Self {
        params.0
    }
}

impl<K, V> FromIterator<(K, V)> for ParameterSet
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl IntoIterator for ParameterSet {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_insertion_order() {
        let params = ParameterSet::new()
            .with("zeta", "1")
            .with("alpha", "2")
            .with("mid", "3");
        let keys: Vec<&str> = params.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn remove_preserves_remaining_order() {
        let mut params = ParameterSet::new().with("a", "1").with("b", "2").with("c", "3");
        params.remove("b");
        let keys: Vec<&str> = params.keys().collect();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn text_renders_scalars_only() {
        let params = ParameterSet::new()
            .with("amount", json!(10.5))
            .with("count", json!(3))
            .with("flag", json!(true))
            .with("nested", json!({"a": 1}))
            .with("nothing", Value::Null);
        assert_eq!(params.text("amount").as_deref(), Some("10.5"));
        assert_eq!(params.text("count").as_deref(), Some("3"));
        assert_eq!(params.text("flag").as_deref(), Some("true"));
        assert_eq!(params.text("nested"), None);
        assert_eq!(params.text("nothing"), None);
        assert_eq!(params.text("missing"), None);
    }

    #[test]
    fn reserved_key_detected() {
        let params = ParameterSet::new().with("a", "1").with("signature", "x");
        assert_eq!(params.reserved_key(), Some("signature"));
        assert_eq!(ParameterSet::new().with("sign_type", "MD5").reserved_key(), None);
    }

    #[test]
    fn deserializes_from_json_object() {
        let params: ParameterSet =
            serde_json::from_str(r#"{"b":"2","a":"1"}"#).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params.text("a").as_deref(), Some("1"));
    }
}
