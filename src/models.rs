use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Field holding the event time in every indexed document.
pub const TIMESTAMP_FIELD: &str = "@timestamp";

/// A single decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<FieldValue>),
    Object(BTreeMap<String, FieldValue>),
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => FieldValue::Number(n),
            Value::String(s) => FieldValue::String(s),
            Value::Array(items) => FieldValue::Array(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                FieldValue::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&FieldValue> for Value {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Number(n) => Value::Number(n.clone()),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Array(items) => Value::Array(items.iter().map(Into::into).collect()),
            FieldValue::Object(map) => {
                Value::Object(map.iter().map(|(k, v)| (k.clone(), v.into())).collect())
            }
        }
    }
}

impl fmt::Display for FieldValue {
    /// Strings print bare; everything else prints as compact JSON.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => f.write_str(s),
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Number(n) => write!(f, "{}", n),
            other => write!(f, "{}", Value::from(other)),
        }
    }
}

/// One matched document, keyed by top-level field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    fields: BTreeMap<String, FieldValue>,
}

impl Event {
    /// Decodes a document source. Anything other than a JSON object is rejected.
    pub fn from_source(source: &Value) -> Result<Self> {
        match source {
            Value::Object(map) => Ok(Event {
                fields: map
                    .iter()
                    .map(|(k, v)| (k.clone(), FieldValue::from(v.clone())))
                    .collect(),
            }),
            Value::Null => Err(Error::Decode("document has no source".to_string())),
            other => Err(Error::Decode(format!(
                "expected an object, got {}",
                json_kind(other)
            ))),
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn decodes_object_fields() {
        let event = Event::from_source(&json!({
            "@timestamp": "2024-01-01T00:00:00Z",
            "host": "web1",
            "status": 502,
        }))
        .unwrap();

        assert_eq!(event.len(), 3);
        assert_eq!(
            event.get(TIMESTAMP_FIELD),
            Some(&FieldValue::String("2024-01-01T00:00:00Z".to_string()))
        );
        assert!(event.get("missing").is_none());
    }

    #[test_case(json!(null) ; "null source")]
    #[test_case(json!("text") ; "string source")]
    #[test_case(json!([1, 2]) ; "array source")]
    fn rejects_non_objects(source: Value) {
        assert!(matches!(Event::from_source(&source), Err(Error::Decode(_))));
    }

    #[test_case(json!("plain"), "plain")]
    #[test_case(json!(42), "42")]
    #[test_case(json!(1.5), "1.5")]
    #[test_case(json!(true), "true")]
    #[test_case(json!(null), "null")]
    #[test_case(json!(["a", 1]), r#"["a",1]"#)]
    #[test_case(json!({"b": 2, "a": 1}), r#"{"a":1,"b":2}"#)]
    fn displays_values(value: Value, expected: &str) {
        assert_eq!(FieldValue::from(value).to_string(), expected);
    }
}
