//! A fired event and its wire representation: a 2-element JSON array
//! `[name, argument]`, where `argument` is either a literal JSON value or
//! a JSON-encoded string holding an expression for the evaluator to parse.

use kunquat_core::{ErrorKind, KindedError};
use kunquat_stream::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventWireError {
    #[error("event must be a 2-element array [name, argument], got: {0}")]
    MalformedArray(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KindedError for EventWireError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Format
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub channel: i32,
    pub name: String,
    pub argument: Value,
}

impl Event {
    pub fn new(channel: i32, name: impl Into<String>, argument: Value) -> Self {
        Self {
            channel,
            name: name.into(),
            argument,
        }
    }

    /// Parse a fired event from its `[name, argument]` wire form. Numbers,
    /// bools and strings in `argument` become the corresponding [`Value`];
    /// anything else is carried as its literal string encoding, letting the
    /// receiver decide whether to feed it to the expression evaluator.
    pub fn from_wire(channel: i32, json: &str) -> Result<Self, EventWireError> {
        let parsed: serde_json::Value = serde_json::from_str(json)?;
        let arr = parsed
            .as_array()
            .filter(|a| a.len() == 2)
            .ok_or_else(|| EventWireError::MalformedArray(json.to_string()))?;
        let name = arr[0]
            .as_str()
            .ok_or_else(|| EventWireError::MalformedArray(json.to_string()))?
            .to_string();
        let argument = json_to_value(&arr[1]);
        Ok(Self {
            channel,
            name,
            argument,
        })
    }

    pub fn to_wire(&self) -> String {
        let arg = value_to_json(&self.argument);
        serde_json::json!([self.name, arg]).to_string()
    }

    /// A `receive_events` reply entry: `[channel, [name, argument]]`.
    pub fn to_reply_wire(&self) -> String {
        let arg = value_to_json(&self.argument);
        serde_json::json!([self.channel, [&self.name, arg]]).to_string()
    }
}

fn json_to_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::Str(s.clone()),
        other => Value::Str(other.to_string()),
    }
}

fn value_to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::json!(i),
        Value::Float(f) => serde_json::json!(f),
        Value::Tstamp(t) => serde_json::json!([t.beats(), t.rem()]),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::PatInst(a, b) => serde_json::json!([a, b]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_argument() {
        let ev = Event::from_wire(0, r#"["n+", "440"]"#).unwrap();
        assert_eq!(ev.name, "n+");
        assert_eq!(ev.argument, Value::Str("440".to_string()));
    }

    #[test]
    fn parses_numeric_argument() {
        let ev = Event::from_wire(1, r#"[".f", 0.8]"#).unwrap();
        assert_eq!(ev.name, ".f");
        assert_eq!(ev.argument, Value::Float(0.8));
    }

    #[test]
    fn rejects_non_array() {
        assert!(Event::from_wire(0, r#"{"name": "n+"}"#).is_err());
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(Event::from_wire(0, r#"["n+"]"#).is_err());
    }

    #[test]
    fn reply_wire_includes_channel() {
        let ev = Event::new(3, "A*", Value::Int(42));
        assert_eq!(ev.to_reply_wire(), r#"[3,["A*",42]]"#);
    }
}
