//! Push payload normalization.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{time, Interface, Notification, NotificationData, NotificationId};

/// How many layers of string encoding are unwrapped before giving up.
const MAX_DECODE_DEPTH: usize = 3;

/// Envelope keys that are not part of the data record.
const ENVELOPE_KEYS: [&str; 4] = ["id", "type", "created_at", "read_at"];

/// Decode a payload into a JSON object, unwrapping string encodings.
pub fn decode_object(payload: Value) -> Result<Map<String, Value>> {
    let mut value = payload;
    for _ in 0..=MAX_DECODE_DEPTH {
        match value {
            Value::Object(map) => return Ok(map),
            Value::String(text) => {
                value = serde_json::from_str(&text)
                    .map_err(|e| Error::parse(format!("undecodable payload: {e}")))?;
            }
            other => {
                return Err(Error::parse(format!(
                    "expected an object payload, got {}",
                    json_kind(&other)
                )))
            }
        }
    }
    Err(Error::parse("payload nested too deeply"))
}

/// Turn a push payload into a notification for `audience`.
///
/// Returns `Ok(None)` when the event targets another audience or names none.
pub fn normalize_event(payload: Value, audience: Interface) -> Result<Option<Notification>> {
    let mut envelope = decode_object(payload)?;

    let mut data = match envelope.remove("data") {
        Some(data) => decode_object(data)?,
        None => {
            let mut data = envelope.clone();
            for key in ENVELOPE_KEYS {
                data.remove(key);
            }
            data
        }
    };

    let interface = data
        .get("interface")
        .or_else(|| envelope.get("interface"))
        .and_then(Value::as_str)
        .map(Interface::from_param);

    match interface {
        Some(interface) if interface == audience => {}
        Some(interface) => {
            debug!(target_interface = interface.as_str(), "Ignoring event for another audience");
            return Ok(None);
        }
        None => {
            debug!("Ignoring event without an interface discriminator");
            return Ok(None);
        }
    }
    data.insert("interface".into(), Value::from(audience.as_str()));

    let id = envelope
        .get("id")
        .and_then(id_from_value)
        .unwrap_or_else(NotificationId::local);
    let kind = envelope
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let created_at = envelope
        .get("created_at")
        .and_then(timestamp_from_value)
        .unwrap_or_else(Utc::now);
    let read_at = envelope.get("read_at").and_then(timestamp_from_value);

    let data: NotificationData = serde_json::from_value(Value::Object(data))?;

    Ok(Some(Notification {
        id,
        kind,
        data,
        read_at,
        created_at,
    }))
}

fn id_from_value(value: &Value) -> Option<NotificationId> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(NotificationId::new(s.trim())),
        Value::Number(n) => Some(NotificationId::new(n.to_string())),
        _ => None,
    }
}

fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => time::parse_timestamp(s),
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
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
