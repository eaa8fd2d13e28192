//! Shared `{meta, objects}` response envelope and echoed query metadata.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Outcome flag carried in `meta.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Ok,
    Error,
}

/// Query parameters echoed back in `meta.query`.
///
/// Keys whose value is null are never stored, and the internal `geom` key is
/// always dropped.
///
/// # Examples
/// ```
/// use sensornet::domain::EchoedQuery;
/// use serde_json::json;
///
/// let echoed = EchoedQuery::default()
///     .with("network_name", json!("array_of_things_chicago"))
///     .with("nodes", serde_json::Value::Null)
///     .with("geom", json!("{}"));
/// assert_eq!(echoed.keys().collect::<Vec<_>>(), vec!["network_name"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EchoedQuery(BTreeMap<String, Value>);

const INTERNAL_KEYS: [&str; 1] = ["geom"];

impl EchoedQuery {
    /// Echo raw query-string pairs verbatim (used for error envelopes).
    pub fn from_raw<'a>(pairs: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        pairs.into_iter().fold(Self::default(), |echoed, (key, value)| {
            echoed.with(key.clone(), Value::String(value.clone()))
        })
    }

    /// Insert a key, skipping nulls and internal-only keys.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if value.is_null() || INTERNAL_KEYS.contains(&key.as_str()) {
            self.0.remove(&key);
        } else {
            self.0.insert(key, value);
        }
        self
    }

    /// Insert an optional value, serialising it when present.
    pub fn with_opt<T: Serialize>(self, key: impl Into<String>, value: Option<&T>) -> Self {
        let value = value
            .and_then(|inner| serde_json::to_value(inner).ok())
            .unwrap_or(Value::Null);
        self.with(key, value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// `meta` block of every response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvelopeMeta {
    pub status: EnvelopeStatus,
    pub message: String,
    pub query: EchoedQuery,
}

/// Envelope shared by every JSON response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope<T> {
    pub meta: EnvelopeMeta,
    pub objects: Vec<T>,
}

impl<T> ResponseEnvelope<T> {
    pub fn ok(query: EchoedQuery, objects: Vec<T>) -> Self {
        Self {
            meta: EnvelopeMeta {
                status: EnvelopeStatus::Ok,
                message: String::new(),
                query,
            },
            objects,
        }
    }

    pub fn error(query: EchoedQuery, message: impl Into<String>) -> Self {
        Self {
            meta: EnvelopeMeta {
                status: EnvelopeStatus::Error,
                message: message.into(),
                query,
            },
            objects: Vec::new(),
        }
    }
}
