use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One record of `GET /api/states`.
///
/// All fields are defaulted, so a single malformed record does not make the
/// whole states array fail to parse. Validation happens when the record is
/// normalized.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct State {
    #[serde(default)]
    pub entity_id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl State {
    #[must_use]
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Splits `domain.object_id`. Both halves must be non-empty.
    #[must_use]
    pub fn split_entity_id(&self) -> Option<(&str, &str)> {
        let (domain, object_id) = self.entity_id.trim().split_once('.')?;
        if domain.is_empty() || object_id.is_empty() {
            return None;
        }
        Some((domain, object_id))
    }

    #[must_use]
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|x| !x.is_empty())
    }

    #[must_use]
    pub fn friendly_name(&self) -> Option<&str> {
        self.attr_str("friendly_name")
    }

    #[must_use]
    pub fn device_class(&self) -> Option<&str> {
        self.attr_str("device_class")
    }

    #[must_use]
    pub fn unit_of_measurement(&self) -> Option<&str> {
        self.attr_str("unit_of_measurement")
    }
}

/// Response of `GET /api/`.
///
/// Older Home Assistant releases only answer with `message`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ApiInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}
