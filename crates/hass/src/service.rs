use serde_json::{Map, Value};

/// A call to `POST /api/services/{domain}/{service}`.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceCall {
    pub domain: String,
    pub service: &'static str,
    pub data: Map<String, Value>,
}

impl ServiceCall {
    pub const TURN_ON: &'static str = "turn_on";
    pub const TURN_OFF: &'static str = "turn_off";
    pub const SET_VALUE: &'static str = "set_value";

    /// Flips an on/off entity. Anything that is not exactly `"on"` is
    /// treated as off, so `unknown` and `unavailable` entities get `turn_on`.
    #[must_use]
    pub fn toggle(domain: &str, current_state: &str) -> Self {
        let service = if current_state == "on" {
            Self::TURN_OFF
        } else {
            Self::TURN_ON
        };
        Self {
            domain: domain.to_string(),
            service,
            data: Map::new(),
        }
    }

    #[must_use]
    pub fn set_value(domain: &str, value: f64) -> Self {
        let mut data = Map::new();
        data.insert("value".to_string(), Value::from(value));
        Self {
            domain: domain.to_string(),
            service: Self::SET_VALUE,
            data,
        }
    }

    #[must_use]
    pub fn path(&self) -> String {
        format!("/api/services/{}/{}", self.domain, self.service)
    }

    /// Request body: the service data with `entity_id` added.
    #[must_use]
    pub fn payload(&self, entity_id: &str) -> Value {
        let mut data = self.data.clone();
        if !entity_id.trim().is_empty() {
            data.insert(
                "entity_id".to_string(),
                Value::String(entity_id.to_string()),
            );
        }
        Value::Object(data)
    }
}
