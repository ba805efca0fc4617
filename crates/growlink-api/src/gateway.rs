use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{GatewayId, GrowId};

/// A configured Home Assistant instance, as stored by the backend.
#[derive(Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Gateway {
    pub id: GatewayId,
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub api_url: String,
    pub api_key: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, alias = "grow_id", skip_serializing_if = "Option::is_none")]
    pub linked_grow_id: Option<GrowId>,
}

// The api key is a long-lived Home Assistant token; keep it out of logs.
impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("api_url", &self.api_url)
            .field("api_key", &"<<REDACTED>>")
            .field("is_active", &self.is_active)
            .field("linked_grow_id", &self.linked_grow_id)
            .finish_non_exhaustive()
    }
}

/// Body of `PUT /iot-gateways/{id}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct GatewayUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}
