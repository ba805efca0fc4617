use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{GatewayId, GrowId, RecordId, Stage};

const fn default_enabled() -> bool {
    true
}

/// A persisted association between a Home Assistant entity and a grow.
///
/// Records coming from the backend always carry an `id`. Entries built
/// locally for entities that only exist in the live gateway snapshot have
/// `id: None` until they are first linked.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct LinkedEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub gateway_id: GatewayId,
    #[serde(alias = "entity_name")]
    pub entity_id: String,
    #[serde(default)]
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_grow_id: Option<GrowId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
}

impl LinkedEntity {
    /// Linked entities are enabled and attached to a grow. Everything else is
    /// linkable.
    #[must_use]
    pub const fn is_linked(&self) -> bool {
        self.is_enabled && self.linked_grow_id.is_some()
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        if let Some(domain) = self.domain.as_deref().filter(|x| !x.is_empty()) {
            return domain;
        }
        match self.entity_id.split_once('.') {
            Some((domain, _)) if !domain.is_empty() => domain,
            _ => &self.entity_type,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        self.friendly_name
            .as_deref()
            .filter(|x| !x.trim().is_empty())
            .unwrap_or(&self.entity_id)
    }

    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        self.linked_stage.as_deref()?.parse().ok()
    }
}

/// Body of `POST /iot-gateways/{id}/entities`.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct NewEntity {
    pub gateway_id: GatewayId,
    pub entity_id: String,
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    pub is_enabled: bool,
}

/// Body of `PUT /iot-gateways/{id}/entities/{entity}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct EntityUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_enabled: Option<bool>,
}

/// Body of `PUT /iot-gateways/{id}/entities/{entity}/link`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct LinkRequest {
    pub grow_id: GrowId,
    pub stage: Stage,
}
