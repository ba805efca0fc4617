use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use growlink_api::{GatewayId, LinkedEntity, NewEntity};

/// One device as reported by the latest gateway poll.
///
/// Snapshots are replaced wholesale on every poll; a `RemoteEntity` is never
/// patched in place.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct RemoteEntity {
    pub entity_id: String,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    pub friendly_name: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl RemoteEntity {
    /// The state as a finite number, for `number`/`input_number` entities.
    #[must_use]
    pub fn numeric_state(&self) -> Option<f64> {
        self.state.trim().parse::<f64>().ok().filter(|x| x.is_finite())
    }

    /// State with its unit, e.g. `23.1 °C`.
    #[must_use]
    pub fn display_state(&self) -> String {
        match &self.unit_of_measurement {
            Some(unit) => format!("{} {unit}", self.state),
            None => self.state.clone(),
        }
    }

    /// Unpersisted linkable entry for an entity the backend has no record of.
    #[must_use]
    pub fn to_linkable(&self, gateway_id: GatewayId) -> LinkedEntity {
        LinkedEntity {
            id: None,
            gateway_id,
            entity_id: self.entity_id.clone(),
            entity_type: self.domain.clone(),
            domain: Some(self.domain.clone()),
            device_class: self.device_class.clone(),
            friendly_name: Some(self.friendly_name.clone()),
            is_enabled: false,
            linked_grow_id: None,
            linked_stage: None,
            last_state: Some(self.state.clone()),
            created_at: None,
        }
    }

    /// Record creation payload; the friendly name is snapshotted here.
    #[must_use]
    pub fn to_new_entity(&self, gateway_id: GatewayId) -> NewEntity {
        NewEntity {
            gateway_id,
            entity_id: self.entity_id.clone(),
            entity_type: self.domain.clone(),
            domain: Some(self.domain.clone()),
            device_class: self.device_class.clone(),
            friendly_name: Some(self.friendly_name.clone()),
            is_enabled: true,
        }
    }
}
