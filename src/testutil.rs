use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hass::ServiceCall;
use serde_json::{Map, Value};
use tokio::sync::Notify;

use growlink_api::{
    EntityUpdate, GatewayId, LinkRequest, LinkedEntity, NewEntity, RecordId,
};

use crate::control::StateRefresher;
use crate::error::{ApiError, ApiResult};
use crate::gateway::{EntityStore, GatewayApi};
use crate::model::remote::RemoteEntity;

pub fn remote(
    entity_id: &str,
    state: &str,
    device_class: Option<&str>,
    name: Option<&str>,
) -> RemoteEntity {
    RemoteEntity {
        entity_id: entity_id.to_string(),
        domain: entity_id
            .split_once('.')
            .map_or(entity_id, |(domain, _)| domain)
            .to_string(),
        device_class: device_class.map(ToString::to_string),
        friendly_name: name.unwrap_or(entity_id).to_string(),
        state: state.to_string(),
        unit_of_measurement: None,
        last_updated: None,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    pub domain: String,
    pub service: String,
    pub entity_id: String,
    pub data: Map<String, Value>,
}

/// In-memory Home Assistant. Successful service calls update the stored
/// state the way a real instance would.
#[derive(Default)]
pub struct FakeGateway {
    states: Mutex<Vec<hass::State>>,
    calls: Mutex<Vec<RecordedCall>>,
    fetches: AtomicUsize,
    unauthorized: AtomicBool,
    fail_calls: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeGateway {
    pub fn with_states(states: &[(&str, &str)]) -> Self {
        let gw = Self::default();
        gw.set_states(states);
        gw
    }

    pub fn set_states(&self, states: &[(&str, &str)]) {
        *self.states.lock().unwrap() = states
            .iter()
            .map(|(id, state)| hass::State::new(*id, *state))
            .collect();
    }

    pub fn state_of(&self, entity_id: &str) -> Option<String> {
        self.states
            .lock()
            .unwrap()
            .iter()
            .find(|x| x.entity_id == entity_id)
            .map(|x| x.state.clone())
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn set_unauthorized(&self, value: bool) {
        self.unauthorized.store(value, Ordering::SeqCst);
    }

    pub fn set_fail_calls(&self, value: bool) {
        self.fail_calls.store(value, Ordering::SeqCst);
    }

    /// Holds every service call until the returned handle is notified.
    pub fn hold_calls(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn apply(&self, call: &RecordedCall) {
        let mut states = self.states.lock().unwrap();
        let Some(state) = states.iter_mut().find(|x| x.entity_id == call.entity_id) else {
            return;
        };
        match call.service.as_str() {
            "turn_on" => state.state = "on".to_string(),
            "turn_off" => state.state = "off".to_string(),
            "set_value" => {
                if let Some(value) = call.data.get("value") {
                    state.state = value.to_string();
                }
            }
            _ => {}
        }
    }
}

#[async_trait]
impl GatewayApi for FakeGateway {
    async fn fetch_states(&self) -> ApiResult<Vec<hass::State>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(ApiError::Unauthorized("token rejected".to_string()));
        }
        Ok(self.states.lock().unwrap().clone())
    }

    async fn call_service(&self, call: &ServiceCall, entity_id: &str) -> ApiResult<()> {
        let call = RecordedCall {
            domain: call.domain.clone(),
            service: call.service.to_string(),
            entity_id: entity_id.to_string(),
            data: call.data.clone(),
        };
        self.calls.lock().unwrap().push(call.clone());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(ApiError::Unauthorized("token rejected".to_string()));
        }
        if self.fail_calls.load(Ordering::SeqCst) {
            return Err(ApiError::service_error("gateway timed out".to_string()));
        }
        self.apply(&call);
        Ok(())
    }

    async fn api_info(&self) -> ApiResult<hass::ApiInfo> {
        Ok(hass::ApiInfo {
            message: Some("API running.".to_string()),
            version: None,
        })
    }
}

/// In-memory entity record store.
pub struct MemoryStore {
    records: Mutex<Vec<LinkedEntity>>,
    next_id: AtomicI64,
    unauthorized: AtomicBool,
    fail_link: Mutex<HashSet<String>>,
    unlink_calls: AtomicUsize,
    link_gate: Mutex<Option<Arc<Notify>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            records: Mutex::default(),
            next_id: AtomicI64::new(1),
            unauthorized: AtomicBool::new(false),
            fail_link: Mutex::default(),
            unlink_calls: AtomicUsize::new(0),
            link_gate: Mutex::default(),
        }
    }
}

impl MemoryStore {
    pub fn record(&self, entity_id: &str, enabled: bool, link: Option<(i64, &str)>) -> LinkedEntity {
        LinkedEntity {
            id: Some(self.next_id.fetch_add(1, Ordering::SeqCst)),
            gateway_id: 1,
            entity_id: entity_id.to_string(),
            entity_type: entity_id.split('.').next().unwrap_or_default().to_string(),
            domain: None,
            device_class: None,
            friendly_name: None,
            is_enabled: enabled,
            linked_grow_id: link.map(|(grow, _)| grow),
            linked_stage: link.map(|(_, stage)| stage.to_string()),
            last_state: None,
            created_at: None,
        }
    }

    pub fn insert(&self, record: LinkedEntity) {
        self.records.lock().unwrap().push(record);
    }

    pub fn records(&self) -> Vec<LinkedEntity> {
        self.records.lock().unwrap().clone()
    }

    pub fn set_unauthorized(&self, value: bool) {
        self.unauthorized.store(value, Ordering::SeqCst);
    }

    pub fn fail_link_for(&self, entity_id: &str) {
        self.fail_link.lock().unwrap().insert(entity_id.to_string());
    }

    /// Holds every `link_entity` call until the returned handle is notified.
    pub fn hold_links(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.link_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn unlink_calls(&self) -> usize {
        self.unlink_calls.load(Ordering::SeqCst)
    }

    fn check_auth(&self) -> ApiResult<()> {
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(ApiError::Unauthorized("session expired".to_string()));
        }
        Ok(())
    }

    fn modify(
        &self,
        gateway_id: GatewayId,
        id: RecordId,
        func: impl FnOnce(&mut LinkedEntity),
    ) -> ApiResult<LinkedEntity> {
        self.check_auth()?;
        let mut records = self.records.lock().unwrap();
        let rec = records
            .iter_mut()
            .find(|x| x.gateway_id == gateway_id && x.id == Some(id))
            .ok_or_else(|| ApiError::NotFound(format!("record {id}")))?;
        func(rec);
        Ok(rec.clone())
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn list_entities(&self, gateway_id: GatewayId) -> ApiResult<Vec<LinkedEntity>> {
        self.check_auth()?;
        Ok(self
            .records()
            .into_iter()
            .filter(|x| x.gateway_id == gateway_id)
            .collect())
    }

    async fn create_entity(
        &self,
        gateway_id: GatewayId,
        entity: NewEntity,
    ) -> ApiResult<LinkedEntity> {
        self.check_auth()?;
        let mut rec = self.record(&entity.entity_id, entity.is_enabled, None);
        rec.gateway_id = gateway_id;
        rec.entity_type = entity.entity_type;
        rec.domain = entity.domain;
        rec.device_class = entity.device_class;
        rec.friendly_name = entity.friendly_name;
        self.insert(rec.clone());
        Ok(rec)
    }

    async fn update_entity(
        &self,
        gateway_id: GatewayId,
        id: RecordId,
        update: EntityUpdate,
    ) -> ApiResult<LinkedEntity> {
        self.modify(gateway_id, id, |rec| {
            if let Some(name) = update.friendly_name {
                rec.friendly_name = Some(name);
            }
            if let Some(enabled) = update.is_enabled {
                rec.is_enabled = enabled;
            }
        })
    }

    async fn link_entity(
        &self,
        gateway_id: GatewayId,
        id: RecordId,
        link: LinkRequest,
    ) -> ApiResult<LinkedEntity> {
        let failing = self.records().into_iter().any(|x| {
            x.id == Some(id) && self.fail_link.lock().unwrap().contains(&x.entity_id)
        });
        if failing {
            return Err(ApiError::service_error("backend returned 500".to_string()));
        }
        let gate = self.link_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.modify(gateway_id, id, |rec| {
            rec.linked_grow_id = Some(link.grow_id);
            rec.linked_stage = Some(link.stage.to_string());
        })
    }

    async fn unlink_entity(
        &self,
        gateway_id: GatewayId,
        id: RecordId,
    ) -> ApiResult<LinkedEntity> {
        self.unlink_calls.fetch_add(1, Ordering::SeqCst);
        self.modify(gateway_id, id, |rec| {
            rec.linked_grow_id = None;
            rec.linked_stage = None;
        })
    }

    async fn delete_entity(&self, gateway_id: GatewayId, id: RecordId) -> ApiResult<()> {
        self.check_auth()?;
        self.records
            .lock()
            .unwrap()
            .retain(|x| !(x.gateway_id == gateway_id && x.id == Some(id)));
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingRefresher {
    refreshes: AtomicUsize,
}

impl CountingRefresher {
    pub fn count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateRefresher for CountingRefresher {
    async fn refresh(&self) -> ApiResult<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
