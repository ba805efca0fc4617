use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use hass::ServiceCall;

use crate::error::{ApiError, ApiResult};
use crate::gateway::GatewayApi;

/// Something that can re-fetch gateway state after a command, so the next
/// displayed state is confirmed rather than assumed.
#[async_trait]
pub trait StateRefresher: Send + Sync {
    async fn refresh(&self) -> ApiResult<()>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CommitOutcome {
    /// Empty or not yet a number; nothing was sent.
    Skipped,
    Committed(f64),
}

#[derive(Debug, Default)]
struct ControlState {
    in_flight: HashSet<String>,
    pending: HashMap<String, String>,
}

fn lock(state: &Mutex<ControlState>) -> MutexGuard<'_, ControlState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks an entity as having a command in flight until dropped.
struct InFlight<'a> {
    state: &'a Mutex<ControlState>,
    entity_id: String,
}

impl<'a> InFlight<'a> {
    fn acquire(state: &'a Mutex<ControlState>, entity_id: &str) -> ApiResult<Self> {
        if !lock(state).in_flight.insert(entity_id.to_string()) {
            return Err(ApiError::in_flight(entity_id));
        }
        Ok(Self {
            state,
            entity_id: entity_id.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.state).in_flight.remove(&self.entity_id);
    }
}

/// Sends toggle and set-value commands to the gateway.
///
/// At most one command per entity is in flight. A second command for the
/// same entity while the first is pending is rejected with
/// [`ApiError::Conflict`]. Displayed state is never changed optimistically:
/// after a successful call the dispatcher triggers a refresh, and only that
/// refresh updates what callers see.
pub struct ControlDispatcher {
    name: String,
    gateway: Arc<dyn GatewayApi>,
    refresher: Arc<dyn StateRefresher>,
    state: Mutex<ControlState>,
}

impl ControlDispatcher {
    pub fn new(
        name: &str,
        gateway: Arc<dyn GatewayApi>,
        refresher: Arc<dyn StateRefresher>,
    ) -> Self {
        Self {
            name: name.to_string(),
            gateway,
            refresher,
            state: Mutex::default(),
        }
    }

    #[must_use]
    pub fn is_controlling(&self, entity_id: &str) -> bool {
        lock(&self.state).in_flight.contains(entity_id)
    }

    /// `turn_off` when the entity is exactly `"on"`, `turn_on` otherwise.
    pub async fn toggle(
        &self,
        entity_id: &str,
        domain: &str,
        current_state: &str,
    ) -> ApiResult<()> {
        self.dispatch(entity_id, ServiceCall::toggle(domain, current_state))
            .await
    }

    async fn dispatch(&self, entity_id: &str, call: ServiceCall) -> ApiResult<()> {
        let _guard = InFlight::acquire(&self.state, entity_id)
            .inspect_err(|err| log::warn!("[{}] {err}", self.name))?;

        log::debug!(
            "[{}] {}.{} -> {}",
            self.name,
            call.domain,
            call.service,
            entity_id
        );
        self.gateway.call_service(&call, entity_id).await?;

        if let Err(err) = self.refresher.refresh().await {
            if err.is_unauthorized() {
                return Err(err);
            }
            log::warn!("[{}] Refresh after {} failed: {err}", self.name, entity_id);
        }
        Ok(())
    }

    #[must_use]
    pub fn pending_value(&self, entity_id: &str) -> Option<String> {
        lock(&self.state).pending.get(entity_id).cloned()
    }

    pub fn set_pending_value(&self, entity_id: &str, raw: &str) {
        lock(&self.state)
            .pending
            .insert(entity_id.to_string(), raw.to_string());
    }

    pub fn clear_pending_value(&self, entity_id: &str) {
        lock(&self.state).pending.remove(entity_id);
    }

    /// Writes `baseline ± 1` into the pending buffer. A non-numeric baseline
    /// leaves the buffer untouched and returns `None`.
    pub fn adjust_pending_value(
        &self,
        entity_id: &str,
        increment: bool,
        baseline: &str,
    ) -> Option<String> {
        let base = baseline
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|x| x.is_finite())?;

        let value = if increment { base + 1.0 } else { base - 1.0 };
        let value = value.to_string();
        self.set_pending_value(entity_id, &value);
        Some(value)
    }

    /// Pending value if the user is editing, the gateway state otherwise.
    #[must_use]
    pub fn display_value(&self, entity_id: &str, remote_state: &str) -> String {
        self.pending_value(entity_id)
            .unwrap_or_else(|| remote_state.to_string())
    }

    /// Sends `set_value` for a pending edit. Values that do not parse as a
    /// number are kept in the buffer and not sent, since the user is
    /// presumably still typing. On failure the pending value is kept so the
    /// user can retry.
    pub async fn commit_value(&self, entity_id: &str, pending: &str) -> ApiResult<CommitOutcome> {
        let pending = pending.trim();
        if pending.is_empty() {
            return Ok(CommitOutcome::Skipped);
        }
        self.set_pending_value(entity_id, pending);

        let Some(value) = pending.parse::<f64>().ok().filter(|x| x.is_finite()) else {
            log::debug!("[{}] Not committing {pending:?} for {entity_id}", self.name);
            return Ok(CommitOutcome::Skipped);
        };

        let domain = entity_id
            .split_once('.')
            .map(|(domain, _)| domain)
            .filter(|domain| !domain.is_empty())
            .ok_or_else(|| ApiError::Validation(format!("malformed entity id {entity_id:?}")))?;

        self.dispatch(entity_id, ServiceCall::set_value(domain, value))
            .await?;
        self.clear_pending_value(entity_id);
        Ok(CommitOutcome::Committed(value))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::control::{CommitOutcome, ControlDispatcher};
    use crate::error::ErrorKind;
    use crate::testutil::{CountingRefresher, FakeGateway};

    fn dispatcher(
        states: &[(&str, &str)],
    ) -> (Arc<FakeGateway>, Arc<CountingRefresher>, Arc<ControlDispatcher>) {
        let gw = Arc::new(FakeGateway::with_states(states));
        let refresher = Arc::new(CountingRefresher::default());
        let disp = Arc::new(ControlDispatcher::new(
            "test",
            gw.clone(),
            refresher.clone(),
        ));
        (gw, refresher, disp)
    }

    #[tokio::test]
    async fn toggle_sends_opposite_service_and_refreshes() {
        let (gw, refresher, disp) = dispatcher(&[("switch.fan", "off")]);

        disp.toggle("switch.fan", "switch", "off").await.unwrap();
        disp.toggle("switch.fan", "switch", "on").await.unwrap();

        let calls = gw.calls();
        assert_eq!(calls[0].service, "turn_on");
        assert_eq!(calls[1].service, "turn_off");
        assert_eq!(calls[0].domain, "switch");
        assert_eq!(calls[0].entity_id, "switch.fan");
        assert_eq!(refresher.count(), 2);
        assert!(!disp.is_controlling("switch.fan"));
    }

    #[tokio::test]
    async fn second_command_while_in_flight_is_rejected() {
        let (gw, _refresher, disp) = dispatcher(&[("switch.fan", "off")]);
        let gate = gw.hold_calls();

        let first = tokio::spawn({
            let disp = disp.clone();
            async move { disp.toggle("switch.fan", "switch", "off").await }
        });
        while gw.calls().is_empty() {
            tokio::task::yield_now().await;
        }
        assert!(disp.is_controlling("switch.fan"));

        let err = disp
            .toggle("switch.fan", "switch", "off")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        gate.notify_one();
        first.await.unwrap().unwrap();

        assert_eq!(gw.calls().len(), 1);
        assert!(!disp.is_controlling("switch.fan"));
    }

    #[tokio::test]
    async fn failed_command_clears_in_flight_without_refresh() {
        let (gw, refresher, disp) = dispatcher(&[("switch.fan", "off")]);
        gw.set_fail_calls(true);

        let err = disp
            .toggle("switch.fan", "switch", "off")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(!disp.is_controlling("switch.fan"));
        assert_eq!(refresher.count(), 0);
        assert_eq!(gw.state_of("switch.fan").as_deref(), Some("off"));
    }

    #[tokio::test]
    async fn commit_value_sends_set_value() {
        let (gw, _refresher, disp) = dispatcher(&[("number.rh_target", "85")]);
        disp.set_pending_value("number.rh_target", "87.5");

        let res = disp.commit_value("number.rh_target", "87.5").await.unwrap();
        assert_eq!(res, CommitOutcome::Committed(87.5));

        let calls = gw.calls();
        assert_eq!(calls[0].service, "set_value");
        assert_eq!(calls[0].domain, "number");
        assert_eq!(calls[0].data.get("value"), Some(&json!(87.5)));
        assert_eq!(disp.pending_value("number.rh_target"), None);
    }

    #[tokio::test]
    async fn empty_commit_is_noop() {
        let (gw, _refresher, disp) = dispatcher(&[("number.rh_target", "85")]);
        let res = disp.commit_value("number.rh_target", "  ").await.unwrap();
        assert_eq!(res, CommitOutcome::Skipped);
        assert!(gw.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_commit_keeps_pending_value() {
        let (gw, _refresher, disp) = dispatcher(&[("number.rh_target", "85")]);
        gw.set_fail_calls(true);

        assert!(disp.commit_value("number.rh_target", "90").await.is_err());
        assert_eq!(disp.pending_value("number.rh_target").as_deref(), Some("90"));
        assert_eq!(disp.display_value("number.rh_target", "85"), "90");
    }

    #[tokio::test]
    async fn non_numeric_commit_is_skipped() {
        let (gw, _refresher, disp) = dispatcher(&[("number.rh_target", "85")]);
        let res = disp.commit_value("number.rh_target", "8.").await.unwrap();
        assert_eq!(res, CommitOutcome::Committed(8.0));

        let res = disp.commit_value("number.rh_target", "-").await.unwrap();
        assert_eq!(res, CommitOutcome::Skipped);
        assert_eq!(gw.calls().len(), 1);
        assert_eq!(disp.pending_value("number.rh_target").as_deref(), Some("-"));
    }

    #[test]
    fn adjust_steps_from_baseline() {
        let gw = Arc::new(FakeGateway::default());
        let disp = ControlDispatcher::new("test", gw, Arc::new(CountingRefresher::default()));

        assert_eq!(disp.adjust_pending_value("number.t", true, "20").as_deref(), Some("21"));
        assert_eq!(disp.adjust_pending_value("number.t", true, "21").as_deref(), Some("22"));
        assert_eq!(disp.adjust_pending_value("number.t", false, "20").as_deref(), Some("19"));
        assert_eq!(disp.adjust_pending_value("number.h", false, "0.5").as_deref(), Some("-0.5"));
        assert_eq!(disp.display_value("number.t", "20"), "19");

        assert_eq!(disp.adjust_pending_value("number.x", true, "unavailable"), None);
        assert_eq!(disp.pending_value("number.x"), None);
        assert_eq!(disp.display_value("number.x", "unavailable"), "unavailable");
    }

    #[test]
    fn adjust_ignores_half_typed_pending_value() {
        let gw = Arc::new(FakeGateway::default());
        let disp = ControlDispatcher::new("test", gw, Arc::new(CountingRefresher::default()));

        disp.set_pending_value("number.t", "-");
        assert_eq!(disp.adjust_pending_value("number.t", true, "20").as_deref(), Some("21"));
        assert_eq!(disp.pending_value("number.t").as_deref(), Some("21"));

        disp.set_pending_value("number.t", "2");
        assert_eq!(disp.adjust_pending_value("number.t", true, "n/a"), None);
        assert_eq!(disp.pending_value("number.t").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn commit_while_toggle_in_flight_is_rejected() {
        let (gw, _refresher, disp) = dispatcher(&[("input_boolean.mister", "off")]);
        let gate = gw.hold_calls();

        let first = tokio::spawn({
            let disp = disp.clone();
            async move { disp.toggle("input_boolean.mister", "input_boolean", "off").await }
        });
        while gw.calls().is_empty() {
            tokio::task::yield_now().await;
        }

        let err = disp
            .commit_value("input_boolean.mister", "3")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(disp.pending_value("input_boolean.mister").as_deref(), Some("3"));

        gate.notify_one();
        first.await.unwrap().unwrap();
        assert_eq!(gw.calls().len(), 1);
        assert_eq!(gw.calls()[0].service, "turn_on");
    }
}
