use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use growlink_api::{Gateway, Grow, GrowId, LinkedEntity, Stage};

use crate::bulk::{BulkAction, BulkReport, dedup};
use crate::control::{CommitOutcome, ControlDispatcher};
use crate::error::{ApiError, ApiResult};
use crate::filter::filter_entities;
use crate::gateway::{EntityStore, GatewayApi};
use crate::model::prefs::FilterPreferences;
use crate::model::remote::RemoteEntity;
use crate::poll::{Poller, SessionEvent};
use crate::present::{DomainGroup, GrowGroup, group_linkable, group_linked};
use crate::registry::{LinkCounts, LinkPlan, LinkRegistry, PendingChange};

/// Everything tied to one selected gateway: its registry, the poller that
/// keeps it fresh, and the control dispatcher.
///
/// Dropping the session cancels polling, and any poll still in flight
/// discards its result.
pub struct GatewaySession {
    gateway: Gateway,
    registry: Arc<Mutex<LinkRegistry>>,
    poller: Poller,
    dispatcher: ControlDispatcher,
    events: broadcast::Sender<SessionEvent>,
    shutdown: CancellationToken,
    polling: Option<(CancellationToken, JoinHandle<()>)>,
    interval: Duration,
}

impl GatewaySession {
    pub fn new(
        gateway: Gateway,
        api: Arc<dyn GatewayApi>,
        store: Arc<dyn EntityStore>,
        interval: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(32);
        let shutdown = CancellationToken::new();
        let registry = Arc::new(Mutex::new(LinkRegistry::new(
            gateway.id,
            &gateway.name,
            store,
        )));
        let poller = Poller::new(
            &gateway.name,
            api.clone(),
            registry.clone(),
            events.clone(),
            shutdown.clone(),
        );
        let dispatcher = ControlDispatcher::new(&gateway.name, api, Arc::new(poller.clone()));

        Self {
            gateway,
            registry,
            poller,
            dispatcher,
            events,
            shutdown,
            polling: None,
            interval,
        }
    }

    #[must_use]
    pub const fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    #[must_use]
    pub fn registry(&self) -> Arc<Mutex<LinkRegistry>> {
        self.registry.clone()
    }

    #[must_use]
    pub const fn dispatcher(&self) -> &ControlDispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Loads persisted records and takes a first snapshot.
    pub async fn load(&self) -> ApiResult<LinkCounts> {
        self.registry.lock().await.load().await?;
        self.poller.poll_once().await?;
        Ok(self.registry.lock().await.counts())
    }

    pub async fn poll_now(&self) -> ApiResult<bool> {
        self.poller.poll_once().await
    }

    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.polling
            .as_ref()
            .is_some_and(|(token, _)| !token.is_cancelled())
    }

    /// Starts periodic polling. Inactive gateways are never polled.
    pub fn start(&mut self) {
        if !self.gateway.is_active {
            log::info!("[{}] Gateway inactive, not polling", self.gateway.name);
            return;
        }
        if self.is_polling() {
            return;
        }
        let token = self.shutdown.child_token();
        let task = tokio::spawn(self.poller.clone().run(self.interval, token.clone()));
        self.polling = Some((token, task));
    }

    pub fn stop(&mut self) {
        if let Some((token, _task)) = self.polling.take() {
            token.cancel();
        }
    }

    /// Records an enable/disable of the gateway and starts or stops polling
    /// to match.
    pub fn set_active(&mut self, active: bool) {
        self.gateway.is_active = active;
        if active {
            self.start();
        } else {
            self.stop();
        }
    }

    /// Runs a planned change with the registry unlocked, so polls and
    /// lookups are not blocked behind backend round-trips.
    async fn run_change(&self, mut change: PendingChange) -> ApiResult<LinkedEntity> {
        let res = change.run().await;
        self.registry.lock().await.finish(change);
        res
    }

    pub async fn link(
        &self,
        entity_id: &str,
        grow_id: GrowId,
        stage: Stage,
    ) -> ApiResult<LinkedEntity> {
        let plan = self
            .registry
            .lock()
            .await
            .plan_link(entity_id, grow_id, stage)?;
        match plan {
            LinkPlan::Current(rec) => Ok(rec),
            LinkPlan::Pending(change) => self.run_change(change).await,
        }
    }

    pub async fn unlink(&self, entity_id: &str) -> ApiResult<()> {
        let change = self.registry.lock().await.plan_unlink(entity_id);
        match change {
            Some(change) => self.run_change(change).await.map(|_| ()),
            None => Ok(()),
        }
    }

    /// Links each id once. Per-entity failures are reported; `Unauthorized`
    /// aborts the batch.
    pub async fn bulk_link(
        &self,
        entity_ids: &[String],
        grow_id: GrowId,
        stage: Stage,
    ) -> ApiResult<BulkReport> {
        let mut report = BulkReport::new(BulkAction::Link);
        for entity_id in dedup(entity_ids) {
            let res = self.link(entity_id, grow_id, stage).await.map(|_| ());
            report.record(&self.gateway.name, entity_id, res)?;
        }
        log::info!("[{}] Bulk link: {report}", self.gateway.name);
        Ok(report)
    }

    pub async fn bulk_unlink(&self, entity_ids: &[String]) -> ApiResult<BulkReport> {
        let mut report = BulkReport::new(BulkAction::Unlink);
        for entity_id in dedup(entity_ids) {
            let res = self.unlink(entity_id).await;
            report.record(&self.gateway.name, entity_id, res)?;
        }
        log::info!("[{}] Bulk unlink: {report}", self.gateway.name);
        Ok(report)
    }

    /// Live state of a linked entity the gateway currently reports.
    async fn controllable(&self, entity_id: &str) -> ApiResult<RemoteEntity> {
        let reg = self.registry.lock().await;
        if !reg.is_linked(entity_id) {
            return Err(ApiError::NotFound(format!("entity {entity_id} is not linked")));
        }
        reg.remote(entity_id)
            .cloned()
            .ok_or_else(|| ApiError::entity_not_found(entity_id))
    }

    pub async fn toggle(&self, entity_id: &str) -> ApiResult<()> {
        let ent = self.controllable(entity_id).await?;
        self.dispatcher
            .toggle(&ent.entity_id, &ent.domain, &ent.state)
            .await
    }

    /// Steps a linked numeric entity by one. The user's edit is the baseline
    /// while it is a number, the confirmed gateway value otherwise. `None`
    /// when neither is numeric.
    pub async fn adjust_value(&self, entity_id: &str, increment: bool) -> ApiResult<Option<String>> {
        let ent = self.controllable(entity_id).await?;
        let baseline = self
            .dispatcher
            .pending_value(entity_id)
            .filter(|raw| raw.trim().parse::<f64>().is_ok_and(f64::is_finite))
            .or_else(|| ent.numeric_state().map(|x| x.to_string()));

        Ok(baseline.and_then(|baseline| {
            self.dispatcher
                .adjust_pending_value(entity_id, increment, &baseline)
        }))
    }

    pub async fn commit_value(&self, entity_id: &str, pending: &str) -> ApiResult<CommitOutcome> {
        self.controllable(entity_id).await?;
        self.dispatcher.commit_value(entity_id, pending).await
    }

    pub async fn linked_groups(&self, grows: &[Grow]) -> Vec<GrowGroup> {
        let reg = self.registry.lock().await;
        group_linked(&reg.list_linked(), reg.remote_entities(), grows)
    }

    /// Remote entities that are not linked, filtered and grouped by domain.
    pub async fn linkable_groups(&self, prefs: &FilterPreferences, query: &str) -> Vec<DomainGroup> {
        let reg = self.registry.lock().await;
        let linked: HashSet<String> = reg
            .list_linked()
            .into_iter()
            .map(|x| x.entity_id)
            .collect();
        let pool: Vec<RemoteEntity> = reg
            .remote_entities()
            .iter()
            .filter(|x| !linked.contains(&x.entity_id))
            .cloned()
            .collect();
        drop(reg);
        group_linkable(filter_entities(&pool, prefs, query))
    }
}

impl Drop for GatewaySession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
