use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use growlink_api::{
    EntityUpdate, GatewayId, GrowId, LinkRequest, LinkedEntity, NewEntity, RecordId, Stage,
};

use crate::error::{ApiError, ApiResult};
use crate::gateway::EntityStore;
use crate::model::remote::RemoteEntity;

/// Whether a linked entity is present in the latest gateway snapshot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Reachability {
    /// No snapshot has been received yet.
    Unknown,
    Reachable,
    /// Linked, but the gateway no longer reports it. The link is kept.
    Unreachable,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LinkCounts {
    pub linked: usize,
    pub linkable: usize,
    pub unreachable: usize,
}

#[derive(Debug, Default)]
struct Snapshot {
    seq: Option<u64>,
    entities: Vec<RemoteEntity>,
    index: HashMap<String, usize>,
}

impl Snapshot {
    fn get(&self, entity_id: &str) -> Option<&RemoteEntity> {
        self.index.get(entity_id).map(|idx| &self.entities[*idx])
    }
}

/// Source of truth for which gateway entities are linked to which grow and
/// stage.
///
/// Known entities are the union of persisted records and the latest remote
/// snapshot. Every known entity is either linked or linkable, never both.
pub struct LinkRegistry {
    gateway_id: GatewayId,
    name: String,
    store: Arc<dyn EntityStore>,
    records: BTreeMap<String, LinkedEntity>,
    snapshot: Snapshot,
}

impl LinkRegistry {
    pub fn new(gateway_id: GatewayId, name: &str, store: Arc<dyn EntityStore>) -> Self {
        Self {
            gateway_id,
            name: name.to_string(),
            store,
            records: BTreeMap::new(),
            snapshot: Snapshot::default(),
        }
    }

    #[must_use]
    pub const fn gateway_id(&self) -> GatewayId {
        self.gateway_id
    }

    /// Replaces the cached records with the backend's current list.
    pub async fn load(&mut self) -> ApiResult<usize> {
        let list = self.store.list_entities(self.gateway_id).await?;

        let mut records: BTreeMap<String, LinkedEntity> = BTreeMap::new();
        for ent in list {
            if ent.gateway_id != self.gateway_id {
                continue;
            }
            if let Some(prev) = records.get(&ent.entity_id) {
                log::warn!(
                    "[{}] Duplicate record for {}, keeping {:?}",
                    self.name,
                    ent.entity_id,
                    prev.id
                );
                continue;
            }
            records.insert(ent.entity_id.clone(), ent);
        }

        log::debug!("[{}] Loaded {} entity records", self.name, records.len());
        self.records = records;
        Ok(self.records.len())
    }

    /// Installs a fresh remote snapshot, unless a newer one is already in
    /// place. Returns whether the snapshot was applied.
    pub fn apply_snapshot(&mut self, seq: u64, entities: Vec<RemoteEntity>) -> bool {
        if self.snapshot.seq.is_some_and(|current| current >= seq) {
            log::debug!(
                "[{}] Discarding out-of-order poll #{seq} (have #{:?})",
                self.name,
                self.snapshot.seq
            );
            return false;
        }

        let mut index = HashMap::with_capacity(entities.len());
        for (idx, ent) in entities.iter().enumerate() {
            index.entry(ent.entity_id.clone()).or_insert(idx);
        }

        let was_unreachable = self.unreachable_ids();
        self.snapshot = Snapshot {
            seq: Some(seq),
            entities,
            index,
        };
        let now_unreachable = self.unreachable_ids();

        for id in now_unreachable.difference(&was_unreachable) {
            log::warn!("[{}] Linked entity {id} is no longer reported", self.name);
        }
        for id in was_unreachable.difference(&now_unreachable) {
            log::info!("[{}] Linked entity {id} is reachable again", self.name);
        }

        true
    }

    fn unreachable_ids(&self) -> HashSet<String> {
        if self.snapshot.seq.is_none() {
            return HashSet::new();
        }
        self.records
            .values()
            .filter(|ent| ent.is_linked() && self.snapshot.get(&ent.entity_id).is_none())
            .map(|ent| ent.entity_id.clone())
            .collect()
    }

    #[must_use]
    pub const fn snapshot_seq(&self) -> Option<u64> {
        self.snapshot.seq
    }

    #[must_use]
    pub fn remote_entities(&self) -> &[RemoteEntity] {
        &self.snapshot.entities
    }

    #[must_use]
    pub fn remote(&self, entity_id: &str) -> Option<&RemoteEntity> {
        self.snapshot.get(entity_id)
    }

    #[must_use]
    pub fn record(&self, entity_id: &str) -> Option<&LinkedEntity> {
        self.records.get(entity_id)
    }

    #[must_use]
    pub fn is_linked(&self, entity_id: &str) -> bool {
        self.records.get(entity_id).is_some_and(LinkedEntity::is_linked)
    }

    #[must_use]
    pub fn list_linked(&self) -> Vec<LinkedEntity> {
        self.records
            .values()
            .filter(|ent| ent.is_linked())
            .cloned()
            .collect()
    }

    /// Unlinked entities: remote entities in gateway order, followed by
    /// persisted records the gateway no longer reports.
    #[must_use]
    pub fn list_linkable(&self) -> Vec<LinkedEntity> {
        let mut res: Vec<LinkedEntity> = self
            .snapshot
            .entities
            .iter()
            .filter_map(|remote| match self.records.get(&remote.entity_id) {
                Some(rec) if rec.is_linked() => None,
                Some(rec) => Some(rec.clone()),
                None => Some(remote.to_linkable(self.gateway_id)),
            })
            .collect();

        res.extend(
            self.records
                .values()
                .filter(|rec| !rec.is_linked() && self.snapshot.get(&rec.entity_id).is_none())
                .cloned(),
        );

        res
    }

    #[must_use]
    pub fn reachability(&self, entity_id: &str) -> Reachability {
        if self.snapshot.seq.is_none() {
            Reachability::Unknown
        } else if self.snapshot.get(entity_id).is_some() {
            Reachability::Reachable
        } else {
            Reachability::Unreachable
        }
    }

    /// Linked entities present in the latest snapshot, with their live state.
    #[must_use]
    pub fn controllable(&self) -> Vec<(&LinkedEntity, &RemoteEntity)> {
        self.records
            .values()
            .filter(|ent| ent.is_linked())
            .filter_map(|ent| self.snapshot.get(&ent.entity_id).map(|remote| (ent, remote)))
            .collect()
    }

    #[must_use]
    pub fn counts(&self) -> LinkCounts {
        let linked = self.records.values().filter(|ent| ent.is_linked()).count();
        LinkCounts {
            linked,
            linkable: self.list_linkable().len(),
            unreachable: self.unreachable_ids().len(),
        }
    }

    /// Plans a link of a remote entity to a grow and stage. Returns
    /// [`LinkPlan::Current`] when the entity is already linked exactly so.
    pub fn plan_link(
        &self,
        entity_id: &str,
        grow_id: GrowId,
        stage: Stage,
    ) -> ApiResult<LinkPlan> {
        let Some(remote) = self.snapshot.get(entity_id) else {
            return Err(ApiError::entity_not_found(entity_id));
        };

        let record = self.records.get(entity_id).cloned();
        if let Some(rec) = &record {
            if rec.is_linked()
                && rec.linked_grow_id == Some(grow_id)
                && rec.linked_stage.as_deref() == Some(stage.as_str())
            {
                return Ok(LinkPlan::Current(rec.clone()));
            }
        }

        let create = record
            .is_none()
            .then(|| remote.to_new_entity(self.gateway_id));
        Ok(LinkPlan::Pending(self.change(
            entity_id,
            record,
            create,
            ChangeOp::Link { grow_id, stage },
        )))
    }

    /// Plans clearing the grow/stage association. `None` when the entity is
    /// not linked.
    #[must_use]
    pub fn plan_unlink(&self, entity_id: &str) -> Option<PendingChange> {
        let rec = self.records.get(entity_id).filter(|rec| rec.is_linked())?;
        Some(self.change(entity_id, Some(rec.clone()), None, ChangeOp::Unlink))
    }

    fn change(
        &self,
        entity_id: &str,
        record: Option<LinkedEntity>,
        create: Option<NewEntity>,
        op: ChangeOp,
    ) -> PendingChange {
        PendingChange {
            gateway_id: self.gateway_id,
            name: self.name.clone(),
            store: self.store.clone(),
            entity_id: entity_id.to_string(),
            record,
            create,
            op,
        }
    }

    /// Caches whatever the backend last returned for a change, including
    /// the partial progress of a failed one.
    pub fn finish(&mut self, change: PendingChange) {
        if let Some(record) = change.record {
            self.records.insert(change.entity_id, record);
        }
    }

    /// Links a remote entity to a grow and stage, creating its record on
    /// first use. Repeating a link with the same arguments is a no-op.
    pub async fn link(
        &mut self,
        entity_id: &str,
        grow_id: GrowId,
        stage: Stage,
    ) -> ApiResult<LinkedEntity> {
        let mut change = match self.plan_link(entity_id, grow_id, stage)? {
            LinkPlan::Current(rec) => return Ok(rec),
            LinkPlan::Pending(change) => change,
        };
        let res = change.run().await;
        self.finish(change);
        res
    }

    /// Clears the grow/stage association. Unlinking an entity that is not
    /// linked is a no-op.
    pub async fn unlink(&mut self, entity_id: &str) -> ApiResult<()> {
        let Some(mut change) = self.plan_unlink(entity_id) else {
            return Ok(());
        };
        let res = change.run().await;
        self.finish(change);
        res.map(|_| ())
    }

    /// Deletes the persisted record entirely. The entity stays linkable as
    /// long as the gateway reports it.
    pub async fn forget(&mut self, entity_id: &str) -> ApiResult<()> {
        let Some(id) = self.records.get(entity_id).and_then(|rec| rec.id) else {
            return Ok(());
        };
        self.store.delete_entity(self.gateway_id, id).await?;
        self.records.remove(entity_id);
        log::info!("[{}] Removed record for {}", self.name, entity_id);
        Ok(())
    }
}

/// Outcome of [`LinkRegistry::plan_link`].
#[derive(Debug)]
pub enum LinkPlan {
    /// Already linked to the requested grow and stage.
    Current(LinkedEntity),
    Pending(PendingChange),
}

#[derive(Clone, Copy, Debug)]
enum ChangeOp {
    Link { grow_id: GrowId, stage: Stage },
    Unlink,
}

/// Backend calls for one link or unlink, detached from the registry so
/// they can run without holding it. Hand the change back to
/// [`LinkRegistry::finish`] afterwards.
pub struct PendingChange {
    gateway_id: GatewayId,
    name: String,
    store: Arc<dyn EntityStore>,
    entity_id: String,
    record: Option<LinkedEntity>,
    create: Option<NewEntity>,
    op: ChangeOp,
}

impl std::fmt::Debug for PendingChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingChange")
            .field("entity_id", &self.entity_id)
            .field("op", &self.op)
            .finish_non_exhaustive()
    }
}

impl PendingChange {
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub async fn run(&mut self) -> ApiResult<LinkedEntity> {
        match self.op {
            ChangeOp::Link { grow_id, stage } => self.link(grow_id, stage).await,
            ChangeOp::Unlink => self.unlink().await,
        }
    }

    fn record_id(&self) -> ApiResult<RecordId> {
        self.record.as_ref().and_then(|rec| rec.id).ok_or_else(|| {
            ApiError::Validation(format!(
                "record for {} has no persistence id",
                self.entity_id
            ))
        })
    }

    async fn link(&mut self, grow_id: GrowId, stage: Stage) -> ApiResult<LinkedEntity> {
        if let Some(new) = self.create.take() {
            self.record = Some(self.store.create_entity(self.gateway_id, new).await?);
        }
        let id = self.record_id()?;

        if !self.record.as_ref().is_some_and(|rec| rec.is_enabled) {
            let update = EntityUpdate {
                is_enabled: Some(true),
                ..EntityUpdate::default()
            };
            self.record = Some(self.store.update_entity(self.gateway_id, id, update).await?);
        }

        let linked = self
            .store
            .link_entity(self.gateway_id, id, LinkRequest { grow_id, stage })
            .await?;
        self.record = Some(linked.clone());

        log::info!(
            "[{}] Linked {} to grow {} ({})",
            self.name,
            self.entity_id,
            grow_id,
            stage
        );
        Ok(linked)
    }

    async fn unlink(&mut self) -> ApiResult<LinkedEntity> {
        let id = self.record_id()?;
        let unlinked = self.store.unlink_entity(self.gateway_id, id).await?;
        self.record = Some(unlinked.clone());

        log::info!("[{}] Unlinked {}", self.name, self.entity_id);
        Ok(unlinked)
    }
}
