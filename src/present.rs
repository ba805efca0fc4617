//! Grouping and ordering of entity lists for display.

use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;

use growlink_api::{Grow, GrowId, LinkedEntity, Stage};

use crate::model::remote::RemoteEntity;

pub const UNKNOWN_GROW: &str = "Unknown Grow";
pub const NO_GROW: &str = "No Grow";

/// A linked entity together with its live state, if the gateway still
/// reports it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LinkedRow {
    pub entity: LinkedEntity,
    pub remote: Option<RemoteEntity>,
}

impl LinkedRow {
    #[must_use]
    pub const fn is_reachable(&self) -> bool {
        self.remote.is_some()
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        self.remote
            .as_ref()
            .map_or_else(|| self.entity.display_name(), |x| x.friendly_name.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StageGroup {
    pub stage: Option<String>,
    pub rows: Vec<LinkedRow>,
}

impl StageGroup {
    #[must_use]
    pub fn label(&self) -> &str {
        self.stage.as_deref().unwrap_or("unassigned")
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GrowGroup {
    pub label: String,
    /// Set only when the grow resolved against the known grows.
    pub grow_id: Option<GrowId>,
    pub stages: Vec<StageGroup>,
}

impl GrowGroup {
    pub fn rows(&self) -> impl Iterator<Item = &LinkedRow> {
        self.stages.iter().flat_map(|x| x.rows.iter())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DomainGroup {
    pub domain: String,
    pub entities: Vec<RemoteEntity>,
}

/// Resolved grows sort by name, then the unknown bucket, then entities
/// without a grow.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
enum GrowKey {
    Resolved(String, GrowId),
    Unknown,
    Missing,
}

impl GrowKey {
    fn label(&self) -> &str {
        match self {
            Self::Resolved(name, _) => name,
            Self::Unknown => UNKNOWN_GROW,
            Self::Missing => NO_GROW,
        }
    }

    const fn grow_id(&self) -> Option<GrowId> {
        match self {
            Self::Resolved(_, id) => Some(*id),
            Self::Unknown | Self::Missing => None,
        }
    }
}

fn stage_key(stage: Option<&str>) -> (usize, bool, String) {
    let name = stage.unwrap_or_default();
    (Stage::rank(name), stage.is_none(), name.to_string())
}

/// Groups linked entities by grow and then by stage.
///
/// Stages follow cultivation order; unknown stage strings sort after every
/// known stage. Sorting is stable, so entities within a stage keep their
/// input order.
#[must_use]
pub fn group_linked(
    linked: &[LinkedEntity],
    remote: &[RemoteEntity],
    grows: &[Grow],
) -> Vec<GrowGroup> {
    let names: HashMap<GrowId, String> = grows.iter().map(|g| (g.id, g.display_name())).collect();
    let live: HashMap<&str, &RemoteEntity> =
        remote.iter().map(|x| (x.entity_id.as_str(), x)).collect();

    let mut by_grow: BTreeMap<GrowKey, Vec<LinkedRow>> = BTreeMap::new();
    for ent in linked {
        let key = match ent.linked_grow_id {
            Some(id) => names
                .get(&id)
                .map_or(GrowKey::Unknown, |name| GrowKey::Resolved(name.clone(), id)),
            None => GrowKey::Missing,
        };
        by_grow.entry(key).or_default().push(LinkedRow {
            entity: ent.clone(),
            remote: live.get(ent.entity_id.as_str()).map(|x| (*x).clone()),
        });
    }

    by_grow
        .into_iter()
        .map(|(key, mut rows)| {
            rows.sort_by_cached_key(|row| stage_key(row.entity.linked_stage.as_deref()));
            let stages = rows
                .into_iter()
                .chunk_by(|row| row.entity.linked_stage.clone())
                .into_iter()
                .map(|(stage, rows)| StageGroup {
                    stage,
                    rows: rows.collect_vec(),
                })
                .collect_vec();
            GrowGroup {
                label: key.label().to_string(),
                grow_id: key.grow_id(),
                stages,
            }
        })
        .collect()
}

/// Groups linkable entities by domain, domains in alphabetical order.
#[must_use]
pub fn group_linkable<'a>(entities: impl IntoIterator<Item = &'a RemoteEntity>) -> Vec<DomainGroup> {
    let mut by_domain: BTreeMap<&str, Vec<RemoteEntity>> = BTreeMap::new();
    for ent in entities {
        by_domain
            .entry(ent.domain.as_str())
            .or_default()
            .push(ent.clone());
    }
    by_domain
        .into_iter()
        .map(|(domain, entities)| DomainGroup {
            domain: domain.to_string(),
            entities,
        })
        .collect()
}
