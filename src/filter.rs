use std::collections::BTreeSet;

use crate::model::prefs::FilterPreferences;
use crate::model::remote::RemoteEntity;

#[must_use]
pub fn matches_domain(ent: &RemoteEntity, prefs: &FilterPreferences) -> bool {
    prefs.show_all_domains || prefs.domains.contains(&ent.domain)
}

/// Entities without a device class always pass, so classless domains such
/// as `switch` and `automation` survive a device class filter.
#[must_use]
pub fn matches_device_class(ent: &RemoteEntity, prefs: &FilterPreferences) -> bool {
    if prefs.device_classes.is_empty() {
        return true;
    }
    ent.device_class
        .as_ref()
        .is_none_or(|class| prefs.device_classes.contains(class))
}

/// Case-insensitive substring match on name, id and device class.
#[must_use]
pub fn matches_query(ent: &RemoteEntity, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }
    [
        Some(ent.friendly_name.as_str()),
        Some(ent.entity_id.as_str()),
        ent.device_class.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(&query))
}

/// Narrows a snapshot by domain, device class and free-text query.
///
/// Pure function of its inputs; output keeps the input order.
#[must_use]
pub fn filter_entities<'a>(
    entities: &'a [RemoteEntity],
    prefs: &FilterPreferences,
    query: &str,
) -> Vec<&'a RemoteEntity> {
    entities
        .iter()
        .filter(|ent| {
            matches_domain(ent, prefs)
                && matches_device_class(ent, prefs)
                && matches_query(ent, query)
        })
        .collect()
}

/// Domains present in a snapshot, for building filter toggles.
#[must_use]
pub fn available_domains(entities: &[RemoteEntity]) -> BTreeSet<&str> {
    entities.iter().map(|x| x.domain.as_str()).collect()
}

/// Device classes present in a snapshot, for building filter toggles.
#[must_use]
pub fn available_device_classes(entities: &[RemoteEntity]) -> BTreeSet<&str> {
    entities
        .iter()
        .filter_map(|x| x.device_class.as_deref())
        .collect()
}
