use serde::{Deserialize, Serialize};

use crate::GrowId;

/// The subset of a grow record needed to label linked entities.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct Grow {
    pub id: GrowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl Grow {
    #[must_use]
    pub fn named(id: GrowId, name: &str) -> Self {
        Self {
            id,
            name: Some(name.to_string()),
            species: None,
            variant: None,
        }
    }

    /// Explicit name if set, otherwise "species variant", otherwise "Grow #id".
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|x| !x.is_empty()) {
            return name.to_string();
        }
        let parts = [self.species.as_deref(), self.variant.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|x| !x.is_empty())
            .collect::<Vec<_>>();
        if parts.is_empty() {
            format!("Grow #{}", self.id)
        } else {
            parts.join(" ")
        }
    }
}
