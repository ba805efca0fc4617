use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[error("Unknown cultivation stage {0:?}")]
pub struct StageParseError(pub String);

/// Cultivation stages, in the order a grow passes through them.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Inoculation,
    SpawnColonization,
    BulkColonization,
    Fruiting,
    Harvest,
}

impl Stage {
    pub const ALL: [Self; 5] = [
        Self::Inoculation,
        Self::SpawnColonization,
        Self::BulkColonization,
        Self::Fruiting,
        Self::Harvest,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inoculation => "inoculation",
            Self::SpawnColonization => "spawn_colonization",
            Self::BulkColonization => "bulk_colonization",
            Self::Fruiting => "fruiting",
            Self::Harvest => "harvest",
        }
    }

    /// Sort key for a persisted stage string. Strings that are not a known
    /// stage rank after every known stage.
    #[must_use]
    pub fn rank(stage: &str) -> usize {
        Self::ALL
            .iter()
            .position(|x| x.as_str() == stage)
            .unwrap_or(Self::ALL.len())
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = StageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|x| x.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StageParseError(s.to_string()))
    }
}
