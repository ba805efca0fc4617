use std::collections::HashSet;
use std::fmt;

use crate::error::{ApiError, ApiResult, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BulkAction {
    Link,
    Unlink,
}

impl BulkAction {
    const fn past_tense(self) -> &'static str {
        match self {
            Self::Link => "linked",
            Self::Unlink => "unlinked",
        }
    }
}

/// Per-entity outcome of a batch link or unlink.
///
/// One entity failing never aborts the batch, so a report can hold any mix
/// of successes and failures.
#[derive(Debug)]
pub struct BulkReport {
    action: BulkAction,
    outcomes: Vec<(String, ApiResult<()>)>,
}

impl BulkReport {
    #[must_use]
    pub const fn new(action: BulkAction) -> Self {
        Self {
            action,
            outcomes: Vec::new(),
        }
    }

    pub fn push(&mut self, entity_id: &str, result: ApiResult<()>) {
        self.outcomes.push((entity_id.to_string(), result));
    }

    /// Records one entity's outcome. `Unauthorized` is handed back instead,
    /// aborting the batch.
    pub fn record(&mut self, label: &str, entity_id: &str, result: ApiResult<()>) -> ApiResult<()> {
        if let Err(err) = &result {
            if err.is_unauthorized() {
                return result;
            }
            log::warn!("[{label}] {entity_id}: {err}");
        }
        self.push(entity_id, result);
        Ok(())
    }

    #[must_use]
    pub const fn action(&self) -> BulkAction {
        self.action
    }

    #[must_use]
    pub fn outcomes(&self) -> &[(String, ApiResult<()>)] {
        &self.outcomes
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|(_, res)| res.is_ok()).count()
    }

    /// Entities that were not present on the gateway.
    #[must_use]
    pub fn unavailable(&self) -> usize {
        self.count_errors(|err| err.kind() == ErrorKind::NotFound)
    }

    /// Failures other than unavailable entities.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count_errors(|err| err.kind() != ErrorKind::NotFound)
    }

    fn count_errors(&self, pred: impl Fn(&ApiError) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, res)| res.as_ref().err().is_some_and(&pred))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ApiError)> {
        self.outcomes
            .iter()
            .filter_map(|(id, res)| res.as_ref().err().map(|err| (id.as_str(), err)))
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.succeeded() == self.total()
    }

    #[must_use]
    pub fn is_total_failure(&self) -> bool {
        self.total() > 0 && self.succeeded() == 0
    }
}

/// Ids in first-seen order, each once.
pub fn dedup(ids: &[String]) -> impl Iterator<Item = &str> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(String::as_str)
        .filter(move |id| seen.insert(*id))
}

impl fmt::Display for BulkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} {}",
            self.succeeded(),
            self.total(),
            self.action.past_tense()
        )?;
        let unavailable = self.unavailable();
        if unavailable > 0 {
            write!(f, "; {unavailable} unavailable")?;
        }
        let failed = self.failed();
        if failed > 0 {
            write!(f, "; {failed} failed")?;
        }
        Ok(())
    }
}
