use std::collections::BTreeSet;

/// What a tap on an entity means.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SelectionMode {
    /// A tap selects exactly that entity and proceeds immediately.
    #[default]
    Idle,
    /// Taps add to or remove from the selection until an explicit action.
    BulkActive,
}

/// Result of [`SelectionController::toggle`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SelectionChange {
    /// Idle mode: the single entity is ready for its action.
    Proceed,
    Added,
    Removed,
}

/// Selection state for one list (linking or unlinking).
#[derive(Clone, Debug, Default)]
pub struct SelectionController {
    mode: SelectionMode,
    selected: BTreeSet<String>,
}

impl SelectionController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn mode(&self) -> SelectionMode {
        self.mode
    }

    #[must_use]
    pub const fn is_bulk(&self) -> bool {
        matches!(self.mode, SelectionMode::BulkActive)
    }

    /// Enters bulk mode with an empty selection.
    pub fn enter_bulk_mode(&mut self) {
        self.mode = SelectionMode::BulkActive;
        self.selected.clear();
    }

    /// Leaves bulk mode, discarding the selection.
    pub fn exit_bulk_mode(&mut self) {
        self.mode = SelectionMode::Idle;
        self.selected.clear();
    }

    pub fn toggle(&mut self, entity_id: &str) -> SelectionChange {
        match self.mode {
            SelectionMode::Idle => {
                self.selected.clear();
                self.selected.insert(entity_id.to_string());
                SelectionChange::Proceed
            }
            SelectionMode::BulkActive => {
                if self.selected.remove(entity_id) {
                    SelectionChange::Removed
                } else {
                    self.selected.insert(entity_id.to_string());
                    SelectionChange::Added
                }
            }
        }
    }

    /// Replaces the selection with every given id. Only meaningful in bulk
    /// mode, which this enters.
    pub fn select_all<'a>(&mut self, entity_ids: impl IntoIterator<Item = &'a str>) {
        self.mode = SelectionMode::BulkActive;
        self.selected = entity_ids.into_iter().map(ToString::to_string).collect();
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    #[must_use]
    pub fn is_selected(&self, entity_id: &str) -> bool {
        self.selected.contains(entity_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.selected.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    #[must_use]
    pub fn selected(&self) -> Vec<String> {
        self.selected.iter().cloned().collect()
    }

    /// Drains the selection for an action. The mode is kept so the user can
    /// continue picking after a bulk operation.
    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.selected).into_iter().collect()
    }

    /// Drops ids that are no longer offered, e.g. after a poll.
    pub fn retain_known<'a>(&mut self, known: impl IntoIterator<Item = &'a str>) {
        let known: BTreeSet<&str> = known.into_iter().collect();
        self.selected.retain(|id| known.contains(id.as_str()));
    }
}

/// The two independent selections of the linking screen.
#[derive(Clone, Debug, Default)]
pub struct EntitySelections {
    pub linking: SelectionController,
    pub unlinking: SelectionController,
}

impl EntitySelections {
    pub fn reset(&mut self) {
        self.linking.exit_bulk_mode();
        self.unlinking.exit_bulk_mode();
    }
}
