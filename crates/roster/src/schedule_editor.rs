//! In-memory edits of schedule layer membership.
//!
//! Nothing here performs I/O. Callers read a [`Schedule`] snapshot, edit it
//! through [`ScheduleEdit`] and persist the result themselves.

use crate::model::{Schedule, ScheduleLayer};

/// Point every assignment of `departing_id` at `replacement`.
///
/// Assignment windows are preserved. Returns whether anything changed.
pub fn replace_in_layer(layer: &mut ScheduleLayer, departing_id: &str, replacement: &str) -> bool {
    if departing_id == replacement {
        return false;
    }

    let mut changed = false;
    for assignment in &mut layer.assignments {
        if assignment.identity_id == departing_id {
            replacement.clone_into(&mut assignment.identity_id);
            changed = true;
        }
    }
    changed
}

/// Drop every assignment of `departing_id`.
///
/// Only for the explicit "drop coverage" path, when no substitute exists.
pub fn remove_from_layer(layer: &mut ScheduleLayer, departing_id: &str) -> bool {
    let before = layer.assignments.len();
    layer.assignments.retain(|a| a.identity_id != departing_id);
    layer.assignments.len() != before
}

/// Pending edit of a schedule snapshot.
#[derive(Debug, Clone)]
pub struct ScheduleEdit {
    draft: Schedule,
    changed: bool,
}

impl ScheduleEdit {
    /// Start editing a copy of `snapshot`.
    #[must_use]
    pub fn new(snapshot: &Schedule) -> Self {
        Self {
            draft: snapshot.clone(),
            changed: false,
        }
    }

    /// [`replace_in_layer`] on layer `layer_index`. Out-of-range is a no-op.
    pub fn replace_in_layer(
        &mut self,
        layer_index: usize,
        departing_id: &str,
        replacement: &str,
    ) -> bool {
        let changed = self
            .draft
            .layers
            .get_mut(layer_index)
            .is_some_and(|layer| replace_in_layer(layer, departing_id, replacement));
        self.changed |= changed;
        changed
    }

    /// [`remove_from_layer`] on layer `layer_index`. Out-of-range is a no-op.
    pub fn remove_from_layer(&mut self, layer_index: usize, departing_id: &str) -> bool {
        let changed = self
            .draft
            .layers
            .get_mut(layer_index)
            .is_some_and(|layer| remove_from_layer(layer, departing_id));
        self.changed |= changed;
        changed
    }

    /// The edited schedule, or `None` when nothing changed.
    #[must_use]
    pub fn finish(self) -> Option<Schedule> {
        self.changed.then_some(self.draft)
    }
}
