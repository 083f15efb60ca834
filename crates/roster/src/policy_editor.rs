//! In-memory edits of escalation rule targets.
//!
//! Rule order is never touched; only the targets inside a rule change. Edits
//! go through [`PolicyEdit`] so several of them can be batched into a single
//! write per policy.

use crate::error::RosterError;
use crate::model::{EscalationPolicy, EscalationRule, Target};

/// Add `target` to the rule unless it is already present.
///
/// New targets are appended. Returns `false` when the target was already
/// there.
pub fn add_target(rule: &mut EscalationRule, target: Target) -> bool {
    if rule.targets.contains(&target) {
        return false;
    }
    rule.targets.push(target);
    true
}

/// Remove every identity target with `identity_id`.
pub fn remove_target(rule: &mut EscalationRule, identity_id: &str) -> bool {
    let before = rule.targets.len();
    rule.targets.retain(|t| !t.is_identity(identity_id));
    rule.targets.len() != before
}

/// Swap the departing identity for `replacement`, keeping its position.
///
/// If `replacement` is already a target of the rule the departing entry is
/// only removed, so the rule never holds the same target twice.
pub fn replace_target(rule: &mut EscalationRule, departing_id: &str, replacement: Target) -> bool {
    if replacement.is_identity(departing_id) || !rule.references(departing_id) {
        return false;
    }
    if rule.targets.contains(&replacement) {
        return remove_target(rule, departing_id);
    }

    let mut swapped = false;
    rule.targets.retain_mut(|t| {
        if !t.is_identity(departing_id) {
            return true;
        }
        if swapped {
            return false;
        }
        *t = replacement.clone();
        swapped = true;
        true
    });
    true
}

/// Pending edit of an escalation policy snapshot.
#[derive(Debug, Clone)]
pub struct PolicyEdit {
    draft: EscalationPolicy,
    changed: bool,
}

impl PolicyEdit {
    /// Start editing a copy of `snapshot`.
    #[must_use]
    pub fn new(snapshot: &EscalationPolicy) -> Self {
        Self {
            draft: snapshot.clone(),
            changed: false,
        }
    }

    /// Add `target` to the rule at `rule_index`.
    ///
    /// The index is chosen by the caller; there is no implicit placement.
    pub fn add_target_at(&mut self, rule_index: usize, target: Target) -> Result<bool, RosterError> {
        let rule_count = self.draft.rules.len();
        let rule = self
            .draft
            .rules
            .get_mut(rule_index)
            .ok_or_else(|| RosterError::RuleIndexOutOfRange {
                policy_id: self.draft.id.clone(),
                index: rule_index,
                rule_count,
            })?;

        let changed = add_target(rule, target);
        self.changed |= changed;
        Ok(changed)
    }

    /// [`remove_target`] on one rule. Out-of-range is a no-op.
    pub fn remove_target(&mut self, rule_index: usize, identity_id: &str) -> bool {
        let changed = self
            .draft
            .rules
            .get_mut(rule_index)
            .is_some_and(|rule| remove_target(rule, identity_id));
        self.changed |= changed;
        changed
    }

    /// [`replace_target`] on one rule. Out-of-range is a no-op.
    pub fn replace_target(
        &mut self,
        rule_index: usize,
        departing_id: &str,
        replacement: Target,
    ) -> bool {
        let changed = self
            .draft
            .rules
            .get_mut(rule_index)
            .is_some_and(|rule| replace_target(rule, departing_id, replacement));
        self.changed |= changed;
        changed
    }

    /// The edited policy, or `None` when nothing changed.
    #[must_use]
    pub fn finish(self) -> Option<EscalationPolicy> {
        self.changed.then_some(self.draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn rule(targets: Vec<Target>) -> EscalationRule {
        EscalationRule {
            id: Some("R0".into()),
            delay_minutes: 30,
            targets,
        }
    }

    fn policy() -> EscalationPolicy {
        EscalationPolicy {
            id: "P1".into(),
            name: "Primary".into(),
            rules: vec![
                rule(vec![Target::identity("U1"), Target::identity("U3")]),
                rule(vec![Target::schedule("S1")]),
            ],
            attributes: Map::new(),
        }
    }

    #[test]
    fn test_add_target_is_idempotent() {
        let mut r = rule(vec![]);
        assert!(add_target(&mut r, Target::identity("U9")));
        assert!(!add_target(&mut r, Target::identity("U9")));
        assert_eq!(r.targets, vec![Target::identity("U9")]);
    }

    #[test]
    fn test_add_target_distinguishes_kinds() {
        let mut r = rule(vec![Target::schedule("X1")]);
        assert!(add_target(&mut r, Target::identity("X1")));
        assert_eq!(r.targets.len(), 2);
    }

    #[test]
    fn test_remove_target_removes_all_matches() {
        let mut r = rule(vec![
            Target::identity("U1"),
            Target::schedule("U1"),
            Target::identity("U2"),
            Target::identity("U1"),
        ]);
        assert!(remove_target(&mut r, "U1"));
        assert_eq!(
            r.targets,
            vec![Target::schedule("U1"), Target::identity("U2")]
        );
        assert!(!remove_target(&mut r, "U1"));
    }

    #[test]
    fn test_replace_target_keeps_position() {
        let mut r = rule(vec![
            Target::identity("U2"),
            Target::identity("U1"),
            Target::schedule("S1"),
        ]);
        assert!(replace_target(&mut r, "U1", Target::identity("U5")));
        assert_eq!(
            r.targets,
            vec![
                Target::identity("U2"),
                Target::identity("U5"),
                Target::schedule("S1")
            ]
        );
    }

    #[test]
    fn test_replace_with_existing_target_only_removes() {
        let mut r = rule(vec![Target::identity("U1"), Target::identity("U3")]);
        assert!(replace_target(&mut r, "U1", Target::identity("U3")));
        assert_eq!(r.targets, vec![Target::identity("U3")]);
    }

    #[test]
    fn test_replace_with_itself_is_noop() {
        let mut r = rule(vec![Target::identity("U1"), Target::identity("U3")]);
        assert!(!replace_target(&mut r, "U1", Target::identity("U1")));
        assert_eq!(
            r.targets,
            vec![Target::identity("U1"), Target::identity("U3")]
        );
    }

    #[test]
    fn test_replace_missing_departing_is_noop() {
        let mut r = rule(vec![Target::identity("U3")]);
        assert!(!replace_target(&mut r, "U1", Target::identity("U4")));
        assert_eq!(r.targets, vec![Target::identity("U3")]);
    }

    #[test]
    fn test_add_target_at_explicit_index() {
        let snapshot = policy();
        let mut edit = PolicyEdit::new(&snapshot);

        assert!(edit.add_target_at(1, Target::identity("U9")).unwrap());
        assert!(!edit.add_target_at(1, Target::identity("U9")).unwrap());

        let err = edit.add_target_at(2, Target::identity("U9")).unwrap_err();
        assert!(matches!(
            err,
            RosterError::RuleIndexOutOfRange {
                index: 2,
                rule_count: 2,
                ..
            }
        ));

        let edited = edit.finish().unwrap();
        assert_eq!(
            edited.rules[1].targets,
            vec![Target::schedule("S1"), Target::identity("U9")]
        );
        assert_eq!(edited.rules[0], snapshot.rules[0]);
    }

    #[test]
    fn test_policy_edit_unchanged_yields_none() {
        let snapshot = policy();
        let mut edit = PolicyEdit::new(&snapshot);
        assert!(!edit.remove_target(0, "U7"));
        assert!(!edit.remove_target(5, "U1"));
        assert!(edit.finish().is_none());
    }
}
