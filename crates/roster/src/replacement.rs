//! Substitute search for a departing identity.
//!
//! Removing someone from a slot without backfilling it silently drops
//! coverage, so every removal starts here. The search prefers a peer from the
//! same layer or rule and only then reaches outward to related layers.

use std::collections::BTreeSet;

use crate::model::{EscalationRule, Schedule, Target};

/// Identities that must never be picked as a substitute.
pub type AvoidSet = BTreeSet<String>;

/// Find a substitute.
///
/// Scans `candidates` in order and returns the first id not in `avoid`. If
/// there is none, scans each pool of `fallback_pools` in order and returns
/// the first qualifying id of the first pool that has one.
///
/// `None` means no safe substitute exists and the slot must be left to a
/// human.
pub fn find_replacement<'a, S: AsRef<str>>(
    candidates: &'a [S],
    avoid: &AvoidSet,
    fallback_pools: &[&'a [S]],
) -> Option<&'a str> {
    std::iter::once(candidates)
        .chain(fallback_pools.iter().copied())
        .find_map(|pool| first_allowed(pool, avoid))
}

fn first_allowed<'a, S: AsRef<str>>(pool: &'a [S], avoid: &AvoidSet) -> Option<&'a str> {
    pool.iter()
        .map(AsRef::as_ref)
        .find(|id| !avoid.contains(*id))
}

/// Substitute for a slot in `schedule.layers[layer_index]`.
///
/// Same-layer peers come first, then the previous layer, then the next one.
pub fn replacement_for_layer(
    schedule: &Schedule,
    layer_index: usize,
    avoid: &AvoidSet,
) -> Option<String> {
    let members = |index: usize| -> Vec<String> {
        schedule
            .layers
            .get(index)
            .map(|layer| layer.member_ids())
            .unwrap_or_default()
    };

    let candidates = members(layer_index);
    let previous = layer_index.checked_sub(1).map(&members).unwrap_or_default();
    let next = members(layer_index + 1);

    find_replacement(&candidates, avoid, &[previous.as_slice(), next.as_slice()])
        .map(str::to_string)
}

/// Substitute for an identity target in an escalation rule.
///
/// A rule's targets are self-contained: there is no fallback pool. Identity
/// targets are preferred; a schedule target of the same rule still covers
/// the slot when no identity qualifies.
pub fn replacement_for_rule(rule: &EscalationRule, avoid: &AvoidSet) -> Option<Target> {
    let identities = rule.identity_ids();
    if let Some(id) = find_replacement(&identities, avoid, &[]) {
        return Some(Target::identity(id));
    }
    rule.schedule_ids().next().map(Target::schedule)
}
