//! Integration tests for the decommission state machine.
//!
//! Every scenario runs against the in-memory directory in `common`, which
//! can be told to drop, fail or revert writes.

mod common;

use common::{incident, oncall, policy, schedule, FakeDirectory};
use roster::decommission::{DecommissionOptions, Decommissioner, OutcomeDetail, Stage};
use roster::error::{EntityKind, RosterError};
use roster::model::Target;

fn u(id: &str) -> Target {
    Target::identity(id)
}

/// U1 is on S1 with U2, targeted by P1 rule 0 with U3, and holds I1.
fn standard_roster() -> FakeDirectory {
    FakeDirectory::new()
        .with_identity("U1")
        .with_identity("U2")
        .with_identity("U3")
        .with_schedule(schedule("S1", &[&["U1", "U2"]]))
        .with_policy(policy(
            "P1",
            vec![vec![u("U1"), u("U3")], vec![Target::schedule("S1")]],
        ))
        .with_incident(incident("I1", "U1", Some("P1")))
        .with_oncall("U1", oncall("P1", Some("S1")))
        .with_oncall("U1", oncall("P1", None))
}

async fn decommission(
    directory: &FakeDirectory,
    options: DecommissionOptions,
) -> roster::DecommissionReport {
    Decommissioner::new(directory, options).run("U1").await
}

// =============================================================================
// Success path
// =============================================================================

#[tokio::test]
async fn test_end_to_end_backfills_hands_off_and_deletes() {
    let directory = standard_roster();

    let report = decommission(&directory, DecommissionOptions::default()).await;

    assert!(report.is_done(), "failure: {:?}", report.failure());
    assert_eq!(report.stage, Stage::Done);
    assert_eq!(
        directory.schedule("S1").layers[0].member_ids(),
        vec!["U2", "U2"]
    );
    assert_eq!(directory.policy("P1").rules[0].targets, vec![u("U3")]);
    assert_eq!(
        directory.policy("P1").rules[1].targets,
        vec![Target::schedule("S1")]
    );

    let handed_off = directory.incident("I1");
    assert_eq!(handed_off.assigned_policy_id.as_deref(), Some("P1"));
    assert_eq!(handed_off.assignee_identity_id, None);

    assert!(!directory.has_identity("U1"));
    assert_eq!(directory.state().delete_calls, 1);
    // one write per entity
    assert_eq!(directory.state().schedule_puts, 1);
    assert_eq!(directory.state().policy_puts, 1);
}

#[tokio::test]
async fn test_report_records_every_stage_in_order() {
    let directory = standard_roster();

    let report = decommission(&directory, DecommissionOptions::default()).await;

    let stages: Vec<Stage> = report.outcomes.iter().map(|o| o.stage).collect();
    let mut sorted = stages.clone();
    sorted.sort();
    assert_eq!(stages, sorted);

    assert!(report.at_stage(Stage::OverrideSchedules).any(|o| matches!(
        &o.detail,
        OutcomeDetail::LayerReplaced { layer: 0, replacement } if replacement == "U2"
    )));
    assert!(report.at_stage(Stage::OverridePolicies).any(|o| matches!(
        &o.detail,
        OutcomeDetail::RuleTargetRemoved { rule: 0, covered_by } if *covered_by == Target::identity("U3")
    )));
    assert!(report
        .at_stage(Stage::ReassignIncidents)
        .any(|o| o.id == "I1" && matches!(o.detail, OutcomeDetail::HandedOff { .. })));
    assert!(report
        .at_stage(Stage::Delete)
        .any(|o| matches!(o.detail, OutcomeDetail::Deleted)));
    assert_eq!(report.failures().count(), 0);
}

#[tokio::test]
async fn test_collect_follows_schedules_of_collected_policies() {
    // U1 is only reported as a direct target of P1, but also sits on S5
    // which P1 escalates to.
    let directory = FakeDirectory::new()
        .with_identity("U1")
        .with_schedule(schedule("S5", &[&["U1", "U4"]]))
        .with_policy(policy(
            "P1",
            vec![vec![u("U1"), u("U2")], vec![Target::schedule("S5")]],
        ))
        .with_oncall("U1", oncall("P1", None));

    let report = decommission(&directory, DecommissionOptions::default()).await;

    assert!(report.is_done());
    assert_eq!(
        directory.schedule("S5").layers[0].member_ids(),
        vec!["U4", "U4"]
    );
}

#[tokio::test]
async fn test_cross_layer_fallback() {
    let directory = FakeDirectory::new()
        .with_identity("U1")
        .with_schedule(schedule("S1", &[&["U1"], &["U8"]]))
        .with_oncall("U1", oncall("P9", Some("S1")))
        .with_policy(policy("P9", vec![vec![Target::schedule("S1")]]));

    let report = decommission(&directory, DecommissionOptions::default()).await;

    assert!(report.is_done());
    let layers = directory.schedule("S1").layers;
    assert_eq!(layers[0].member_ids(), vec!["U8"]);
    assert_eq!(layers[1].member_ids(), vec!["U8"]);
}

#[tokio::test]
async fn test_extra_avoid_is_never_picked() {
    let directory = FakeDirectory::new()
        .with_identity("U1")
        .with_schedule(schedule("S1", &[&["U1", "U2", "U3"]]))
        .with_oncall("U1", oncall("P9", Some("S1")))
        .with_policy(policy("P9", vec![vec![Target::schedule("S1")]]));
    let options = DecommissionOptions {
        extra_avoid: ["U2".to_string()].into_iter().collect(),
        ..DecommissionOptions::default()
    };

    let report = decommission(&directory, options).await;

    assert!(report.is_done());
    assert_eq!(
        directory.schedule("S1").layers[0].member_ids(),
        vec!["U3", "U2", "U3"]
    );
}

// =============================================================================
// Fail-closed gates
// =============================================================================

#[tokio::test]
async fn test_verification_catches_external_re_add() {
    let directory = standard_roster();
    directory.state().ignore_schedule_writes = true;

    let report = decommission(&directory, DecommissionOptions::default()).await;

    assert_eq!(report.stage, Stage::Aborted);
    assert_eq!(report.aborted_at, Some(Stage::VerifySchedules));
    assert!(matches!(
        report.failure(),
        Some(RosterError::VerificationFailed {
            entity: EntityKind::Schedule,
            id,
            ..
        }) if id == "S1"
    ));
    assert_eq!(directory.state().delete_calls, 0);
    assert!(directory.has_identity("U1"));
}

#[tokio::test]
async fn test_policy_verification_catches_external_re_add() {
    let directory = standard_roster();
    directory.state().ignore_policy_writes = true;

    let report = decommission(&directory, DecommissionOptions::default()).await;

    assert_eq!(report.aborted_at, Some(Stage::VerifyPolicies));
    assert!(matches!(
        report.failure(),
        Some(RosterError::VerificationFailed {
            entity: EntityKind::Policy,
            id,
            ..
        }) if id == "P1"
    ));
    // schedules were verified clean before the policy gate closed
    assert!(report
        .at_stage(Stage::VerifySchedules)
        .any(|o| o.id == "S1" && matches!(o.detail, OutcomeDetail::Clean)));
    assert_eq!(directory.state().delete_calls, 0);
    assert!(directory.has_identity("U1"));
}

#[tokio::test]
async fn test_verification_rescans_oncall() {
    // S7 only shows up in the on-call lookup after COLLECT
    let directory = standard_roster().with_schedule(schedule("S7", &[&["U1", "U5"]]));
    directory.state().late_oncall = vec![oncall("P1", Some("S7"))];

    let report = decommission(&directory, DecommissionOptions::default()).await;

    assert_eq!(report.aborted_at, Some(Stage::VerifySchedules));
    assert!(matches!(
        report.failure(),
        Some(RosterError::VerificationFailed {
            entity: EntityKind::Schedule,
            id,
            ..
        }) if id == "S7"
    ));
    assert_eq!(
        directory.schedule("S7").layers[0].member_ids(),
        vec!["U1", "U5"]
    );
    assert_eq!(directory.state().delete_calls, 0);
}

#[tokio::test]
async fn test_verification_read_error_fails_closed() {
    let directory = standard_roster();
    directory.state().schedule_reads_fail_after_write = true;

    let report = decommission(&directory, DecommissionOptions::default()).await;

    assert_eq!(report.aborted_at, Some(Stage::VerifySchedules));
    assert!(matches!(
        report.failure(),
        Some(RosterError::Api { status: 500, .. })
    ));
    assert_eq!(directory.state().delete_calls, 0);
    assert!(directory.has_identity("U1"));
}

#[tokio::test]
async fn test_no_safe_replacement_aborts_after_finishing_stage() {
    let directory = FakeDirectory::new()
        .with_identity("U1")
        .with_schedule(schedule("S1", &[&["U1"]]))
        .with_schedule(schedule("S2", &[&["U1", "U2"]]))
        .with_oncall("U1", oncall("P9", Some("S1")))
        .with_oncall("U1", oncall("P9", Some("S2")))
        .with_policy(policy("P9", vec![vec![Target::schedule("S1")]]));

    let report = decommission(&directory, DecommissionOptions::default()).await;

    assert_eq!(report.aborted_at, Some(Stage::OverrideSchedules));
    assert!(matches!(
        report.failure(),
        Some(RosterError::NoSafeReplacement { id, .. }) if id == "S1"
    ));
    assert_eq!(report.unsafe_slots(), vec![(EntityKind::Schedule, "S1")]);
    // the blocked schedule is left alone, the other one is still handled
    assert_eq!(directory.schedule("S1").layers[0].member_ids(), vec!["U1"]);
    assert_eq!(
        directory.schedule("S2").layers[0].member_ids(),
        vec!["U2", "U2"]
    );
    assert_eq!(directory.state().delete_calls, 0);
}

#[tokio::test]
async fn test_drop_coverage_removes_when_slot_stays_staffed() {
    // U7 leaves in the same batch, so it may stay but not take over
    let directory = FakeDirectory::new()
        .with_identity("U1")
        .with_schedule(schedule("S1", &[&["U1", "U7"]]))
        .with_oncall("U1", oncall("P9", Some("S1")))
        .with_policy(policy("P9", vec![vec![Target::schedule("S1")]]));
    let options = DecommissionOptions {
        drop_coverage: true,
        extra_avoid: ["U7".to_string()].into_iter().collect(),
    };

    let report = decommission(&directory, options).await;

    assert!(report.is_done());
    assert_eq!(directory.schedule("S1").layers[0].member_ids(), vec!["U7"]);
    assert!(report
        .outcomes
        .iter()
        .any(|o| matches!(o.detail, OutcomeDetail::LayerDropped { layer: 0 })));
}

#[tokio::test]
async fn test_drop_coverage_never_empties_a_rule() {
    let directory = FakeDirectory::new()
        .with_identity("U1")
        .with_policy(policy("P1", vec![vec![u("U1")]]))
        .with_oncall("U1", oncall("P1", None));
    let options = DecommissionOptions {
        drop_coverage: true,
        ..DecommissionOptions::default()
    };

    let report = decommission(&directory, options).await;

    assert_eq!(report.aborted_at, Some(Stage::OverridePolicies));
    assert_eq!(directory.policy("P1").rules[0].targets, vec![u("U1")]);
    assert_eq!(directory.state().policy_puts, 0);
}

#[tokio::test]
async fn test_incident_without_policy_blocks_delete() {
    let directory = standard_roster().with_incident(incident("I2", "U1", None));

    let report = decommission(&directory, DecommissionOptions::default()).await;

    assert_eq!(report.aborted_at, Some(Stage::VerifyIncidents));
    assert!(report.at_stage(Stage::ReassignIncidents).any(|o| matches!(
        o.error(),
        Some(RosterError::IncidentReassignmentFailed { incident_id, .. }) if incident_id == "I2"
    )));
    assert!(matches!(
        report.failure(),
        Some(RosterError::VerificationFailed { entity: EntityKind::Incident, id, .. }) if id == "I2"
    ));
    assert_eq!(directory.state().delete_calls, 0);
    // the incident that could be handed off still was
    assert_eq!(directory.incident("I1").assignee_identity_id, None);
}

#[tokio::test]
async fn test_platform_refusing_delete_aborts() {
    let directory = standard_roster();
    directory.state().refuse_delete = true;

    let report = decommission(&directory, DecommissionOptions::default()).await;

    assert_eq!(report.aborted_at, Some(Stage::Delete));
    assert!(matches!(
        report.failure(),
        Some(RosterError::DeleteConflict { .. })
    ));
    assert!(directory.has_identity("U1"));
}

// =============================================================================
// Write retry
// =============================================================================

#[tokio::test]
async fn test_failed_write_is_retried_once() {
    let directory = standard_roster();
    directory.state().failing_schedule_puts = 1;

    let report = decommission(&directory, DecommissionOptions::default()).await;

    assert!(report.is_done());
    assert_eq!(directory.state().schedule_puts, 2);
    assert_eq!(
        directory.schedule("S1").layers[0].member_ids(),
        vec!["U2", "U2"]
    );
}

#[tokio::test]
async fn test_second_write_failure_is_a_conflict() {
    let directory = standard_roster();
    directory.state().failing_policy_puts = 2;

    let report = decommission(&directory, DecommissionOptions::default()).await;

    assert_eq!(report.aborted_at, Some(Stage::OverridePolicies));
    assert!(matches!(
        report.failure(),
        Some(RosterError::RemoteWriteConflict {
            entity: EntityKind::Policy,
            id,
            ..
        }) if id == "P1"
    ));
    assert_eq!(directory.state().policy_puts, 2);
    assert_eq!(directory.state().delete_calls, 0);
}

#[tokio::test]
async fn test_missing_entity_is_skipped() {
    // on-call still reports a schedule that has since been deleted
    let directory = standard_roster().with_oncall("U1", oncall("P1", Some("S404")));

    let report = decommission(&directory, DecommissionOptions::default()).await;

    assert!(report.is_done());
    assert!(report
        .at_stage(Stage::OverrideSchedules)
        .any(|o| o.id == "S404" && o.error().is_some_and(RosterError::is_not_found)));
}
