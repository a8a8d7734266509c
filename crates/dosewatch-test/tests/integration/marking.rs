#![allow(clippy::expect_used, clippy::unwrap_used)]
//! Dose marking, aggregate recomputation and late corrections.

use chrono::Duration;
use uuid::Uuid;

use dosewatch_core::error::StoreError;
use dosewatch_core::types::{AggregateStatus, RepeatRule};
use dosewatch_service::error::ServiceError;
use dosewatch_test::TestEngine;

use crate::helpers::{create_reminder, start};

#[test_log::test(tokio::test)]
async fn aggregate_follows_item_marks() {
    let engine = TestEngine::new(start());
    let user = engine.add_user("dana");
    let occ = create_reminder(
        &engine,
        user,
        start() + Duration::minutes(30),
        RepeatRule::None,
        &["aspirin", "metformin"],
    )
    .await;

    let outcome = engine
        .scheduler
        .mark_taken(occ.id, 0, Some(user))
        .await
        .unwrap();
    assert_eq!(
        outcome.occurrence.status,
        AggregateStatus::PartiallyCompleted
    );
    assert!(!outcome.late_correction);
    assert_eq!(outcome.occurrence.medicines[0].marked_by, Some(user));
    assert!(outcome.occurrence.medicines[0].marked_at.is_some());

    let outcome = engine
        .scheduler
        .mark_taken(occ.id, 1, Some(user))
        .await
        .unwrap();
    assert_eq!(outcome.occurrence.status, AggregateStatus::Completed);
}

#[test_log::test(tokio::test)]
async fn a_missed_item_dominates_the_aggregate() {
    let engine = TestEngine::new(start());
    let user = engine.add_user("dana");
    let occ = create_reminder(
        &engine,
        user,
        start() + Duration::minutes(30),
        RepeatRule::None,
        &["aspirin", "metformin"],
    )
    .await;

    engine
        .scheduler
        .mark_taken(occ.id, 0, Some(user))
        .await
        .unwrap();
    let outcome = engine
        .scheduler
        .mark_missed(occ.id, 1, Some(user))
        .await
        .unwrap();
    assert_eq!(outcome.occurrence.status, AggregateStatus::Missed);
}

#[test_log::test(tokio::test)]
async fn out_of_range_index_is_a_validation_error() {
    let engine = TestEngine::new(start());
    let user = engine.add_user("dana");
    let occ = create_reminder(
        &engine,
        user,
        start() + Duration::minutes(30),
        RepeatRule::None,
        &["aspirin"],
    )
    .await;

    let result = engine.scheduler.mark_taken(occ.id, 5, Some(user)).await;
    assert!(matches!(result, Err(ServiceError::ValidationError(_))));

    // The occurrence is untouched.
    let stored = engine.reminders.get(occ.id).unwrap();
    assert_eq!(stored.status, AggregateStatus::Pending);
}

#[test_log::test(tokio::test)]
async fn marking_an_unknown_occurrence_is_not_found() {
    let engine = TestEngine::new(start());
    let user = engine.add_user("dana");

    let result = engine
        .scheduler
        .mark_taken(Uuid::new_v4(), 0, Some(user))
        .await;
    assert!(matches!(
        result,
        Err(ServiceError::StoreError(StoreError::NotFound { .. }))
    ));
}

#[test_log::test(tokio::test)]
async fn late_taken_mark_clears_the_missed_escalation() {
    let engine = TestEngine::new(start());
    let user = engine.add_user("dana");
    let guardian = engine.add_guardian(user, "sam");
    let occ = create_reminder(
        &engine,
        user,
        start() + Duration::minutes(10),
        RepeatRule::None,
        &["aspirin"],
    )
    .await;
    engine.scheduler.schedule_one(&occ).await.unwrap();
    engine.advance_minutes(11).await;
    engine.advance_minutes(31).await;

    let missed = engine.reminders.get(occ.id).unwrap();
    assert_eq!(missed.status, AggregateStatus::Missed);
    assert!(missed.missed_at.is_some());
    assert_eq!(engine.dispatcher.deliveries_for(guardian).len(), 1);

    let outcome = engine
        .scheduler
        .mark_taken(occ.id, 0, Some(user))
        .await
        .unwrap();
    assert!(outcome.late_correction);
    assert_eq!(outcome.occurrence.status, AggregateStatus::Completed);
    assert!(outcome.occurrence.missed_at.is_none());
}

#[test_log::test(tokio::test)]
async fn partial_late_mark_keeps_the_missed_state() {
    let engine = TestEngine::new(start());
    let user = engine.add_user("dana");
    let occ = create_reminder(
        &engine,
        user,
        start() + Duration::minutes(10),
        RepeatRule::None,
        &["aspirin", "metformin"],
    )
    .await;
    engine.scheduler.schedule_one(&occ).await.unwrap();
    engine.advance_minutes(11).await;
    engine.advance_minutes(31).await;

    // One of two force-missed items taken late: the aggregate is still
    // missed, so this is not a correction and missed_at stays.
    let outcome = engine
        .scheduler
        .mark_taken(occ.id, 0, Some(user))
        .await
        .unwrap();
    assert!(!outcome.late_correction);
    assert_eq!(outcome.occurrence.status, AggregateStatus::Missed);
    assert!(outcome.occurrence.missed_at.is_some());
}
