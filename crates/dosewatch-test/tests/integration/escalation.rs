#![allow(clippy::expect_used, clippy::unwrap_used)]
//! Missed-dose escalation after the grace window.

use chrono::Duration;

use dosewatch_core::types::{AggregateStatus, DoseStatus, RepeatRule};
use dosewatch_test::TestEngine;

use crate::helpers::{create_reminder, start};

#[test_log::test(tokio::test)]
async fn unactioned_reminder_escalates_and_notifies_guardian_once() {
    let engine = TestEngine::new(start());
    let user = engine.add_user("dana");
    let guardian = engine.add_guardian(user, "sam");
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
    assert_eq!(engine.dispatcher.deliveries_for(user).len(), 1);
    assert!(engine.dispatcher.deliveries_for(guardian).is_empty());

    // Let the 30 minute grace window elapse untouched.
    engine.advance_minutes(31).await;

    let escalated = engine.reminders.get(occ.id).unwrap();
    assert_eq!(escalated.status, AggregateStatus::Missed);
    assert!(escalated.missed_at.is_some());
    assert!(escalated.parent_notified);
    assert!(
        escalated
            .medicines
            .iter()
            .all(|m| m.status == DoseStatus::Missed)
    );

    let alerts = engine.dispatcher.deliveries_for(guardian);
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].message.contains("dana missed"), "{}", alerts[0].message);

    // At-least-once delivery: a redelivered check must not re-notify.
    engine.scheduler.on_missed_check(occ.id).await.unwrap();
    assert_eq!(engine.dispatcher.deliveries_for(guardian).len(), 1);
}

#[test_log::test(tokio::test)]
async fn dose_taken_within_grace_prevents_escalation() {
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

    engine
        .scheduler
        .mark_taken(occ.id, 0, Some(user))
        .await
        .unwrap();

    engine.advance_minutes(31).await;

    let stored = engine.reminders.get(occ.id).unwrap();
    assert_eq!(stored.status, AggregateStatus::Completed);
    assert!(stored.missed_at.is_none());
    assert!(!stored.parent_notified);
    assert!(engine.dispatcher.deliveries_for(guardian).is_empty());
}

#[test_log::test(tokio::test)]
async fn snoozed_reminder_is_not_escalated() {
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

    engine.scheduler.snooze(occ.id, 60).await.unwrap();

    // The original missed-check comes due while the reminder is snoozed.
    engine.advance_minutes(35).await;

    let stored = engine.reminders.get(occ.id).unwrap();
    assert_ne!(stored.status, AggregateStatus::Missed);
    assert!(stored.missed_at.is_none());
    assert!(engine.dispatcher.deliveries_for(guardian).is_empty());
}

#[test_log::test(tokio::test)]
async fn snoozed_then_fired_reminder_escalates_after_grace() {
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

    engine.scheduler.snooze(occ.id, 15).await.unwrap();

    // The snoozed fire comes due and re-arms the occurrence.
    engine.advance_minutes(15).await;
    let fired = engine.reminders.get(occ.id).unwrap();
    assert_eq!(fired.status, AggregateStatus::Pending);
    assert!(fired.snoozed_until.is_none());
    assert_eq!(engine.dispatcher.deliveries_for(user).len(), 2);

    // A full grace window elapses with no action taken.
    engine.advance_minutes(31).await;

    let escalated = engine.reminders.get(occ.id).unwrap();
    assert_eq!(escalated.status, AggregateStatus::Missed);
    assert!(escalated.missed_at.is_some());
    assert_eq!(engine.dispatcher.deliveries_for(guardian).len(), 1);
}

#[test_log::test(tokio::test)]
async fn escalation_without_guardian_still_marks_missed() {
    let engine = TestEngine::new(start());
    let user = engine.add_user("dana");
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

    let stored = engine.reminders.get(occ.id).unwrap();
    assert_eq!(stored.status, AggregateStatus::Missed);
    assert!(!stored.parent_notified);
    // Only the original reminder delivery exists.
    assert_eq!(engine.dispatcher.deliveries().len(), 1);
}

#[test_log::test(tokio::test)]
async fn guardian_delivery_failure_does_not_block_the_missed_write() {
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

    engine.dispatcher.fail_deliveries(true);
    engine.advance_minutes(31).await;

    let stored = engine.reminders.get(occ.id).unwrap();
    assert_eq!(stored.status, AggregateStatus::Missed);
    // Delivery is best effort; the claim is consumed either way.
    assert!(stored.parent_notified);
    assert_eq!(engine.dispatcher.deliveries_for(guardian).len(), 1);
}
