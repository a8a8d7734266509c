#![allow(clippy::expect_used, clippy::unwrap_used)]
//! Priming, firing, snoozing and recurrence end to end.

use chrono::Duration;

use dosewatch_core::constants::{fire_job_id, missed_check_job_id};
use dosewatch_core::store::{JobState, ReminderStore};
use dosewatch_core::types::{AggregateStatus, RepeatRule};
use dosewatch_test::TestEngine;

use crate::helpers::{create_bounded_reminder, create_reminder, start};

#[test_log::test(tokio::test)]
async fn no_premature_fire_before_the_scheduled_instant() {
    let engine = TestEngine::new(start());
    let user = engine.add_user("dana");
    let occ = create_reminder(
        &engine,
        user,
        start() + Duration::minutes(60),
        RepeatRule::None,
        &["aspirin"],
    )
    .await;

    assert!(engine.scheduler.schedule_one(&occ).await.unwrap());
    engine.run_due().await;
    assert!(engine.dispatcher.deliveries().is_empty());

    engine.advance_minutes(59).await;
    assert!(engine.dispatcher.deliveries().is_empty());

    engine.advance_minutes(2).await;
    assert_eq!(engine.dispatcher.deliveries_for(user).len(), 1);

    let stored = engine.reminders.get(occ.id).unwrap();
    assert!(stored.notification_sent);
    assert_eq!(stored.notification_count, 1);

    let fire_job = engine.jobs.job(&fire_job_id(occ.id)).unwrap();
    assert_eq!(fire_job.state, JobState::Done);
    let check_job = engine.jobs.job(&missed_check_job_id(occ.id)).unwrap();
    assert_eq!(check_job.state, JobState::Pending);
}

#[test_log::test(tokio::test)]
async fn rescheduling_is_idempotent() {
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

    assert!(engine.scheduler.schedule_one(&occ).await.unwrap());
    assert!(engine.scheduler.schedule_one(&occ).await.unwrap());
    assert_eq!(engine.jobs.all().len(), 1);

    engine.advance_minutes(31).await;
    assert_eq!(engine.dispatcher.deliveries_for(user).len(), 1);
}

#[test_log::test(tokio::test)]
async fn stale_fire_times_are_skipped_not_replayed() {
    let engine = TestEngine::new(start());
    let user = engine.add_user("dana");
    let occ = create_reminder(
        &engine,
        user,
        start() - Duration::minutes(10),
        RepeatRule::None,
        &["aspirin"],
    )
    .await;

    assert!(!engine.scheduler.schedule_one(&occ).await.unwrap());
    assert!(engine.jobs.all().is_empty());

    engine.advance_minutes(5).await;
    assert!(engine.dispatcher.deliveries().is_empty());
}

#[test_log::test(tokio::test)]
async fn initialize_primes_only_the_horizon() {
    let engine = TestEngine::new(start());
    let user = engine.add_user("dana");
    let near = create_reminder(
        &engine,
        user,
        start() + Duration::hours(1),
        RepeatRule::None,
        &["aspirin"],
    )
    .await;
    // Beyond the 48 hour priming horizon; a later pass picks it up.
    create_reminder(
        &engine,
        user,
        start() + Duration::hours(72),
        RepeatRule::None,
        &["metformin"],
    )
    .await;

    let primed = engine.scheduler.initialize().await.unwrap();
    assert_eq!(primed, 1);
    assert!(engine.jobs.job(&fire_job_id(near.id)).is_some());
    assert_eq!(engine.jobs.all().len(), 1);
}

#[test_log::test(tokio::test)]
async fn actioned_occurrences_are_not_rescheduled() {
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

    engine
        .scheduler
        .mark_taken(occ.id, 0, Some(user))
        .await
        .unwrap();

    let reloaded = engine.reminders.get(occ.id).unwrap();
    assert_eq!(reloaded.status, AggregateStatus::Completed);
    assert!(!engine.scheduler.schedule_one(&reloaded).await.unwrap());
    assert!(engine.jobs.all().is_empty());
}

#[test_log::test(tokio::test)]
async fn snooze_moves_the_single_fire_job() {
    let engine = TestEngine::new(start());
    let user = engine.add_user("dana");
    let occ = create_reminder(
        &engine,
        user,
        start() + Duration::minutes(5),
        RepeatRule::None,
        &["aspirin"],
    )
    .await;
    engine.scheduler.schedule_one(&occ).await.unwrap();

    let snoozed = engine.scheduler.snooze(occ.id, 15).await.unwrap();
    assert_eq!(snoozed.status, AggregateStatus::Snoozed);
    assert_eq!(snoozed.snoozed_until, Some(start() + Duration::minutes(15)));

    // Still exactly one fire job, re-armed at the snooze instant.
    let fire_jobs: Vec<_> = engine
        .jobs
        .all()
        .into_iter()
        .filter(|j| j.id == fire_job_id(occ.id))
        .collect();
    assert_eq!(fire_jobs.len(), 1);
    assert_eq!(fire_jobs[0].state, JobState::Pending);
    assert_eq!(fire_jobs[0].fire_at, start() + Duration::minutes(15));

    // The original instant passes quietly; the snoozed one fires.
    engine.advance_minutes(6).await;
    assert!(engine.dispatcher.deliveries().is_empty());
    engine.advance_minutes(10).await;
    assert_eq!(engine.dispatcher.deliveries_for(user).len(), 1);
}

#[test_log::test(tokio::test)]
async fn negative_snooze_is_rejected() {
    let engine = TestEngine::new(start());
    let user = engine.add_user("dana");
    let occ = create_reminder(
        &engine,
        user,
        start() + Duration::minutes(5),
        RepeatRule::None,
        &["aspirin"],
    )
    .await;

    let result = engine.scheduler.snooze(occ.id, -5).await;
    assert!(matches!(
        result,
        Err(dosewatch_service::error::ServiceError::ValidationError(_))
    ));
}

#[test_log::test(tokio::test)]
async fn firing_a_recurring_reminder_materializes_the_next_occurrence() {
    let engine = TestEngine::new(start());
    let user = engine.add_user("dana");
    let occ = create_reminder(
        &engine,
        user,
        start() + Duration::minutes(10),
        RepeatRule::Daily,
        &["aspirin"],
    )
    .await;
    engine.scheduler.schedule_one(&occ).await.unwrap();

    engine.advance_minutes(11).await;

    let all = engine.reminders.for_user(user);
    assert_eq!(all.len(), 2);
    let next = &all[1];
    assert_eq!(next.fire_time, occ.fire_time + Duration::days(1));
    assert_eq!(next.status, AggregateStatus::Pending);
    assert_eq!(next.repeat, RepeatRule::Daily);
    assert!(!next.parent_notified);
    assert_eq!(next.notification_count, 0);

    let next_job = engine.jobs.job(&fire_job_id(next.id)).unwrap();
    assert_eq!(next_job.state, JobState::Pending);
    assert_eq!(next_job.fire_at, next.fire_time);
}

#[test_log::test(tokio::test)]
async fn redelivered_fire_does_not_fork_the_series() {
    let engine = TestEngine::new(start());
    let user = engine.add_user("dana");
    let occ = create_reminder(
        &engine,
        user,
        start() + Duration::minutes(10),
        RepeatRule::Daily,
        &["aspirin"],
    )
    .await;
    engine.scheduler.schedule_one(&occ).await.unwrap();

    engine.advance_minutes(11).await;
    assert_eq!(engine.reminders.for_user(user).len(), 2);

    // At-least-once delivery: the handler can run again for the same
    // job, and must land on the occurrence it already materialized.
    engine.scheduler.on_fire(occ.id).await.unwrap();
    assert_eq!(engine.reminders.for_user(user).len(), 2);
}

#[test_log::test(tokio::test)]
async fn an_elapsed_snooze_falls_back_to_the_base_fire_time() {
    let engine = TestEngine::new(start());
    let user = engine.add_user("dana");
    let occ = create_reminder(
        &engine,
        user,
        start() + Duration::minutes(60),
        RepeatRule::None,
        &["aspirin"],
    )
    .await;
    // A snooze that already ran out before the priming window opened.
    engine
        .reminders
        .set_snoozed(occ.id, start() - Duration::minutes(5))
        .await
        .unwrap();

    let primed = engine.scheduler.initialize().await.unwrap();
    assert_eq!(primed, 1);
    let job = engine.jobs.job(&fire_job_id(occ.id)).unwrap();
    assert_eq!(job.fire_at, occ.fire_time);
}

#[test_log::test(tokio::test)]
async fn recurring_series_ends_at_scheduled_end() {
    let engine = TestEngine::new(start());
    let user = engine.add_user("dana");
    let fire = start() + Duration::minutes(10);
    let occ = create_bounded_reminder(
        &engine,
        user,
        fire,
        Some(fire + Duration::hours(1)),
        RepeatRule::Daily,
        &["aspirin"],
    )
    .await;
    engine.scheduler.schedule_one(&occ).await.unwrap();

    engine.advance_minutes(11).await;

    // Fired, but the next daily instant exceeds the series bound.
    assert_eq!(engine.dispatcher.deliveries_for(user).len(), 1);
    assert_eq!(engine.reminders.for_user(user).len(), 1);
}
