//! Fully wired in-memory engine for end-to-end scenarios.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use dosewatch_core::clock::Clock;
use dosewatch_core::config::SchedulerConfig;
use dosewatch_core::store::{JobStore, NotificationDispatcher, ReminderStore, UserDirectory};
use dosewatch_core::types::UserContact;
use dosewatch_service::notify::Notifier;
use dosewatch_service::queue::JobQueue;
use dosewatch_service::queue::worker::{JobHandler, QueueWorker, WorkerConfig};
use dosewatch_service::scheduler::ReminderScheduler;

use crate::clock::ManualClock;
use crate::memory::{MemoryJobStore, MemoryReminderStore, MemoryUserDirectory, RecordingDispatcher};

/// Scheduler tuning used by the suites: 30 minute grace, 48 hour
/// horizon, 3 attempts with a 60 second retry base.
#[must_use]
pub fn test_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        grace_window_minutes: 30,
        prime_horizon_hours: 48,
        refresh_interval_hours: 24,
        safety_scan_interval_minutes: 60,
        poll_interval_secs: 1,
        batch_size: 32,
        max_attempts: 3,
        retry_base_secs: 60,
    }
}

pub struct TestEngine {
    pub clock: Arc<ManualClock>,
    pub reminders: Arc<MemoryReminderStore>,
    pub jobs: Arc<MemoryJobStore>,
    pub users: Arc<MemoryUserDirectory>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub queue: JobQueue,
    pub scheduler: Arc<ReminderScheduler>,
    worker: Arc<QueueWorker>,
}

impl TestEngine {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self::with_config(start, &test_scheduler_config())
    }

    #[must_use]
    pub fn with_config(start: DateTime<Utc>, config: &SchedulerConfig) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        let clock_dyn: Arc<dyn Clock> = Arc::clone(&clock) as Arc<dyn Clock>;

        let reminders = Arc::new(MemoryReminderStore::new(Arc::clone(&clock_dyn)));
        let jobs = Arc::new(MemoryJobStore::default());
        let users = Arc::new(MemoryUserDirectory::default());
        let dispatcher = Arc::new(RecordingDispatcher::default());

        let notifier = Notifier::new(
            Arc::clone(&dispatcher) as Arc<dyn NotificationDispatcher>,
            "UTC",
        )
        .expect("UTC is a valid display timezone");
        let queue = JobQueue::new(
            Arc::clone(&jobs) as Arc<dyn JobStore>,
            Arc::clone(&clock_dyn),
            config.max_attempts,
        );
        let scheduler = Arc::new(ReminderScheduler::new(
            Arc::clone(&reminders) as Arc<dyn ReminderStore>,
            Arc::clone(&users) as Arc<dyn UserDirectory>,
            notifier,
            queue.clone(),
            Arc::clone(&clock_dyn),
            config,
        ));
        let worker = Arc::new(QueueWorker::new(
            Arc::clone(&jobs) as Arc<dyn JobStore>,
            Arc::clone(&scheduler) as Arc<dyn JobHandler>,
            clock_dyn,
            WorkerConfig {
                poll_interval: config.poll_interval(),
                batch_size: config.batch_size,
                retry_base: config.retry_base(),
            },
        ));

        Self {
            clock,
            reminders,
            jobs,
            users,
            dispatcher,
            queue,
            scheduler,
            worker,
        }
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// One worker poll at the current clock instant.
    pub async fn run_due(&self) {
        self.worker.drain_due().await;
    }

    /// Advances the clock and drains whatever became due.
    pub async fn advance_minutes(&self, minutes: i64) {
        self.clock.advance(Duration::minutes(minutes));
        self.run_due().await;
    }

    /// Registers a push-reachable contact and returns its user id.
    pub fn add_user(&self, name: &str) -> Uuid {
        let user_id = Uuid::new_v4();
        self.users.add_contact(UserContact {
            user_id,
            name: name.to_owned(),
            push_token: Some(format!("token-{name}")),
            phone: None,
            email: None,
            prefers_push: true,
            prefers_sms: false,
            prefers_email: false,
        });
        user_id
    }

    /// Registers a guardian contact and links it to `user_id`.
    pub fn add_guardian(&self, user_id: Uuid, name: &str) -> Uuid {
        let guardian_id = self.add_user(name);
        self.users.link_guardian(user_id, guardian_id);
        guardian_id
    }
}
