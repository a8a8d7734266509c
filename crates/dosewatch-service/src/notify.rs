//! Notification rendering and fan-out.
//!
//! Messages are rendered with times in a configured display timezone
//! while all stored instants stay UTC. Channels are attempted
//! independently per the recipient's stored preferences; a failed
//! channel is logged and never aborts the others.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use dosewatch_core::store::NotificationDispatcher;
use dosewatch_core::types::{ReminderOccurrence, UserContact};

use crate::error::{ServiceError, ServiceResult};

const DUE_SUBJECT: &str = "Medication reminder";
const MISSED_SUBJECT: &str = "Missed dose alert";

#[derive(Clone)]
pub struct Notifier {
    dispatcher: Arc<dyn NotificationDispatcher>,
    display_tz: Tz,
}

impl Notifier {
    /// ## Summary
    /// Builds a notifier rendering times in the named IANA timezone.
    ///
    /// ## Errors
    /// Returns an error when the timezone name is unknown.
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>, tz_name: &str) -> ServiceResult<Self> {
        let display_tz = tz_name.parse::<Tz>().map_err(|err| {
            ServiceError::InvalidConfiguration(format!("display timezone {tz_name}: {err}"))
        })?;
        Ok(Self {
            dispatcher,
            display_tz,
        })
    }

    fn local(&self, instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&self.display_tz)
            .format("%H:%M on %Y-%m-%d (%Z)")
            .to_string()
    }

    fn medicine_list(occurrence: &ReminderOccurrence) -> String {
        occurrence
            .medicines
            .iter()
            .map(|m| m.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Message for a reminder that just fired.
    #[must_use]
    pub fn render_due(&self, occurrence: &ReminderOccurrence) -> String {
        format!(
            "Time to take {}: scheduled for {}.",
            Self::medicine_list(occurrence),
            self.local(occurrence.fire_time),
        )
    }

    /// Message to a guardian about an escalated missed dose.
    #[must_use]
    pub fn render_missed(&self, occurrence: &ReminderOccurrence, patient_name: &str) -> String {
        format!(
            "{} missed their dose of {} scheduled for {}.",
            patient_name,
            Self::medicine_list(occurrence),
            self.local(occurrence.fire_time),
        )
    }

    /// ## Summary
    /// Sends `message` over every channel the contact prefers and has an
    /// address for. Returns true when at least one delivery was
    /// attempted, whether or not any transport reported success.
    #[tracing::instrument(skip(self, contact, message), fields(user_id = %contact.user_id))]
    pub async fn dispatch(&self, contact: &UserContact, subject: &str, message: &str) -> bool {
        let mut attempted = false;

        if contact.prefers_push && contact.push_token.is_some() {
            attempted = true;
            if !self.dispatcher.send_push(contact, message).await {
                tracing::warn!("push delivery failed");
            }
        }
        if contact.prefers_sms && contact.phone.is_some() {
            attempted = true;
            if !self.dispatcher.send_sms(contact, message).await {
                tracing::warn!("sms delivery failed");
            }
        }
        if contact.prefers_email && contact.email.is_some() {
            attempted = true;
            if !self.dispatcher.send_email(contact, subject, message).await {
                tracing::warn!("email delivery failed");
            }
        }

        if !attempted {
            tracing::debug!("no notification channel configured, nothing sent");
        }
        attempted
    }

    #[must_use]
    pub const fn due_subject() -> &'static str {
        DUE_SUBJECT
    }

    #[must_use]
    pub const fn missed_subject() -> &'static str {
        MISSED_SUBJECT
    }
}
