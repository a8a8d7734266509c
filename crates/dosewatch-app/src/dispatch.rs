//! Log-only notification transport.
//!
//! Concrete push/SMS/email providers plug in behind the dispatcher
//! contract; this stand-in records every delivery in the log so the
//! engine is fully operable without provider credentials.

use async_trait::async_trait;

use dosewatch_core::store::NotificationDispatcher;
use dosewatch_core::types::UserContact;

pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn send_push(&self, target: &UserContact, message: &str) -> bool {
        tracing::info!(user_id = %target.user_id, message, "push (log only)");
        true
    }

    async fn send_sms(&self, target: &UserContact, message: &str) -> bool {
        tracing::info!(user_id = %target.user_id, message, "sms (log only)");
        true
    }

    async fn send_email(&self, target: &UserContact, subject: &str, message: &str) -> bool {
        tracing::info!(user_id = %target.user_id, subject, message, "email (log only)");
        true
    }
}
