//! Models for the users table.
//!
//! User CRUD is owned by the external API layer; the core reads only the
//! notification channels and the guardian link.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use dosewatch_core::types::UserContact;

use crate::db::schema::users;

/// One user row.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub push_token: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub prefers_push: bool,
    pub prefers_sms: bool,
    pub prefers_email: bool,
    /// Linked guardian account receiving missed-dose escalations.
    pub guardian_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New user row for insertion (seeding and tests).
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub push_token: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub prefers_push: bool,
    pub prefers_sms: bool,
    pub prefers_email: bool,
    pub guardian_id: Option<Uuid>,
}

impl User {
    /// Converts the row into the directory contact view.
    #[must_use]
    pub fn into_contact(self) -> UserContact {
        UserContact {
            user_id: self.id,
            name: self.name,
            push_token: self.push_token,
            phone: self.phone,
            email: self.email,
            prefers_push: self.prefers_push,
            prefers_sms: self.prefers_sms,
            prefers_email: self.prefers_email,
        }
    }
}
