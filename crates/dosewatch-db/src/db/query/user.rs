//! Query composition for `users`.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::db::connection::DbConnection;
use crate::db::schema::users;
use crate::model::user::{NewUser, User};

/// ## Summary
/// Loads one user row.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn find(conn: &mut DbConnection<'_>, id: Uuid) -> QueryResult<Option<User>> {
    users::table
        .find(id)
        .select(User::as_select())
        .first(conn)
        .await
        .optional()
}

/// ## Summary
/// Loads the guardian row linked to a user, if any.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn guardian_of(conn: &mut DbConnection<'_>, user_id: Uuid) -> QueryResult<Option<User>> {
    let Some(user) = find(conn, user_id).await? else {
        return Ok(None);
    };
    let Some(guardian_id) = user.guardian_id else {
        return Ok(None);
    };
    find(conn, guardian_id).await
}

/// ## Summary
/// Inserts a user row (seeding and tests).
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn insert(conn: &mut DbConnection<'_>, user: &NewUser) -> QueryResult<()> {
    diesel::insert_into(users::table)
        .values(user)
        .execute(conn)
        .await?;
    Ok(())
}
