//! Diesel table definitions, kept in sync with `migrations/`.

diesel::table! {
    users (id) {
        id -> Uuid,
        name -> Text,
        push_token -> Nullable<Text>,
        phone -> Nullable<Text>,
        email -> Nullable<Text>,
        prefers_push -> Bool,
        prefers_sms -> Bool,
        prefers_email -> Bool,
        guardian_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    reminders (id) {
        id -> Uuid,
        user_id -> Uuid,
        scheduled_start -> Nullable<Timestamptz>,
        scheduled_end -> Nullable<Timestamptz>,
        fire_time -> Timestamptz,
        snoozed_until -> Nullable<Timestamptz>,
        missed_at -> Nullable<Timestamptz>,
        repeat_kind -> Text,
        days_of_week -> Nullable<Array<Int2>>,
        days_of_month -> Nullable<Array<Int2>>,
        custom_interval -> Nullable<Int4>,
        custom_unit -> Nullable<Text>,
        status -> Text,
        notification_sent -> Bool,
        notification_count -> Int4,
        parent_notified -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    reminder_medicines (reminder_id, position) {
        reminder_id -> Uuid,
        position -> Int4,
        medicine_id -> Uuid,
        name -> Text,
        status -> Text,
        marked_by -> Nullable<Uuid>,
        marked_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    scheduled_jobs (id) {
        id -> Text,
        kind -> Text,
        reminder_id -> Uuid,
        fire_at -> Timestamptz,
        state -> Text,
        attempts -> Int4,
        max_attempts -> Int4,
        last_error -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(reminders -> users (user_id));
diesel::joinable!(reminder_medicines -> reminders (reminder_id));

diesel::allow_tables_to_appear_in_same_query!(users, reminders, reminder_medicines, scheduled_jobs);
