//! Job-id and scheduling constants shared across crates.
//!
//! Queue jobs are keyed by deterministic ids derived from the reminder id,
//! so cancellation and idempotent re-scheduling work against the durable
//! queue table without any in-memory bookkeeping.

use uuid::Uuid;

/// Prefix for every reminder-derived job id.
pub const JOB_ID_PREFIX: &str = "reminder:";

pub const MISSED_CHECK_COMPONENT: &str = "missed-check";
pub const MISSED_CHECK_SUFFIX: &str = const_str::concat!(":", MISSED_CHECK_COMPONENT);

/// Deterministic id of the fire job for an occurrence.
#[must_use]
pub fn fire_job_id(occurrence_id: Uuid) -> String {
    format!("{JOB_ID_PREFIX}{occurrence_id}")
}

/// Deterministic id of the missed-check job for an occurrence.
#[must_use]
pub fn missed_check_job_id(occurrence_id: Uuid) -> String {
    format!("{JOB_ID_PREFIX}{occurrence_id}{MISSED_CHECK_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_deterministic_and_distinct() {
        let id = Uuid::nil();
        assert_eq!(
            fire_job_id(id),
            "reminder:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            missed_check_job_id(id),
            "reminder:00000000-0000-0000-0000-000000000000:missed-check"
        );
        assert_ne!(fire_job_id(id), missed_check_job_id(id));
    }
}
