//! Status-driven TTL policy for the hot tier.

use svp_schemas::status;

use crate::env_parse;

/// Seconds-per-status-class table. Loaded from the environment so
/// retention can be tuned per deployment without a rebuild.
///
/// Terminal classes (completed / failed / published) must outlive the
/// in-flight classes; `ttl_for` is the only lookup path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TtlTable {
    pub pending_secs: u64,
    pub processing_secs: u64,
    pub completed_secs: u64,
    pub failed_secs: u64,
    pub published_secs: u64,
    pub default_secs: u64,
}

impl TtlTable {
    pub fn from_env() -> Self {
        Self {
            pending_secs: env_parse("SVP_TASK_TTL_PENDING_SECONDS", 3_600),
            processing_secs: env_parse("SVP_TASK_TTL_PROCESSING_SECONDS", 1_800),
            completed_secs: env_parse("SVP_TASK_TTL_COMPLETED_SECONDS", 86_400),
            failed_secs: env_parse("SVP_TASK_TTL_FAILED_SECONDS", 172_800),
            published_secs: env_parse("SVP_TASK_TTL_PUBLISHED_SECONDS", 604_800),
            default_secs: env_parse("SVP_DEFAULT_TTL_SECONDS", 3_600),
        }
    }

    /// TTL in seconds for a task in `task_status`. Unknown statuses get the
    /// default; they are not an error.
    pub fn ttl_for(&self, task_status: &str) -> u64 {
        if task_status == status::ACCEPTED {
            return self.pending_secs;
        }
        if task_status == status::COMPLETED {
            return self.completed_secs;
        }
        if task_status == status::PUBLISHED {
            return self.published_secs;
        }
        if status::FAILED.contains(&task_status) {
            return self.failed_secs;
        }
        if status::PROCESSING.contains(&task_status) {
            return self.processing_secs;
        }
        self.default_secs
    }
}

impl Default for TtlTable {
    fn default() -> Self {
        Self {
            pending_secs: 3_600,
            processing_secs: 1_800,
            completed_secs: 86_400,
            failed_secs: 172_800,
            published_secs: 604_800,
            default_secs: 3_600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_known_status_resolves_off_the_default() {
        let table = TtlTable::default();

        assert_eq!(table.ttl_for(status::ACCEPTED), table.pending_secs);
        assert_eq!(table.ttl_for(status::COMPLETED), table.completed_secs);
        assert_eq!(table.ttl_for(status::PUBLISHED), table.published_secs);
        assert_eq!(table.ttl_for(status::ERROR), table.failed_secs);
        assert_eq!(
            table.ttl_for(status::FAILED_SAVING_SCHEMA),
            table.failed_secs
        );
        assert_eq!(
            table.ttl_for(status::VALIDATING_FILE),
            table.processing_secs
        );
    }

    #[test]
    fn unknown_status_gets_default_ttl() {
        let table = TtlTable::default();
        assert_eq!(table.ttl_for("made-up-status"), table.default_secs);
    }

    #[test]
    fn terminal_statuses_outlive_processing_statuses() {
        let table = TtlTable::default();
        for terminal in [status::COMPLETED, status::PUBLISHED, status::ERROR] {
            for processing in status::PROCESSING {
                assert!(
                    table.ttl_for(terminal) > table.ttl_for(processing),
                    "{terminal} must outlive {processing}"
                );
            }
        }
    }
}
