use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::{GraphqlError, WarningLevel};

/// Counters shared by every stage of one deploy invocation.
///
/// All counters are atomic so parallel workers can bump them through `&self`.
#[derive(Debug, Default)]
pub struct DeployStats {
    force: bool,
    dry_run: bool,
    warnings: [AtomicUsize; 4],
    build_errors: AtomicUsize,
    services_created: AtomicUsize,
    services_deleted: AtomicUsize,
    schemas_migrated: AtomicUsize,
    schemas_skipped_pending_create: AtomicUsize,
    connectors_before_schema: AtomicUsize,
    connectors_after_schema: AtomicUsize,
    connectors_deleted: AtomicUsize,
    abort_due_to_missing_billing: AtomicBool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningCounts {
    pub log_only: usize,
    pub interactive_ack: usize,
    pub require_ack: usize,
    pub require_force: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployStatsSnapshot {
    pub force: bool,
    pub dry_run: bool,
    pub warnings: WarningCounts,
    pub build_errors: usize,
    pub services_created: usize,
    pub services_deleted: usize,
    pub schemas_migrated: usize,
    pub schemas_skipped_pending_create: usize,
    pub connectors_before_schema: usize,
    pub connectors_after_schema: usize,
    pub connectors_deleted: usize,
    pub abort_due_to_missing_billing: bool,
}

fn bump(counter: &AtomicUsize, by: usize) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl DeployStats {
    #[must_use]
    pub fn new(force: bool, dry_run: bool) -> Self {
        Self {
            force,
            dry_run,
            ..Self::default()
        }
    }

    /// Count each error by level; errors without a level count as build errors.
    pub fn record_errors(&self, errors: &[GraphqlError]) {
        for error in errors {
            match error.warning_level() {
                Some(level) => bump(&self.warnings[level.index()], 1),
                None => bump(&self.build_errors, 1),
            }
        }
    }

    pub fn service_created(&self) {
        bump(&self.services_created, 1);
    }

    pub fn services_deleted(&self, count: usize) {
        bump(&self.services_deleted, count);
    }

    pub fn schema_migrated(&self) {
        bump(&self.schemas_migrated, 1);
    }

    pub fn schema_skipped_pending_create(&self) {
        bump(&self.schemas_skipped_pending_create, 1);
    }

    pub fn connector_before_schema(&self) {
        bump(&self.connectors_before_schema, 1);
    }

    pub fn connector_after_schema(&self) {
        bump(&self.connectors_after_schema, 1);
    }

    pub fn connectors_deleted(&self, count: usize) {
        bump(&self.connectors_deleted, count);
    }

    pub fn mark_missing_billing(&self) {
        self.abort_due_to_missing_billing
            .store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn warning_count(&self, level: WarningLevel) -> usize {
        self.warnings[level.index()].load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> DeployStatsSnapshot {
        let load = |counter: &AtomicUsize| counter.load(Ordering::Relaxed);
        DeployStatsSnapshot {
            force: self.force,
            dry_run: self.dry_run,
            warnings: WarningCounts {
                log_only: self.warning_count(WarningLevel::LogOnly),
                interactive_ack: self.warning_count(WarningLevel::InteractiveAck),
                require_ack: self.warning_count(WarningLevel::RequireAck),
                require_force: self.warning_count(WarningLevel::RequireForce),
            },
            build_errors: load(&self.build_errors),
            services_created: load(&self.services_created),
            services_deleted: load(&self.services_deleted),
            schemas_migrated: load(&self.schemas_migrated),
            schemas_skipped_pending_create: load(&self.schemas_skipped_pending_create),
            connectors_before_schema: load(&self.connectors_before_schema),
            connectors_after_schema: load(&self.connectors_after_schema),
            connectors_deleted: load(&self.connectors_deleted),
            abort_due_to_missing_billing: self.abort_due_to_missing_billing.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::DeployStats;
    use crate::{GraphqlError, WarningLevel};

    #[test]
    fn errors_are_counted_by_level() {
        let stats = DeployStats::new(false, true);
        stats.record_errors(&[
            GraphqlError::new("a").with_level(WarningLevel::RequireAck),
            GraphqlError::new("b").with_level(WarningLevel::RequireAck),
            GraphqlError::new("c"),
        ]);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.warnings.require_ack, 2);
        assert_eq!(snapshot.build_errors, 1);
        assert!(snapshot.dry_run);
    }

    #[test]
    fn counters_accept_concurrent_increments() {
        let stats = DeployStats::default();
        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| stats.connector_after_schema());
            }
        });
        assert_eq!(stats.snapshot().connectors_after_schema, 8);
    }
}
