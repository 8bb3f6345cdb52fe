//! Stress tests for ResDB.
//!
//! These runners drive concurrent commits against one database, both to
//! distinct resources and to a single contended one.

use crate::fixtures::{make_point, point};
use resdb_core::{CoreError, Database, FieldReader, Rid};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Commits that lost a race and were retried.
    pub conflicts: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, conflicts: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            conflicts,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Conflicts: {}", self.conflicts);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Commits performed by each thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Attempts per commit before a contended write counts as failed.
    pub max_retries: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
            max_retries: 1_000,
        }
    }
}

/// Increments `rid`'s `x` coordinate, retrying lost races.
///
/// Returns the number of conflicts seen, or `None` if every attempt lost.
fn increment_x(db: &Database, rid: Rid, max_retries: usize) -> Option<usize> {
    let mut conflicts = 0;
    for _ in 0..max_retries.max(1) {
        let Ok(mut writer) = db.write(rid) else {
            return None;
        };
        let x = writer.get_float(point::X).unwrap_or_default();
        writer.set_float(point::X, x + 1.0);
        match writer.commit(None) {
            Ok(_) => return Some(conflicts),
            Err(CoreError::CommitConflict { .. }) => conflicts += 1,
            Err(_) => return None,
        }
    }
    None
}

/// Each thread commits to its own `Point`.
///
/// Writers never share a resource, so no commit should conflict.
pub fn stress_distinct_writers(db: &Database, config: &StressConfig) -> (StressTestResult, Vec<Rid>) {
    let rids: Vec<Rid> = (0..config.threads).map(|_| make_point(db, 0.0, 0.0)).collect();
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let conflicts = AtomicUsize::new(0);

    let start = Instant::now();
    thread::scope(|s| {
        for &rid in &rids {
            let (successful, failed, conflicts) = (&successful, &failed, &conflicts);
            s.spawn(move || {
                for _ in 0..config.operations {
                    match increment_x(db, rid, config.max_retries) {
                        Some(lost) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                            conflicts.fetch_add(lost, Ordering::Relaxed);
                        }
                        None => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }
    });

    let result = StressTestResult::new(
        successful.into_inner(),
        failed.into_inner(),
        conflicts.into_inner(),
        start.elapsed(),
    );
    (result, rids)
}

/// Every thread increments the same `Point`, retrying lost races.
///
/// With retries no increment is lost, so the final `x` equals the number of
/// successful operations.
pub fn stress_shared_writer(db: &Database, config: &StressConfig) -> (StressTestResult, Rid) {
    let rid = make_point(db, 0.0, 0.0);
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let conflicts = AtomicUsize::new(0);

    let start = Instant::now();
    thread::scope(|s| {
        for _ in 0..config.threads {
            s.spawn(|| {
                for _ in 0..config.operations {
                    match increment_x(db, rid, config.max_retries) {
                        Some(lost) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                            conflicts.fetch_add(lost, Ordering::Relaxed);
                        }
                        None => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }
    });

    let result = StressTestResult::new(
        successful.into_inner(),
        failed.into_inner(),
        conflicts.into_inner(),
        start.elapsed(),
    );
    (result, rid)
}

/// Readers poll a `Point` while one writer keeps both coordinates equal.
///
/// A reader seeing `x != y` in one snapshot counts as a failed operation.
pub fn stress_readers_during_writes(db: &Database, config: &StressConfig) -> StressTestResult {
    let rid = make_point(db, 0.0, 0.0);
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    let start = Instant::now();
    thread::scope(|s| {
        s.spawn(|| {
            for i in 1..=config.operations {
                let Ok(mut writer) = db.write(rid) else {
                    return;
                };
                let value = i as f64;
                writer.set_float(point::X, value).set_float(point::Y, value);
                let _ = writer.commit(None);
            }
        });

        for _ in 0..config.threads.saturating_sub(1).max(1) {
            s.spawn(|| {
                for _ in 0..config.operations {
                    let Some(snapshot) = db.read(rid).snapshot() else {
                        continue;
                    };
                    let view = resdb_core::InstanceView::from(snapshot.as_ref());
                    if view.get_float(point::X) == view.get_float(point::Y) {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    StressTestResult::new(
        successful.into_inner(),
        failed.into_inner(),
        0,
        start.elapsed(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestDatabase;

    fn quick() -> StressConfig {
        StressConfig {
            operations: 200,
            threads: 4,
            max_retries: 10_000,
        }
    }

    #[test]
    fn test_distinct_writers() {
        let db = TestDatabase::new();
        let config = quick();
        let (result, rids) = stress_distinct_writers(&db, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.conflicts, 0);
        for rid in rids {
            assert_eq!(db.read(rid).get_float(point::X), Some(config.operations as f64));
            assert_eq!(db.version(rid), config.operations as u64 + 1);
        }
    }

    #[test]
    fn test_shared_writer() {
        let db = TestDatabase::new();
        let config = quick();
        let (result, rid) = stress_shared_writer(&db, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(
            db.read(rid).get_float(point::X),
            Some(result.successful_ops as f64)
        );
        assert_eq!(db.stats().commit_conflicts, result.conflicts as u64);
    }

    #[test]
    fn test_readers_see_whole_snapshots() {
        let db = TestDatabase::new();
        let result = stress_readers_during_writes(&db, &quick());
        assert_eq!(result.failed_ops, 0);
    }
}
