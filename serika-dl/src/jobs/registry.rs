//! In-memory job registry.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use tracing::debug;

use super::model::{DownloadMode, Job, JobId, JobPatch};

/// Process-wide mapping from job id to its progress record.
///
/// Every mutation is keyed by id and applied under the entry lock, so
/// concurrent updates from the stdout and stderr readers of one job merge
/// instead of replacing each other. Callers only ever see cloned snapshots.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<JobId, Job>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh `queued` record. An existing record with the same id is
    /// replaced; ids are v4 UUIDs and are never reused in practice.
    pub fn create(&self, id: JobId, mode: DownloadMode) -> Job {
        let job = Job::new(id, mode);
        self.jobs.insert(id, job.clone());
        debug!(job_id = %id, mode = %mode, "Registered job");
        job
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.jobs.contains_key(id)
    }

    /// Merge `patch` into the record. Unknown ids are ignored.
    pub fn update(&self, id: &JobId, patch: JobPatch) -> bool {
        self.modify(id, |job| patch.apply(job)).is_some()
    }

    /// Read-modify-write under the entry lock.
    ///
    /// Returns `None` when the job does not exist (for example after it was
    /// evicted while its process was still draining output).
    pub fn modify<T>(&self, id: &JobId, f: impl FnOnce(&mut Job) -> T) -> Option<T> {
        let mut entry = self.jobs.get_mut(id)?;
        let job = entry.value_mut();
        let result = f(job);
        job.updated_at = Utc::now();
        Some(result)
    }

    pub fn delete(&self, id: &JobId) -> Option<Job> {
        self.jobs.remove(id).map(|(_, job)| job)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Mark the job for eviction at `at`.
    pub fn schedule_expiry(&self, id: &JobId, at: DateTime<Utc>) -> bool {
        self.modify(id, |job| job.expires_at = Some(at)).is_some()
    }

    /// Mark the job for eviction `ttl` from now.
    pub fn expire_after(&self, id: &JobId, ttl: std::time::Duration) -> bool {
        let now = Utc::now();
        let at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.schedule_expiry(id, at)
    }

    /// Remove and return every job whose expiry is at or before `now`.
    pub fn take_expired(&self, now: DateTime<Utc>) -> Vec<Job> {
        let expired: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|entry| entry.expires_at.is_some_and(|at| at <= now))
            .map(|entry| *entry.key())
            .collect();

        expired
            .into_iter()
            // Re-check under the removal lock in case the expiry moved.
            .filter_map(|id| {
                self.jobs
                    .remove_if(&id, |_, job| job.expires_at.is_some_and(|at| at <= now))
                    .map(|(_, job)| job)
            })
            .collect()
    }
}
