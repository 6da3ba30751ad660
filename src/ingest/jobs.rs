use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{IngestJob, JobKind, JobState, RepoRef};

/// Process-local job records. Nothing survives a restart: callers must read a
/// missing id as "unknown", never as "failed".
///
/// Terminal jobs are forgotten once older than the TTL, and the oldest
/// terminal jobs are evicted first when the registry is at capacity. Jobs
/// still queued or running are never evicted.
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, IngestJob>>,
    ttl: Duration,
    capacity: usize,
}

impl JobRegistry {
    pub fn new(ttl_secs: u64, capacity: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs.min(u64::from(u32::MAX)) as i64),
            capacity: capacity.max(1),
        }
    }

    pub fn create(&self, repo: &RepoRef, kind: JobKind) -> IngestJob {
        let job = IngestJob {
            id: Uuid::new_v4(),
            repo: repo.key(),
            kind,
            state: JobState::Queued,
            files_total: 0,
            files_processed: 0,
            files_skipped: 0,
            chunks_produced: 0,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        };

        let mut jobs = self.jobs.write();
        self.evict(&mut jobs, Utc::now());
        jobs.insert(job.id, job.clone());
        job
    }

    pub fn get(&self, id: Uuid) -> Option<IngestJob> {
        let jobs = self.jobs.read();
        let job = jobs.get(&id)?;
        if self.expired(job, Utc::now()) {
            return None;
        }
        Some(job.clone())
    }

    /// `queued → running`
    pub fn start(&self, id: Uuid) {
        self.update(id, |job| job.state = JobState::Running);
    }

    pub fn set_total(&self, id: Uuid, total: usize) {
        self.update(id, |job| job.files_total = total);
    }

    /// Add one batch worth of progress. Counts only ever grow.
    pub fn add_progress(&self, id: Uuid, processed: usize, skipped: usize, chunks: usize) {
        self.update(id, |job| {
            job.files_processed += processed;
            job.files_skipped += skipped;
            job.chunks_produced += chunks;
        });
    }

    pub fn finish(&self, id: Uuid) {
        self.update(id, |job| {
            job.state = JobState::Done;
            job.finished_at = Some(Utc::now());
        });
    }

    pub fn fail(&self, id: Uuid, error: String) {
        self.update(id, |job| {
            job.state = JobState::Error;
            job.error = Some(error);
            job.finished_at = Some(Utc::now());
        });
    }

    /// Mutate a job unless it already reached a terminal state.
    fn update<F: FnOnce(&mut IngestJob)>(&self, id: Uuid, f: F) {
        let mut jobs = self.jobs.write();
        match jobs.get_mut(&id) {
            Some(job) if !job.state.is_terminal() => f(job),
            Some(job) => tracing::debug!("Ignoring update to finished job {id} ({:?})", job.state),
            None => tracing::debug!("Ignoring update to unknown job {id}"),
        }
    }

    fn expired(&self, job: &IngestJob, now: DateTime<Utc>) -> bool {
        job.finished_at.is_some_and(|at| now - at > self.ttl)
    }

    fn evict(&self, jobs: &mut HashMap<Uuid, IngestJob>, now: DateTime<Utc>) {
        jobs.retain(|_, job| !self.expired(job, now));
        if jobs.len() < self.capacity {
            return;
        }

        let mut finished: Vec<(DateTime<Utc>, Uuid)> = jobs
            .values()
            .filter_map(|job| job.finished_at.map(|at| (at, job.id)))
            .collect();
        finished.sort();
        let excess = jobs.len() + 1 - self.capacity;
        for (_, id) in finished.into_iter().take(excess) {
            jobs.remove(&id);
        }
    }
}
