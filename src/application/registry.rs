//! In-memory job registry shared by request handlers and pipeline tasks.

use crate::domain::jobs::{Job, JobId, JobView};
use crate::error::RegistryError;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Cloneable handle to the process-wide map of jobs.
///
/// Every read and write of an entry happens under that entry's shard lock, so a
/// reader sees either the state before a `mutate` closure or the state after
/// it, never a mix.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<DashMap<JobId, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new job. An id that is already present is never replaced.
    pub fn insert(&self, job: Job) -> Result<(), RegistryError> {
        match self.jobs.entry(job.id.clone()) {
            Entry::Occupied(entry) => Err(RegistryError::DuplicateId(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(job);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.get(id).map(|job| job.value().clone())
    }

    pub fn view(&self, id: &JobId) -> Option<JobView> {
        self.jobs.get(id).map(|job| job.view())
    }

    /// Applies `f` to the stored job while holding its exclusive lock.
    /// `f` must not call back into the registry.
    pub fn mutate<F, R>(&self, id: &JobId, f: F) -> Option<R>
    where
        F: FnOnce(&mut Job) -> R,
    {
        self.jobs.get_mut(id).map(|mut job| f(job.value_mut()))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Drops terminal jobs that finished before `cutoff`. Returns how many were removed.
    pub fn prune_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| {
            !(job.is_terminal() && job.finished_at.is_some_and(|finished| finished < cutoff))
        });
        before.saturating_sub(self.jobs.len())
    }

    /// Marks completed jobs whose output is `filename` as no longer available.
    pub fn release_output(&self, filename: &str) -> usize {
        let mut released = 0;
        for mut job in self.jobs.iter_mut() {
            if !job.output_released && job.output_filename() == Some(filename) {
                job.output_released = true;
                released += 1;
            }
        }
        released
    }
}
