//! Single-reader / single-writer discipline across cooperating ranks.
//!
//! Every rank runs the same pipeline. The [`Coordinator`] capability decides
//! which rank reads the input, which one writes shared artifacts, and moves
//! values from the coordinator to everybody else.

use crate::config::JobConfig;
use crate::error::{JobError, Result};
use crate::io::ArtifactStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::debug;

pub trait Coordinator: Send + Sync {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn is_coordinator(&self) -> bool {
        self.rank() == 0
    }

    /// Blocks until every rank holds the coordinator's payload.
    ///
    /// The payload passed by non-coordinator ranks is ignored.
    fn broadcast_bytes(&self, payload: Vec<u8>) -> Result<Vec<u8>>;

    /// Writes `bytes` on the coordinator; other ranks do nothing and get `false`.
    fn write_shared_artifact(
        &self,
        store: &dyn ArtifactStore,
        name: &str,
        bytes: &[u8],
    ) -> Result<bool> {
        if !self.is_coordinator() {
            return Ok(false);
        }
        store.write(name, bytes)?;
        Ok(true)
    }
}

/// The only rank of a one-process run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Coordinator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn broadcast_bytes(&self, payload: Vec<u8>) -> Result<Vec<u8>> {
        Ok(payload)
    }
}

/// A reusable rendezvous for a fixed number of ranks.
///
/// After [`Gate::abort`] every pending and future `wait` returns an error.
struct Gate {
    size: usize,
    state: Mutex<GateState>,
    released: Condvar,
}

#[derive(Default)]
struct GateState {
    arrived: usize,
    generation: u64,
    aborted: bool,
}

impl Gate {
    fn new(size: usize) -> Self {
        Gate {
            size: size.max(1),
            state: Mutex::new(GateState::default()),
            released: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait(&self, rank: usize) -> Result<()> {
        let mut state = self.lock();
        if state.aborted {
            return Err(group_aborted(rank));
        }
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.size {
            state.arrived = 0;
            state.generation += 1;
            self.released.notify_all();
            return Ok(());
        }
        while state.generation == generation && !state.aborted {
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.generation == generation {
            return Err(group_aborted(rank));
        }
        Ok(())
    }

    fn abort(&self) {
        self.lock().aborted = true;
        self.released.notify_all();
    }
}

fn group_aborted(rank: usize) -> JobError {
    JobError::Coordination(format!("rank {rank}: the rank group was aborted"))
}

struct Shared {
    slot: Mutex<Option<(u64, Arc<Vec<u8>>)>>,
    gate: Gate,
}

/// One member of a group of ranks living as threads of the same process.
pub struct LocalRank {
    rank: usize,
    size: usize,
    sequence: AtomicU64,
    shared: Arc<Shared>,
}

impl LocalRank {
    /// Creates the handles of a `size`-rank group; hand one to each thread.
    pub fn group(size: usize) -> Vec<LocalRank> {
        let shared = Arc::new(Shared {
            slot: Mutex::new(None),
            gate: Gate::new(size),
        });
        (0..size)
            .map(|rank| LocalRank {
                rank,
                size,
                sequence: AtomicU64::new(0),
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Releases every rank blocked in, or later entering, a broadcast with an error.
    ///
    /// Called when this rank stops early (error or panic) so the others do
    /// not wait for it forever.
    pub fn abort(&self) {
        debug!("Rank {} aborts the group", self.rank);
        self.shared.gate.abort();
    }
}

impl Coordinator for LocalRank {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast_bytes(&self, payload: Vec<u8>) -> Result<Vec<u8>> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        if self.is_coordinator() {
            *self.shared.slot.lock().unwrap_or_else(PoisonError::into_inner) =
                Some((sequence, Arc::new(payload)));
        }
        self.shared.gate.wait(self.rank)?;
        let received = self
            .shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.shared.gate.wait(self.rank)?;

        match received {
            Some((sent, bytes)) if sent == sequence => Ok(bytes.as_ref().clone()),
            Some((sent, _)) => Err(JobError::Coordination(format!(
                "rank {} is at broadcast #{} but the coordinator sent #{}",
                self.rank, sequence, sent
            ))),
            None => Err(JobError::Coordination(format!(
                "rank {} received no payload from the coordinator",
                self.rank
            ))),
        }
    }
}

/// Aborts the group unless the owning rank finished successfully.
struct AbortUnlessFinished<'a> {
    rank: &'a LocalRank,
    finished: bool,
}

impl Drop for AbortUnlessFinished<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.rank.abort();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}

/// Runs `body` once per rank of a `size`-rank group of scoped threads.
///
/// A rank that returns an error or panics aborts the group, so the other ranks
/// fail instead of waiting for it. Returns the coordinator's result, or the
/// first panic when the coordinator did not succeed.
pub fn run_local_group<T, F>(size: usize, body: F) -> Result<T>
where
    T: Send,
    F: Fn(&LocalRank) -> Result<T> + Sync,
{
    let group = LocalRank::group(size);
    let (mut results, panicked) = thread::scope(|scope| {
        let handles: Vec<_> = group
            .iter()
            .map(|rank| {
                let body = &body;
                scope.spawn(move || {
                    let mut guard = AbortUnlessFinished {
                        rank,
                        finished: false,
                    };
                    let result = body(rank);
                    guard.finished = result.is_ok();
                    result
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        let mut panicked = None;
        for (rank, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(result) => results.push(result),
                Err(payload) => {
                    let message = format!("rank {rank} panicked: {}", panic_message(payload.as_ref()));
                    panicked.get_or_insert_with(|| message.clone());
                    results.push(Err(JobError::Coordination(message)));
                }
            }
        }
        (results, panicked)
    });

    if results.is_empty() {
        return Err(JobError::Coordination("no ranks were started".to_string()));
    }
    match (results.swap_remove(0), panicked) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(message)) => Err(JobError::Coordination(message)),
        (Err(e), None) => Err(e),
    }
}

#[derive(Serialize, Deserialize)]
enum Wire<T> {
    Value(T),
    Failed(String),
}

/// Runs `produce` on the coordinator and hands its outcome to every rank.
///
/// A failure on the coordinator is broadcast as well, so the other ranks fail
/// instead of waiting forever.
pub fn broadcast_with<T, F>(coordinator: &dyn Coordinator, produce: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T>,
{
    let mut local_error = None;
    let payload = if coordinator.is_coordinator() {
        let encoded = produce()
            .and_then(|value| serde_json::to_vec(&Wire::Value(&value)).map_err(JobError::from));
        match encoded {
            Ok(bytes) => bytes,
            Err(e) => {
                let bytes = serde_json::to_vec(&Wire::<()>::Failed(e.to_string()))
                    .unwrap_or_default();
                local_error = Some(e);
                bytes
            }
        }
    } else {
        Vec::new()
    };

    let bytes = coordinator.broadcast_bytes(payload)?;
    if let Some(e) = local_error {
        return Err(e);
    }
    match serde_json::from_slice::<Wire<T>>(&bytes)? {
        Wire::Value(value) => Ok(value),
        Wire::Failed(message) => Err(JobError::Coordination(format!(
            "coordinator failed: {message}"
        ))),
    }
}

/// Reads and decodes the job file on the coordinator only, then broadcasts it.
pub fn read_config(coordinator: &dyn Coordinator, path: &Path) -> Result<JobConfig> {
    let config = broadcast_with(coordinator, || {
        debug!("Rank {} reading {}", coordinator.rank(), path.display());
        JobConfig::load(path)
    })?;
    debug!("Rank {} holds the job configuration", coordinator.rank());
    Ok(config)
}
