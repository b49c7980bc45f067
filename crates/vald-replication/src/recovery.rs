//! Drives pending members to recovery.
//!
//! Each sweep takes every pending entry out of the set *before* calling the
//! member, so overlapping sweeps never issue two concurrent requests for the
//! same name. Failed (or interrupted) attempts put the entry back, which
//! makes the next sweep retry it.

use crate::{BoxError, Error, MemberRecord, PendingRecoverySet, Result, SweepFailures};
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Issues the "recover yourself" request to a member.
///
/// Implementations own connection management. The remote operation is
/// idempotent, so a request may be repeated after a false-negative failure.
#[async_trait]
pub trait RecoveryClient: Send + Sync {
    async fn recover(&self, member: &MemberRecord) -> std::result::Result<(), BoxError>;
}

enum Attempt {
    Recovered,
    Interrupted,
    Failed(Error),
}

/// Sweeps the pending set, one concurrent request per entry.
pub struct RecoveryDriver {
    pending: Arc<PendingRecoverySet>,
    client: Arc<dyn RecoveryClient>,
    permits: Arc<Semaphore>,
    runtime: Option<Handle>,
}

impl RecoveryDriver {
    /// Creates a driver allowing at most `max_concurrent` in-flight requests
    /// across all sweeps.
    pub fn new(
        pending: Arc<PendingRecoverySet>,
        client: Arc<dyn RecoveryClient>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            pending,
            client,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            runtime: None,
        }
    }

    /// Spawns request tasks on `handle` instead of the ambient runtime.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn pending(&self) -> &Arc<PendingRecoverySet> {
        &self.pending
    }

    /// Attempts recovery of every currently pending member.
    ///
    /// Waits for all attempts started by this sweep. Returns the number of
    /// recovered members, or [`Error::Sweep`] listing every failure; failed
    /// members are back in the pending set when this returns. Cancellation
    /// re-queues in-flight members and is not an error. Dropping the sweep
    /// aborts its attempts, and each aborted member returns to the set.
    pub async fn sweep(&self, cancel: &CancellationToken) -> Result<usize> {
        let candidates = self.pending.snapshot();
        if candidates.is_empty() {
            return Ok(0);
        }

        let mut tasks = JoinSet::new();
        for candidate in candidates {
            // Another sweep may have taken it since the snapshot.
            let Some(record) = self.pending.take(&candidate.name) else {
                continue;
            };
            let attempt = attempt(
                InFlight::new(record, Arc::clone(&self.pending)),
                Arc::clone(&self.client),
                Arc::clone(&self.permits),
                cancel.clone(),
            );
            match &self.runtime {
                Some(handle) => tasks.spawn_on(attempt, handle),
                None => tasks.spawn(attempt),
            };
        }

        let dispatched = tasks.len();
        let mut recovered = 0;
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Attempt::Recovered) => recovered += 1,
                Ok(Attempt::Interrupted) => {}
                Ok(Attempt::Failed(err)) => failures.push(err),
                Err(err) => failures.push(Error::Task(err.to_string())),
            }
        }

        debug!(
            dispatched,
            recovered,
            failed = failures.len(),
            "recovery sweep finished"
        );

        if failures.is_empty() {
            Ok(recovered)
        } else {
            Err(Error::Sweep(SweepFailures(failures)))
        }
    }
}

/// A member taken out of the pending set for one attempt.
///
/// Dropping it puts the record back unless the attempt succeeded, so an
/// aborted task or a dropped sweep never loses a recovery.
struct InFlight {
    record: MemberRecord,
    pending: Arc<PendingRecoverySet>,
    recovered: bool,
}

impl InFlight {
    fn new(record: MemberRecord, pending: Arc<PendingRecoverySet>) -> Self {
        Self {
            record,
            pending,
            recovered: false,
        }
    }

    fn record(&self) -> &MemberRecord {
        &self.record
    }

    fn complete(mut self) {
        self.recovered = true;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.recovered {
            self.pending.insert_if_absent(self.record.clone());
        }
    }
}

async fn attempt(
    member: InFlight,
    client: Arc<dyn RecoveryClient>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
) -> Attempt {
    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        outcome = async {
            let _permit = permits.acquire_owned().await.ok();
            AssertUnwindSafe(client.recover(member.record())).catch_unwind().await
        } => Some(outcome),
    };

    let record = member.record();
    match outcome {
        None => {
            debug!(name = %record.name, "recovery interrupted by shutdown");
            Attempt::Interrupted
        }
        Some(Ok(Ok(()))) => {
            info!(name = %record.name, address = %record.address, "member recovered");
            member.complete();
            Attempt::Recovered
        }
        Some(Ok(Err(source))) => {
            warn!(
                name = %record.name,
                address = %record.address,
                error = %source,
                "recovery request failed, will retry"
            );
            Attempt::Failed(failure(record, source))
        }
        Some(Err(_panic)) => {
            warn!(name = %record.name, "recovery client panicked, will retry");
            Attempt::Failed(failure(record, "recovery client panicked".into()))
        }
    }
}

fn failure(record: &MemberRecord, source: BoxError) -> Error {
    Error::RecoveryFailed {
        name: record.name.clone(),
        address: record.address.clone(),
        source,
    }
}
