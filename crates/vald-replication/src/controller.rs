//! The replication controller: lifecycle and membership accessors.

use crate::{
    ClusterView, ControllerConfig, Error, MemberRecord, MembershipWatcher, PendingRecoverySet,
    Reconcile, ReconcileEngine, RecoveryClient, RecoveryDriver, Result, ViewCell,
};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Keeps replica membership current and drives recovery of changed members.
///
/// A controller is started once. It runs until the cancellation token
/// passed to [`start`](Self::start) fires; there is no pause or restart.
pub struct ReplicationController {
    config: ControllerConfig,
    watcher: Arc<dyn MembershipWatcher>,
    client: Arc<dyn RecoveryClient>,
    view: Arc<ViewCell>,
    pending: Arc<PendingRecoverySet>,
    engine: Arc<ReconcileEngine>,
    driver: Arc<RecoveryDriver>,
    runtime: Option<Handle>,
    started: AtomicBool,
}

impl ReplicationController {
    pub fn new(
        config: ControllerConfig,
        watcher: Arc<dyn MembershipWatcher>,
        client: Arc<dyn RecoveryClient>,
    ) -> Result<Self> {
        config.validate()?;

        let view = Arc::new(ViewCell::new());
        let pending = Arc::new(PendingRecoverySet::new());
        let engine = Arc::new(ReconcileEngine::new(
            config.scope(),
            Arc::clone(&view),
            Arc::clone(&pending),
        ));
        let driver = Arc::new(RecoveryDriver::new(
            Arc::clone(&pending),
            Arc::clone(&client),
            config.max_concurrent_recoveries,
        ));

        Ok(Self {
            config,
            watcher,
            client,
            view,
            pending,
            engine,
            driver,
            runtime: None,
            started: AtomicBool::new(false),
        })
    }

    /// Runs background tasks and recovery requests on `handle`.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.driver = Arc::new(
            RecoveryDriver::new(
                Arc::clone(&self.pending),
                Arc::clone(&self.client),
                self.config.max_concurrent_recoveries,
            )
            .with_runtime(handle.clone()),
        );
        self.runtime = Some(handle);
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Starts the membership watch and the recovery loop.
    ///
    /// The watch delivers its initial listing before this returns, so the
    /// cluster view is populated on success. A watch that cannot be
    /// established is returned as an error and the controller may be started
    /// again. Otherwise the returned channel receives every asynchronous
    /// failure from either subsystem and closes after `cancel` fires.
    pub async fn start(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<Error>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }

        let watch_errors = match self.start_watch(cancel.clone()).await {
            Ok(rx) => rx,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let (errors_tx, errors_rx) = mpsc::channel(self.config.error_buffer);

        self.spawn(forward_watch_errors(
            watch_errors,
            errors_tx.clone(),
            cancel.clone(),
        ));
        self.spawn(recovery_loop(
            Arc::clone(&self.driver),
            self.config.recovery_check_duration,
            errors_tx,
            cancel,
        ));

        info!(
            name = %self.config.name,
            namespace = %self.config.namespace,
            interval = ?self.config.recovery_check_duration,
            members = self.view.load().map_or(0, |v| v.len()),
            "replication controller started"
        );

        Ok(errors_rx)
    }

    /// Addresses of all members in the current view, or `None` if no
    /// listing has been reconciled yet.
    pub fn current_pod_ips(&self) -> Option<Vec<String>> {
        self.view.load().map(|view| view.addresses())
    }

    /// The current view, if one has been published.
    pub fn current_view(&self) -> Option<Arc<ClusterView>> {
        self.view.load()
    }

    /// Members still awaiting a successful recovery, ordered by name.
    pub fn pending_recoveries(&self) -> Vec<MemberRecord> {
        self.pending.snapshot()
    }

    /// Runs one recovery sweep immediately, with tick semantics.
    pub async fn recover_now(&self, cancel: &CancellationToken) -> Result<usize> {
        self.driver.sweep(cancel).await
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Starts the watch inside the injected runtime, if any, so the tasks a
    /// watcher spawns share it with the recovery loop.
    async fn start_watch(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<Error>> {
        let reconciler: Arc<dyn Reconcile> = self.engine.clone();
        match &self.runtime {
            Some(handle) => {
                let watcher = Arc::clone(&self.watcher);
                handle
                    .spawn(async move { watcher.start(reconciler, cancel).await })
                    .await
                    .map_err(|e| Error::Task(e.to_string()))?
            }
            None => self.watcher.start(reconciler, cancel).await,
        }
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match &self.runtime {
            Some(handle) => drop(handle.spawn(task)),
            None => drop(tokio::spawn(task)),
        }
    }
}

/// Sends `err` unless the controller is shutting down first.
async fn publish(errors: &mpsc::Sender<Error>, err: Error, cancel: &CancellationToken) {
    tokio::select! {
        biased;
        () = cancel.cancelled() => debug!(error = %err, "dropping error during shutdown"),
        permit = errors.reserve() => match permit {
            Ok(permit) => permit.send(err),
            Err(_) => debug!(error = %err, "error receiver dropped"),
        },
    }
}

async fn forward_watch_errors(
    mut watch_errors: mpsc::Receiver<Error>,
    errors: mpsc::Sender<Error>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = watch_errors.recv() => next,
        };
        match next {
            Some(err) => {
                warn!(error = %err, "membership watch error");
                publish(&errors, err, &cancel).await;
            }
            None => {
                debug!("membership watch error channel closed");
                break;
            }
        }
    }
}

/// Spawns one sweep per tick. Sweeps may overlap when requests outlive the
/// interval; removal-before-attempt keeps them from duplicating work.
async fn recovery_loop(
    driver: Arc<RecoveryDriver>,
    period: Duration,
    errors: mpsc::Sender<Error>,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sweeps = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(_) = sweeps.join_next(), if !sweeps.is_empty() => {}
            _ = ticker.tick() => {
                let driver = Arc::clone(&driver);
                let errors = errors.clone();
                let cancel = cancel.clone();
                sweeps.spawn(async move {
                    match driver.sweep(&cancel).await {
                        Ok(0) => {}
                        Ok(recovered) => info!(recovered, "recovery sweep complete"),
                        Err(err) => {
                            warn!(error = %err, "recovery sweep failed");
                            publish(&errors, err, &cancel).await;
                        }
                    }
                });
            }
        }
    }

    // In-flight sweeps observe the same token and re-queue their members.
    while sweeps.join_next().await.is_some() {}
    debug!("recovery loop stopped");
}
