//! Pod watch driving the reconcile engine.

use crate::pod::{DEFAULT_APP_LABEL, snapshot_from_pods};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::runtime::reflector::{self, store::Writer};
use kube::runtime::{WatchStreamExt, watcher};
use kube::Client;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vald_replication::watcher::WATCH_ERROR_BUFFER;
use vald_replication::{Error, MembershipWatcher, Reconcile, Result};

/// Membership source backed by the pods of one namespace.
pub struct PodWatcher {
    api: Api<Pod>,
    app_label: String,
}

impl PodWatcher {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self::with_api(Api::namespaced(client, namespace))
    }

    pub fn with_api(api: Api<Pod>) -> Self {
        Self {
            api,
            app_label: DEFAULT_APP_LABEL.to_string(),
        }
    }

    /// Groups pods by `label` instead of `app`.
    pub fn with_app_label(mut self, label: impl Into<String>) -> Self {
        self.app_label = label.into();
        self
    }

    pub fn app_label(&self) -> &str {
        &self.app_label
    }
}

#[async_trait]
impl MembershipWatcher for PodWatcher {
    async fn start(
        &self,
        reconciler: Arc<dyn Reconcile>,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Error>> {
        let pods = self
            .api
            .list(&ListParams::default().labels(&self.app_label))
            .await
            .map_err(Error::watch_start)?;
        let initial = snapshot_from_pods(&pods.items, &self.app_label);
        info!(
            pods = pods.items.len(),
            groups = initial.len(),
            "initial pod listing received"
        );
        reconciler.reconcile(&initial);

        let (_, writer) = reflector::store::<Pod>();
        let events = watcher(
            self.api.clone(),
            watcher::Config::default().labels(&self.app_label),
        )
        .default_backoff();

        let (errors_tx, errors_rx) = mpsc::channel(WATCH_ERROR_BUFFER);
        tokio::spawn(run_watch(
            events,
            writer,
            self.app_label.clone(),
            reconciler,
            errors_tx,
            cancel,
        ));

        Ok(errors_rx)
    }
}

/// Applies watch events to a pod store and reconciles the full store after
/// every change. Events from the list phase of a re-list are buffered by
/// the store and reconciled once, at `InitDone`.
pub(crate) async fn run_watch<S, E>(
    events: S,
    mut writer: Writer<Pod>,
    app_label: String,
    reconciler: Arc<dyn Reconcile>,
    errors: mpsc::Sender<Error>,
    cancel: CancellationToken,
) where
    S: Stream<Item = std::result::Result<watcher::Event<Pod>, E>> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    let store = writer.as_reader();
    let mut events = std::pin::pin!(events);

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = events.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                writer.apply_watcher_event(&event);
                match event {
                    watcher::Event::Init | watcher::Event::InitApply(_) => {}
                    watcher::Event::Apply(_)
                    | watcher::Event::Delete(_)
                    | watcher::Event::InitDone => {
                        let pods = store.state();
                        let snapshot =
                            snapshot_from_pods(pods.iter().map(|pod| &**pod), &app_label);
                        reconciler.reconcile(&snapshot);
                    }
                }
            }
            Some(Err(err)) => {
                warn!(error = %err, "pod watch error");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    sent = errors.send(Error::watch(err)) => {
                        if sent.is_err() {
                            debug!("watch error receiver dropped");
                        }
                    }
                }
            }
            None => break,
        }
    }

    debug!("pod watch stopped");
}
