//! Membership sources.

use crate::{BoxError, Error, MemberSnapshot, Reconcile, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Capacity of the runtime error channel returned by watchers in this crate.
pub const WATCH_ERROR_BUFFER: usize = 16;

/// A source of full membership listings.
#[async_trait]
pub trait MembershipWatcher: Send + Sync {
    /// Establishes the watch.
    ///
    /// The initial full listing must be delivered to `reconciler` before
    /// this returns. Later listings are delivered serially, never
    /// concurrently, until `cancel` fires. Failures after start are sent on
    /// the returned channel, which closes when the watch stops.
    async fn start(
        &self,
        reconciler: Arc<dyn Reconcile>,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Error>>;
}

enum FeedEvent {
    Members(MemberSnapshot),
    Failure(BoxError),
}

/// Sending half of a [`ChannelWatcher`].
#[derive(Clone)]
pub struct WatchFeed {
    tx: mpsc::UnboundedSender<FeedEvent>,
}

impl WatchFeed {
    /// Delivers a new full listing. Returns `false` once the watcher is gone.
    pub fn publish(&self, members: MemberSnapshot) -> bool {
        self.tx.send(FeedEvent::Members(members)).is_ok()
    }

    /// Reports a runtime watch failure.
    pub fn fail(&self, err: impl Into<BoxError>) -> bool {
        self.tx.send(FeedEvent::Failure(err.into())).is_ok()
    }
}

/// In-process membership source fed through a [`WatchFeed`].
///
/// Useful for embedders that already own a membership stream, and in tests.
pub struct ChannelWatcher {
    initial: MemberSnapshot,
    rx: Mutex<Option<mpsc::UnboundedReceiver<FeedEvent>>>,
}

impl ChannelWatcher {
    /// Creates a watcher whose initial listing is `initial`.
    pub fn new(initial: MemberSnapshot) -> (Self, WatchFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = Self {
            initial,
            rx: Mutex::new(Some(rx)),
        };
        (watcher, WatchFeed { tx })
    }
}

#[async_trait]
impl MembershipWatcher for ChannelWatcher {
    async fn start(
        &self,
        reconciler: Arc<dyn Reconcile>,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Error>> {
        let mut rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| Error::watch_start("channel watcher already started"))?;

        reconciler.reconcile(&self.initial);

        let (err_tx, err_rx) = mpsc::channel(WATCH_ERROR_BUFFER);
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    event = rx.recv() => event,
                };
                match event {
                    Some(FeedEvent::Members(members)) => reconciler.reconcile(&members),
                    Some(FeedEvent::Failure(err)) => {
                        tokio::select! {
                            () = cancel.cancelled() => break,
                            sent = err_tx.send(Error::watch(err)) => {
                                if sent.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    None => break,
                }
            }
            debug!("channel watcher stopped");
        });

        Ok(err_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemberRecord;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<MemberSnapshot>>);

    impl Reconcile for Recorder {
        fn reconcile(&self, members: &MemberSnapshot) {
            self.0.lock().push(members.clone());
        }
    }

    fn listing(address: &str) -> MemberSnapshot {
        BTreeMap::from([(
            "vald-agent".to_string(),
            vec![MemberRecord::new("agent-0", "vald", address, "node-a")],
        )])
    }

    #[tokio::test]
    async fn initial_listing_delivered_before_start_returns() {
        let recorder = Arc::new(Recorder::default());
        let (watcher, _feed) = ChannelWatcher::new(listing("10.0.0.1"));

        let _errors = watcher
            .start(recorder.clone(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(recorder.0.lock().as_slice(), &[listing("10.0.0.1")]);
    }

    #[tokio::test]
    async fn feed_updates_and_failures_are_forwarded() {
        let recorder = Arc::new(Recorder::default());
        let (watcher, feed) = ChannelWatcher::new(MemberSnapshot::new());
        let mut errors = watcher
            .start(recorder.clone(), CancellationToken::new())
            .await
            .unwrap();

        assert!(feed.publish(listing("10.0.0.2")));
        assert!(feed.fail("api server unavailable"));

        let err = errors.recv().await.unwrap();
        assert!(matches!(err, Error::Watch(_)));
        assert_eq!(recorder.0.lock().len(), 2);

        drop(feed);
        assert!(errors.recv().await.is_none());
    }

    #[tokio::test]
    async fn second_start_fails() {
        let recorder = Arc::new(Recorder::default());
        let (watcher, _feed) = ChannelWatcher::new(MemberSnapshot::new());
        watcher
            .start(recorder.clone(), CancellationToken::new())
            .await
            .unwrap();

        let result = watcher.start(recorder, CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::WatchStart(_))));
    }

    #[tokio::test]
    async fn cancellation_closes_error_channel() {
        let recorder = Arc::new(Recorder::default());
        let (watcher, _feed) = ChannelWatcher::new(MemberSnapshot::new());
        let cancel = CancellationToken::new();
        let mut errors = watcher.start(recorder, cancel.clone()).await.unwrap();

        cancel.cancel();
        assert!(errors.recv().await.is_none());
    }
}
