//! Journal: fire-and-forget persistence queue.
//!
//! The request path pushes [`Entry`] values onto an unbounded channel and
//! never waits. A single background task drains the channel and applies each
//! entry to the [`LedgerStore`] on the blocking pool. Store errors are logged
//! and dropped.
//!
//! On shutdown the task drains whatever is already queued before exiting, so
//! cancelling the token never loses accepted entries.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{DailyDelta, LedgerStore, RequestOutcome, RequestStart, UsageRecord};
use crate::error::AppError;
use crate::ledger::RequestCost;

/// One deferred write.
#[derive(Debug)]
pub enum Entry {
    RequestStarted(RequestStart),
    RequestFinished(RequestOutcome),
    Usage(UsageRecord),
    Cost(RequestCost),
    Daily(DailyDelta),
    /// Acknowledged once every entry queued before it has been applied.
    Flush(oneshot::Sender<()>),
}

impl Entry {
    fn kind(&self) -> &'static str {
        match self {
            Entry::RequestStarted(_) => "request_started",
            Entry::RequestFinished(_) => "request_finished",
            Entry::Usage(_) => "usage",
            Entry::Cost(_) => "cost",
            Entry::Daily(_) => "daily",
            Entry::Flush(_) => "flush",
        }
    }
}

/// Cloneable sending side of the journal.
#[derive(Debug, Clone)]
pub struct Journal {
    tx: mpsc::UnboundedSender<Entry>,
}

impl Journal {
    /// Spawn the background writer. It stops when `shutdown` is cancelled or
    /// every [`Journal`] handle is dropped.
    pub fn spawn(
        store: Arc<dyn LedgerStore>,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(store, rx, shutdown));
        debug!("journal started");
        (Self { tx }, handle)
    }

    /// Queue an entry. Never blocks.
    pub fn send(&self, entry: Entry) {
        if let Err(e) = self.tx.send(entry) {
            warn!(kind = e.0.kind(), "journal closed, entry dropped");
        }
    }

    /// Wait until everything queued so far has been written.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Entry::Flush(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.await;
    }
}

async fn run(
    store: Arc<dyn LedgerStore>,
    mut rx: mpsc::UnboundedReceiver<Entry>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                rx.close();
                while let Some(entry) = rx.recv().await {
                    apply(&store, entry).await;
                }
                info!("journal drained, shutting down");
                break;
            }

            entry = rx.recv() => match entry {
                Some(entry) => apply(&store, entry).await,
                None => {
                    debug!("all journal handles dropped, exiting");
                    break;
                }
            }
        }
    }
}

async fn apply(store: &Arc<dyn LedgerStore>, entry: Entry) {
    if let Entry::Flush(ack) = entry {
        let _ = ack.send(());
        return;
    }
    let kind = entry.kind();
    let store = Arc::clone(store);
    let result = tokio::task::spawn_blocking(move || write(store.as_ref(), &entry)).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(kind, error = %e, "journal write failed"),
        Err(e) => warn!(kind, error = %e, "journal writer task failed"),
    }
}

fn write(store: &dyn LedgerStore, entry: &Entry) -> Result<(), AppError> {
    match entry {
        Entry::RequestStarted(start) => store.request_started(start),
        Entry::RequestFinished(outcome) => store.request_finished(outcome),
        Entry::Usage(usage) => store.record_usage(usage),
        Entry::Cost(cost) => store.record_cost(cost),
        Entry::Daily(delta) => store.add_daily(delta),
        Entry::Flush(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{DailyAggregate, Provider, ProviderUnits};
    use chrono::{NaiveDate, Utc};
    use std::sync::Mutex;

    /// Records which writes arrived; optionally fails every write.
    #[derive(Default)]
    struct RecordingStore {
        seen: Mutex<Vec<&'static str>>,
        fail: bool,
    }

    impl RecordingStore {
        fn push(&self, kind: &'static str) -> Result<(), AppError> {
            self.seen.lock().unwrap().push(kind);
            if self.fail { Err(AppError::Store("disk full".into())) } else { Ok(()) }
        }
    }

    impl LedgerStore for RecordingStore {
        fn request_started(&self, _: &RequestStart) -> Result<(), AppError> {
            self.push("request_started")
        }
        fn request_finished(&self, _: &RequestOutcome) -> Result<(), AppError> {
            self.push("request_finished")
        }
        fn record_usage(&self, _: &UsageRecord) -> Result<(), AppError> {
            self.push("usage")
        }
        fn record_cost(&self, _: &RequestCost) -> Result<(), AppError> {
            self.push("cost")
        }
        fn add_daily(&self, _: &DailyDelta) -> Result<(), AppError> {
            self.push("daily")
        }
        fn load_daily(&self, _: NaiveDate) -> Result<Option<DailyAggregate>, AppError> {
            Ok(None)
        }
        fn load_request_cost(&self, _: &str) -> Result<Option<RequestCost>, AppError> {
            Ok(None)
        }
        fn ping(&self) -> Result<(), AppError> {
            Ok(())
        }
    }

    fn usage() -> Entry {
        Entry::Usage(UsageRecord {
            request_id: "r".into(),
            provider: Provider::BraveSearch,
            units: 1,
            cost: 0.005,
            at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn flush_waits_for_prior_entries() {
        let store = Arc::new(RecordingStore::default());
        let (journal, _handle) = Journal::spawn(store.clone(), CancellationToken::new());
        journal.send(usage());
        journal.send(Entry::Cost(RequestCost::new("r", None)));
        journal.flush().await;
        assert_eq!(*store.seen.lock().unwrap(), vec!["usage", "cost"]);
    }

    #[tokio::test]
    async fn store_errors_do_not_stop_the_writer() {
        let store = Arc::new(RecordingStore { fail: true, ..Default::default() });
        let (journal, _handle) = Journal::spawn(store.clone(), CancellationToken::new());
        journal.send(usage());
        journal.send(Entry::Daily(DailyDelta {
            date: Utc::now().date_naive(),
            requests: 1,
            cache_hits: 0,
            errors: 0,
            cost: 0.0,
            units: ProviderUnits::default(),
        }));
        journal.flush().await;
        assert_eq!(store.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn shutdown_drains_queue() {
        let store = Arc::new(RecordingStore::default());
        let shutdown = CancellationToken::new();
        let (journal, handle) = Journal::spawn(store.clone(), shutdown.clone());
        for _ in 0..5 {
            journal.send(usage());
        }
        shutdown.cancel();
        handle.await.unwrap();
        assert_eq!(store.seen.lock().unwrap().len(), 5);

        // Sends after shutdown are dropped without panicking; flush returns.
        journal.send(usage());
        journal.flush().await;
    }
}
