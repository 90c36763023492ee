//! Delivery handles and the completion coordinator
//!
//! Every publish registers a single-assignment cell with the coordinator
//! task running on the caller's scheduler. Delivery callbacks, which run on
//! the polling thread, never touch the cell: they send a [`Completion`]
//! over a channel and the coordinator performs the one write.

use crate::core::{DeliveryMetrics, LoggerError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};

/// Message from publishers and delivery callbacks to the coordinator
#[derive(Debug)]
pub(crate) enum Completion {
    Register {
        id: u64,
        topic: String,
        cell: oneshot::Sender<Result<()>>,
    },
    Resolve {
        id: u64,
        outcome: std::result::Result<(), String>,
    },
}

/// Eventual outcome of one publish.
///
/// Awaiting yields `Ok(())` once the transport confirmed delivery,
/// [`LoggerError::DeliveryFailure`] with the transport's cause, or
/// [`LoggerError::ResourceClosed`] if the bridge closed before an outcome
/// arrived.
#[derive(Debug)]
#[must_use = "a delivery handle does nothing unless awaited"]
pub struct DeliveryHandle {
    id: u64,
    topic: String,
    cell: oneshot::Receiver<Result<()>>,
}

impl DeliveryHandle {
    pub(crate) fn new(id: u64, topic: String, cell: oneshot::Receiver<Result<()>>) -> Self {
        Self { id, topic, cell }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Non-blocking check; `None` while the outcome is still pending
    pub fn try_result(&mut self) -> Option<Result<()>> {
        match self.cell.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(self.abandoned())),
        }
    }

    fn abandoned(&self) -> LoggerError {
        LoggerError::closed(format!(
            "delivery bridge (message {} to '{}' unconfirmed)",
            self.id, self.topic
        ))
    }
}

impl Future for DeliveryHandle {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.cell).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(this.abandoned())),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Pending cells keyed by message id. Owned by the coordinator task only.
pub(crate) struct Resolver {
    pending: HashMap<u64, (String, oneshot::Sender<Result<()>>)>,
    metrics: Arc<DeliveryMetrics>,
}

impl Resolver {
    pub(crate) fn new(metrics: Arc<DeliveryMetrics>) -> Self {
        Self {
            pending: HashMap::new(),
            metrics,
        }
    }

    pub(crate) fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::Register { id, topic, cell } => {
                self.pending.insert(id, (topic, cell));
            }
            Completion::Resolve { id, outcome } => {
                self.resolve(id, outcome);
            }
        }
    }

    /// Resolve a cell exactly once. Returns `false` (and writes nothing)
    /// for an id that is unknown or already resolved.
    pub(crate) fn resolve(&mut self, id: u64, outcome: std::result::Result<(), String>) -> bool {
        let Some((topic, cell)) = self.pending.remove(&id) else {
            self.metrics.record_duplicate();
            eprintln!(
                "[LOGGER WARNING] Ignoring second delivery outcome for message {}",
                id
            );
            return false;
        };

        let result = match outcome {
            Ok(()) => {
                self.metrics.record_delivered();
                Ok(())
            }
            Err(cause) => {
                self.metrics.record_failed();
                Err(LoggerError::delivery(topic, cause))
            }
        };

        if let Err(unobserved) = cell.send(result) {
            self.metrics.record_abandoned(1);
            if let Err(e) = unobserved {
                eprintln!("[LOGGER ERROR] {} (nobody awaited this delivery)", e);
            }
        }
        true
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Drop every outstanding cell; awaiting handles observe `ResourceClosed`
    pub(crate) fn abandon_all(&mut self) {
        let count = self.pending.len() as u64;
        if count > 0 {
            eprintln!(
                "[LOGGER WARNING] Delivery bridge closed with {} unconfirmed message(s)",
                count
            );
            self.metrics.record_unconfirmed(count);
        }
        self.pending.clear();
    }
}

/// Coordinator loop: runs on the caller's scheduler until every sender is gone
pub(crate) async fn run_coordinator(
    mut completions: mpsc::UnboundedReceiver<Completion>,
    metrics: Arc<DeliveryMetrics>,
) {
    let mut resolver = Resolver::new(metrics);
    while let Some(completion) = completions.recv().await {
        resolver.apply(completion);
    }
    resolver.abandon_all();
}
