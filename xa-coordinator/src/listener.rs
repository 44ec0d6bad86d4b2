//! Status change listeners and subscriptions.
//!
//! Every status change of a transaction created by a
//! [`TransactionManager`](crate::TransactionManager) is delivered two ways:
//! synchronously to callbacks registered with `listen`, and through a bounded
//! broadcast channel to each [`TransactionSubscription`]. A slow subscriber
//! never blocks the transaction; once it falls behind by more than the
//! channel capacity the oldest events are dropped for that subscriber only.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use xa_core::{Status, Xid};

use crate::lock;
use crate::transaction::{Transaction, TransactionObserver, WeakTransaction};

/// Handle of a registered listener or a subscription.
///
/// Returned by [`TransactionManager::listen`](crate::TransactionManager::listen)
/// and accepted by `remove_listener`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The random id behind this handle.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// A status change of one transaction.
///
/// The transaction is held weakly, so buffered events do not keep completed
/// transactions alive or visible to `visit`.
#[derive(Clone)]
pub struct TransactionEvent {
    xid: Xid,
    transaction: WeakTransaction,
    status: Status,
}

impl TransactionEvent {
    /// Identifier of the transaction that changed.
    pub fn xid(&self) -> &Xid {
        &self.xid
    }

    /// The transaction that changed, if something still holds it.
    pub fn transaction(&self) -> Option<Transaction> {
        self.transaction.upgrade()
    }

    /// The status the transaction entered.
    pub fn status(&self) -> Status {
        self.status
    }
}

impl fmt::Debug for TransactionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionEvent")
            .field("xid", &self.xid.to_string())
            .field("status", &self.status)
            .finish()
    }
}

/// Callback invoked synchronously on every status change.
pub type TransactionListener = Arc<dyn Fn(&Transaction) + Send + Sync>;

/// Tracks transactions and fans out their status changes.
pub(crate) struct TransactionRegistry {
    tracked: Mutex<Vec<WeakTransaction>>,
    listeners: RwLock<Vec<(ListenerId, TransactionListener)>>,
    events: broadcast::Sender<TransactionEvent>,
}

impl TransactionRegistry {
    pub(crate) fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            tracked: Mutex::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            events,
        }
    }

    pub(crate) fn add_listener(&self, listener: TransactionListener) -> ListenerId {
        let id = ListenerId::generate();
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        tracing::debug!(listener = %id, "listener added");
        id
    }

    pub(crate) fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        before != listeners.len()
    }

    pub(crate) fn subscribe(&self) -> TransactionSubscription {
        TransactionSubscription {
            id: ListenerId::generate(),
            receiver: self.events.subscribe(),
            sender: self.events.clone(),
            closed: CancellationToken::new(),
        }
    }

    /// Calls `visitor` for each live tracked transaction until it returns `Some`.
    pub(crate) fn visit<V>(&self, visitor: impl FnMut(&Transaction) -> Option<V>) -> Option<V> {
        let live: Vec<Transaction> = {
            let mut tracked = lock(&self.tracked);
            tracked.retain(WeakTransaction::is_alive);
            tracked.iter().filter_map(WeakTransaction::upgrade).collect()
        };
        live.iter().find_map(visitor)
    }
}

impl TransactionObserver for TransactionRegistry {
    fn created(&self, transaction: &Transaction) {
        let mut tracked = lock(&self.tracked);
        tracked.retain(WeakTransaction::is_alive);
        tracked.push(transaction.downgrade());
    }

    fn status_changed(&self, transaction: &Transaction, status: Status) {
        let listeners: Vec<TransactionListener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(transaction);
        }

        // no receivers is not an error
        let _ = self.events.send(TransactionEvent {
            xid: transaction.xid().clone(),
            transaction: transaction.downgrade(),
            status,
        });
    }
}

/// An ordered, closeable feed of transaction status changes.
///
/// Only changes that happen after the subscription was created (or last
/// restarted) are delivered.
#[derive(Debug)]
pub struct TransactionSubscription {
    id: ListenerId,
    receiver: broadcast::Receiver<TransactionEvent>,
    sender: broadcast::Sender<TransactionEvent>,
    closed: CancellationToken,
}

impl TransactionSubscription {
    /// Returns the subscription ID.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Waits for the next event, or `None` once closed.
    pub async fn next(&mut self) -> Option<TransactionEvent> {
        loop {
            tokio::select! {
                biased;
                _ = self.closed.cancelled() => return None,
                received = self.receiver.recv() => match received {
                    Ok(event) => return Some(event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(subscription = %self.id, skipped, "subscriber lagged, events dropped");
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }

    /// Stops delivering events.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Returns a token that closes this subscription from another task.
    pub fn closer(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Returns `true` once closed.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Reopens the subscription, delivering changes from now on.
    pub fn restart(&mut self) {
        self.receiver = self.sender.subscribe();
        self.closed = CancellationToken::new();
    }

    /// Converts the subscription into a [`Stream`] that ends once closed.
    pub fn into_stream(self) -> impl Stream<Item = TransactionEvent> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            let event = subscription.next().await?;
            Some((event, subscription))
        })
    }
}
