use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::ObserverMessage;
use crate::error::AcquisitionError;

/// Identity of a registered observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverId(Uuid);

impl ObserverId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sending side of an observer's inbound queue
#[derive(Debug, Clone)]
pub struct ObserverHandle {
    id: ObserverId,
    tx: mpsc::Sender<Arc<ObserverMessage>>,
}

impl ObserverHandle {
    /// Create a handle and the queue it feeds
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<ObserverMessage>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: ObserverId::new(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ObserverId {
        self.id
    }

    fn try_deliver(&self, message: &Arc<ObserverMessage>) -> Result<(), AcquisitionError> {
        self.tx
            .try_send(Arc::clone(message))
            .map_err(|_| AcquisitionError::UnreachableObserver(self.id))
    }
}

/// Fan-out of batches and terminal events to all registered observers
///
/// Delivery never waits: a full or closed queue gets its observer dropped.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Mutex<Vec<ObserverHandle>>,
    dropped: AtomicU64,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn observers(&self) -> MutexGuard<'_, Vec<ObserverHandle>> {
        self.observers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, handle: ObserverHandle) {
        let mut observers = self.observers();
        if observers.iter().any(|o| o.id == handle.id) {
            return;
        }
        debug!(observer = %handle.id, count = observers.len() + 1, "observer registered");
        observers.push(handle);
    }

    /// Remove an observer; removing an absent one is a no-op
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut observers = self.observers();
        match observers.iter().position(|o| o.id == id) {
            Some(pos) => {
                observers.remove(pos);
                debug!(observer = %id, count = observers.len(), "observer unregistered");
                true
            }
            None => {
                debug!(observer = %id, "observer already unregistered");
                false
            }
        }
    }

    /// Deliver to every current observer, returning how many accepted the message
    pub fn broadcast(&self, message: ObserverMessage) -> usize {
        let message = Arc::new(message);
        // Snapshot so that delivery runs without holding the lock
        let snapshot: Vec<ObserverHandle> = self.observers().clone();

        let mut delivered = 0;
        for observer in &snapshot {
            match observer.try_deliver(&message) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(error = %e, "dropping observer");
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    self.unregister(observer.id);
                }
            }
        }
        delivered
    }

    /// Drop every observer; their supervisors drain what is queued and exit
    pub fn close_all(&self) -> usize {
        let closed = std::mem::take(&mut *self.observers());
        if !closed.is_empty() {
            debug!(count = closed.len(), "closing all observers");
        }
        closed.len()
    }

    pub fn len(&self) -> usize {
        self.observers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers().is_empty()
    }

    pub fn contains(&self, id: ObserverId) -> bool {
        self.observers().iter().any(|o| o.id == id)
    }

    /// Observers removed because they could not keep up or went away
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
