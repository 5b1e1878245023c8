//! Single-flight request coalescing
//!
//! At most one producer runs per key; concurrent callers for the same
//! key subscribe to the leader's broadcast channel and all observe the
//! same result. The in-flight table has a hard cap: registrations past
//! the cap are rejected immediately so the caller can degrade to an
//! uncoalesced path instead of queueing.
//!
//! The leader removes its key from the table before publishing, under
//! the same lock callers register through, so a request arriving right
//! after completion starts a fresh execution rather than joining a
//! settled one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::errors::CoalesceError;

pub struct RequestCoalescer<T: Clone + Send + 'static> {
    in_flight: Arc<Mutex<HashMap<String, broadcast::Sender<T>>>>,
    capacity: usize,
}

/// Removes the key on drop so a panicking or cancelled leader never
/// leaves a permanent entry that would starve future callers.
struct InFlightGuard<T: Clone + Send + 'static> {
    table: Arc<Mutex<HashMap<String, broadcast::Sender<T>>>>,
    key: String,
    settled: bool,
}

impl<T: Clone + Send + 'static> InFlightGuard<T> {
    /// Remove the key and hand back the sender for publishing.
    fn settle(&mut self) -> Option<broadcast::Sender<T>> {
        self.settled = true;
        lock_table(&self.table).remove(&self.key)
    }
}

impl<T: Clone + Send + 'static> Drop for InFlightGuard<T> {
    fn drop(&mut self) {
        if !self.settled {
            lock_table(&self.table).remove(&self.key);
            warn!("In-flight operation for '{}' dropped before settling", self.key);
        }
    }
}

fn lock_table<T>(
    table: &Mutex<HashMap<String, broadcast::Sender<T>>>,
) -> std::sync::MutexGuard<'_, HashMap<String, broadcast::Sender<T>>> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: Clone + Send + 'static> RequestCoalescer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            capacity,
        }
    }

    /// Run `producer` exclusively for `key`.
    ///
    /// The first caller for a key becomes the leader and executes the
    /// producer; callers arriving while it runs receive a clone of the
    /// leader's result. Registration beyond the capacity cap fails
    /// immediately with [`CoalesceError::TableFull`].
    pub async fn run_exclusive<F, Fut>(&self, key: &str, producer: F) -> Result<T, CoalesceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut receiver = {
            let mut table = lock_table(&self.in_flight);
            if let Some(sender) = table.get(key) {
                debug!("Joining in-flight operation for '{}'", key);
                Some(sender.subscribe())
            } else if table.len() >= self.capacity {
                warn!(
                    "Rejecting operation for '{}': in-flight table at capacity ({})",
                    key, self.capacity
                );
                return Err(CoalesceError::TableFull {
                    capacity: self.capacity,
                });
            } else {
                let (sender, _) = broadcast::channel(1);
                table.insert(key.to_string(), sender);
                None
            }
        };

        if let Some(receiver) = receiver.as_mut() {
            return match receiver.recv().await {
                Ok(value) => Ok(value),
                Err(_) => Err(CoalesceError::Abandoned {
                    key: key.to_string(),
                }),
            };
        }

        let mut guard = InFlightGuard {
            table: Arc::clone(&self.in_flight),
            key: key.to_string(),
            settled: false,
        };

        let value = producer().await;

        if let Some(sender) = guard.settle() {
            // Followers may all have dropped already; that is fine.
            let _ = sender.send(value.clone());
        }
        Ok(value)
    }

    /// Number of distinct keys currently in flight
    pub fn in_flight_len(&self) -> usize {
        lock_table(&self.in_flight).len()
    }
}
