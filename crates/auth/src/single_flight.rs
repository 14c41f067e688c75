//! Coalescing concurrent work per key.
//!
//! While an acquisition for a key is running, later callers for the same key
//! get a clone of the same shared future instead of starting another one.
//! The entry is removed once the future settles, so failures are never
//! cached and the next call starts fresh.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use {
    futures::future::{BoxFuture, FutureExt, Shared},
    tracing::debug,
};

/// Handle to one in-flight piece of work, shared by every caller for a key.
pub type Flight<T> = Shared<BoxFuture<'static, T>>;

struct Slot<T> {
    id: u64,
    flight: Flight<T>,
}

struct Flights<T> {
    next_id: u64,
    slots: HashMap<String, Slot<T>>,
}

/// Process-local single-flight group.
pub struct SingleFlight<T> {
    inner: Arc<Mutex<Flights<T>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Flights {
                next_id: 0,
                slots: HashMap::new(),
            })),
        }
    }
}

fn lock<T>(flights: &Mutex<Flights<T>>) -> MutexGuard<'_, Flights<T>> {
    flights.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the flight for `key`, starting it with `factory` if none is
    /// running.
    ///
    /// `factory` runs with the group locked and must not call back into
    /// this group.
    pub fn acquire<F, Fut>(&self, key: &str, factory: F) -> Flight<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut flights = lock(&self.inner);
        if let Some(slot) = flights.slots.get(key) {
            debug!(key, "joining in-flight acquisition");
            return slot.flight.clone();
        }

        let id = flights.next_id;
        flights.next_id = flights.next_id.wrapping_add(1);

        let work = factory();
        let group: Weak<Mutex<Flights<T>>> = Arc::downgrade(&self.inner);
        let owned_key = key.to_string();
        let flight = async move {
            let out = work.await;
            if let Some(group) = group.upgrade() {
                let mut flights = lock(&group);
                // A newer flight may own the key by now; leave it alone.
                if flights.slots.get(&owned_key).is_some_and(|s| s.id == id) {
                    flights.slots.remove(&owned_key);
                }
            }
            out
        }
        .boxed()
        .shared();

        debug!(key, "starting acquisition");
        flights.slots.insert(key.to_string(), Slot {
            id,
            flight: flight.clone(),
        });
        flight
    }

    /// Number of keys with work in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.inner).slots.len()
    }
}
