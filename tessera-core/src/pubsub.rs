//! Typed publish/subscribe topics with explicit subscription handles.
//!
//! A [`Topic`] holds any number of callbacks. Subscribing returns a
//! [`Subscription`]; dropping it (or calling [`Subscription::unsubscribe`])
//! removes the callback. Callbacks run outside the registry lock, so a
//! callback may subscribe, unsubscribe or publish again without deadlocking.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    callbacks: Vec<(u64, Callback<T>)>,
}

/// A fan-out channel of `T` values delivered synchronously to subscribers.
pub struct Topic<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> Topic<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                callbacks: Vec::new(),
            })),
        }
    }

    /// Register a callback. It stays registered while the returned
    /// handle is alive.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = self.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.callbacks.push((id, Arc::new(callback)));
            id
        };

        let registry: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.lock().callbacks.retain(|(cid, _)| *cid != id);
            }
        })
    }

    /// Deliver `value` to every current subscriber. Returns how many
    /// callbacks ran.
    pub fn publish(&self, value: &T) -> usize {
        let callbacks: Vec<Callback<T>> = self
            .registry
            .lock()
            .callbacks
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in &callbacks {
            callback(value);
        }
        callbacks.len()
    }

    /// Drop every subscriber. Outstanding handles become inert.
    pub fn clear(&self) {
        self.registry.lock().callbacks.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().callbacks.len()
    }
}

impl<T: 'static> Default for Topic<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Topic<T> {
    /// Clones share the same subscriber registry.
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

/// Handle returned by [`Topic::subscribe`].
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Remove the callback now.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keep the callback registered for the lifetime of the topic.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
