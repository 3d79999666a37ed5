//! Insertion-ordered listener tables.

use std::sync::{Arc, Mutex};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A table of listeners invoked in registration order.
///
/// `emit` iterates over a snapshot, so a listener may register further
/// listeners without deadlocking; additions made during an emit are first
/// seen by the next emit.
pub struct Listeners<T> {
    inner: Mutex<Vec<Listener<T>>>,
}

impl<T> Listeners<T> {
    pub fn new() -> Self {
        Listeners {
            inner: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, listener: impl Fn(&T) + Send + Sync + 'static) {
        self.inner.lock().unwrap().push(Arc::new(listener));
    }

    pub fn emit(&self, argument: &T) {
        let snapshot: Vec<Listener<T>> = self.inner.lock().unwrap().clone();
        for listener in snapshot {
            listener(argument);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}
