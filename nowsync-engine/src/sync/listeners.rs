//! Synchronous listener registry
//!
//! Listeners are invoked in registration order. A panicking listener is caught,
//! logged and skipped; later listeners and later emissions are unaffected.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

/// Identifier handed out on registration, used to unsubscribe
pub type ListenerId = u64;

type Callback<T> = Box<dyn FnMut(&T) + Send>;

pub struct Listeners<T> {
    label: &'static str,
    next_id: ListenerId,
    entries: Vec<(ListenerId, Callback<T>)>,
}

impl<T> Listeners<T> {
    /// `label` names the notification in log output
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            next_id: 0,
            entries: Vec::new(),
        }
    }

    pub fn add<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&T) + Send + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, Box::new(listener)));
        id
    }

    /// Returns false when `id` was not registered
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn emit(&mut self, value: &T) {
        for (id, listener) in self.entries.iter_mut() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(value))) {
                warn!(
                    "{} listener {} panicked: {}",
                    self.label,
                    id,
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}

impl<T> std::fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("label", &self.label)
            .field("count", &self.entries.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
