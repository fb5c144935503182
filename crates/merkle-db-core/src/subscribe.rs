//! Subscriber registry with trailing-debounce notification.
//!
//! Each subscriber gets its own timer: a burst of `notify()` calls within
//! the debounce window collapses into a single callback invocation after
//! the burst goes quiet. This has no reference in the teacher's codebase;
//! it exists purely to satisfy the reactive-binding surface this crate
//! exposes (see the engine's `subscribe` operation).

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

struct Subscriber {
    label: String,
    notify: Arc<Notify>,
}

/// Owns every subscriber registered against a single database instance.
pub struct SubscriberRegistry {
    subscribers: Mutex<Vec<Subscriber>>,
    debounce: Duration,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::with_debounce(DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(debounce: Duration) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            debounce,
        }
    }

    /// Register `callback` under `label`. `callback` runs on its own task,
    /// at most once per debounce window, after the most recent `notify()`.
    pub fn register<F>(&self, label: impl Into<String>, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let notify = Arc::new(Notify::new());
        let debounce = self.debounce;
        let task_notify = Arc::clone(&notify);

        tokio::spawn(async move {
            loop {
                task_notify.notified().await;
                loop {
                    tokio::select! {
                        _ = task_notify.notified() => continue,
                        _ = tokio::time::sleep(debounce) => break,
                    }
                }
                callback();
            }
        });

        self.subscribers.lock().push(Subscriber {
            label: label.into(),
            notify,
        });
    }

    pub fn unsubscribe(&self, label: &str) {
        self.subscribers.lock().retain(|s| s.label != label);
    }

    /// Wake every registered subscriber's debounce timer.
    pub fn notify(&self) {
        for s in self.subscribers.lock().iter() {
            s.notify.notify_one();
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}
