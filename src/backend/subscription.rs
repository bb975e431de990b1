use tokio::sync::mpsc;

use crate::common::InsertEvent;

/// Buffer between the backend and a listener task.
pub const EVENT_BUFFER: usize = 100;

type Release = Box<dyn FnOnce() + Send>;

/// A live stream of insert events from one table.
///
/// Dropping the subscription releases it; `split` hands the event receiver to
/// a listener task while the owner keeps the guard.
pub struct Subscription {
    guard: SubscriptionGuard,
    events: mpsc::Receiver<InsertEvent>,
}

impl Subscription {
    pub fn new(
        key: impl Into<String>,
        events: mpsc::Receiver<InsertEvent>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            guard: SubscriptionGuard {
                key: key.into(),
                release: Some(Box::new(release)),
            },
            events,
        }
    }

    #[cfg(test)]
    pub async fn next(&mut self) -> Option<InsertEvent> {
        self.events.recv().await
    }

    pub fn split(self) -> (SubscriptionGuard, mpsc::Receiver<InsertEvent>) {
        (self.guard, self.events)
    }

    #[cfg(test)]
    pub fn unsubscribe(self) {
        drop(self);
    }
}

/// Owner side of a subscription; releases the backend resources exactly once.
pub struct SubscriptionGuard {
    key: String,
    release: Option<Release>,
}

impl SubscriptionGuard {
    #[cfg(test)]
    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }

    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            log::debug!("Releasing subscription {}", self.key);
            release();
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn release_runs_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let (_tx, rx) = mpsc::channel(1);
        let subscription = Subscription::new("k", rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (mut guard, _events) = subscription.split();
        guard.release();
        guard.release();
        assert!(guard.is_released());
        drop(guard);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
