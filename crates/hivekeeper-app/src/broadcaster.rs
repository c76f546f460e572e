//! Event broadcaster: fan-out of lifecycle events to registered observers
//!
//! Observers are kept in a registry keyed by a monotonically increasing
//! token, so iteration order is registration order. A failing or panicking
//! observer is logged and skipped; it never prevents delivery to the others.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use hivekeeper_core::prelude::*;
use hivekeeper_core::ServiceEvent;

/// Receives lifecycle events.
///
/// `deliver` runs on the thread that committed the state change, so the
/// supervisor's queries already reflect `event` when it is called.
/// Implementations must not call `start()`/`stop()` from inside `deliver`.
pub trait Observer: Send + Sync {
    /// Label used in delivery failure logs
    fn name(&self) -> &str {
        "observer"
    }

    fn deliver(&self, event: &ServiceEvent) -> Result<()>;
}

/// Registration handle returned by [`EventBroadcaster::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverToken(u64);

impl ObserverToken {
    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Default)]
pub struct EventBroadcaster {
    next_token: AtomicU64,
    observers: RwLock<BTreeMap<u64, Arc<dyn Observer>>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Arc<dyn Observer>) -> ObserverToken {
        let id = self.next_token.fetch_add(1, Ordering::Relaxed);
        debug!("Registering observer '{}' as #{}", observer.name(), id);
        self.write_registry().insert(id, observer);
        ObserverToken(id)
    }

    /// Remove an observer. Returns false if the token was unknown.
    pub fn unregister(&self, token: ObserverToken) -> bool {
        let removed = self.write_registry().remove(&token.0).is_some();
        if removed {
            debug!("Unregistered observer #{}", token.id());
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every observer in registration order.
    ///
    /// Returns how many observers accepted the event.
    pub fn broadcast(&self, event: &ServiceEvent) -> usize {
        let observers = self.snapshot();
        let mut delivered = 0;

        for (id, observer) in observers {
            match catch_unwind(AssertUnwindSafe(|| observer.deliver(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!(
                    "Observer '{}' (#{}) failed to take {}: {}",
                    observer.name(),
                    id,
                    event.event_type(),
                    e
                ),
                Err(_) => error!(
                    "Observer '{}' (#{}) panicked while taking {}",
                    observer.name(),
                    id,
                    event.event_type()
                ),
            }
        }

        trace!("Delivered {} to {} observer(s)", event.event_type(), delivered);
        delivered
    }

    /// Registration changes during a broadcast apply from the next one
    fn snapshot(&self) -> Vec<(u64, Arc<dyn Observer>)> {
        let registry = match self.observers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        registry
            .iter()
            .map(|(id, observer)| (*id, Arc::clone(observer)))
            .collect()
    }

    fn write_registry(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<u64, Arc<dyn Observer>>> {
        match self.observers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observers::FnObserver;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &'static str) -> Arc<dyn Observer> {
        let log = Arc::clone(log);
        Arc::new(FnObserver::new(label, move |event: &ServiceEvent| {
            log.lock()
                .unwrap()
                .push(format!("{}:{}", label, event.event_type()));
            Ok(())
        }))
    }

    #[test]
    fn test_delivers_in_registration_order() {
        let broadcaster = EventBroadcaster::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        broadcaster.register(recorder(&log, "a"));
        broadcaster.register(recorder(&log, "b"));
        broadcaster.register(recorder(&log, "c"));

        assert_eq!(broadcaster.broadcast(&ServiceEvent::ServiceStarting), 3);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "a:service_starting",
                "b:service_starting",
                "c:service_starting"
            ]
        );
    }

    #[test]
    fn test_failing_observer_does_not_block_others() {
        for n in 2..=6usize {
            for failing in 0..n {
                let broadcaster = EventBroadcaster::new();
                let log = Arc::new(Mutex::new(Vec::new()));

                for i in 0..n {
                    if i == failing {
                        broadcaster.register(Arc::new(FnObserver::new("broken", |_: &ServiceEvent| {
                            Err(Error::observer_delivery("window closed"))
                        })));
                    } else {
                        broadcaster.register(recorder(&log, "ok"));
                    }
                }

                assert_eq!(broadcaster.broadcast(&ServiceEvent::ServiceFailed), n - 1);
                assert_eq!(log.lock().unwrap().len(), n - 1);
            }
        }
    }

    #[test]
    fn test_panicking_observer_is_contained() {
        let broadcaster = EventBroadcaster::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        broadcaster.register(Arc::new(FnObserver::new("panics", |_: &ServiceEvent| {
            panic!("observer bug")
        })));
        broadcaster.register(recorder(&log, "after"));

        assert_eq!(broadcaster.broadcast(&ServiceEvent::ServiceStarted), 1);
        assert_eq!(*log.lock().unwrap(), vec!["after:service_started"]);
    }

    #[test]
    fn test_unregister() {
        let broadcaster = EventBroadcaster::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = broadcaster.register(recorder(&log, "first"));
        let second = broadcaster.register(recorder(&log, "second"));
        assert!(first < second);
        assert_ne!(first.id(), second.id());

        assert!(broadcaster.unregister(first));
        assert!(!broadcaster.unregister(first));
        assert_eq!(broadcaster.len(), 1);

        broadcaster.broadcast(&ServiceEvent::ServiceStopping);
        assert_eq!(*log.lock().unwrap(), vec!["second:service_stopping"]);
    }

    #[test]
    fn test_broadcast_without_observers() {
        let broadcaster = EventBroadcaster::new();
        assert!(broadcaster.is_empty());
        assert_eq!(broadcaster.broadcast(&ServiceEvent::ServiceStarting), 0);
    }
}
