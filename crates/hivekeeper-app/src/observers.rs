//! Ready-made [`Observer`] implementations

use tokio::sync::mpsc;

use hivekeeper_core::prelude::*;
use hivekeeper_core::ServiceEvent;

use crate::broadcaster::Observer;

/// Forwards events into an unbounded channel.
///
/// A dropped receiver makes every later delivery fail, which the broadcaster
/// logs; unregister the observer to silence it.
pub struct ChannelObserver {
    name: String,
    tx: mpsc::UnboundedSender<ServiceEvent>,
}

impl ChannelObserver {
    pub fn new(name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<ServiceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                name: name.into(),
                tx,
            },
            rx,
        )
    }
}

impl Observer for ChannelObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&self, event: &ServiceEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| Error::observer_delivery(format!("{} receiver dropped", self.name)))
    }
}

/// Wraps a closure
pub struct FnObserver<F> {
    name: String,
    f: F,
}

impl<F> FnObserver<F>
where
    F: Fn(&ServiceEvent) -> Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Observer for FnObserver<F>
where
    F: Fn(&ServiceEvent) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&self, event: &ServiceEvent) -> Result<()> {
        (self.f)(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_observer_forwards() {
        let (observer, mut rx) = ChannelObserver::new("window-1");
        observer.deliver(&ServiceEvent::ServiceStarted).unwrap();
        assert_eq!(rx.try_recv().unwrap(), ServiceEvent::ServiceStarted);
        assert_eq!(observer.name(), "window-1");
    }

    #[test]
    fn test_channel_observer_closed_receiver_is_an_error() {
        let (observer, rx) = ChannelObserver::new("window-2");
        drop(rx);
        let err = observer.deliver(&ServiceEvent::ServiceFailed).unwrap_err();
        assert!(matches!(err, Error::ObserverDelivery { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_fn_observer() {
        let observer = FnObserver::new("count", |event: &ServiceEvent| {
            if matches!(event, ServiceEvent::DownloadError { .. }) {
                Err(Error::observer_delivery("rejected"))
            } else {
                Ok(())
            }
        });
        assert!(observer.deliver(&ServiceEvent::ServiceStarting).is_ok());
        assert!(observer
            .deliver(&ServiceEvent::download_error("404"))
            .is_err());
    }
}
