use patchsync_connection::PatchId;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    /// A full fetch swapped in a new collection.
    PatchesReplaced { count: usize },
    /// One patch was refreshed in place or appended.
    PatchUpdated { id: PatchId },
    PatchesReset,
    /// The derived checked-out patch changed. `None` when nothing matches.
    CheckedOutPatchChanged { id: Option<PatchId> },
}

pub trait StoreObserver: Send + Sync {
    fn on_event(&self, event: &StoreEvent);
}

impl<F> StoreObserver for F
where
    F: Fn(&StoreEvent) + Send + Sync,
{
    fn on_event(&self, event: &StoreEvent) {
        self(event);
    }
}

pub type SharedStoreObserver = Arc<dyn StoreObserver>;
pub type StoreEventSender = mpsc::UnboundedSender<StoreEvent>;
pub type StoreEventReceiver = mpsc::UnboundedReceiver<StoreEvent>;

pub fn store_event_channel() -> (StoreEventSender, StoreEventReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Clone, Default)]
pub(crate) struct StoreEventSink {
    observers: Vec<SharedStoreObserver>,
    senders: Vec<StoreEventSender>,
}

impl StoreEventSink {
    pub(crate) fn add_observer(&mut self, observer: SharedStoreObserver) {
        self.observers.push(observer);
    }

    pub(crate) fn add_sender(&mut self, sender: StoreEventSender) {
        self.senders.push(sender);
    }

    /// Delivers `event` to every subscriber. Runs on a cloned sink so no
    /// lock is held while observers execute.
    pub(crate) fn emit(&self, event: &StoreEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
        for sender in &self.senders {
            let _ = sender.send(event.clone());
        }
    }

    /// Drops senders whose receiver went away.
    pub(crate) fn prune_closed(&mut self) {
        self.senders.retain(|sender| !sender.is_closed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn observers_and_senders_both_receive_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observer_seen = Arc::clone(&seen);
        let mut sink = StoreEventSink::default();
        sink.add_observer(Arc::new(move |event: &StoreEvent| {
            observer_seen
                .lock()
                .expect("observer mutex should lock")
                .push(event.clone());
        }));
        let (tx, mut rx) = store_event_channel();
        sink.add_sender(tx);

        sink.emit(&StoreEvent::PatchesReplaced { count: 3 });

        assert_eq!(
            rx.try_recv().expect("channel should receive one event"),
            StoreEvent::PatchesReplaced { count: 3 }
        );
        assert_eq!(
            seen.lock().expect("observer mutex should lock").as_slice(),
            &[StoreEvent::PatchesReplaced { count: 3 }]
        );
    }

    #[test]
    fn closed_receivers_are_pruned() {
        let mut sink = StoreEventSink::default();
        let (tx, rx) = store_event_channel();
        sink.add_sender(tx);
        drop(rx);

        sink.emit(&StoreEvent::PatchesReset);
        assert_eq!(sink.senders.len(), 1);
        sink.prune_closed();
        assert!(sink.senders.is_empty());
    }
}
