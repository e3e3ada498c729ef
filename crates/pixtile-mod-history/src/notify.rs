/// Change notification fan-out over `mpsc` channels.
use std::sync::mpsc::{self, Receiver, Sender};

/// Delivers cloned events to every live subscriber, in emission order.
///
/// Subscribers whose receiver was dropped are pruned on the next emit.
#[derive(Debug)]
pub struct EventBus<E> {
    senders: Vec<Sender<E>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            senders: Vec::new(),
        }
    }
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber.
    pub fn subscribe(&mut self) -> Receiver<E> {
        let (tx, rx) = mpsc::channel();
        self.senders.push(tx);
        rx
    }

    pub fn emit(&mut self, event: E) {
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_order() {
        let mut bus = EventBus::new();
        let rx = bus.subscribe();
        bus.emit(1);
        bus.emit(2);
        bus.emit(3);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_fan_out_to_all_subscribers() {
        let mut bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.emit("changed");
        assert_eq!(a.try_recv().unwrap(), "changed");
        assert_eq!(b.try_recv().unwrap(), "changed");
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let mut bus = EventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);
        bus.emit(7u8);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.try_recv().unwrap(), 7);
    }
}
