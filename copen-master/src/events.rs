//! Notifications about worker lifecycle and node activity
use std::sync::Mutex;

use copen_common::{
    messages::{Emergency, NmtState},
    BusId,
};
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};

/// An event published by a [`Master`](crate::Master)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MasterEvent {
    /// A session was started on a bus
    WorkerStarted {
        /// The bus
        bus: BusId,
    },
    /// A session was stopped
    WorkerStopped {
        /// The bus
        bus: BusId,
    },
    /// A node reported a state different from the last one seen
    NodeState {
        /// The bus the heartbeat was received on
        bus: BusId,
        /// The node
        node: u8,
        /// The new state
        state: NmtState,
        /// The state seen before, if any
        previous: Option<NmtState>,
    },
    /// A node sent an emergency message
    NodeEmergency {
        /// The bus the message was received on
        bus: BusId,
        /// The message
        emergency: Emergency,
    },
}

/// Fan-out of events to any number of subscribers
///
/// Each subscriber gets its own bounded channel. Publishing never blocks: when a subscriber is not
/// keeping up, events for it are dropped.
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    senders: Mutex<Vec<Sender<MasterEvent>>>,
}

impl EventBus {
    pub fn subscribe(&self, capacity: usize) -> Receiver<MasterEvent> {
        let (tx, rx) = bounded(capacity);
        self.senders.lock().unwrap().push(tx);
        rx
    }

    pub fn publish(&self, event: MasterEvent) {
        let mut senders = self.senders.lock().unwrap();
        senders.retain(|sender| match sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!("Dropped event due to overflow: {event:?}");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    /// Get the number of current subscribers
    #[cfg(test)]
    pub fn num_subscribers(&self) -> usize {
        self.senders.lock().unwrap().len()
    }
}
