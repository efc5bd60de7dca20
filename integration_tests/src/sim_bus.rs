use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};

use copen_common::{
    traits::{Bus, BusMode, CanSendError, FrameListener, FrameRouter, ListenerId, TxStatus},
    BusFrame, BusId, CanId, CanMessage,
};

/// Something on a simulated bus which may answer frames sent by the master
///
/// Closures taking a frame and returning the replies can be used as peers.
pub trait Peer: Send {
    /// Handle a frame sent by the master, returning any frames sent in response
    fn on_frame(&mut self, msg: &CanMessage) -> Vec<CanMessage>;
}

impl<F> Peer for F
where
    F: FnMut(&CanMessage) -> Vec<CanMessage> + Send,
{
    fn on_frame(&mut self, msg: &CanMessage) -> Vec<CanMessage> {
        self(msg)
    }
}

/// Delivers frames injected on any [`SimBus`] to the registered listeners
#[derive(Default)]
pub struct SimRouter {
    listeners: Mutex<Vec<(ListenerId, FrameListener)>>,
    next_id: AtomicU64,
}

impl SimRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver a frame to every listener
    pub fn inject(&self, frame: BusFrame) {
        // Call listeners without holding the lock so they may (de)register
        let listeners: Vec<FrameListener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(frame);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }
}

impl FrameRouter for SimRouter {
    fn register_listener(&self, listener: FrameListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().unwrap().push((id, listener));
        id
    }

    fn deregister_listener(&self, id: ListenerId) {
        self.listeners.lock().unwrap().retain(|(l, _)| *l != id);
    }
}

/// An in-memory CAN interface
///
/// Every frame written by the master is recorded and handed to the peers. Their replies are
/// injected into the router as received on this bus.
pub struct SimBus {
    id: BusId,
    name: String,
    router: Arc<SimRouter>,
    mode: Mutex<BusMode>,
    fail_writes: AtomicUsize,
    sent: Mutex<Vec<CanMessage>>,
    peers: Mutex<Vec<Box<dyn Peer>>>,
}

impl SimBus {
    pub fn new(id: u8, router: &Arc<SimRouter>) -> Arc<Self> {
        Arc::new(Self {
            id: BusId(id),
            name: format!("can{id}"),
            router: router.clone(),
            mode: Mutex::new(BusMode::Active),
            fail_writes: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            peers: Mutex::new(Vec::new()),
        })
    }

    pub fn add_peer(&self, peer: impl Peer + 'static) {
        self.peers.lock().unwrap().push(Box::new(peer));
    }

    pub fn set_mode(&self, mode: BusMode) {
        *self.mode.lock().unwrap() = mode;
    }

    /// Make the next `count` writes fail
    pub fn fail_next_writes(&self, count: usize) {
        self.fail_writes.store(count, Ordering::Relaxed);
    }

    /// Deliver a frame to the master as if a node had sent it
    pub fn inject(&self, msg: impl Into<CanMessage>) {
        self.router.inject(BusFrame::new(self.id, msg.into()));
    }

    /// All frames written so far
    pub fn sent(&self) -> Vec<CanMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// The frames written with a given standard ID
    pub fn sent_with_id(&self, id: u16) -> Vec<CanMessage> {
        self.sent()
            .into_iter()
            .filter(|msg| msg.id() == CanId::Std(id))
            .collect()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl Bus for SimBus {
    fn id(&self) -> BusId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, msg: CanMessage) -> Result<TxStatus, CanSendError> {
        let failed = self
            .fail_writes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(CanSendError(msg));
        }

        log::trace!("{} tx: {:?}", self.name, msg);
        self.sent.lock().unwrap().push(msg);

        let replies: Vec<CanMessage> = self
            .peers
            .lock()
            .unwrap()
            .iter_mut()
            .flat_map(|peer| peer.on_frame(&msg))
            .collect();
        for reply in replies {
            self.inject(reply);
        }
        Ok(TxStatus::Delivered)
    }

    fn power_mode(&self) -> BusMode {
        *self.mode.lock().unwrap()
    }
}
