//! Per-bus job execution
//!
//! A worker owns one thread, which takes jobs from a bounded FIFO and executes them one at a
//! time. Frames received on the worker's bus are passed to [`Worker::handle_frame`] by the
//! master's dispatch thread: a frame carrying the identifier the active job waits for is put
//! into a single-slot response channel, and every frame is inspected for heartbeat and EMCY
//! content.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use copen_common::{
    messages::CanOpenMessage,
    traits::{Bus, BusMode},
    AtomicCell, BusId, CanId, CanMessage,
};
use crossbeam::channel::{bounded, select, Receiver, Sender, TrySendError};

use crate::{
    config::MasterConfig,
    events::{EventBus, MasterEvent},
    job::{ClientId, Job, JobKind},
    node_metrics::NodeMetricsRegistry,
    result::JobResult,
    status::WorkerStatus,
};

mod nmt;
mod sdo_transfer;

#[derive(Debug, Default)]
struct WorkerStats {
    processed: AtomicCell<u32>,
    timeouts: AtomicCell<u32>,
    errors: AtomicCell<u32>,
    nmt_received: AtomicCell<u32>,
    emcy_received: AtomicCell<u32>,
}

/// The state of one bus session, shared between the worker thread, the dispatch thread and
/// clients
pub(crate) struct Worker {
    bus: Arc<dyn Bus>,
    retry_delay: Duration,
    job_tx: Sender<Job>,
    clients: Mutex<HashMap<ClientId, Sender<Job>>>,
    next_client_id: AtomicCell<u64>,
    /// The identifier the active job waits for
    awaiting: AtomicCell<Option<u16>>,
    response_tx: Sender<CanMessage>,
    response_rx: Receiver<CanMessage>,
    running: AtomicCell<bool>,
    stats: WorkerStats,
    metrics: Arc<NodeMetricsRegistry>,
    events: Arc<EventBus>,
}

impl core::fmt::Debug for Worker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Worker")
            .field("bus", &self.bus_id())
            .field("name", &self.bus_name())
            .field("awaiting", &self.awaiting.load())
            .field("running", &self.running.load())
            .finish_non_exhaustive()
    }
}

/// Controls the thread of a running worker
#[derive(Debug)]
pub(crate) struct WorkerThread {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

impl WorkerThread {
    /// Stop the thread after its current job, and wait for it to exit
    pub fn stop(self) {
        drop(self.shutdown);
        if self.handle.join().is_err() {
            log::error!("Worker thread panicked");
        }
    }
}

impl Worker {
    /// Create a worker for `bus` and start its thread
    pub fn spawn(
        bus: Arc<dyn Bus>,
        config: &MasterConfig,
        events: Arc<EventBus>,
    ) -> std::io::Result<(Arc<Worker>, WorkerThread)> {
        let (job_tx, job_rx) = bounded(config.job_queue_size);
        let (response_tx, response_rx) = bounded(1);
        let (shutdown_tx, shutdown_rx) = bounded(0);

        let worker = Arc::new(Worker {
            metrics: Arc::new(NodeMetricsRegistry::new(bus.name())),
            bus,
            retry_delay: config.retry_delay(),
            job_tx,
            clients: Mutex::new(HashMap::new()),
            next_client_id: AtomicCell::new(0),
            awaiting: AtomicCell::new(None),
            response_tx,
            response_rx,
            running: AtomicCell::new(true),
            stats: WorkerStats::default(),
            events,
        });

        let thread_worker = worker.clone();
        let handle = thread::Builder::new()
            .name(format!("copen-{}", worker.bus.name()))
            .spawn(move || thread_worker.run(job_rx, shutdown_rx))?;

        Ok((
            worker,
            WorkerThread {
                shutdown: shutdown_tx,
                handle,
            },
        ))
    }

    pub fn bus_id(&self) -> BusId {
        self.bus.id()
    }

    pub fn bus_name(&self) -> &str {
        self.bus.name()
    }

    pub fn is_running(&self) -> bool {
        self.running.load()
    }

    pub fn metrics(&self) -> &Arc<NodeMetricsRegistry> {
        &self.metrics
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            bus: self.bus_id(),
            name: self.bus_name().to_string(),
            clients: self.client_count(),
            jobs_waiting: self.job_tx.len(),
            jobs_processed: self.stats.processed.load(),
            timeouts: self.stats.timeouts.load(),
            other_errors: self.stats.errors.load(),
            nmt_received: self.stats.nmt_received.load(),
            emcy_received: self.stats.emcy_received.load(),
        }
    }

    /// Register a client, returning its ID and the channel its finished jobs are posted to
    pub fn attach(&self, queue_size: usize) -> (ClientId, Receiver<Job>) {
        let id = ClientId(self.next_client_id.fetch_add(1));
        let (tx, rx) = bounded(queue_size);
        self.clients.lock().unwrap().insert(id, tx);
        (id, rx)
    }

    pub fn detach(&self, id: ClientId) {
        self.clients.lock().unwrap().remove(&id);
    }

    fn is_attached(&self, id: ClientId) -> bool {
        self.clients.lock().unwrap().contains_key(&id)
    }

    /// Enqueue a job without blocking, handing it back if the queue is full or the worker stopped
    pub fn submit(&self, job: Job) -> Result<(), Job> {
        match self.job_tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => {
                log::warn!("{}: job queue full, rejecting {} job", self.bus_name(), job.kind);
                Err(job)
            }
            Err(TrySendError::Disconnected(job)) => {
                log::warn!("{}: worker stopped, rejecting {} job", self.bus_name(), job.kind);
                Err(job)
            }
        }
    }

    fn run(self: Arc<Self>, jobs: Receiver<Job>, shutdown: Receiver<()>) {
        log::info!("{}: worker started", self.bus_name());
        loop {
            select! {
                recv(jobs) -> job => match job {
                    Ok(job) => self.process(job),
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
            }
        }
        self.running.store(false);
        // Wake up any client still blocked on a result
        self.clients.lock().unwrap().clear();
        log::info!("{}: worker stopped", self.bus_name());
    }

    fn process(&self, mut job: Job) {
        let Some(client) = job.client.filter(|id| self.is_attached(*id)) else {
            log::warn!(
                "{}: dropping {} job, client has detached",
                self.bus_name(),
                job.kind
            );
            return;
        };

        log::trace!("{}: processing {} job", self.bus_name(), job.kind);
        self.awaiting
            .store((job.rx_id != 0).then_some(job.rx_id));
        job.result = self.execute(&mut job);
        self.awaiting.store(None);
        log::trace!(
            "{}: {} job finished: {}",
            self.bus_name(),
            job.kind,
            job.result_description()
        );

        self.stats.processed.fetch_add(1);
        match job.result {
            JobResult::Ok => (),
            JobResult::Timeout => {
                self.stats.timeouts.fetch_add(1);
            }
            _ => {
                self.stats.errors.fetch_add(1);
            }
        }

        self.post(client, job);
    }

    fn execute(&self, job: &mut Job) -> JobResult {
        job.try_count = 0;
        if job.max_tries == 0 {
            return JobResult::ParamRange;
        }

        let Job {
            kind,
            tx_id,
            rx_id,
            timeout,
            max_tries,
            try_count,
            ..
        } = job;
        let mut link = Link {
            worker: self,
            tx_id: *tx_id,
            rx_id: *rx_id,
            timeout: *timeout,
            max_tries: *max_tries,
            try_count,
        };

        match kind {
            JobKind::None => JobResult::Ok,
            JobKind::SendNmt(nmt) => nmt::send_nmt(&mut link, nmt),
            JobKind::ReceiveHeartbeat(hb) => nmt::receive_heartbeat(&mut link, hb),
            JobKind::ReadSdo(sdo) => sdo_transfer::upload(&mut link, sdo),
            JobKind::WriteSdo(sdo) => sdo_transfer::download(&mut link, sdo),
        }
    }

    fn post(&self, client: ClientId, job: Job) {
        let clients = self.clients.lock().unwrap();
        let Some(tx) = clients.get(&client) else {
            log::warn!(
                "{}: discarding result of {} job, client has detached",
                self.bus_name(),
                job.kind
            );
            return;
        };
        match tx.try_send(job) {
            Ok(()) => (),
            Err(TrySendError::Full(job)) => log::warn!(
                "{}: discarding result of {} job, client queue full",
                self.bus_name(),
                job.kind
            ),
            Err(TrySendError::Disconnected(job)) => log::warn!(
                "{}: discarding result of {} job, client is gone",
                self.bus_name(),
                job.kind
            ),
        }
    }

    /// Handle a frame received on this worker's bus
    pub fn handle_frame(&self, msg: CanMessage) {
        if let Some(expected) = self.awaiting.load() {
            if msg.id() == CanId::Std(expected) && self.response_tx.try_send(msg).is_err() {
                log::trace!(
                    "{}: response slot occupied, dropping {:?}",
                    self.bus_name(),
                    msg
                );
            }
        }
        self.observe(msg);
    }

    /// Update node metrics from heartbeat and EMCY frames
    fn observe(&self, msg: CanMessage) {
        match CanOpenMessage::try_from(msg) {
            Ok(CanOpenMessage::Heartbeat(hb)) => {
                self.stats.nmt_received.fetch_add(1);
                let node = self.metrics.get_or_create(hb.node);
                if let Some(previous) = node.update_state(hb.state) {
                    log::trace!(
                        "{} node {} new state: {}",
                        self.bus_name(),
                        hb.node,
                        hb.state
                    );
                    self.events.publish(MasterEvent::NodeState {
                        bus: self.bus_id(),
                        node: hb.node,
                        state: hb.state,
                        previous,
                    });
                }
            }
            Ok(CanOpenMessage::Emergency(emcy)) => {
                self.stats.emcy_received.fetch_add(1);
                log::trace!(
                    "{} node {} emergency: code=0x{:04x} type=0x{:02x} data: {:02x?}",
                    self.bus_name(),
                    emcy.node,
                    emcy.error_code,
                    emcy.error_register,
                    emcy.data
                );
                self.metrics.get_or_create(emcy.node).update_emergency(&emcy);
                self.events.publish(MasterEvent::NodeEmergency {
                    bus: self.bus_id(),
                    emergency: emcy,
                });
            }
            _ => (),
        }
    }

    fn can_transmit(&self) -> bool {
        self.bus.power_mode() == BusMode::Active
    }

    fn transmit(&self, msg: CanMessage) -> bool {
        match self.bus.write(msg) {
            Ok(_) => true,
            Err(e) => {
                log::debug!("{}: {e}", self.bus_name());
                false
            }
        }
    }

    fn flush_responses(&self) {
        while self.response_rx.try_recv().is_ok() {}
    }
}

/// The request/response channel of the active job, with its retry policy
pub(super) struct Link<'a> {
    worker: &'a Worker,
    tx_id: u16,
    rx_id: u16,
    timeout: Duration,
    max_tries: u8,
    try_count: &'a mut u8,
}

impl Link<'_> {
    fn can_transmit(&self) -> bool {
        self.worker.can_transmit()
    }

    fn message(&self, payload: &[u8]) -> CanMessage {
        CanMessage::new(CanId::Std(self.tx_id), payload)
    }

    /// Send a single frame, without retries
    fn send(&self, msg: CanMessage) -> bool {
        self.worker.transmit(msg)
    }

    fn start_try(&mut self) {
        if *self.try_count > 0 {
            thread::sleep(self.worker.retry_delay);
        }
        *self.try_count += 1;
    }

    /// Send a frame which expects no response, retrying only if the bus rejects it
    fn send_with_retries(&mut self, msg: CanMessage) -> bool {
        *self.try_count = 0;
        while *self.try_count < self.max_tries {
            self.start_try();
            if self.send(msg) {
                return true;
            }
        }
        false
    }

    /// Send `request` (if any) and wait for a response frame which `accept` agrees with
    ///
    /// Each try waits up to the timeout. Frames which are not accepted do not end a try early.
    /// Returns `None` once all tries have passed without an accepted response.
    fn transact(
        &mut self,
        request: Option<CanMessage>,
        mut accept: impl FnMut(&CanMessage) -> bool,
    ) -> Option<CanMessage> {
        *self.try_count = 0;
        while *self.try_count < self.max_tries {
            self.start_try();
            self.worker.flush_responses();
            if let Some(msg) = request {
                if !self.send(msg) {
                    continue;
                }
            }
            let deadline = Instant::now() + self.timeout;
            while let Ok(msg) = self.worker.response_rx.recv_deadline(deadline) {
                if accept(&msg) {
                    return Some(msg);
                }
            }
        }
        None
    }
}
