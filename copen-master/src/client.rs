//! The API used by applications to run jobs on a worker
use std::sync::{Arc, Mutex};

use copen_common::{
    messages::{NmtCommand, NmtState},
    traits::Bus,
    BusId,
};
use crossbeam::channel::Receiver;

use crate::{
    config::JobDefaults,
    job::{ClientId, Job},
    master::{Master, MasterError, WorkerHandle},
    result::{JobError, JobResult},
    worker::Worker,
};

/// Error returned when a job is submitted to a full queue, handing the job back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueFullError(pub Job);

impl core::fmt::Display for QueueFullError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Queue full, {} job rejected", self.0.kind)
    }
}

impl std::error::Error for QueueFullError {}

/// A non-blocking client
///
/// Jobs are queued with [`submit`](Self::submit) and the finished jobs collected with
/// [`poll_completed`](Self::poll_completed), in the order they were submitted. Results are
/// dropped if more than the configured number of finished jobs are left uncollected.
///
/// The client is detached from its worker when dropped. Jobs it submitted which have not started
/// yet are then skipped, and the results of jobs in progress are discarded.
pub struct AsyncClient {
    worker: Arc<Worker>,
    id: ClientId,
    results: Receiver<Job>,
    defaults: JobDefaults,
}

impl core::fmt::Debug for AsyncClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AsyncClient")
            .field("bus", &self.worker.bus_id())
            .field("id", &self.id)
            .finish()
    }
}

impl AsyncClient {
    /// Attach a new client to a worker
    pub fn new(handle: &WorkerHandle) -> Self {
        Self::with_queue_size(handle, handle.client_queue_size)
    }

    fn with_queue_size(handle: &WorkerHandle, queue_size: usize) -> Self {
        let (id, results) = handle.worker.attach(queue_size);
        Self {
            worker: handle.worker.clone(),
            id,
            results,
            defaults: handle.defaults,
        }
    }

    /// The ID of this client
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// The bus this client sends to
    pub fn bus_id(&self) -> BusId {
        self.worker.bus_id()
    }

    /// The timeouts and try counts applied by the job helpers
    pub fn defaults(&self) -> &JobDefaults {
        &self.defaults
    }

    /// Queue a job without blocking
    ///
    /// On success the job is owned by the worker until it shows up in
    /// [`poll_completed`](Self::poll_completed).
    pub fn submit(&self, mut job: Job) -> Result<(), QueueFullError> {
        job.client = Some(self.id);
        job.result = JobResult::Waiting;
        job.try_count = 0;
        self.worker.submit(job).map_err(|mut job| {
            job.result = JobResult::QueueFull;
            QueueFullError(job)
        })
    }

    /// Get the next finished job, if there is one
    pub fn poll_completed(&self) -> Option<Job> {
        self.results.try_recv().ok()
    }

    /// Queue an NMT command with the default policy
    pub fn send_nmt(
        &self,
        node: u8,
        command: NmtCommand,
        wait_for_state: bool,
    ) -> Result<(), QueueFullError> {
        self.submit(Job::send_nmt(node, command, wait_for_state).with_defaults(&self.defaults))
    }

    /// Queue a heartbeat wait with the default policy
    pub fn receive_heartbeat(&self, node: u8) -> Result<(), QueueFullError> {
        self.submit(Job::receive_heartbeat(node).with_defaults(&self.defaults))
    }

    /// Queue an SDO read with the default policy
    pub fn read_sdo(
        &self,
        node: u8,
        index: u16,
        sub: u8,
        capacity: usize,
    ) -> Result<(), QueueFullError> {
        self.submit(Job::read_sdo(node, index, sub, capacity).with_defaults(&self.defaults))
    }

    /// Queue an SDO write with the default policy
    pub fn write_sdo(&self, node: u8, index: u16, sub: u8, data: &[u8]) -> Result<(), QueueFullError> {
        self.submit(Job::write_sdo(node, index, sub, data).with_defaults(&self.defaults))
    }
}

impl Drop for AsyncClient {
    fn drop(&mut self) {
        self.worker.detach(self.id);
    }
}

/// A blocking client
///
/// [`execute`](Self::execute) submits a job and waits for it to finish. The wait is bounded by the
/// job's own timeout and try count. Calls from several threads sharing one client are executed one
/// after the other.
#[derive(Debug)]
pub struct Client {
    inner: AsyncClient,
    lock: Mutex<()>,
}

impl Client {
    /// Attach a new client to the worker for `bus`, starting a session if needed
    pub fn new(master: &Master, bus: Arc<dyn Bus>) -> Result<Self, MasterError> {
        Ok(Self::from_handle(&master.start_session(bus)?))
    }

    /// Attach a new client to a running worker
    pub fn from_handle(handle: &WorkerHandle) -> Self {
        Self {
            inner: AsyncClient::with_queue_size(handle, 1),
            lock: Mutex::new(()),
        }
    }

    /// The ID of this client
    pub fn id(&self) -> ClientId {
        self.inner.id()
    }

    /// The bus this client sends to
    pub fn bus_id(&self) -> BusId {
        self.inner.bus_id()
    }

    /// The timeouts and try counts applied by the job helpers
    pub fn defaults(&self) -> &JobDefaults {
        self.inner.defaults()
    }

    /// Run a job and return it with its result
    ///
    /// The result is `QueueFull` if the worker queue had no room, and `Waiting` if the session
    /// was stopped before the job finished.
    pub fn execute(&self, job: Job) -> Job {
        let _guard = self.lock.lock().unwrap();
        let mut pending = job.clone();
        if let Err(QueueFullError(job)) = self.inner.submit(job) {
            return job;
        }
        match self.inner.results.recv() {
            Ok(job) => job,
            Err(_) => {
                pending.result = JobResult::Waiting;
                pending
            }
        }
    }

    /// Send an NMT command, optionally waiting for the node to confirm the new state
    pub fn send_nmt(
        &self,
        node: u8,
        command: NmtCommand,
        wait_for_state: bool,
    ) -> Result<(), JobError> {
        let job = Job::send_nmt(node, command, wait_for_state).with_defaults(self.defaults());
        self.execute(job).result.into_result()
    }

    /// Wait for the next heartbeat of a node, returning the reported state
    pub fn receive_heartbeat(&self, node: u8) -> Result<NmtState, JobError> {
        let job = self.execute(Job::receive_heartbeat(node).with_defaults(self.defaults()));
        job.result.into_result()?;
        job.heartbeat_state().ok_or(JobError::NotComplete)
    }

    /// Read up to `capacity` bytes from an object
    pub fn read_sdo(
        &self,
        node: u8,
        index: u16,
        sub: u8,
        capacity: usize,
    ) -> Result<Vec<u8>, JobError> {
        let job = self.execute(Job::read_sdo(node, index, sub, capacity).with_defaults(self.defaults()));
        job.result.into_result()?;
        Ok(job.data().to_vec())
    }

    /// Write bytes to an object
    pub fn write_sdo(&self, node: u8, index: u16, sub: u8, data: &[u8]) -> Result<(), JobError> {
        let job = Job::write_sdo(node, index, sub, data).with_defaults(self.defaults());
        self.execute(job).result.into_result()
    }

    /// Write a numeric value to an object whose size is not known
    pub fn write_sdo_value(&self, node: u8, index: u16, sub: u8, value: u32) -> Result<(), JobError> {
        let job = Job::write_sdo_value(node, index, sub, value).with_defaults(self.defaults());
        self.execute(job).result.into_result()
    }
}
