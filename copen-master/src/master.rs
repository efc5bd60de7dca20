//! Session registry and inbound frame dispatch
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
    thread::{self, JoinHandle},
};

use copen_common::{
    traits::{Bus, FrameListener, FrameRouter, ListenerId},
    BusFrame, BusId,
};
use crossbeam::channel::{bounded, select, Receiver, Sender, TrySendError};
use snafu::{ResultExt, Snafu};

use crate::{
    config::{JobDefaults, MasterConfig},
    events::{EventBus, MasterEvent},
    node_metrics::NodeMetricsRegistry,
    status::{MasterStatus, WorkerStatus},
    worker::{Worker, WorkerThread},
};

/// Error returned by [`Master::start_session`]
#[derive(Debug, Snafu)]
pub enum MasterError {
    /// All worker slots are in use
    #[snafu(display("No free worker slot, at most {max} sessions can run"))]
    CapacityExceeded {
        /// The configured maximum
        max: usize,
    },
    /// A thread could not be started
    #[snafu(display("Failed to spawn thread: {source}"))]
    Spawn {
        /// The underlying error
        source: std::io::Error,
    },
}

/// Result of [`Master::stop_session`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// The session is no longer running
    Stopped,
    /// The session was kept because clients are still attached
    StillInUse {
        /// The number of attached clients
        clients: usize,
    },
}

/// A reference to a running worker, used to create clients
#[derive(Clone)]
pub struct WorkerHandle {
    pub(crate) worker: Arc<Worker>,
    pub(crate) client_queue_size: usize,
    pub(crate) defaults: JobDefaults,
}

impl core::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("bus", &self.worker.bus_id())
            .field("name", &self.worker.bus_name())
            .finish()
    }
}

impl WorkerHandle {
    /// The bus served by the worker
    pub fn bus_id(&self) -> BusId {
        self.worker.bus_id()
    }

    /// The bus name
    pub fn bus_name(&self) -> &str {
        self.worker.bus_name()
    }

    /// Number of attached clients
    pub fn client_count(&self) -> usize {
        self.worker.client_count()
    }

    /// False once the session has been stopped
    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Current counters
    pub fn status(&self) -> WorkerStatus {
        self.worker.status()
    }

    /// Metrics of the nodes seen on the bus
    pub fn node_metrics(&self) -> Arc<NodeMetricsRegistry> {
        self.worker.metrics().clone()
    }
}

type Routes = Arc<RwLock<HashMap<BusId, Arc<Worker>>>>;

fn route(routes: &Routes, frame: BusFrame) {
    if let Some(worker) = routes.read().unwrap().get(&frame.origin) {
        worker.handle_frame(frame.message);
    }
}

/// The thread moving frames from the router listener to the workers
#[derive(Debug)]
struct Dispatcher {
    listener: ListenerId,
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Dispatcher {
    fn spawn(router: &dyn FrameRouter, routes: Routes, queue_size: usize) -> std::io::Result<Self> {
        let (frame_tx, frame_rx) = bounded(queue_size);
        let (stop_tx, stop_rx): (Sender<()>, Receiver<()>) = bounded(0);

        let handle = thread::Builder::new()
            .name("copen-dispatch".into())
            .spawn(move || loop {
                select! {
                    recv(frame_rx) -> frame => match frame {
                        Ok(frame) => route(&routes, frame),
                        Err(_) => break,
                    },
                    recv(stop_rx) -> _ => break,
                }
            })?;

        let listener: FrameListener = Arc::new(move |frame: BusFrame| {
            if let Err(TrySendError::Full(frame)) = frame_tx.try_send(frame) {
                log::warn!("Dropped frame from {} due to overflow", frame.origin);
            }
        });
        let listener = router.register_listener(listener);

        Ok(Self {
            listener,
            stop: stop_tx,
            handle,
        })
    }

    fn stop(self, router: &dyn FrameRouter) {
        router.deregister_listener(self.listener);
        drop(self.stop);
        if self.handle.join().is_err() {
            log::error!("Dispatch thread panicked");
        }
    }
}

#[derive(Debug)]
struct Session {
    worker: Arc<Worker>,
    thread: WorkerThread,
}

struct MasterInner {
    router: Arc<dyn FrameRouter>,
    config: MasterConfig,
    sessions: Mutex<HashMap<BusId, Session>>,
    routes: Routes,
    dispatcher: Mutex<Option<Dispatcher>>,
    events: Arc<EventBus>,
}

impl Drop for MasterInner {
    fn drop(&mut self) {
        let sessions: Vec<Session> = match self.sessions.get_mut() {
            Ok(sessions) => sessions.drain().map(|(_, s)| s).collect(),
            Err(_) => return,
        };
        for session in sessions {
            session.thread.stop();
        }
        if let Ok(dispatcher) = self.dispatcher.get_mut() {
            if let Some(dispatcher) = dispatcher.take() {
                dispatcher.stop(self.router.as_ref());
            }
        }
    }
}

/// The registry of CANopen sessions, one per bus
///
/// The master registers a single listener with the frame router while at least one session is
/// running, and hands every received frame to the worker of the bus it came from. Frames from
/// buses without a session are dropped.
///
/// `Master` is cheap to clone; all clones refer to the same registry. Sessions are stopped when
/// the last clone is dropped.
#[derive(Clone)]
pub struct Master {
    inner: Arc<MasterInner>,
}

impl core::fmt::Debug for Master {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Master")
            .field("config", &self.inner.config)
            .field("sessions", &self.session_count())
            .finish()
    }
}

impl Master {
    /// Create a master receiving frames from `router`
    pub fn new(router: Arc<dyn FrameRouter>, config: MasterConfig) -> Self {
        Self {
            inner: Arc::new(MasterInner {
                router,
                config,
                sessions: Mutex::new(HashMap::new()),
                routes: Arc::new(RwLock::new(HashMap::new())),
                dispatcher: Mutex::new(None),
                events: Arc::new(EventBus::default()),
            }),
        }
    }

    /// The configuration in use
    pub fn config(&self) -> &MasterConfig {
        &self.inner.config
    }

    fn handle(&self, worker: Arc<Worker>) -> WorkerHandle {
        WorkerHandle {
            worker,
            client_queue_size: self.inner.config.client_queue_size,
            defaults: self.inner.config.defaults,
        }
    }

    /// Get the worker for `bus`, starting one if there is no session yet
    pub fn start_session(&self, bus: Arc<dyn Bus>) -> Result<WorkerHandle, MasterError> {
        let mut sessions = self.inner.sessions.lock().unwrap();
        let bus_id = bus.id();
        if let Some(session) = sessions.get(&bus_id) {
            log::debug!("{}: session already running", bus.name());
            return Ok(self.handle(session.worker.clone()));
        }

        let max = self.inner.config.max_workers;
        if sessions.len() >= max {
            return CapacityExceededSnafu { max }.fail();
        }

        {
            let mut dispatcher = self.inner.dispatcher.lock().unwrap();
            if dispatcher.is_none() {
                *dispatcher = Some(
                    Dispatcher::spawn(
                        self.inner.router.as_ref(),
                        self.inner.routes.clone(),
                        self.inner.config.rx_queue_size,
                    )
                    .context(SpawnSnafu)?,
                );
            }
        }

        let (worker, thread) =
            Worker::spawn(bus, &self.inner.config, self.inner.events.clone())
                .context(SpawnSnafu)?;
        self.inner
            .routes
            .write()
            .unwrap()
            .insert(bus_id, worker.clone());
        sessions.insert(
            bus_id,
            Session {
                worker: worker.clone(),
                thread,
            },
        );
        self.inner
            .events
            .publish(MasterEvent::WorkerStarted { bus: bus_id });
        Ok(self.handle(worker))
    }

    /// Stop the session on `bus` if no clients are attached
    ///
    /// A job in progress is completed first. Stopping a bus without a session succeeds.
    pub fn stop_session(&self, bus: BusId) -> StopOutcome {
        let mut sessions = self.inner.sessions.lock().unwrap();
        let clients = match sessions.get(&bus) {
            None => return StopOutcome::Stopped,
            Some(session) => session.worker.client_count(),
        };
        if clients > 0 {
            return StopOutcome::StillInUse { clients };
        }
        let Some(session) = sessions.remove(&bus) else {
            return StopOutcome::Stopped;
        };
        drop(sessions);

        // Frames keep flowing to the worker until its last job is done
        session.thread.stop();
        {
            let mut routes = self.inner.routes.write().unwrap();
            if routes
                .get(&bus)
                .is_some_and(|w| Arc::ptr_eq(w, &session.worker))
            {
                routes.remove(&bus);
            }
        }
        let dispatcher = {
            let sessions = self.inner.sessions.lock().unwrap();
            if sessions.is_empty() {
                self.inner.dispatcher.lock().unwrap().take()
            } else {
                None
            }
        };
        if let Some(dispatcher) = dispatcher {
            dispatcher.stop(self.inner.router.as_ref());
        }

        self.inner
            .events
            .publish(MasterEvent::WorkerStopped { bus });
        StopOutcome::Stopped
    }

    /// Hand a received frame to the worker of its bus
    ///
    /// Frames registered with the router arrive here through the dispatch thread; this method
    /// allows feeding frames from another source.
    pub fn route_frame(&self, frame: BusFrame) {
        route(&self.inner.routes, frame);
    }

    /// Get the worker for a bus, if a session is running
    pub fn worker(&self, bus: BusId) -> Option<WorkerHandle> {
        let sessions = self.inner.sessions.lock().unwrap();
        sessions
            .get(&bus)
            .map(|session| self.handle(session.worker.clone()))
    }

    /// The number of running sessions
    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().unwrap().len()
    }

    /// Metrics of the nodes seen on a bus, if a session is running
    pub fn node_metrics(&self, bus: BusId) -> Option<Arc<NodeMetricsRegistry>> {
        self.worker(bus).map(|w| w.node_metrics())
    }

    /// Take a snapshot of all sessions
    pub fn status(&self) -> MasterStatus {
        let sessions = self.inner.sessions.lock().unwrap();
        let mut workers: Vec<WorkerStatus> =
            sessions.values().map(|s| s.worker.status()).collect();
        workers.sort_by_key(|w| w.bus);
        MasterStatus { workers }
    }

    /// Receive [`MasterEvent`]s
    ///
    /// Events are dropped for a subscriber whose channel holds `capacity` unread events.
    pub fn subscribe(&self, capacity: usize) -> Receiver<MasterEvent> {
        self.inner.events.subscribe(capacity)
    }
}
