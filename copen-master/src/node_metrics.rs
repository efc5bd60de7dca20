//! Per node state and emergency metrics, discovered from heartbeat and EMCY traffic
//!
//! Entries are created on the first frame seen from a node and never removed. Each value is held
//! in its own [`AtomicCell`], so readers never block the worker, but a snapshot taken while a
//! frame is being processed may mix old and new values.
use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use copen_common::{
    messages::{Emergency, NmtState},
    AtomicCell,
};

/// Metric names for one node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricNames {
    /// The NMT state, as a string
    pub state: String,
    /// The last EMCY error code
    pub emcy_code: String,
    /// The error register of the last EMCY
    pub emcy_type: String,
}

impl MetricNames {
    fn new(bus_name: &str, node: u8) -> Self {
        let prefix = format!("co.{bus_name}.nd{node}");
        Self {
            state: format!("{prefix}.state"),
            emcy_code: format!("{prefix}.emcy.code"),
            emcy_type: format!("{prefix}.emcy.type"),
        }
    }
}

/// A point in time copy of a node's metrics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeSnapshot {
    /// The node ID
    pub node: u8,
    /// Last reported NMT state
    pub state: Option<NmtState>,
    /// When the last heartbeat was received
    pub last_heartbeat: Option<Instant>,
    /// Error code of the last EMCY
    pub emcy_code: Option<u16>,
    /// Error register of the last EMCY
    pub emcy_type: Option<u8>,
    /// Manufacturer data of the last EMCY
    pub emcy_data: [u8; 5],
}

/// The metrics of one node
#[derive(Debug)]
pub struct NodeMetrics {
    node: u8,
    names: MetricNames,
    state: AtomicCell<Option<NmtState>>,
    last_heartbeat: AtomicCell<Option<Instant>>,
    emcy_code: AtomicCell<Option<u16>>,
    emcy_type: AtomicCell<Option<u8>>,
    emcy_data: AtomicCell<[u8; 5]>,
}

impl NodeMetrics {
    fn new(bus_name: &str, node: u8) -> Self {
        Self {
            node,
            names: MetricNames::new(bus_name, node),
            state: AtomicCell::new(None),
            last_heartbeat: AtomicCell::new(None),
            emcy_code: AtomicCell::new(None),
            emcy_type: AtomicCell::new(None),
            emcy_data: AtomicCell::new([0; 5]),
        }
    }

    /// The node ID
    pub fn node(&self) -> u8 {
        self.node
    }

    /// The names these metrics are published under
    pub fn names(&self) -> &MetricNames {
        &self.names
    }

    /// Last reported NMT state
    pub fn state(&self) -> Option<NmtState> {
        self.state.load()
    }

    /// The state metric value, or an empty string before the first heartbeat
    pub fn state_string(&self) -> String {
        self.state().map(|s| s.to_string()).unwrap_or_default()
    }

    /// Error code of the last EMCY
    pub fn emcy_code(&self) -> Option<u16> {
        self.emcy_code.load()
    }

    /// Error register of the last EMCY
    pub fn emcy_type(&self) -> Option<u8> {
        self.emcy_type.load()
    }

    /// When the last heartbeat was received
    pub fn last_heartbeat(&self) -> Option<Instant> {
        self.last_heartbeat.load()
    }

    /// True if no heartbeat has been received within `max_age`
    pub fn is_stale(&self, max_age: Duration) -> bool {
        match self.last_heartbeat() {
            Some(t) => t.elapsed() > max_age,
            None => true,
        }
    }

    /// Copy all values
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            node: self.node,
            state: self.state.load(),
            last_heartbeat: self.last_heartbeat.load(),
            emcy_code: self.emcy_code.load(),
            emcy_type: self.emcy_type.load(),
            emcy_data: self.emcy_data.load(),
        }
    }

    /// Record a heartbeat. Returns the previous state if the state changed.
    pub(crate) fn update_state(&self, state: NmtState) -> Option<Option<NmtState>> {
        self.last_heartbeat.store(Some(Instant::now()));
        self.state
            .fetch_update(|old| (old != Some(state)).then_some(Some(state)))
            .ok()
    }

    pub(crate) fn update_emergency(&self, emcy: &Emergency) {
        self.emcy_code.store(Some(emcy.error_code));
        self.emcy_type.store(Some(emcy.error_register));
        self.emcy_data.store(emcy.data);
    }
}

/// All nodes seen on one bus
#[derive(Debug)]
pub struct NodeMetricsRegistry {
    bus_name: String,
    nodes: RwLock<BTreeMap<u8, Arc<NodeMetrics>>>,
}

impl NodeMetricsRegistry {
    pub(crate) fn new(bus_name: &str) -> Self {
        Self {
            bus_name: bus_name.to_string(),
            nodes: RwLock::new(BTreeMap::new()),
        }
    }

    /// The name of the bus the nodes were seen on
    pub fn bus_name(&self) -> &str {
        &self.bus_name
    }

    /// Get the metrics of a node, if it has been seen
    pub fn get(&self, node: u8) -> Option<Arc<NodeMetrics>> {
        self.nodes.read().unwrap().get(&node).cloned()
    }

    /// Get the metrics of a node, creating them on first use
    pub(crate) fn get_or_create(&self, node: u8) -> Arc<NodeMetrics> {
        if let Some(metrics) = self.get(node) {
            return metrics;
        }
        self.nodes
            .write()
            .unwrap()
            .entry(node)
            .or_insert_with(|| Arc::new(NodeMetrics::new(&self.bus_name, node)))
            .clone()
    }

    /// All nodes seen so far, ordered by node ID
    pub fn nodes(&self) -> Vec<Arc<NodeMetrics>> {
        self.nodes.read().unwrap().values().cloned().collect()
    }

    /// Snapshots of all nodes seen so far
    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.nodes().iter().map(|n| n.snapshot()).collect()
    }

    /// The number of nodes seen so far
    pub fn len(&self) -> usize {
        self.nodes.read().unwrap().len()
    }

    /// True if no node has been seen
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
