//! The unit of work executed by a worker
use std::time::Duration;

use copen_common::{
    constants::cob_ids::{HEARTBEAT_BASE, NMT, SDO_REQ_BASE, SDO_RESP_BASE},
    messages::{NmtCommand, NmtState},
    sdo::RawAbortCode,
};

use crate::{config::JobDefaults, result::JobResult};

/// Identifies a client attached to a worker
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(pub(crate) u64);

/// Payload of an NMT command job
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NmtJob {
    /// The addressed node, or 0 for all nodes
    pub node_id: u8,
    /// The command to send
    pub command: NmtCommand,
}

/// Payload of a heartbeat receive job
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeartbeatJob {
    /// The node to listen to
    pub node_id: u8,
    /// The state reported by the received heartbeat
    pub state: Option<NmtState>,
}

/// Payload of an SDO read or write job
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SdoJob {
    /// The SDO server node
    pub node_id: u8,
    /// Object index
    pub index: u16,
    /// Object sub-index
    pub subindex: u8,
    /// Data to write, or the destination of a read
    pub buffer: Vec<u8>,
    /// The maximum number of bytes a read may store
    pub capacity: usize,
    /// Number of bytes read into `buffer`, or acknowledged by the server on a write
    pub bytes_transferred: usize,
    /// The object size, when indicated by the server on a read
    pub content_size: Option<u32>,
    /// The abort code received or sent, or 0
    pub error: u32,
    /// When false, a write is sent as 4 expedited bytes without size indication
    pub size_indicated: bool,
}

impl SdoJob {
    fn new(node_id: u8, index: u16, subindex: u8, buffer: Vec<u8>, capacity: usize) -> Self {
        Self {
            node_id,
            index,
            subindex,
            buffer,
            capacity,
            bytes_transferred: 0,
            content_size: None,
            error: 0,
            size_indicated: true,
        }
    }

    /// The transferred part of the buffer
    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.bytes_transferred.min(self.buffer.len())]
    }
}

/// Job kinds with their payloads
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobKind {
    /// Do nothing
    None,
    /// Send an NMT command, optionally waiting for a heartbeat confirming it
    SendNmt(NmtJob),
    /// Wait for the next heartbeat of a node
    ReceiveHeartbeat(HeartbeatJob),
    /// Read an object via SDO
    ReadSdo(SdoJob),
    /// Write an object via SDO
    WriteSdo(SdoJob),
}

impl core::fmt::Display for JobKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            JobKind::None => "NoOp",
            JobKind::SendNmt(_) => "SendNMT",
            JobKind::ReceiveHeartbeat(_) => "ReceiveHB",
            JobKind::ReadSdo(_) => "ReadSDO",
            JobKind::WriteSdo(_) => "WriteSDO",
        };
        f.write_str(name)
    }
}

/// A request to a worker, together with its progress and result
///
/// Jobs are built with one of the constructors, optionally adjusted with the `with_` methods, and
/// handed to a [`Client`](crate::Client) or [`AsyncClient`](crate::AsyncClient). A finished job
/// is handed back with `result` set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    /// What to do
    pub kind: JobKind,
    pub(crate) client: Option<ClientId>,
    /// Identifier used for requests
    pub tx_id: u16,
    /// Identifier of expected responses, or 0 when no response is expected
    pub rx_id: u16,
    /// Time to wait for each response
    pub timeout: Duration,
    /// Number of times a request is sent before giving up
    pub max_tries: u8,
    /// Number of times the last request was sent
    pub try_count: u8,
    /// The outcome
    pub result: JobResult,
}

impl Default for Job {
    fn default() -> Self {
        Self {
            kind: JobKind::None,
            client: None,
            tx_id: 0,
            rx_id: 0,
            timeout: Duration::ZERO,
            max_tries: 1,
            try_count: 0,
            result: JobResult::Waiting,
        }
    }
}

impl Job {
    /// Create an NMT command job
    ///
    /// `node_id` 0 addresses all nodes. With `wait_for_state`, the command is repeated until the
    /// node reports a matching state in its heartbeat; otherwise it is sent once.
    pub fn send_nmt(node_id: u8, command: NmtCommand, wait_for_state: bool) -> Self {
        let defaults = JobDefaults::default();
        Self {
            kind: JobKind::SendNmt(NmtJob { node_id, command }),
            tx_id: NMT,
            rx_id: if wait_for_state {
                HEARTBEAT_BASE + node_id as u16
            } else {
                0
            },
            timeout: defaults.nmt_timeout(),
            max_tries: if wait_for_state {
                defaults.nmt_max_tries
            } else {
                1
            },
            ..Default::default()
        }
    }

    /// Create a job waiting for the next heartbeat from a node
    pub fn receive_heartbeat(node_id: u8) -> Self {
        let defaults = JobDefaults::default();
        Self {
            kind: JobKind::ReceiveHeartbeat(HeartbeatJob {
                node_id,
                state: None,
            }),
            rx_id: HEARTBEAT_BASE + node_id as u16,
            timeout: defaults.heartbeat_timeout(),
            max_tries: defaults.heartbeat_max_tries,
            ..Default::default()
        }
    }

    /// Create a job reading up to `capacity` bytes from an object
    pub fn read_sdo(node_id: u8, index: u16, subindex: u8, capacity: usize) -> Self {
        Self::new_sdo(JobKind::ReadSdo(SdoJob::new(
            node_id,
            index,
            subindex,
            vec![0; capacity],
            capacity,
        )))
    }

    /// Create a job writing `data` to an object
    ///
    /// Up to 4 bytes are sent expedited, longer data segmented.
    pub fn write_sdo(node_id: u8, index: u16, subindex: u8, data: &[u8]) -> Self {
        Self::new_sdo(JobKind::WriteSdo(SdoJob::new(
            node_id,
            index,
            subindex,
            data.to_vec(),
            data.len(),
        )))
    }

    /// Create a job writing a numeric value of unknown size to an object
    ///
    /// The value is sent as 4 expedited bytes without size indication, leaving the conversion to
    /// the server.
    pub fn write_sdo_value(node_id: u8, index: u16, subindex: u8, value: u32) -> Self {
        let mut sdo = SdoJob::new(node_id, index, subindex, value.to_le_bytes().to_vec(), 4);
        sdo.size_indicated = false;
        Self::new_sdo(JobKind::WriteSdo(sdo))
    }

    fn new_sdo(kind: JobKind) -> Self {
        let defaults = JobDefaults::default();
        let node_id = match &kind {
            JobKind::ReadSdo(sdo) | JobKind::WriteSdo(sdo) => sdo.node_id,
            _ => 0,
        };
        Self {
            kind,
            tx_id: SDO_REQ_BASE + node_id as u16,
            rx_id: SDO_RESP_BASE + node_id as u16,
            timeout: defaults.sdo_timeout(),
            max_tries: defaults.sdo_max_tries,
            ..Default::default()
        }
    }

    /// Set the response timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of tries
    pub fn with_max_tries(mut self, max_tries: u8) -> Self {
        self.max_tries = max_tries;
        self
    }

    /// Override the request and response identifiers
    ///
    /// A `rx_id` of 0 means no response is expected.
    pub fn with_ids(mut self, tx_id: u16, rx_id: u16) -> Self {
        self.tx_id = tx_id;
        self.rx_id = rx_id;
        self
    }

    /// Apply the timeout and try count for this kind of job from `defaults`
    ///
    /// An NMT job without confirmation keeps its single try.
    pub fn with_defaults(self, defaults: &JobDefaults) -> Self {
        match &self.kind {
            JobKind::None => self,
            JobKind::SendNmt(_) if self.rx_id == 0 => self.with_timeout(defaults.nmt_timeout()),
            JobKind::SendNmt(_) => self
                .with_timeout(defaults.nmt_timeout())
                .with_max_tries(defaults.nmt_max_tries),
            JobKind::ReceiveHeartbeat(_) => self
                .with_timeout(defaults.heartbeat_timeout())
                .with_max_tries(defaults.heartbeat_max_tries),
            JobKind::ReadSdo(_) | JobKind::WriteSdo(_) => self
                .with_timeout(defaults.sdo_timeout())
                .with_max_tries(defaults.sdo_max_tries),
        }
    }

    /// The SDO payload, for read and write jobs
    pub fn sdo(&self) -> Option<&SdoJob> {
        match &self.kind {
            JobKind::ReadSdo(sdo) | JobKind::WriteSdo(sdo) => Some(sdo),
            _ => None,
        }
    }

    /// The transferred data of an SDO job, or an empty slice for other kinds
    pub fn data(&self) -> &[u8] {
        self.sdo().map(|sdo| sdo.data()).unwrap_or(&[])
    }

    /// The state received by a heartbeat job
    pub fn heartbeat_state(&self) -> Option<NmtState> {
        match &self.kind {
            JobKind::ReceiveHeartbeat(hb) => hb.state,
            _ => None,
        }
    }

    /// Describe the result, including the SDO abort code when there is one
    pub fn result_description(&self) -> String {
        match self.sdo() {
            Some(sdo) if sdo.error != 0 && !self.result.is_ok() => {
                format!("{}; {}", self.result, RawAbortCode::from(sdo.error))
            }
            _ => self.result.to_string(),
        }
    }
}
