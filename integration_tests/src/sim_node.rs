//! Scripted CANopen nodes answering the master on a [`SimBus`](crate::sim_bus::SimBus)
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use copen_common::{
    constants::cob_ids::{SDO_REQ_BASE, SDO_RESP_BASE},
    messages::{Heartbeat, NmtCommand, NmtRequest, NmtState},
    sdo::{AbortCode, SdoRequest, SdoResponse},
    CanId, CanMessage,
};

use crate::sim_bus::Peer;

/// Deliberate protocol errors of an [`SdoServer`]
#[derive(Clone, Copy, Debug, Default)]
pub struct SdoFaults {
    /// Answer the segment with this number (counting from 0) with the wrong toggle bit
    pub wrong_toggle_at: Option<usize>,
    /// Abort the transfer instead of answering the segment with this number
    pub abort_at: Option<(usize, AbortCode)>,
    /// Answer initiate requests with another object index
    pub wrong_index: bool,
    /// Do not answer at all
    pub silent: bool,
    /// Ignore `count` requests starting at request number `first` (counting from 0), as if
    /// they were lost on the bus: `(first, count)`
    pub lost_requests: Option<(usize, usize)>,
}

enum Transfer {
    Idle,
    Upload {
        data: Vec<u8>,
        offset: usize,
        toggle: bool,
        segment: usize,
    },
    Download {
        key: (u16, u8),
        data: Vec<u8>,
        toggle: bool,
        segment: usize,
    },
}

struct ServerState {
    node: u8,
    objects: BTreeMap<(u16, u8), Vec<u8>>,
    read_only: Vec<(u16, u8)>,
    faults: SdoFaults,
    transfer: Transfer,
    aborts: Vec<u32>,
    requests: usize,
    received: usize,
}

impl ServerState {
    fn abort(&mut self, index: u16, sub: u8, code: AbortCode) -> Option<SdoResponse> {
        self.transfer = Transfer::Idle;
        Some(SdoResponse::abort(index, sub, code))
    }

    fn handle(&mut self, req: SdoRequest) -> Option<SdoResponse> {
        self.requests += 1;
        match req {
            SdoRequest::InitiateUpload { index, sub } => {
                let Some(data) = self.objects.get(&(index, sub)).cloned() else {
                    return self.abort(index, sub, AbortCode::NoSuchObject);
                };
                let index = if self.faults.wrong_index { index + 1 } else { index };
                if data.len() <= 4 {
                    self.transfer = Transfer::Idle;
                    Some(SdoResponse::expedited_upload(index, sub, &data))
                } else {
                    let size = data.len() as u32;
                    self.transfer = Transfer::Upload {
                        data,
                        offset: 0,
                        toggle: false,
                        segment: 0,
                    };
                    Some(SdoResponse::upload_acknowledge(index, sub, size))
                }
            }
            SdoRequest::ReqUploadSegment { t } => {
                let faults = self.faults;
                let Transfer::Upload {
                    data,
                    offset,
                    toggle,
                    segment,
                } = &mut self.transfer
                else {
                    return self.abort(0, 0, AbortCode::InvalidCommandSpecifier);
                };
                if t != *toggle {
                    return self.abort(0, 0, AbortCode::ToggleNotAlternated);
                }
                if let Some((at, code)) = faults.abort_at {
                    if at == *segment {
                        return self.abort(0, 0, code);
                    }
                }
                let end = (*offset + 7).min(data.len());
                let last = end == data.len();
                let t = if faults.wrong_toggle_at == Some(*segment) { !t } else { t };
                let resp = SdoResponse::upload_segment(t, last, &data[*offset..end]);
                *offset = end;
                *toggle = !*toggle;
                *segment += 1;
                if last {
                    self.transfer = Transfer::Idle;
                }
                Some(resp)
            }
            SdoRequest::InitiateDownload {
                n,
                e,
                s,
                index,
                sub,
                data,
            } => {
                if !self.objects.contains_key(&(index, sub)) {
                    return self.abort(index, sub, AbortCode::NoSuchObject);
                }
                if self.read_only.contains(&(index, sub)) {
                    return self.abort(index, sub, AbortCode::ReadOnly);
                }
                if e {
                    let len = if s { 4 - n as usize } else { 4 };
                    self.objects.insert((index, sub), data[..len].to_vec());
                    self.transfer = Transfer::Idle;
                } else {
                    self.transfer = Transfer::Download {
                        key: (index, sub),
                        data: Vec::new(),
                        toggle: false,
                        segment: 0,
                    };
                }
                let index = if self.faults.wrong_index { index + 1 } else { index };
                Some(SdoResponse::download_acknowledge(index, sub))
            }
            SdoRequest::DownloadSegment { t, n, c, data } => {
                let faults = self.faults;
                let Transfer::Download {
                    key,
                    data: received,
                    toggle,
                    segment,
                } = &mut self.transfer
                else {
                    return self.abort(0, 0, AbortCode::InvalidCommandSpecifier);
                };
                if t != *toggle {
                    return self.abort(0, 0, AbortCode::ToggleNotAlternated);
                }
                if let Some((at, code)) = faults.abort_at {
                    if at == *segment {
                        let key = *key;
                        return self.abort(key.0, key.1, code);
                    }
                }
                received.extend_from_slice(&data[..7 - n as usize]);
                let ack = if faults.wrong_toggle_at == Some(*segment) { !t } else { t };
                *toggle = !*toggle;
                *segment += 1;
                if c {
                    let (key, value) = (*key, core::mem::take(received));
                    self.objects.insert(key, value);
                    self.transfer = Transfer::Idle;
                }
                Some(SdoResponse::download_segment_acknowledge(ack))
            }
            SdoRequest::Abort { abort_code, .. } => {
                self.aborts.push(abort_code);
                self.transfer = Transfer::Idle;
                None
            }
        }
    }
}

/// An SDO server with a small object dictionary
///
/// Clones share the same state, so a test can keep one to inspect the objects while another is
/// attached to the bus.
#[derive(Clone)]
pub struct SdoServer {
    state: Arc<Mutex<ServerState>>,
}

impl SdoServer {
    pub fn new(node: u8) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                node,
                objects: BTreeMap::new(),
                read_only: Vec::new(),
                faults: SdoFaults::default(),
                transfer: Transfer::Idle,
                aborts: Vec::new(),
                requests: 0,
                received: 0,
            })),
        }
    }

    pub fn with_object(self, index: u16, sub: u8, value: &[u8]) -> Self {
        self.set_object(index, sub, value);
        self
    }

    pub fn with_read_only(self, index: u16, sub: u8, value: &[u8]) -> Self {
        self.set_object(index, sub, value);
        self.state.lock().unwrap().read_only.push((index, sub));
        self
    }

    pub fn with_faults(self, faults: SdoFaults) -> Self {
        self.state.lock().unwrap().faults = faults;
        self
    }

    pub fn set_object(&self, index: u16, sub: u8, value: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert((index, sub), value.to_vec());
    }

    pub fn object(&self, index: u16, sub: u8) -> Option<Vec<u8>> {
        self.state.lock().unwrap().objects.get(&(index, sub)).cloned()
    }

    /// Abort codes received from the master
    pub fn aborts(&self) -> Vec<u32> {
        self.state.lock().unwrap().aborts.clone()
    }

    /// Number of requests handled
    pub fn requests(&self) -> usize {
        self.state.lock().unwrap().requests
    }
}

impl Peer for SdoServer {
    fn on_frame(&mut self, msg: &CanMessage) -> Vec<CanMessage> {
        let mut state = self.state.lock().unwrap();
        if msg.id() != CanId::Std(SDO_REQ_BASE + state.node as u16) || state.faults.silent {
            return Vec::new();
        }
        let seen = state.received;
        state.received += 1;
        if let Some((first, count)) = state.faults.lost_requests {
            if (first..first + count).contains(&seen) {
                return Vec::new();
            }
        }
        let Ok(req) = SdoRequest::try_from(&msg.data) else {
            return Vec::new();
        };
        let resp_id = CanId::Std(SDO_RESP_BASE + state.node as u16);
        state
            .handle(req)
            .map(|resp| vec![resp.to_can_message(resp_id)])
            .unwrap_or_default()
    }
}

struct NodeState {
    node: u8,
    state: NmtState,
    ignore: usize,
    received: Vec<NmtCommand>,
}

/// A node answering NMT commands with a heartbeat reporting its new state
#[derive(Clone)]
pub struct NmtNode {
    inner: Arc<Mutex<NodeState>>,
}

impl NmtNode {
    pub fn new(node: u8) -> Self {
        Self {
            inner: Arc::new(Mutex::new(NodeState {
                node,
                state: NmtState::PreOperational,
                ignore: 0,
                received: Vec::new(),
            })),
        }
    }

    /// Drop the next `count` commands addressed to this node
    pub fn ignoring(self, count: usize) -> Self {
        self.inner.lock().unwrap().ignore = count;
        self
    }

    pub fn state(&self) -> NmtState {
        self.inner.lock().unwrap().state
    }

    /// Commands acted upon
    pub fn received(&self) -> Vec<NmtCommand> {
        self.inner.lock().unwrap().received.clone()
    }

    fn heartbeat(node: u8, state: NmtState) -> CanMessage {
        Heartbeat {
            node,
            toggle: false,
            state,
        }
        .into()
    }
}

impl Peer for NmtNode {
    fn on_frame(&mut self, msg: &CanMessage) -> Vec<CanMessage> {
        let Ok(req) = NmtRequest::try_from(*msg) else {
            return Vec::new();
        };
        let mut inner = self.inner.lock().unwrap();
        if req.node != 0 && req.node != inner.node {
            return Vec::new();
        }
        if inner.ignore > 0 {
            inner.ignore -= 1;
            return Vec::new();
        }
        inner.received.push(req.command);
        let node = inner.node;
        match req.command {
            NmtCommand::Start => inner.state = NmtState::Operational,
            NmtCommand::Stop => inner.state = NmtState::Stopped,
            NmtCommand::PreOp => inner.state = NmtState::PreOperational,
            NmtCommand::Reset | NmtCommand::CommReset => {
                inner.state = NmtState::PreOperational;
                return vec![
                    Self::heartbeat(node, NmtState::Bootup),
                    Self::heartbeat(node, NmtState::PreOperational),
                ];
            }
        }
        vec![Self::heartbeat(node, inner.state)]
    }
}
