use copen_common::{
    messages::{Heartbeat, NmtState},
    node_id::NmtTarget,
    NodeId,
};

use super::Link;
use crate::{
    job::{HeartbeatJob, NmtJob},
    result::JobResult,
};

fn heartbeat_state(node: u8, payload: &[u8]) -> Option<NmtState> {
    match payload {
        [byte] => Some(Heartbeat::from_payload(node, *byte).state),
        _ => None,
    }
}

/// Send an NMT command, and wait for a heartbeat confirming it if the job expects a response
///
/// Heartbeats reporting a state which does not confirm the command are ignored; they do not end
/// the current try.
pub(super) fn send_nmt(link: &mut Link, nmt: &NmtJob) -> JobResult {
    if !link.can_transmit() {
        return JobResult::NoWriteAccess;
    }
    // A broadcast cannot be confirmed by a single node's heartbeat
    let target = match NmtTarget::new(nmt.node_id) {
        Ok(NmtTarget::Broadcast) if link.rx_id != 0 => return JobResult::ParamRange,
        Ok(target) => target,
        Err(_) => return JobResult::ParamRange,
    };

    let request = link.message(&[nmt.command as u8, target.raw()]);
    if link.rx_id == 0 {
        return if link.send_with_retries(request) {
            JobResult::Ok
        } else {
            JobResult::Timeout
        };
    }

    let confirmed = link.transact(Some(request), |msg| {
        heartbeat_state(nmt.node_id, msg.data())
            .is_some_and(|state| nmt.command.confirmed_by(state))
    });
    match confirmed {
        Some(_) => JobResult::Ok,
        None => JobResult::Timeout,
    }
}

/// Wait for the next heartbeat of a node and record its state
pub(super) fn receive_heartbeat(link: &mut Link, hb: &mut HeartbeatJob) -> JobResult {
    if NodeId::new(hb.node_id).is_err() || link.rx_id == 0 {
        return JobResult::ParamRange;
    }

    let node = hb.node_id;
    match link.transact(None, |msg| heartbeat_state(node, msg.data()).is_some()) {
        Some(msg) => {
            hb.state = heartbeat_state(node, msg.data());
            JobResult::Ok
        }
        None => JobResult::Timeout,
    }
}
