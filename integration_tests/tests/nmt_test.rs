use std::{thread, time::Duration};

use copen_common::{
    messages::{Heartbeat, NmtCommand, NmtState},
    traits::BusMode,
    CanId, CanMessage,
};
use copen_master::{Job, JobError, JobResult};
use integration_tests::sim_node::NmtNode;

mod utils;
use utils::{fast_config, TestSetup};

const NODE: u8 = 5;

fn nmt_frames(setup: &TestSetup) -> Vec<[u8; 2]> {
    setup
        .bus
        .sent_with_id(0)
        .iter()
        .map(|msg| [msg.data[0], msg.data[1]])
        .collect()
}

fn heartbeat(node: u8, state: NmtState) -> Heartbeat {
    Heartbeat {
        node,
        toggle: false,
        state,
    }
}

#[test]
#[serial_test::serial]
fn test_start_confirmed_on_retry() {
    let setup = TestSetup::new(fast_config());
    let node = NmtNode::new(NODE).ignoring(1);
    setup.bus.add_peer(node.clone());
    let client = setup.client();

    let job = Job::send_nmt(NODE, NmtCommand::Start, true)
        .with_timeout(Duration::from_millis(200))
        .with_max_tries(3);
    let job = client.execute(job);

    assert_eq!(JobResult::Ok, job.result);
    assert_eq!(2, job.try_count);
    assert_eq!(vec![[0x01, NODE], [0x01, NODE]], nmt_frames(&setup));
    assert_eq!(NmtState::Operational, node.state());
}

#[test]
#[serial_test::serial]
fn test_confirmation_timeout() {
    let setup = TestSetup::new(fast_config());
    setup.bus.add_peer(NmtNode::new(NODE).ignoring(10));
    let client = setup.client();

    let job = Job::send_nmt(NODE, NmtCommand::Stop, true)
        .with_timeout(Duration::from_millis(30))
        .with_max_tries(3);
    let job = client.execute(job);
    assert_eq!(JobResult::Timeout, job.result);
    assert_eq!(3, job.try_count);
    assert_eq!(3, nmt_frames(&setup).len());
}

#[test]
#[serial_test::serial]
fn test_wrong_state_does_not_confirm() {
    let setup = TestSetup::new(fast_config());
    // Reports its state on every command, but never enters operational
    setup.bus.add_peer(|msg: &CanMessage| -> Vec<CanMessage> {
        if msg.id() == CanId::Std(0) {
            vec![heartbeat(NODE, NmtState::PreOperational).into()]
        } else {
            Vec::new()
        }
    });
    let client = setup.client();

    let job = Job::send_nmt(NODE, NmtCommand::Start, true)
        .with_timeout(Duration::from_millis(30))
        .with_max_tries(2);
    assert_eq!(JobResult::Timeout, client.execute(job).result);
}

#[test]
#[serial_test::serial]
fn test_unconfirmed_command() {
    let setup = TestSetup::new(fast_config());
    let node = NmtNode::new(NODE);
    setup.bus.add_peer(node.clone());
    let client = setup.client();

    client.send_nmt(NODE, NmtCommand::Stop, false).unwrap();
    assert_eq!(vec![[0x02, NODE]], nmt_frames(&setup));
    assert_eq!(vec![NmtCommand::Stop], node.received());
}

#[test]
#[serial_test::serial]
fn test_reset_confirmed_by_bootup() {
    let setup = TestSetup::new(fast_config());
    setup.bus.add_peer(NmtNode::new(NODE));
    let client = setup.client();

    client.send_nmt(NODE, NmtCommand::Stop, true).unwrap();
    client.send_nmt(NODE, NmtCommand::Reset, true).unwrap();
    client.send_nmt(NODE, NmtCommand::CommReset, true).unwrap();
    client.send_nmt(NODE, NmtCommand::PreOp, true).unwrap();
}

#[test]
#[serial_test::serial]
fn test_broadcast() {
    let setup = TestSetup::new(fast_config());
    let nodes = [NmtNode::new(2), NmtNode::new(3)];
    for node in &nodes {
        setup.bus.add_peer(node.clone());
    }
    let client = setup.client();

    client.send_nmt(0, NmtCommand::Start, false).unwrap();
    assert_eq!(vec![[0x01, 0x00]], nmt_frames(&setup));
    for node in &nodes {
        assert_eq!(NmtState::Operational, node.state());
    }

    // A broadcast cannot be confirmed
    assert_eq!(
        Err(JobError::ParamRange),
        client.send_nmt(0, NmtCommand::Stop, true)
    );
    assert_eq!(
        Err(JobError::ParamRange),
        client.send_nmt(128, NmtCommand::Stop, false)
    );
    assert_eq!(1, nmt_frames(&setup).len());
}

#[test]
#[serial_test::serial]
fn test_write_failure_uses_tries() {
    let setup = TestSetup::new(fast_config());
    setup.bus.add_peer(NmtNode::new(NODE));
    let client = setup.client();

    setup.bus.fail_next_writes(2);
    let job = client.execute(Job::send_nmt(NODE, NmtCommand::Start, true).with_max_tries(3));
    assert_eq!(JobResult::Ok, job.result);
    assert_eq!(3, job.try_count);
    assert_eq!(1, nmt_frames(&setup).len());

    setup.bus.fail_next_writes(3);
    let job = client.execute(Job::send_nmt(NODE, NmtCommand::Stop, false).with_max_tries(3));
    assert_eq!(JobResult::Timeout, job.result);
}

#[test]
#[serial_test::serial]
fn test_no_write_access() {
    let setup = TestSetup::new(fast_config());
    setup.bus.add_peer(NmtNode::new(NODE));
    let client = setup.client();

    for mode in [BusMode::Listen, BusMode::Off] {
        setup.bus.set_mode(mode);
        assert_eq!(
            Err(JobError::NoWriteAccess),
            client.send_nmt(NODE, NmtCommand::Start, true)
        );
        assert_eq!(
            Err(JobError::NoWriteAccess),
            client.read_sdo(NODE, 0x1000, 0, 4)
        );
    }
    assert!(setup.bus.sent().is_empty());
}

#[test]
#[serial_test::serial]
fn test_receive_heartbeat() {
    let setup = TestSetup::new(fast_config());
    let client = setup.client();

    let bus = setup.bus.clone();
    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        // Another node's heartbeat is not what the job waits for
        bus.inject(heartbeat(NODE + 1, NmtState::Stopped));
        bus.inject(heartbeat(NODE, NmtState::PreOperational));
    });

    assert_eq!(Ok(NmtState::PreOperational), client.receive_heartbeat(NODE));
    producer.join().unwrap();

    // Nothing is sent while waiting for a heartbeat
    assert!(setup.bus.sent().is_empty());
    assert_eq!(Err(JobError::Timeout), client.receive_heartbeat(NODE));
}

#[test]
#[serial_test::serial]
fn test_receive_heartbeat_in_listen_mode() {
    let setup = TestSetup::new(fast_config());
    setup.bus.set_mode(BusMode::Listen);
    let client = setup.client();

    let bus = setup.bus.clone();
    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        bus.inject(heartbeat(NODE, NmtState::Operational));
    });

    let job = client.execute(Job::receive_heartbeat(NODE));
    producer.join().unwrap();
    assert_eq!(JobResult::Ok, job.result);
    assert_eq!(Some(NmtState::Operational), job.heartbeat_state());
}
