use std::{sync::Arc, thread, time::Duration};

use copen_common::{
    messages::{Emergency, Heartbeat, NmtState},
    sdo::SdoResponse,
    BusFrame, BusId, CanId, CanMessage,
};
use copen_master::{Client, Job, JobResult};

mod utils;
use utils::{fast_config, wait_until, TestSetup};

fn heartbeat(node: u8, state: NmtState) -> Heartbeat {
    Heartbeat {
        node,
        toggle: false,
        state,
    }
}

#[test]
#[serial_test::serial]
fn test_heartbeat_metrics() {
    let setup = TestSetup::new(fast_config());
    let handle = setup.master.start_session(setup.bus.clone()).unwrap();
    let metrics = handle.node_metrics();
    assert!(metrics.is_empty());
    assert_eq!("can1", metrics.bus_name());

    setup.bus.inject(heartbeat(12, NmtState::PreOperational));
    assert!(wait_until(Duration::from_millis(200), || metrics
        .get(12)
        .is_some_and(|n| n.state() == Some(NmtState::PreOperational))));

    let node = metrics.get(12).unwrap();
    assert_eq!("co.can1.nd12.state", node.names().state);
    assert_eq!("co.can1.nd12.emcy.code", node.names().emcy_code);
    assert_eq!("co.can1.nd12.emcy.type", node.names().emcy_type);
    assert_eq!("PreOperational", node.state_string());
    assert!(!node.is_stale(Duration::from_secs(1)));
    assert_eq!(None, node.emcy_code());

    setup.bus.inject(heartbeat(12, NmtState::Stopped));
    setup.bus.inject(heartbeat(40, NmtState::Operational));
    assert!(wait_until(Duration::from_millis(200), || metrics.len() == 2));
    assert!(wait_until(Duration::from_millis(200), || node.state()
        == Some(NmtState::Stopped)));

    let snapshot = metrics.snapshot();
    assert_eq!(vec![12, 40], snapshot.iter().map(|n| n.node).collect::<Vec<_>>());
    assert_eq!(Some(NmtState::Operational), snapshot[1].state);
    let same = setup.master.node_metrics(BusId(1)).unwrap();
    assert!(Arc::ptr_eq(&same, &metrics));
}

#[test]
#[serial_test::serial]
fn test_emergency_metrics() {
    let setup = TestSetup::new(fast_config());
    let handle = setup.master.start_session(setup.bus.clone()).unwrap();
    let metrics = handle.node_metrics();

    setup.bus.inject(Emergency {
        node: 7,
        error_code: 0x8130,
        error_register: 0x11,
        data: [1, 2, 3, 4, 5],
    });
    assert!(wait_until(Duration::from_millis(200), || metrics.get(7).is_some()));

    let node = metrics.get(7).unwrap();
    assert!(wait_until(Duration::from_millis(200), || node.emcy_code()
        == Some(0x8130)));
    assert_eq!(Some(0x11), node.emcy_type());
    assert_eq!([1, 2, 3, 4, 5], node.snapshot().emcy_data);
    // No heartbeat seen yet
    assert_eq!(None, node.state());
    assert_eq!("", node.state_string());
    assert!(node.is_stale(Duration::from_secs(10)));

    assert!(wait_until(Duration::from_millis(200), || {
        setup.master.status().workers[0].emcy_received == 1
    }));
}

#[test]
#[serial_test::serial]
fn test_metrics_during_job() {
    let setup = TestSetup::new(fast_config());
    let handle = setup.master.start_session(setup.bus.clone()).unwrap();
    let metrics = handle.node_metrics();
    let client = Client::from_handle(&handle);

    // Node 7 answers late, after node 5 has sent a heartbeat and an EMCY
    let bus = setup.bus.clone();
    let node7 = thread::spawn(move || {
        assert!(wait_until(Duration::from_millis(200), || !bus
            .sent_with_id(0x607)
            .is_empty()));
        bus.inject(heartbeat(5, NmtState::Operational));
        bus.inject(Emergency {
            node: 5,
            error_code: 0x1000,
            error_register: 0x01,
            data: [0; 5],
        });
        thread::sleep(Duration::from_millis(20));
        bus.inject(
            SdoResponse::expedited_upload(0x1000, 0, &[1, 2, 3, 4])
                .to_can_message(CanId::Std(0x587)),
        );
    });

    let job = Job::read_sdo(7, 0x1000, 0, 4)
        .with_timeout(Duration::from_millis(300))
        .with_max_tries(1);
    let job = client.execute(job);
    node7.join().unwrap();
    assert_eq!(JobResult::Ok, job.result);
    assert_eq!(1, job.try_count);
    assert_eq!(&[1, 2, 3, 4], job.data());

    let node = metrics.get(5).unwrap();
    assert_eq!(Some(NmtState::Operational), node.state());
    assert_eq!(Some(0x1000), node.emcy_code());
    assert!(metrics.get(7).is_none());
}

#[test]
#[serial_test::serial]
fn test_frames_from_other_buses() {
    let setup = TestSetup::new(fast_config());
    let handle = setup.master.start_session(setup.bus.clone()).unwrap();
    let metrics = handle.node_metrics();

    // No session on bus 2
    setup.router.inject(BusFrame::new(
        BusId(2),
        heartbeat(3, NmtState::Operational).into(),
    ));
    // Not a heartbeat or EMCY
    setup
        .bus
        .inject(CanMessage::new(CanId::Std(0x181), &[1, 2, 3]));
    // Malformed heartbeat
    setup
        .bus
        .inject(CanMessage::new(CanId::Std(0x703), &[5, 0]));
    // A frame can also be routed directly
    setup.master.route_frame(BusFrame::new(
        BusId(1),
        heartbeat(4, NmtState::Stopped).into(),
    ));

    assert!(wait_until(Duration::from_millis(200), || metrics.len() == 1));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(1, metrics.len());
    assert_eq!(Some(NmtState::Stopped), metrics.get(4).unwrap().state());
    assert_eq!(1, handle.status().nmt_received);
}
