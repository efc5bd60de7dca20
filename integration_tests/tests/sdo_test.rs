use std::time::Duration;

use copen_common::sdo::{AbortCode, RawAbortCode};
use copen_master::{Job, JobError, JobResult};
use integration_tests::sim_node::{SdoFaults, SdoServer};

mod utils;
use utils::{fast_config, TestSetup};

const NODE: u8 = 5;
const REQ_ID: u16 = 0x605;

fn setup(server: &SdoServer) -> TestSetup {
    let setup = TestSetup::new(fast_config());
    setup.bus.add_peer(server.clone());
    setup
}

/// Command bytes of the requests sent to the server
fn request_commands(setup: &TestSetup) -> Vec<u8> {
    setup
        .bus
        .sent_with_id(REQ_ID)
        .iter()
        .map(|msg| msg.data[0])
        .collect()
}

#[test]
#[serial_test::serial]
fn test_expedited_write() {
    let server = SdoServer::new(NODE).with_object(0x1017, 0, &[0, 0]);
    let setup = setup(&server);
    let client = setup.client();

    let job = client.execute(Job::write_sdo(NODE, 0x1017, 0, &[0xE8, 0x03]));
    assert_eq!(JobResult::Ok, job.result);
    assert_eq!(2, job.sdo().unwrap().bytes_transferred);

    let sent = setup.bus.sent_with_id(REQ_ID);
    assert_eq!(1, sent.len());
    assert_eq!([0x2B, 0x17, 0x10, 0x00, 0xE8, 0x03, 0x00, 0x00], sent[0].data);
    assert_eq!(Some(vec![0xE8, 0x03]), server.object(0x1017, 0));
}

#[test]
#[serial_test::serial]
fn test_unsized_write() {
    let server = SdoServer::new(NODE).with_object(0x6040, 0, &[0, 0]);
    let setup = setup(&server);
    let client = setup.client();

    client.write_sdo_value(NODE, 0x6040, 0, 0x0f).unwrap();

    let sent = setup.bus.sent_with_id(REQ_ID);
    assert_eq!([0x22, 0x40, 0x60, 0x00, 0x0f, 0, 0, 0], sent[0].data);
    assert_eq!(Some(vec![0x0f, 0, 0, 0]), server.object(0x6040, 0));

    let job = client.execute(Job::write_sdo_value(NODE, 0x6040, 0, 6));
    assert_eq!(4, job.sdo().unwrap().bytes_transferred);
}

#[test]
#[serial_test::serial]
fn test_expedited_read() {
    let server = SdoServer::new(NODE).with_object(0x1000, 0, &[0x91, 0x01, 0x04, 0x00]);
    let setup = setup(&server);
    let client = setup.client();

    let job = client.execute(Job::read_sdo(NODE, 0x1000, 0, 8));
    assert_eq!(JobResult::Ok, job.result);
    assert_eq!(&[0x91, 0x01, 0x04, 0x00], job.data());
    let sdo = job.sdo().unwrap();
    assert_eq!(Some(4), sdo.content_size);
    // The rest of the buffer is zeroed
    assert_eq!(&[0; 4], &sdo.buffer[4..]);

    assert_eq!(vec![0x40], request_commands(&setup));
}

#[test]
#[serial_test::serial]
fn test_segmented_read() {
    let value: Vec<u8> = (0..20).collect();
    let server = SdoServer::new(NODE).with_object(0x1008, 0, &value);
    let setup = setup(&server);
    let client = setup.client();

    let job = client.execute(Job::read_sdo(NODE, 0x1008, 0, 32));
    assert_eq!(JobResult::Ok, job.result);
    assert_eq!(value.as_slice(), job.data());
    assert_eq!(Some(20), job.sdo().unwrap().content_size);

    // Initiate, then segment requests with alternating toggle starting at 0
    assert_eq!(vec![0x40, 0x60, 0x70, 0x60], request_commands(&setup));
}

#[test]
#[serial_test::serial]
fn test_segmented_write() {
    let value: Vec<u8> = (100..110).collect();
    let server = SdoServer::new(NODE).with_object(0x2000, 1, &[]);
    let setup = setup(&server);
    let client = setup.client();

    let job = client.execute(Job::write_sdo(NODE, 0x2000, 1, &value));
    assert_eq!(JobResult::Ok, job.result);
    assert_eq!(10, job.sdo().unwrap().bytes_transferred);
    assert_eq!(Some(value), server.object(0x2000, 1));

    let sent = setup.bus.sent_with_id(REQ_ID);
    assert_eq!(3, sent.len());
    // Initiate with size indicated
    assert_eq!([0x21, 0x00, 0x20, 0x01, 10, 0, 0, 0], sent[0].data);
    // 7 bytes, toggle 0, more to come
    assert_eq!(0x00, sent[1].data[0]);
    // 3 bytes, toggle 1, last segment
    assert_eq!(0x19, sent[2].data[0]);
}

#[test]
#[serial_test::serial]
fn test_read_buffer_size() {
    let value: Vec<u8> = (0..10).collect();
    let server = SdoServer::new(NODE).with_object(0x2001, 0, &value);
    let setup = setup(&server);
    let client = setup.client();

    assert_eq!(value, client.read_sdo(NODE, 0x2001, 0, 10).unwrap());
    assert_eq!(value, client.read_sdo(NODE, 0x2001, 0, 11).unwrap());

    let job = client.execute(Job::read_sdo(NODE, 0x2001, 0, 9));
    assert_eq!(JobResult::BufferTooSmall, job.result);
    assert_eq!(&value[..9], job.data());
    assert_eq!(AbortCode::OutOfMemory as u32, job.sdo().unwrap().error);
    // The overflow happened on the last segment, so there was nothing to abort
    assert!(server.aborts().is_empty());

    assert_eq!(
        Err(JobError::BufferTooSmall),
        client.read_sdo(NODE, 0x2001, 0, 9)
    );
}

#[test]
#[serial_test::serial]
fn test_expedited_overflow() {
    let server = SdoServer::new(NODE).with_object(0x2002, 0, &[1, 2, 3, 4]);
    let setup = setup(&server);
    let client = setup.client();

    let job = client.execute(Job::read_sdo(NODE, 0x2002, 0, 3));
    assert_eq!(JobResult::BufferTooSmall, job.result);
    assert_eq!(&[1, 2, 3], job.data());
    assert_eq!(vec![AbortCode::OutOfMemory as u32], server.aborts());
}

#[test]
#[serial_test::serial]
fn test_segmented_overflow() {
    let value: Vec<u8> = (0..30).collect();
    let server = SdoServer::new(NODE).with_object(0x2007, 0, &value);
    let setup = setup(&server);
    let client = setup.client();

    let job = client.execute(Job::read_sdo(NODE, 0x2007, 0, 9));
    assert_eq!(JobResult::BufferTooSmall, job.result);
    assert_eq!(9, job.sdo().unwrap().bytes_transferred);
    assert_eq!(&value[..9], job.data());
    // The server still had segments to send, so the transfer is aborted
    assert_eq!(vec![AbortCode::OutOfMemory as u32], server.aborts());
    assert_eq!(vec![0x40, 0x60, 0x70, 0x80], request_commands(&setup));
}

#[test]
#[serial_test::serial]
fn test_lost_initiate_request() {
    let server = SdoServer::new(NODE)
        .with_object(0x1017, 0, &[0, 0])
        .with_faults(SdoFaults {
            lost_requests: Some((0, 1)),
            ..Default::default()
        });
    let setup = setup(&server);
    let client = setup.client();

    let job = client.execute(Job::write_sdo(NODE, 0x1017, 0, &[0xE8, 0x03]).with_max_tries(3));
    assert_eq!(JobResult::Ok, job.result);
    assert_eq!(2, job.try_count);
    assert_eq!(vec![0x2B, 0x2B], request_commands(&setup));
    assert_eq!(Some(vec![0xE8, 0x03]), server.object(0x1017, 0));
    assert!(server.aborts().is_empty());
}

#[test]
#[serial_test::serial]
fn test_lost_segment_request() {
    let value: Vec<u8> = (0..20).collect();
    let server = SdoServer::new(NODE)
        .with_object(0x1008, 0, &value)
        .with_faults(SdoFaults {
            lost_requests: Some((2, 1)),
            ..Default::default()
        });
    let setup = setup(&server);
    let client = setup.client();

    let job = client.execute(Job::read_sdo(NODE, 0x1008, 0, 32).with_max_tries(3));
    assert_eq!(JobResult::Ok, job.result);
    assert_eq!(value.as_slice(), job.data());
    // The second segment request is repeated with the same toggle bit
    assert_eq!(vec![0x40, 0x60, 0x70, 0x70, 0x60], request_commands(&setup));
    assert!(server.aborts().is_empty());
}

#[test]
#[serial_test::serial]
fn test_lost_last_segment() {
    let value: Vec<u8> = (100..110).collect();
    let server = SdoServer::new(NODE)
        .with_object(0x2000, 1, &[])
        .with_faults(SdoFaults {
            lost_requests: Some((2, 1)),
            ..Default::default()
        });
    let setup = setup(&server);
    let client = setup.client();

    let job = client.execute(Job::write_sdo(NODE, 0x2000, 1, &value).with_max_tries(3));
    assert_eq!(JobResult::Ok, job.result);
    assert_eq!(2, job.try_count);
    assert_eq!(10, job.sdo().unwrap().bytes_transferred);
    assert_eq!(vec![0x21, 0x00, 0x19, 0x19], request_commands(&setup));
    assert_eq!(Some(value), server.object(0x2000, 1));
}

#[test]
#[serial_test::serial]
fn test_segment_mismatch() {
    let value: Vec<u8> = (0..30).collect();
    let server = SdoServer::new(NODE)
        .with_object(0x2003, 0, &value)
        .with_faults(SdoFaults {
            wrong_toggle_at: Some(1),
            ..Default::default()
        });
    let setup = setup(&server);
    let client = setup.client();

    let job = client.execute(Job::read_sdo(NODE, 0x2003, 0, 64));
    assert_eq!(JobResult::SegmentMismatch, job.result);
    assert_eq!(7, job.sdo().unwrap().bytes_transferred);
    assert_eq!(AbortCode::ToggleNotAlternated as u32, job.sdo().unwrap().error);

    // Initiate, two segment requests, then exactly one abort
    let commands = request_commands(&setup);
    assert_eq!(vec![0x40, 0x60, 0x70, 0x80], commands);
    assert_eq!(vec![AbortCode::ToggleNotAlternated as u32], server.aborts());
}

#[test]
#[serial_test::serial]
fn test_download_segment_mismatch() {
    let server = SdoServer::new(NODE)
        .with_object(0x2004, 0, &[])
        .with_faults(SdoFaults {
            wrong_toggle_at: Some(0),
            ..Default::default()
        });
    let setup = setup(&server);
    let client = setup.client();

    let result = client.write_sdo(NODE, 0x2004, 0, &[0; 12]);
    assert_eq!(Err(JobError::SegmentMismatch), result);
    assert_eq!(vec![AbortCode::ToggleNotAlternated as u32], server.aborts());
}

#[test]
#[serial_test::serial]
fn test_server_abort() {
    let server = SdoServer::new(NODE).with_read_only(0x1018, 1, &[0xab, 0x02, 0, 0]);
    let setup = setup(&server);
    let client = setup.client();

    assert_eq!(
        Err(JobError::SdoAccess {
            abort_code: RawAbortCode::Valid(AbortCode::NoSuchObject)
        }),
        client.read_sdo(NODE, 0x3000, 0, 4)
    );

    let job = client.execute(Job::write_sdo(NODE, 0x1018, 1, &[1, 2, 3, 4]));
    assert_eq!(
        JobResult::SdoAccess {
            abort_code: RawAbortCode::Valid(AbortCode::ReadOnly)
        },
        job.result
    );
    assert_eq!(AbortCode::ReadOnly as u32, job.sdo().unwrap().error);
    assert!(job.result_description().starts_with("SDO access failed; "));
    // An abort from the server is not answered with another one
    assert!(server.aborts().is_empty());
}

#[test]
#[serial_test::serial]
fn test_abort_during_segments() {
    let value: Vec<u8> = (0..30).collect();
    let server = SdoServer::new(NODE)
        .with_object(0x2005, 0, &value)
        .with_faults(SdoFaults {
            abort_at: Some((2, AbortCode::HardwareError)),
            ..Default::default()
        });
    let setup = setup(&server);
    let client = setup.client();

    let job = client.execute(Job::read_sdo(NODE, 0x2005, 0, 64));
    assert_eq!(
        JobResult::SdoAccess {
            abort_code: RawAbortCode::Valid(AbortCode::HardwareError)
        },
        job.result
    );
    assert_eq!(14, job.sdo().unwrap().bytes_transferred);
    assert!(server.aborts().is_empty());
}

#[test]
#[serial_test::serial]
fn test_unexpected_initiate_response() {
    let server = SdoServer::new(NODE)
        .with_object(0x2006, 0, &[1])
        .with_faults(SdoFaults {
            wrong_index: true,
            ..Default::default()
        });
    let setup = setup(&server);
    let client = setup.client();

    let job = client.execute(Job::read_sdo(NODE, 0x2006, 0, 4));
    match job.result {
        JobResult::SdoAccess { abort_code } => assert_eq!(0xFFFF_FFFF, abort_code.raw()),
        other => panic!("Unexpected result {other:?}"),
    }
}

#[test]
#[serial_test::serial]
fn test_timeout() {
    let server = SdoServer::new(NODE).with_faults(SdoFaults {
        silent: true,
        ..Default::default()
    });
    let setup = setup(&server);
    let client = setup.client();

    let job = Job::read_sdo(NODE, 0x1000, 0, 4)
        .with_timeout(Duration::from_millis(20))
        .with_max_tries(3);
    let job = client.execute(job);
    assert_eq!(JobResult::Timeout, job.result);
    assert_eq!(3, job.try_count);
    assert_eq!(AbortCode::SdoTimeout as u32, job.sdo().unwrap().error);

    // Three tries, then one abort toward the server
    let sent = setup.bus.sent_with_id(REQ_ID);
    assert_eq!(4, sent.len());
    assert!(sent[..3].iter().all(|msg| msg.data[0] == 0x40));
    assert_eq!(0x80, sent[3].data[0]);
    assert_eq!(
        (AbortCode::SdoTimeout as u32).to_le_bytes(),
        sent[3].data[4..8]
    );

    let status = setup.master.status();
    assert_eq!(1, status.workers[0].timeouts);
}

#[test]
#[serial_test::serial]
fn test_invalid_parameters() {
    let server = SdoServer::new(NODE).with_object(0x1000, 0, &[1, 2, 3, 4]);
    let setup = setup(&server);
    let client = setup.client();

    let job = client.execute(Job::read_sdo(NODE, 0x1000, 0, 4).with_max_tries(0));
    assert_eq!(JobResult::ParamRange, job.result);
    assert_eq!(Err(JobError::ParamRange), client.read_sdo(NODE, 0x1000, 0, 0));
    assert_eq!(Err(JobError::ParamRange), client.read_sdo(0, 0x1000, 0, 4));
    assert_eq!(Err(JobError::ParamRange), client.write_sdo(NODE, 0x1000, 0, &[]));
    assert!(setup.bus.sent().is_empty());
}
