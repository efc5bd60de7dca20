#![allow(dead_code)]
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use copen_master::{Client, JobDefaults, Master, MasterConfig};
use integration_tests::sim_bus::{SimBus, SimRouter};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Timeouts short enough to keep failing jobs quick
pub fn fast_config() -> MasterConfig {
    MasterConfig {
        retry_delay_ms: 5,
        defaults: JobDefaults {
            nmt_timeout_ms: 100,
            nmt_max_tries: 3,
            heartbeat_timeout_ms: 300,
            heartbeat_max_tries: 1,
            sdo_timeout_ms: 30,
            sdo_max_tries: 3,
        },
        ..Default::default()
    }
}

pub struct TestSetup {
    pub router: Arc<SimRouter>,
    pub bus: Arc<SimBus>,
    pub master: Master,
}

impl TestSetup {
    pub fn new(config: MasterConfig) -> Self {
        init_logging();
        let router = SimRouter::new();
        let bus = SimBus::new(1, &router);
        let master = Master::new(router.clone(), config);
        Self {
            router,
            bus,
            master,
        }
    }

    pub fn client(&self) -> Client {
        Client::new(&self.master, self.bus.clone()).unwrap()
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
