//! A CANopen master for communicating with nodes on one or more CAN buses
//!
//! The crate runs one worker thread per bus. Applications interact with a worker through clients:
//!
//! - A [Client] executes one [Job] at a time, blocking until it is finished
//! - An [AsyncClient] queues jobs and collects the finished ones later
//!
//! Jobs cover the basic master services: sending NMT commands, waiting for heartbeats, and
//! reading or writing objects through a node's SDO server, using expedited or segmented
//! transfers as needed.
//!
//! A [Master] keeps track of the bus sessions. It listens to received frames through a
//! [FrameRouter](common::traits::FrameRouter), delivers responses to the job waiting for them,
//! and keeps [node metrics](NodeMetricsRegistry) up to date from heartbeat and EMCY frames.
//!
//! ```ignore
//! let master = Master::new(router, MasterConfig::default());
//! let client = Client::new(&master, bus)?;
//! client.send_nmt(5, NmtCommand::Start, true)?;
//! let device_type = client.read_sdo(5, 0x1000, 0, 4)?;
//! ```
#![warn(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations
)]

mod client;
mod config;
mod events;
mod job;
mod master;
mod node_info;
mod node_metrics;
mod result;
mod status;
mod worker;

pub use copen_common as common;

pub use client::{AsyncClient, Client, QueueFullError};
pub use config::{ConfigError, JobDefaults, MasterConfig};
pub use events::MasterEvent;
pub use job::{ClientId, HeartbeatJob, Job, JobKind, NmtJob, SdoJob};
pub use master::{Master, MasterError, StopOutcome, WorkerHandle};
pub use node_info::{NodeInfo, ScanResult};
pub use node_metrics::{MetricNames, NodeMetrics, NodeMetricsRegistry, NodeSnapshot};
pub use result::{JobError, JobResult};
pub use status::{MasterStatus, WorkerStatus};
