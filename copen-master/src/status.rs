//! Status snapshots of the master and its workers
use copen_common::BusId;

/// Counters of one worker
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerStatus {
    /// The bus served by the worker
    pub bus: BusId,
    /// The bus name
    pub name: String,
    /// Number of attached clients
    pub clients: usize,
    /// Number of jobs in the queue
    pub jobs_waiting: usize,
    /// Number of jobs executed
    pub jobs_processed: u32,
    /// Number of executed jobs which timed out
    pub timeouts: u32,
    /// Number of executed jobs which failed for any other reason
    pub other_errors: u32,
    /// Number of heartbeat frames received
    pub nmt_received: u32,
    /// Number of EMCY frames received
    pub emcy_received: u32,
}

impl core::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "  {}:", self.name)?;
        writeln!(f, "    Active clients: {}", self.clients)?;
        writeln!(f, "    Jobs waiting  : {}", self.jobs_waiting)?;
        writeln!(f, "    Jobs processed: {}", self.jobs_processed)?;
        writeln!(f, "    - timeouts    : {}", self.timeouts)?;
        writeln!(f, "    - other errors: {}", self.other_errors)?;
        writeln!(f, "    NMT received  : {}", self.nmt_received)?;
        writeln!(f, "    EMCY received : {}", self.emcy_received)
    }
}

/// A snapshot of all sessions, ordered by bus
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct MasterStatus {
    /// One entry per active worker
    pub workers: Vec<WorkerStatus>,
}

impl MasterStatus {
    /// The number of active workers
    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    /// Get the status of the worker for a bus
    pub fn worker(&self, bus: BusId) -> Option<&WorkerStatus> {
        self.workers.iter().find(|w| w.bus == bus)
    }
}

impl core::fmt::Display for MasterStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "CANopen status:")?;
        writeln!(f, "  Active workers: {}", self.active_workers())?;
        for worker in &self.workers {
            write!(f, "{worker}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertables::assert_contains;

    #[test]
    fn test_status_report() {
        let status = MasterStatus {
            workers: vec![WorkerStatus {
                bus: BusId(1),
                name: "can1".into(),
                clients: 2,
                jobs_waiting: 0,
                jobs_processed: 17,
                timeouts: 3,
                other_errors: 1,
                nmt_received: 40,
                emcy_received: 2,
            }],
        };
        let report = status.to_string();
        assert!(report.starts_with("CANopen status:\n  Active workers: 1\n  can1:\n"));
        assert_contains!(report, "    Active clients: 2\n");
        assert_contains!(report, "    - timeouts    : 3\n");
        assert_contains!(report, "    EMCY received : 2\n");
        assert_eq!(Some(17), status.worker(BusId(1)).map(|w| w.jobs_processed));
        assert!(status.worker(BusId(2)).is_none());
    }
}
