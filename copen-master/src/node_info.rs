//! Identity queries and bus scanning
use std::{ops::RangeInclusive, time::Duration};

use copen_common::{constants::object_ids, NodeId};

use crate::{client::Client, job::Job, result::JobError};

/// Longest string read from the identity strings
const MAX_STRING_LENGTH: usize = 49;

/// Identity information read from the standard objects of a node
///
/// Only the device type is mandatory; the other fields are `None` when the node does not provide
/// the object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeInfo {
    /// The node ID
    pub node: u8,
    /// Object 0x1000
    pub device_type: u32,
    /// Object 0x1001
    pub error_register: Option<u8>,
    /// Object 0x1018 sub 1
    pub vendor_id: Option<u32>,
    /// Object 0x1018 sub 2
    pub product_code: Option<u32>,
    /// Object 0x1018 sub 3
    pub revision: Option<u32>,
    /// Object 0x1018 sub 4
    pub serial: Option<u32>,
    /// Object 0x1008
    pub device_name: Option<String>,
    /// Object 0x1009
    pub hardware_version: Option<String>,
    /// Object 0x100A
    pub software_version: Option<String>,
}

impl core::fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Node {}:", self.node)?;
        writeln!(f, "  Device type : 0x{:08x}", self.device_type)?;
        if let Some(reg) = self.error_register {
            writeln!(f, "  Error reg.  : 0x{reg:02x}")?;
        }
        let ids = [
            ("Vendor ID   ", self.vendor_id),
            ("Product code", self.product_code),
            ("Revision    ", self.revision),
            ("Serial      ", self.serial),
        ];
        for (label, value) in ids {
            if let Some(value) = value {
                writeln!(f, "  {label}: 0x{value:08x}")?;
            }
        }
        let strings = [
            ("Device name ", &self.device_name),
            ("HW version  ", &self.hardware_version),
            ("SW version  ", &self.software_version),
        ];
        for (label, value) in strings {
            if let Some(value) = value {
                writeln!(f, "  {label}: {value}")?;
            }
        }
        Ok(())
    }
}

/// The result of [`Client::scan`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Nodes which answered, in ascending order
    pub found: Vec<NodeInfo>,
    /// Nodes which answered with an error
    pub failed: Vec<(u8, JobError)>,
}

fn to_u32(data: &[u8]) -> u32 {
    let mut bytes = [0; 4];
    let len = data.len().min(4);
    bytes[..len].copy_from_slice(&data[..len]);
    u32::from_le_bytes(bytes)
}

fn to_string(data: &[u8]) -> String {
    let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

impl Client {
    fn read_object(
        &self,
        node: u8,
        index: u16,
        sub: u8,
        capacity: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, JobError> {
        let job = Job::read_sdo(node, index, sub, capacity)
            .with_defaults(self.defaults())
            .with_timeout(timeout);
        let job = self.execute(job);
        job.result.into_result()?;
        Ok(job.data().to_vec())
    }

    fn read_u32(&self, node: u8, index: u16, sub: u8, timeout: Duration) -> Option<u32> {
        self.read_object(node, index, sub, 4, timeout)
            .ok()
            .map(|data| to_u32(&data))
    }

    /// Read a string object, keeping the first `MAX_STRING_LENGTH` bytes of a longer string
    fn read_string(&self, node: u8, index: u16, timeout: Duration) -> Option<String> {
        let job = Job::read_sdo(node, index, 0, MAX_STRING_LENGTH)
            .with_defaults(self.defaults())
            .with_timeout(timeout);
        let job = self.execute(job);
        match job.result.into_result() {
            Ok(()) | Err(JobError::BufferTooSmall) => Some(to_string(job.data())),
            Err(_) => None,
        }
    }

    /// Read the identity objects of a node
    ///
    /// Fails if the device type cannot be read. `timeout` applies to each SDO request.
    pub fn read_node_info(&self, node: u8, timeout: Duration) -> Result<NodeInfo, JobError> {
        let device_type = self.read_object(node, object_ids::DEVICE_TYPE, 0, 4, timeout)?;
        Ok(NodeInfo {
            node,
            device_type: to_u32(&device_type),
            error_register: self
                .read_object(node, object_ids::ERROR_REGISTER, 0, 1, timeout)
                .ok()
                .and_then(|data| data.first().copied()),
            vendor_id: self.read_u32(node, object_ids::IDENTITY, 1, timeout),
            product_code: self.read_u32(node, object_ids::IDENTITY, 2, timeout),
            revision: self.read_u32(node, object_ids::IDENTITY, 3, timeout),
            serial: self.read_u32(node, object_ids::IDENTITY, 4, timeout),
            device_name: self.read_string(node, object_ids::DEVICE_NAME, timeout),
            hardware_version: self.read_string(node, object_ids::HARDWARE_VERSION, timeout),
            software_version: self.read_string(node, object_ids::SOFTWARE_VERSION, timeout),
        })
    }

    /// Look for nodes in a range of node IDs
    ///
    /// The range is limited to valid node IDs, and may be given in either order. Nodes which do
    /// not respond in time are left out of the result.
    pub fn scan(&self, range: RangeInclusive<u8>, timeout: Duration) -> ScanResult {
        let (mut first, mut last) = range.into_inner();
        if first > last {
            core::mem::swap(&mut first, &mut last);
        }
        let first = first.max(NodeId::MIN);
        let last = last.min(NodeId::MAX);

        let mut result = ScanResult::default();
        for node in first..=last {
            match self.read_node_info(node, timeout) {
                Ok(info) => {
                    log::debug!("Found node {node}, device type 0x{:08x}", info.device_type);
                    result.found.push(info);
                }
                Err(JobError::Timeout) => (),
                Err(e) => result.failed.push((node, e)),
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversion() {
        assert_eq!(0x0004_0191, to_u32(&[0x91, 0x01, 0x04, 0x00]));
        assert_eq!(0x12, to_u32(&[0x12]));
        assert_eq!("drive", to_string(b"drive\0\0"));
        assert_eq!("", to_string(&[]));
    }

    #[test]
    fn test_display() {
        let info = NodeInfo {
            node: 4,
            device_type: 0x191,
            vendor_id: Some(0x2ab),
            device_name: Some("motor".into()),
            ..Default::default()
        };
        let text = info.to_string();
        assert!(text.starts_with("Node 4:\n  Device type : 0x00000191\n"));
        assert!(text.contains("  Vendor ID   : 0x000002ab\n"));
        assert!(text.contains("  Device name : motor\n"));
        assert!(!text.contains("Serial"));
    }
}
