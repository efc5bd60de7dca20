//! Node addressing

/// The ID of a configured CANopen node, which must be between 1 and 127
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u8);

impl NodeId {
    /// The lowest valid node ID
    pub const MIN: u8 = 1;
    /// The highest valid node ID
    pub const MAX: u8 = 127;

    /// Create a node ID, failing if `value` is outside 1..=127
    pub const fn new(value: u8) -> Result<Self, InvalidNodeIdError> {
        if value >= Self::MIN && value <= Self::MAX {
            Ok(NodeId(value))
        } else {
            Err(InvalidNodeIdError { value })
        }
    }

    /// Get the raw node ID value
    pub const fn raw(&self) -> u8 {
        self.0
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for NodeId {
    type Error = InvalidNodeIdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        NodeId::new(value)
    }
}

impl From<NodeId> for u8 {
    fn from(value: NodeId) -> Self {
        value.raw()
    }
}

/// The addressee of an NMT command: a single node, or every node on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmtTarget {
    /// Node ID 0 on the wire
    Broadcast,
    /// A single node
    Node(NodeId),
}

impl NmtTarget {
    /// Interpret a raw NMT node field, where 0 addresses all nodes
    pub fn new(value: u8) -> Result<Self, InvalidNodeIdError> {
        match value {
            0 => Ok(NmtTarget::Broadcast),
            _ => NodeId::new(value).map(NmtTarget::Node),
        }
    }

    /// Get the raw value for the NMT node field
    pub fn raw(&self) -> u8 {
        match self {
            NmtTarget::Broadcast => 0,
            NmtTarget::Node(id) => id.raw(),
        }
    }
}

/// Error returned when a value is not a valid node ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidNodeIdError {
    /// The rejected value
    pub value: u8,
}

impl core::fmt::Display for InvalidNodeIdError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Invalid node ID {}, allowed range is 1-127", self.value)
    }
}
impl core::error::Error for InvalidNodeIdError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_range() {
        assert!(NodeId::new(0).is_err());
        assert_eq!(127, NodeId::new(127).unwrap().raw());
        assert_eq!(Err(InvalidNodeIdError { value: 128 }), NodeId::try_from(128));
    }

    #[test]
    fn test_nmt_target() {
        assert_eq!(NmtTarget::Broadcast, NmtTarget::new(0).unwrap());
        assert_eq!(5, NmtTarget::new(5).unwrap().raw());
        assert!(NmtTarget::new(200).is_err());
    }
}
