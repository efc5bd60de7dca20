//! CAN frame model and the NMT, heartbeat and EMCY message codecs
//!
//! SDO messages live in [`crate::sdo`].
use snafu::Snafu;

use crate::constants::cob_ids::{EMCY_BASE, HEARTBEAT_BASE, NMT, SDO_REQ_BASE, SDO_RESP_BASE};
use crate::sdo::{SdoRequest, SdoResponse};

/// A CAN identifier
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CanId {
    /// A 29-bit extended identifier
    Extended(u32),
    /// An 11-bit standard identifier
    Std(u16),
}

impl CanId {
    /// Create an extended ID
    pub const fn extended(id: u32) -> CanId {
        CanId::Extended(id)
    }

    /// Create a standard ID
    pub const fn std(id: u16) -> CanId {
        CanId::Std(id)
    }

    /// Get the raw identifier value
    pub fn raw(&self) -> u32 {
        match self {
            CanId::Extended(id) => *id,
            CanId::Std(id) => *id as u32,
        }
    }

    /// True if this is an extended ID
    pub fn is_extended(&self) -> bool {
        match self {
            CanId::Extended(_) => true,
            CanId::Std(_) => false,
        }
    }

    /// Get the standard identifier, or None for an extended ID
    ///
    /// CANopen's pre-defined connection set only uses standard identifiers.
    pub fn as_std(&self) -> Option<u16> {
        match self {
            CanId::Std(id) => Some(*id),
            CanId::Extended(_) => None,
        }
    }
}

/// The maximum payload of a classic CAN frame
pub const MAX_DATA_LENGTH: usize = 8;

/// A decoded CAN data frame
///
/// Payload bytes beyond `dlc` are always zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanMessage {
    /// Payload, zero padded to 8 bytes
    pub data: [u8; MAX_DATA_LENGTH],
    /// Number of valid bytes in `data`
    pub dlc: u8,
    /// The frame identifier
    pub id: CanId,
}

impl Default for CanMessage {
    fn default() -> Self {
        Self {
            data: [0; MAX_DATA_LENGTH],
            dlc: 0,
            id: CanId::Std(0),
        }
    }
}

impl CanMessage {
    /// Create a message from an ID and a payload slice
    ///
    /// # Panics
    /// If `data` is longer than 8 bytes
    pub fn new(id: CanId, data: &[u8]) -> Self {
        let dlc = data.len();
        if dlc > MAX_DATA_LENGTH {
            panic!("Data length exceeds maximum size of {} bytes", MAX_DATA_LENGTH);
        }
        let mut buf = [0u8; MAX_DATA_LENGTH];
        buf[0..dlc].copy_from_slice(data);

        Self {
            id,
            dlc: dlc as u8,
            data: buf,
        }
    }

    /// Get the frame identifier
    pub fn id(&self) -> CanId {
        self.id
    }

    /// Get the valid part of the payload
    pub fn data(&self) -> &[u8] {
        &self.data[0..(self.dlc as usize).min(MAX_DATA_LENGTH)]
    }
}

/// Identifies one physical or virtual CAN interface
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BusId(pub u8);

impl core::fmt::Display for BusId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "bus{}", self.0)
    }
}

/// An inbound frame, tagged with the bus it was received on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusFrame {
    /// The bus which received the frame
    pub origin: BusId,
    /// The frame itself
    pub message: CanMessage,
}

impl BusFrame {
    /// Tag a message with its origin
    pub fn new(origin: BusId, message: CanMessage) -> Self {
        Self { origin, message }
    }
}

/// The ID on which NMT commands are broadcast
pub const NMT_CMD_ID: CanId = CanId::Std(NMT);

/// NMT command specifiers
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum NmtCommand {
    /// Enter operational state
    Start = 1,
    /// Enter stopped state
    Stop = 2,
    /// Enter pre-operational state
    PreOp = 128,
    /// Reset the application
    Reset = 129,
    /// Reset the communication layer
    CommReset = 130,
}

impl NmtCommand {
    /// Decode a command specifier byte
    pub fn from_byte(b: u8) -> Result<Self, MessageError> {
        match b {
            1 => Ok(Self::Start),
            2 => Ok(Self::Stop),
            128 => Ok(Self::PreOp),
            129 => Ok(Self::Reset),
            130 => Ok(Self::CommReset),
            _ => Err(MessageError::InvalidField),
        }
    }

    /// Check whether a node reporting `state` has carried out this command
    ///
    /// The reset commands are accepted by any state other than stopped, since a node leaves the
    /// reset through bootup into pre-operational (or straight to operational with auto start).
    pub fn confirmed_by(&self, state: NmtState) -> bool {
        match self {
            NmtCommand::Start => state == NmtState::Operational,
            NmtCommand::Stop => state == NmtState::Stopped,
            NmtCommand::PreOp => state == NmtState::PreOperational,
            NmtCommand::Reset | NmtCommand::CommReset => state != NmtState::Stopped,
        }
    }
}

impl core::fmt::Display for NmtCommand {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            NmtCommand::Start => "Start",
            NmtCommand::Stop => "Stop",
            NmtCommand::PreOp => "PreOp",
            NmtCommand::Reset => "Reset",
            NmtCommand::CommReset => "CommReset",
        };
        f.write_str(name)
    }
}

/// An NMT node control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NmtRequest {
    /// The command to execute
    pub command: NmtCommand,
    /// The addressed node, or 0 for all nodes
    pub node: u8,
}

impl TryFrom<CanMessage> for NmtRequest {
    type Error = MessageError;

    fn try_from(msg: CanMessage) -> Result<Self, Self::Error> {
        let payload = msg.data();
        if msg.id() != NMT_CMD_ID {
            Err(MessageError::UnexpectedId {
                cob_id: msg.id(),
                expected: NMT_CMD_ID,
            })
        } else if payload.len() >= 2 {
            let command = NmtCommand::from_byte(payload[0])?;
            let node = payload[1];
            Ok(NmtRequest { command, node })
        } else {
            Err(MessageError::MessageTooShort)
        }
    }
}

impl From<NmtRequest> for CanMessage {
    fn from(req: NmtRequest) -> Self {
        CanMessage::new(NMT_CMD_ID, &[req.command as u8, req.node])
    }
}

/// The NMT state of a node, as reported in its heartbeat
///
/// Values outside the four states defined by CiA 301 are kept as `Unknown` so they can still be
/// reported.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NmtState {
    /// Boot-up message
    Bootup,
    /// Stopped
    Stopped,
    /// Operational
    Operational,
    /// Pre-operational
    PreOperational,
    /// Any other state value
    Unknown(u8),
}

impl From<u8> for NmtState {
    fn from(value: u8) -> Self {
        match value {
            0 => NmtState::Bootup,
            4 => NmtState::Stopped,
            5 => NmtState::Operational,
            127 => NmtState::PreOperational,
            other => NmtState::Unknown(other),
        }
    }
}

impl From<NmtState> for u8 {
    fn from(value: NmtState) -> Self {
        match value {
            NmtState::Bootup => 0,
            NmtState::Stopped => 4,
            NmtState::Operational => 5,
            NmtState::PreOperational => 127,
            NmtState::Unknown(v) => v,
        }
    }
}

impl core::fmt::Display for NmtState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NmtState::Bootup => f.write_str("Booting"),
            NmtState::Stopped => f.write_str("Stopped"),
            NmtState::Operational => f.write_str("Operational"),
            NmtState::PreOperational => f.write_str("PreOperational"),
            NmtState::Unknown(v) => write!(f, "{v}"),
        }
    }
}

/// A heartbeat message, reporting the NMT state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    /// The reporting node
    pub node: u8,
    /// Toggle bit, only used by node guarding responses
    pub toggle: bool,
    /// The reported state
    pub state: NmtState,
}

impl Heartbeat {
    /// Decode the single state byte of a heartbeat
    pub fn from_payload(node: u8, byte: u8) -> Self {
        Self {
            node,
            toggle: byte & (1 << 7) != 0,
            state: NmtState::from(byte & 0x7f),
        }
    }
}

impl From<Heartbeat> for CanMessage {
    fn from(value: Heartbeat) -> Self {
        let mut state: u8 = value.state.into();
        state &= 0x7f;
        if value.toggle {
            state |= 1 << 7;
        }
        CanMessage::new(CanId::Std(HEARTBEAT_BASE | value.node as u16), &[state])
    }
}

/// An emergency (EMCY) message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Emergency {
    /// The reporting node
    pub node: u8,
    /// Emergency error code (CiA 301 table 21)
    pub error_code: u16,
    /// Error register (object 0x1001) at the time of the error
    pub error_register: u8,
    /// Manufacturer specific error information
    pub data: [u8; 5],
}

impl Emergency {
    /// The payload length of an EMCY message
    pub const PAYLOAD_LENGTH: usize = 8;

    fn from_payload(node: u8, payload: &[u8; MAX_DATA_LENGTH]) -> Self {
        let mut data = [0; 5];
        data.copy_from_slice(&payload[3..8]);
        Self {
            node,
            error_code: u16::from_le_bytes([payload[0], payload[1]]),
            error_register: payload[2],
            data,
        }
    }
}

impl From<Emergency> for CanMessage {
    fn from(value: Emergency) -> Self {
        let mut payload = [0u8; 8];
        payload[0..2].copy_from_slice(&value.error_code.to_le_bytes());
        payload[2] = value.error_register;
        payload[3..8].copy_from_slice(&value.data);
        CanMessage::new(CanId::Std(EMCY_BASE + value.node as u16), &payload)
    }
}

/// Get the node ID when `id` falls in the 1..=127 range above `base`
fn node_in_range(id: CanId, base: u16) -> Option<u8> {
    let id = id.as_std()?;
    if id > base && id < base + 0x80 {
        Some((id - base) as u8)
    } else {
        None
    }
}

/// If `id` is a heartbeat ID, return the node ID it belongs to
pub fn heartbeat_node(id: CanId) -> Option<u8> {
    node_in_range(id, HEARTBEAT_BASE)
}

/// If `id` is an EMCY ID, return the node ID it belongs to
pub fn emergency_node(id: CanId) -> Option<u8> {
    node_in_range(id, EMCY_BASE)
}

/// A CAN message classified by the CANopen service it belongs to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CanOpenMessage {
    /// An NMT command from a master
    NmtRequest(NmtRequest),
    /// A heartbeat from a node
    Heartbeat(Heartbeat),
    /// An emergency message from a node
    Emergency(Emergency),
    /// An SDO request to a server, with the server node ID
    SdoRequest(u8, SdoRequest),
    /// An SDO response from a server, with the server node ID
    SdoResponse(u8, SdoResponse),
}

impl TryFrom<CanMessage> for CanOpenMessage {
    type Error = MessageError;

    fn try_from(msg: CanMessage) -> Result<Self, Self::Error> {
        let cob_id = msg.id();
        if cob_id == NMT_CMD_ID {
            Ok(CanOpenMessage::NmtRequest(msg.try_into()?))
        } else if let Some(node) = heartbeat_node(cob_id) {
            if msg.dlc != 1 {
                return MalformedMsgSnafu { cob_id }.fail();
            }
            Ok(CanOpenMessage::Heartbeat(Heartbeat::from_payload(
                node,
                msg.data[0],
            )))
        } else if let Some(node) = emergency_node(cob_id) {
            if msg.dlc as usize != Emergency::PAYLOAD_LENGTH {
                return MalformedMsgSnafu { cob_id }.fail();
            }
            Ok(CanOpenMessage::Emergency(Emergency::from_payload(
                node, &msg.data,
            )))
        } else if let Some(node) = node_in_range(cob_id, SDO_RESP_BASE) {
            let resp = SdoResponse::try_from(&msg.data)
                .map_err(|_| MessageError::MalformedMsg { cob_id })?;
            Ok(CanOpenMessage::SdoResponse(node, resp))
        } else if let Some(node) = node_in_range(cob_id, SDO_REQ_BASE) {
            let req = SdoRequest::try_from(&msg.data)
                .map_err(|_| MessageError::MalformedMsg { cob_id })?;
            Ok(CanOpenMessage::SdoRequest(node, req))
        } else {
            UnrecognizedIdSnafu { cob_id }.fail()
        }
    }
}

/// Error returned when a CAN message cannot be decoded
#[derive(Debug, Clone, Copy, PartialEq, Snafu)]
pub enum MessageError {
    /// The payload is shorter than the message type requires
    MessageTooShort,
    /// The payload does not decode as the message type its ID belongs to
    #[snafu(display("Malformed message with ID {cob_id:?}"))]
    MalformedMsg {
        /// The ID of the message
        cob_id: CanId,
    },
    /// The message ID was not the expected value
    #[snafu(display("Unexpected message ID found: {cob_id:?}, expected: {expected:?}"))]
    UnexpectedId {
        /// The ID found
        cob_id: CanId,
        /// The ID expected
        expected: CanId,
    },
    /// A field holds a value which is not defined for it
    InvalidField,
    /// The ID does not belong to any supported CANopen service
    #[snafu(display("Unrecognized message ID {cob_id:?}"))]
    UnrecognizedId {
        /// The ID of the message
        cob_id: CanId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nmt_request_encoding() {
        let msg: CanMessage = NmtRequest {
            command: NmtCommand::PreOp,
            node: 5,
        }
        .into();
        assert_eq!(CanId::std(0), msg.id());
        assert_eq!(&[0x80, 5], msg.data());

        let decoded = NmtRequest::try_from(msg).unwrap();
        assert_eq!(NmtCommand::PreOp, decoded.command);

        let short = CanMessage::new(NMT_CMD_ID, &[1]);
        assert_eq!(Err(MessageError::MessageTooShort), NmtRequest::try_from(short));
    }

    #[test]
    fn test_heartbeat_classification() {
        let msg = CanMessage::new(CanId::std(0x705), &[0x05]);
        assert_eq!(
            Ok(CanOpenMessage::Heartbeat(Heartbeat {
                node: 5,
                toggle: false,
                state: NmtState::Operational
            })),
            CanOpenMessage::try_from(msg)
        );

        // Heartbeats carry exactly one byte
        let msg = CanMessage::new(CanId::std(0x705), &[0x05, 0x00]);
        assert!(CanOpenMessage::try_from(msg).is_err());

        // 0x700 itself and 0x780 are outside the node range
        assert_eq!(None, heartbeat_node(CanId::std(0x700)));
        assert_eq!(None, heartbeat_node(CanId::std(0x780)));
        assert_eq!(Some(127), heartbeat_node(CanId::std(0x77f)));
    }

    #[test]
    fn test_emergency_decoding() {
        let msg = CanMessage::new(
            CanId::std(0x083),
            &[0x10, 0x32, 0x04, 0xa1, 0xa2, 0xa3, 0xa4, 0xa5],
        );
        let Ok(CanOpenMessage::Emergency(emcy)) = CanOpenMessage::try_from(msg) else {
            panic!("Expected EMCY message");
        };
        assert_eq!(3, emcy.node);
        assert_eq!(0x3210, emcy.error_code);
        assert_eq!(0x04, emcy.error_register);
        assert_eq!([0xa1, 0xa2, 0xa3, 0xa4, 0xa5], emcy.data);
        assert_eq!(msg, CanMessage::from(emcy));

        // A SYNC message is not an EMCY message
        let sync = CanMessage::new(CanId::std(0x080), &[]);
        assert!(CanOpenMessage::try_from(sync).is_err());
    }

    #[test]
    fn test_unknown_state_is_kept() {
        let hb = Heartbeat::from_payload(9, 0x83);
        assert!(hb.toggle);
        assert_eq!(NmtState::Unknown(3), hb.state);
        assert_eq!("3", hb.state.to_string());
        assert_eq!("PreOperational", NmtState::from(127).to_string());
    }

    #[test]
    fn test_nmt_confirmation() {
        assert!(NmtCommand::Start.confirmed_by(NmtState::Operational));
        assert!(!NmtCommand::Start.confirmed_by(NmtState::PreOperational));
        assert!(NmtCommand::Stop.confirmed_by(NmtState::Stopped));
        assert!(NmtCommand::PreOp.confirmed_by(NmtState::PreOperational));
        assert!(NmtCommand::Reset.confirmed_by(NmtState::Bootup));
        assert!(NmtCommand::CommReset.confirmed_by(NmtState::Operational));
        assert!(!NmtCommand::Reset.confirmed_by(NmtState::Stopped));
    }
}
