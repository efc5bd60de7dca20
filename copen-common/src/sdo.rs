//! SDO protocol messages and abort codes
//!
//! Only the expedited and segmented transfer modes are supported.
use snafu::Snafu;

use crate::messages::{CanId, CanMessage};

/// Masks for the fields of the SDO command byte
pub mod command_byte {
    /// The command specifier bits
    pub const COMMAND_MASK: u8 = 0xE0;
    /// The toggle bit of segment messages
    pub const TOGGLE: u8 = 0x10;
    /// Number of unused bytes in a segment
    pub const SEGMENT_UNUSED_MASK: u8 = 0x0E;
    /// Set on the last segment of a transfer
    pub const SEGMENT_END: u8 = 0x01;
    /// Number of unused bytes in an expedited transfer
    pub const EXPEDITED_UNUSED_MASK: u8 = 0x0C;
    /// Set on an expedited initiate message
    pub const EXPEDITED: u8 = 0x02;
    /// Set when the initiate message indicates the data size
    pub const SIZE_INDICATED: u8 = 0x01;
}

/// Specifies the possible server command specifier (SCS) values in SDO response packets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerCommand {
    /// Respond to an upload segment request
    SegmentUpload = 0,
    /// Acknowledge a download segment
    SegmentDownload = 1,
    /// Respond to an initiate upload request
    Upload = 2,
    /// Acknowledge an initiate download request
    Download = 3,
    /// Abort the transfer
    Abort = 4,
}

impl TryFrom<u8> for ServerCommand {
    type Error = SdoDecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ServerCommand::*;
        match value {
            0 => Ok(SegmentUpload),
            1 => Ok(SegmentDownload),
            2 => Ok(Upload),
            3 => Ok(Download),
            4 => Ok(Abort),
            _ => InvalidCommandSpecifierSnafu { value }.fail(),
        }
    }
}

/// Specifies the possible client command specifier (CCS) values in SDO request packets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientCommand {
    /// Send a download segment
    DownloadSegment = 0,
    /// Start a download
    InitiateDownload = 1,
    /// Start an upload
    InitiateUpload = 2,
    /// Request the next upload segment
    ReqUploadSegment = 3,
    /// Abort the transfer
    Abort = 4,
}

impl TryFrom<u8> for ClientCommand {
    type Error = SdoDecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ClientCommand::*;
        match value {
            0 => Ok(DownloadSegment),
            1 => Ok(InitiateDownload),
            2 => Ok(InitiateUpload),
            3 => Ok(ReqUploadSegment),
            4 => Ok(Abort),
            _ => InvalidCommandSpecifierSnafu { value }.fail(),
        }
    }
}

/// Error returned when an SDO payload cannot be decoded
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
pub enum SdoDecodeError {
    /// The command specifier is not one of the supported values
    #[snafu(display("Invalid SDO command specifier {value}"))]
    InvalidCommandSpecifier {
        /// The command specifier, i.e. the top three bits of the command byte
        value: u8,
    },
}

/// Standard SDO abort codes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum AbortCode {
    /// Toggle bit not alternated
    ToggleNotAlternated = 0x0503_0000,
    /// SDO protocol timed out
    SdoTimeout = 0x0504_0000,
    /// Client/server command specifier not valid or unknown
    InvalidCommandSpecifier = 0x0504_0001,
    /// Invalid block size (block mode only)
    InvalidBlockSize = 0x0504_0002,
    /// Invalid sequence number (block mode only)
    InvalidSequenceNumber = 0x0504_0003,
    /// CRC Error (block mode only )
    CrcError = 0x0504_0004,
    /// Out of memory
    OutOfMemory = 0x0504_0005,
    /// Unsupported access to an object
    UnsupportedAccess = 0x0601_0000,
    /// Attempt to read a write only object
    WriteOnly = 0x0601_0001,
    /// Attempt to write a read only object
    ReadOnly = 0x0601_0002,
    /// Object does not exist in the dictionary
    NoSuchObject = 0x0602_0000,
    /// Object cannot be mapped to the PDO
    UnnallowedPdo = 0x0604_0041,
    /// The number and length of objects would exceed PDO length
    PdoTooLong = 0x0604_0042,
    /// General parameter incompatibility
    IncompatibleParameter = 0x0604_0043,
    /// General internal incompatibility in device
    InternalIncompatibility = 0x0604_0047,
    /// Access failed due to hardware error
    HardwareError = 0x0606_0000,
    /// Data type does not match, length of service parameter does not match
    DataTypeMismatch = 0x0607_0010,
    /// Data type does not match, length of service parameter too high
    DataTypeMismatchLengthHigh = 0x0607_0012,
    /// Data type does not match, length of service parameter too low
    DataTypeMismatchLengthLow = 0x0607_0013,
    /// Sub-index does not exist
    NoSuchSubIndex = 0x0609_0011,
    /// Invalid value for parameter (download only)
    InvalidValue = 0x0609_0030,
    /// Value of parameter too high (download only)
    ValueTooHigh = 0x0609_0031,
    /// Value of parameter too low (download only)
    ValueTooLow = 0x0609_0032,
    /// Maximum value is less than minimum value
    MaxLessThanMin = 0x0609_0036,
    /// General error
    GeneralError = 0x0800_0000,
    /// Data cannot be transferred or stored to the application
    CantStore = 0x0800_0020,
    /// Data cannot be transferred or stored to the application because of local control
    CantStoreLocalControl = 0x0800_0021,
    /// Data cannot be transferred or stored to the application because of the device state
    CantStoreDeviceState = 0x0800_0022,
    /// No object dictionary is present
    NoObjectDict = 0x0800_0023,
}

impl AbortCode {
    /// Get a human readable description of the abort code
    pub fn description(&self) -> &'static str {
        use AbortCode::*;
        match self {
            ToggleNotAlternated => "Toggle bit not alternated",
            SdoTimeout => "SDO protocol timed out",
            InvalidCommandSpecifier => "Client/server command specifier invalid",
            InvalidBlockSize => "Invalid block size",
            InvalidSequenceNumber => "Invalid sequence number",
            CrcError => "CRC error",
            OutOfMemory => "Out of memory",
            UnsupportedAccess => "Unsupported access to an object",
            WriteOnly => "Attempt to read a write only object",
            ReadOnly => "Attempt to write a read only object",
            NoSuchObject => "Object does not exist in the dictionary",
            UnnallowedPdo => "Object cannot be mapped to the PDO",
            PdoTooLong => "Objects to be mapped would exceed PDO length",
            IncompatibleParameter => "General parameter incompatibility",
            InternalIncompatibility => "General internal incompatibility in device",
            HardwareError => "Access failed due to an hardware error",
            DataTypeMismatch => "Data type mismatch, length does not match",
            DataTypeMismatchLengthHigh => "Data type mismatch, length too high",
            DataTypeMismatchLengthLow => "Data type mismatch, length too low",
            NoSuchSubIndex => "Sub-index does not exist",
            InvalidValue => "Value range of parameter exceeded",
            ValueTooHigh => "Value of parameter written too high",
            ValueTooLow => "Value of parameter written too low",
            MaxLessThanMin => "Maximum value is less than minimum value",
            GeneralError => "General error",
            CantStore => "Can't xfer data to application",
            CantStoreLocalControl => "Can't xfer data to application (local control)",
            CantStoreDeviceState => "Can't xfer data to application (device state)",
            NoObjectDict => "Object dictionary not generated or present",
        }
    }
}

impl TryFrom<u32> for AbortCode {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        use AbortCode::*;
        let code = match value {
            0x0503_0000 => ToggleNotAlternated,
            0x0504_0000 => SdoTimeout,
            0x0504_0001 => InvalidCommandSpecifier,
            0x0504_0002 => InvalidBlockSize,
            0x0504_0003 => InvalidSequenceNumber,
            0x0504_0004 => CrcError,
            0x0504_0005 => OutOfMemory,
            0x0601_0000 => UnsupportedAccess,
            0x0601_0001 => WriteOnly,
            0x0601_0002 => ReadOnly,
            0x0602_0000 => NoSuchObject,
            0x0604_0041 => UnnallowedPdo,
            0x0604_0042 => PdoTooLong,
            0x0604_0043 => IncompatibleParameter,
            0x0604_0047 => InternalIncompatibility,
            0x0606_0000 => HardwareError,
            0x0607_0010 => DataTypeMismatch,
            0x0607_0012 => DataTypeMismatchLengthHigh,
            0x0607_0013 => DataTypeMismatchLengthLow,
            0x0609_0011 => NoSuchSubIndex,
            0x0609_0030 => InvalidValue,
            0x0609_0031 => ValueTooHigh,
            0x0609_0032 => ValueTooLow,
            0x0609_0036 => MaxLessThanMin,
            0x0800_0000 => GeneralError,
            0x0800_0020 => CantStore,
            0x0800_0021 => CantStoreLocalControl,
            0x0800_0022 => CantStoreDeviceState,
            0x0800_0023 => NoObjectDict,
            other => return Err(other),
        };
        Ok(code)
    }
}

/// An abort code as received on the bus, which may not be a standard code
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawAbortCode {
    /// A standard abort code
    Valid(AbortCode),
    /// Any other value
    Unknown(u32),
}

impl RawAbortCode {
    /// Get the numeric code
    pub fn raw(&self) -> u32 {
        match self {
            RawAbortCode::Valid(code) => *code as u32,
            RawAbortCode::Unknown(code) => *code,
        }
    }
}

impl From<u32> for RawAbortCode {
    fn from(value: u32) -> Self {
        match AbortCode::try_from(value) {
            Ok(code) => RawAbortCode::Valid(code),
            Err(value) => RawAbortCode::Unknown(value),
        }
    }
}

impl core::fmt::Display for RawAbortCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RawAbortCode::Valid(code) => f.write_str(code.description()),
            RawAbortCode::Unknown(crate::constants::values::BUS_COLLISION) => {
                f.write_str("Master collision / non-CANopen frame")
            }
            RawAbortCode::Unknown(code) => write!(f, "0x{code:08x}"),
        }
    }
}

fn index_bytes(payload: &mut [u8; 8], index: u16, sub: u8) {
    payload[1..3].copy_from_slice(&index.to_le_bytes());
    payload[3] = sub;
}

fn read_index(value: &[u8; 8]) -> (u16, u8) {
    (u16::from_le_bytes([value[1], value[2]]), value[3])
}

fn read_u32(value: &[u8; 8]) -> u32 {
    u32::from_le_bytes([value[4], value[5], value[6], value[7]])
}

fn read_segment(value: &[u8; 8]) -> [u8; 7] {
    let mut data = [0; 7];
    data.copy_from_slice(&value[1..8]);
    data
}

/// A message sent from an SDO client to a server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdoRequest {
    /// Start a download, carrying the whole value if expedited
    InitiateDownload {
        /// Number of unused bytes in data
        n: u8,
        /// Expedited
        e: bool,
        /// Size indicated
        s: bool,
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// The value when e=1, or the total size when e=0 and s=1
        data: [u8; 4],
    },
    /// Send one download segment
    DownloadSegment {
        /// Toggle flag
        t: bool,
        /// Number of unused bytes in data
        n: u8,
        /// When set, indicates there are no more segments to be sent
        c: bool,
        /// Segment data
        data: [u8; 7],
    },
    /// Start an upload
    InitiateUpload {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
    },
    /// Request the next upload segment
    ReqUploadSegment {
        /// Toggle flag
        t: bool,
    },
    /// Abort the transfer
    Abort {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// Reason for the abort
        abort_code: u32,
    },
}

impl SdoRequest {
    /// Create an abort message
    pub fn abort(index: u16, sub: u8, abort_code: AbortCode) -> Self {
        SdoRequest::Abort {
            index,
            sub,
            abort_code: abort_code as u32,
        }
    }

    /// Create a segmented initiate download message
    pub fn initiate_download(index: u16, sub: u8, size: Option<u32>) -> Self {
        let data = size.unwrap_or(0).to_le_bytes();

        SdoRequest::InitiateDownload {
            n: 0,
            e: false,
            s: size.is_some(),
            index,
            sub,
            data,
        }
    }

    /// Create a download segment message carrying up to 7 bytes
    pub fn download_segment(toggle: bool, last_segment: bool, segment_data: &[u8]) -> Self {
        let len = segment_data.len().min(7);
        let mut data = [0; 7];
        data[0..len].copy_from_slice(&segment_data[0..len]);
        SdoRequest::DownloadSegment {
            t: toggle,
            n: 7 - len as u8,
            c: last_segment,
            data,
        }
    }

    /// Create an expedited download message carrying up to 4 bytes
    ///
    /// When `size_indicated` is false, the server is told nothing about the length and the
    /// unused byte count is left at zero.
    pub fn expedited_download(index: u16, sub: u8, data: &[u8], size_indicated: bool) -> Self {
        let len = data.len().min(4);
        let mut msg_data = [0; 4];
        msg_data[0..len].copy_from_slice(&data[0..len]);

        SdoRequest::InitiateDownload {
            n: if size_indicated { (4 - len) as u8 } else { 0 },
            e: true,
            s: size_indicated,
            index,
            sub,
            data: msg_data,
        }
    }

    /// Create an initiate upload message
    pub fn initiate_upload(index: u16, sub: u8) -> Self {
        SdoRequest::InitiateUpload { index, sub }
    }

    /// Create an upload segment request
    pub fn upload_segment_request(toggle: bool) -> Self {
        SdoRequest::ReqUploadSegment { t: toggle }
    }

    /// Encode as an 8-byte CAN message
    pub fn to_can_message(self, id: CanId) -> CanMessage {
        let mut payload = [0; 8];

        match self {
            SdoRequest::InitiateDownload {
                n,
                e,
                s,
                index,
                sub,
                data,
            } => {
                payload[0] = (ClientCommand::InitiateDownload as u8) << 5
                    | ((n & 0x3) << 2)
                    | ((e as u8) << 1)
                    | s as u8;
                index_bytes(&mut payload, index, sub);
                payload[4..8].copy_from_slice(&data);
            }
            SdoRequest::DownloadSegment { t, n, c, data } => {
                payload[0] = (ClientCommand::DownloadSegment as u8) << 5
                    | (t as u8) << 4
                    | (n & 7) << 1
                    | (c as u8);
                payload[1..8].copy_from_slice(&data);
            }
            SdoRequest::InitiateUpload { index, sub } => {
                payload[0] = (ClientCommand::InitiateUpload as u8) << 5;
                index_bytes(&mut payload, index, sub);
            }
            SdoRequest::ReqUploadSegment { t } => {
                payload[0] = (ClientCommand::ReqUploadSegment as u8) << 5 | (t as u8) << 4;
            }
            SdoRequest::Abort {
                index,
                sub,
                abort_code,
            } => {
                payload[0] = (ClientCommand::Abort as u8) << 5;
                index_bytes(&mut payload, index, sub);
                payload[4..8].copy_from_slice(&abort_code.to_le_bytes());
            }
        }

        CanMessage::new(id, &payload)
    }
}

impl TryFrom<&[u8; 8]> for SdoRequest {
    type Error = SdoDecodeError;

    fn try_from(value: &[u8; 8]) -> Result<Self, Self::Error> {
        let ccs: ClientCommand = (value[0] >> 5).try_into()?;

        match ccs {
            ClientCommand::DownloadSegment => Ok(SdoRequest::DownloadSegment {
                t: (value[0] & command_byte::TOGGLE) != 0,
                n: (value[0] & command_byte::SEGMENT_UNUSED_MASK) >> 1,
                c: (value[0] & command_byte::SEGMENT_END) != 0,
                data: read_segment(value),
            }),
            ClientCommand::InitiateDownload => {
                let (index, sub) = read_index(value);
                let mut data = [0; 4];
                data.copy_from_slice(&value[4..8]);
                Ok(SdoRequest::InitiateDownload {
                    n: (value[0] & command_byte::EXPEDITED_UNUSED_MASK) >> 2,
                    e: (value[0] & command_byte::EXPEDITED) != 0,
                    s: (value[0] & command_byte::SIZE_INDICATED) != 0,
                    index,
                    sub,
                    data,
                })
            }
            ClientCommand::InitiateUpload => {
                let (index, sub) = read_index(value);
                Ok(SdoRequest::InitiateUpload { index, sub })
            }
            ClientCommand::ReqUploadSegment => Ok(SdoRequest::ReqUploadSegment {
                t: (value[0] & command_byte::TOGGLE) != 0,
            }),
            ClientCommand::Abort => {
                let (index, sub) = read_index(value);
                Ok(SdoRequest::Abort {
                    index,
                    sub,
                    abort_code: read_u32(value),
                })
            }
        }
    }
}

/// A message sent from an SDO server to a client
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SdoResponse {
    /// Response to an initiate upload
    ConfirmUpload {
        /// Number of unused bytes in data
        n: u8,
        /// Expedited flag
        e: bool,
        /// Size indicated flag
        s: bool,
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// The value if e=1, or the size if e=0 and s=1
        data: [u8; 4],
    },
    /// One upload segment
    UploadSegment {
        /// Toggle flag
        t: bool,
        /// Number of unused bytes in data
        n: u8,
        /// Set on the last segment
        c: bool,
        /// Segment data
        data: [u8; 7],
    },
    /// Acknowledge an initiate download
    ConfirmDownload {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
    },
    /// Acknowledge a download segment
    ConfirmDownloadSegment {
        /// Toggle flag, echoing the acknowledged segment
        t: bool,
    },
    /// Abort the transfer
    Abort {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// Reason for the abort
        abort_code: u32,
    },
}

impl TryFrom<&[u8; 8]> for SdoResponse {
    type Error = SdoDecodeError;

    fn try_from(value: &[u8; 8]) -> Result<Self, Self::Error> {
        let command: ServerCommand = (value[0] >> 5).try_into()?;
        match command {
            ServerCommand::SegmentUpload => Ok(SdoResponse::UploadSegment {
                t: (value[0] & command_byte::TOGGLE) != 0,
                n: (value[0] & command_byte::SEGMENT_UNUSED_MASK) >> 1,
                c: (value[0] & command_byte::SEGMENT_END) != 0,
                data: read_segment(value),
            }),
            ServerCommand::SegmentDownload => Ok(SdoResponse::ConfirmDownloadSegment {
                t: (value[0] & command_byte::TOGGLE) != 0,
            }),
            ServerCommand::Upload => {
                let (index, sub) = read_index(value);
                let mut data = [0; 4];
                data.copy_from_slice(&value[4..8]);
                Ok(SdoResponse::ConfirmUpload {
                    n: (value[0] & command_byte::EXPEDITED_UNUSED_MASK) >> 2,
                    e: (value[0] & command_byte::EXPEDITED) != 0,
                    s: (value[0] & command_byte::SIZE_INDICATED) != 0,
                    index,
                    sub,
                    data,
                })
            }
            ServerCommand::Download => {
                let (index, sub) = read_index(value);
                Ok(SdoResponse::ConfirmDownload { index, sub })
            }
            ServerCommand::Abort => {
                let (index, sub) = read_index(value);
                Ok(SdoResponse::Abort {
                    index,
                    sub,
                    abort_code: read_u32(value),
                })
            }
        }
    }
}

impl SdoResponse {
    /// Create an expedited upload response carrying up to 4 bytes
    pub fn expedited_upload(index: u16, sub: u8, data: &[u8]) -> SdoResponse {
        let len = data.len().min(4);
        let mut msg_data = [0; 4];
        msg_data[0..len].copy_from_slice(&data[0..len]);

        SdoResponse::ConfirmUpload {
            index,
            sub,
            e: true,
            s: true,
            n: 4 - len as u8,
            data: msg_data,
        }
    }

    /// Create a segmented upload response, indicating the total size
    pub fn upload_acknowledge(index: u16, sub: u8, size: u32) -> SdoResponse {
        SdoResponse::ConfirmUpload {
            n: 0,
            e: false,
            s: true,
            index,
            sub,
            data: size.to_le_bytes(),
        }
    }

    /// Create an upload segment carrying up to 7 bytes
    pub fn upload_segment(t: bool, c: bool, data: &[u8]) -> SdoResponse {
        let len = data.len().min(7);
        let mut buf = [0; 7];
        buf[0..len].copy_from_slice(&data[0..len]);
        SdoResponse::UploadSegment {
            t,
            n: (7 - len) as u8,
            c,
            data: buf,
        }
    }

    /// Create an initiate download acknowledgement
    pub fn download_acknowledge(index: u16, sub: u8) -> SdoResponse {
        SdoResponse::ConfirmDownload { index, sub }
    }

    /// Create a download segment acknowledgement
    pub fn download_segment_acknowledge(t: bool) -> SdoResponse {
        SdoResponse::ConfirmDownloadSegment { t }
    }

    /// Create an abort message
    pub fn abort(index: u16, sub: u8, abort_code: AbortCode) -> SdoResponse {
        SdoResponse::Abort {
            index,
            sub,
            abort_code: abort_code as u32,
        }
    }

    /// Encode as an 8-byte CAN message
    pub fn to_can_message(self, id: CanId) -> CanMessage {
        let mut payload = [0; 8];

        match self {
            SdoResponse::ConfirmUpload {
                n,
                e,
                s,
                index,
                sub,
                data,
            } => {
                payload[0] = (ServerCommand::Upload as u8) << 5
                    | ((n & 0x3) << 2)
                    | ((e as u8) << 1)
                    | (s as u8);
                index_bytes(&mut payload, index, sub);
                payload[4..8].copy_from_slice(&data);
            }
            SdoResponse::ConfirmDownload { index, sub } => {
                payload[0] = (ServerCommand::Download as u8) << 5;
                index_bytes(&mut payload, index, sub);
            }
            SdoResponse::UploadSegment { t, n, c, data } => {
                payload[0] = (ServerCommand::SegmentUpload as u8) << 5
                    | (t as u8) << 4
                    | (n & 7) << 1
                    | c as u8;
                payload[1..8].copy_from_slice(&data);
            }
            SdoResponse::Abort {
                index,
                sub,
                abort_code,
            } => {
                payload[0] = (ServerCommand::Abort as u8) << 5;
                index_bytes(&mut payload, index, sub);
                payload[4..8].copy_from_slice(&abort_code.to_le_bytes());
            }
            SdoResponse::ConfirmDownloadSegment { t } => {
                payload[0] = (ServerCommand::SegmentDownload as u8) << 5 | (t as u8) << 4;
            }
        }
        CanMessage::new(id, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expedited_download_bytes() {
        let msg = SdoRequest::expedited_download(0x1017, 0, &[0xE8, 0x03], true)
            .to_can_message(CanId::std(0x605));
        assert_eq!(8, msg.dlc);
        assert_eq!(
            &[0x2B, 0x17, 0x10, 0x00, 0xE8, 0x03, 0x00, 0x00],
            msg.data()
        );

        // Without size indication only the expedited bit is set
        let msg = SdoRequest::expedited_download(0x2000, 1, &[1, 2, 3, 4], false)
            .to_can_message(CanId::std(0x605));
        assert_eq!(0x22, msg.data[0]);
    }

    #[test]
    fn test_upload_segment_decoding() {
        let msg = SdoResponse::upload_segment(true, true, &[1, 2, 3])
            .to_can_message(CanId::std(0x585));
        // scs 0, toggle, 4 unused bytes, last segment
        assert_eq!(0x19, msg.data[0]);
        assert_eq!(
            Ok(SdoResponse::UploadSegment {
                t: true,
                n: 4,
                c: true,
                data: [1, 2, 3, 0, 0, 0, 0]
            }),
            SdoResponse::try_from(&msg.data)
        );
    }

    #[test]
    fn test_request_command_bytes() {
        let id = CanId::std(0x601);
        assert_eq!(0x40, SdoRequest::initiate_upload(0x1000, 0).to_can_message(id).data[0]);
        assert_eq!(0x60, SdoRequest::upload_segment_request(false).to_can_message(id).data[0]);
        assert_eq!(0x70, SdoRequest::upload_segment_request(true).to_can_message(id).data[0]);
        assert_eq!(
            0x21,
            SdoRequest::initiate_download(0x1008, 0, Some(10))
                .to_can_message(id)
                .data[0]
        );
        let abort = SdoRequest::abort(0x1008, 2, AbortCode::ToggleNotAlternated).to_can_message(id);
        assert_eq!(&[0x80, 0x08, 0x10, 0x02, 0x00, 0x00, 0x03, 0x05], abort.data());
    }

    #[test]
    fn test_invalid_command_specifier() {
        let payload = [0xE0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            Err(SdoDecodeError::InvalidCommandSpecifier { value: 7 }),
            SdoResponse::try_from(&payload)
        );
        assert!(SdoRequest::try_from(&payload).is_err());
    }

    #[test]
    fn test_abort_code_names() {
        assert_eq!("Toggle bit not alternated", RawAbortCode::from(0x0503_0000).to_string());
        assert_eq!(
            "Master collision / non-CANopen frame",
            RawAbortCode::from(0xFFFF_FFFF).to_string()
        );
        assert_eq!("0x12345678", RawAbortCode::from(0x1234_5678).to_string());
        assert_eq!(0x0504_0005, RawAbortCode::Valid(AbortCode::OutOfMemory).raw());
    }
}
