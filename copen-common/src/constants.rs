//! Constants defining standard object indices and default communication object ids
//!

/// Object indices for standard objects
pub mod object_ids {
    /// The Device Type object index
    pub const DEVICE_TYPE: u16 = 0x1000;
    /// The Error Register object index
    pub const ERROR_REGISTER: u16 = 0x1001;
    /// The Device Name object index
    pub const DEVICE_NAME: u16 = 0x1008;
    /// The hardware version object index
    pub const HARDWARE_VERSION: u16 = 0x1009;
    /// The software version object index
    pub const SOFTWARE_VERSION: u16 = 0x100A;
    /// The heartbeat producer time object index
    pub const HEARTBEAT_PRODUCER_TIME: u16 = 0x1017;
    /// The identity object index
    ///
    /// Sub 1 is the vendor ID, 2 the product code, 3 the revision and 4 the serial number
    pub const IDENTITY: u16 = 0x1018;
}

/// Default (CiA 301 pre-defined connection set) COB-ID bases
pub mod cob_ids {
    /// NMT commands are broadcast on this ID
    pub const NMT: u16 = 0x000;
    /// Emergency messages are sent on this base plus the node ID
    pub const EMCY_BASE: u16 = 0x080;
    /// SDO responses from a server are sent on this base plus the server node ID
    pub const SDO_RESP_BASE: u16 = 0x580;
    /// SDO requests to a server are sent on this base plus the server node ID
    pub const SDO_REQ_BASE: u16 = 0x600;
    /// Heartbeat messages are sent on this base plus the node ID
    pub const HEARTBEAT_BASE: u16 = 0x700;
}

/// Special values used on the SDO channel
pub mod values {
    /// Pseudo abort code recorded when a non-CANopen frame or another master's traffic is received
    /// in place of an expected SDO response
    pub const BUS_COLLISION: u32 = 0xFFFF_FFFF;
}
