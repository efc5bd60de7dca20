//! Common functionality shared among the copen crates.
//!
//! This crate holds the CANopen wire types (NMT, heartbeat, EMCY and SDO frames), the abort code
//! vocabulary, and the boundary traits through which the master talks to a CAN interface
//! ([`Bus`](traits::Bus)) and receives inbound traffic ([`FrameRouter`](traits::FrameRouter)).
//!
//! Most users will have no reason to depend on this crate directly, as it is re-exported by
//! `copen-master`.
#![warn(missing_docs, missing_copy_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod atomic_cell;
pub use atomic_cell::AtomicCell;
pub mod constants;
pub mod messages;
pub mod node_id;
pub mod sdo;
pub mod traits;

pub use node_id::NodeId;

pub use messages::{BusFrame, BusId, CanId, CanMessage, CanOpenMessage};
