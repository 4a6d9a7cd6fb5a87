//! Wire protocol spoken between the virtual router and its controller.
//!
//! Every message travels inside a length-type frame (see [`lt`]); the frame
//! type selects one of the VNS messages in [`vns`].

pub mod error;
pub mod lt;
pub mod vns;

pub use error::{ProtoError, Result};
pub use lt::{HEADER_LEN, MAX_FRAME_LEN, decode_frame, encode_frame};
pub use vns::{
    HwEntry, HwInterface, HwKey, IFACE_NAME_LEN, MessageType, VnsMessage, hwinfo_entries,
    hwinfo_interfaces,
};
