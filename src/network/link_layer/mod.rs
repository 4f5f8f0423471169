//! Link layer (Layer 2) framing
//!
//! Only Ethernet (DLT_EN10MB) is decoded and rebuilt.

pub mod ethernet;

/// libpcap data link type for Ethernet
pub const DLT_EN10MB: i32 = 1;

/// Whether frames from a handle with this data link type can be rebuilt.
pub fn is_ethernet(dlt: i32) -> bool {
    dlt == DLT_EN10MB
}
