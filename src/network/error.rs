use thiserror::Error;

/// Malformed trailer or frame data.
///
/// These are per-packet failures: the control loop drops the packet and keeps going.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("trailer magic mismatch: expected {expected:#010x}, found {found:#010x}")]
    BadMagic { expected: u32, found: u32 },

    #[error("{what}: need {needed} bytes, only {available} available")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("invalid {which} MAC address: expected 6 bytes, got {len}")]
    InvalidMac { which: &'static str, len: usize },

    #[error("ethernet frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("invalid 802.3 length field {0}")]
    InvalidLength(usize),
}
