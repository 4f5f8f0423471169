// network/platform/mod.rs - Platform-specific socket and process enumeration
//
// Each platform lives in its own subdirectory exporting:
// - create_connection_enumerator() factory function
// - a ConnectionEnumerator implementation

use crate::network::types::SocketEntry;
use anyhow::Result;

pub mod lsof;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "linux")]
pub use linux::{LinuxConnectionEnumerator, create_connection_enumerator};
#[cfg(target_os = "macos")]
pub use macos::{MacOSConnectionEnumerator, create_connection_enumerator};

/// Source of "which process owns which socket" data.
pub trait ConnectionEnumerator: Send + Sync {
    /// All TCP and UDP sockets that could be tied to a process.
    fn enumerate(&self) -> Result<Vec<SocketEntry>>;

    /// Full command line of a process, arguments separated by spaces.
    fn command_line(&self, pid: u32) -> Result<String>;

    /// Get the detection method name for logging
    fn get_detection_method(&self) -> &str;
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn create_connection_enumerator() -> Result<Box<dyn ConnectionEnumerator>> {
    Err(anyhow::anyhow!(
        "process enumeration is not supported on {}",
        std::env::consts::OS
    ))
}
