// network/platform/macos/mod.rs - macOS platform implementation

mod process;

pub use process::MacOSConnectionEnumerator;

use super::ConnectionEnumerator;
use anyhow::Result;

/// Create the lsof-backed enumerator
pub fn create_connection_enumerator() -> Result<Box<dyn ConnectionEnumerator>> {
    log::info!("Using macOS connection enumeration (lsof)");
    Ok(Box::new(MacOSConnectionEnumerator))
}
