// network/platform/linux/mod.rs - Linux platform implementation

mod process;

pub use process::LinuxConnectionEnumerator;

use super::ConnectionEnumerator;
use anyhow::Result;

/// Create the procfs-backed enumerator
pub fn create_connection_enumerator() -> Result<Box<dyn ConnectionEnumerator>> {
    log::info!("Using Linux connection enumeration (procfs)");
    Ok(Box::new(LinuxConnectionEnumerator::new()))
}
