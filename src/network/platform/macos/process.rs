// network/platform/macos/process.rs - lsof/ps based socket enumeration

use crate::network::platform::{ConnectionEnumerator, lsof};
use crate::network::types::SocketEntry;
use anyhow::{Context, Result, anyhow};
use std::process::Command;

pub struct MacOSConnectionEnumerator;

impl ConnectionEnumerator for MacOSConnectionEnumerator {
    fn enumerate(&self) -> Result<Vec<SocketEntry>> {
        let output = Command::new("lsof")
            .args(lsof::LSOF_ARGS)
            .output()
            .context("failed to run lsof")?;

        // lsof exits 1 when some files could not be inspected but still prints the rest
        if !output.status.success() && output.stdout.is_empty() {
            return Err(anyhow!(
                "lsof failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        lsof::parse(&String::from_utf8_lossy(&output.stdout))
    }

    fn command_line(&self, pid: u32) -> Result<String> {
        let output = Command::new("ps")
            .args(["-ww", "-o", "command=", "-p", &pid.to_string()])
            .output()
            .context("failed to run ps")?;

        if !output.status.success() {
            return Err(anyhow!("no process with pid {}", pid));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn get_detection_method(&self) -> &str {
        "lsof"
    }
}
