//! Parser for `lsof -F pcPn` field output
//!
//! Records are newline separated and start with a one-letter field tag. A `p`
//! line opens a new process and is not repeated for its other files:
//!
//! ```text
//! p13100
//! cmpd
//! f5
//! PTCP
//! n127.0.0.1:6600->127.0.0.1:50992
//! f6
//! PUDP
//! n*:5353
//! ```

use crate::network::types::{Protocol, SocketEntry};
use anyhow::{Result, anyhow};

/// Arguments producing the output `parse` expects.
pub const LSOF_ARGS: [&str; 6] = ["-i", "-n", "-P", "-w", "-F", "pcPn"];

#[derive(Default)]
struct CurrentProcess {
    pid: u32,
    name: String,
    protocol: Option<Protocol>,
}

pub fn parse(output: &str) -> Result<Vec<SocketEntry>> {
    let mut entries = Vec::new();
    let mut current = CurrentProcess::default();

    for line in output.lines() {
        let mut chars = line.chars();
        let Some(field) = chars.next() else {
            continue;
        };
        let value = chars.as_str();
        if value.is_empty() {
            continue;
        }

        match field {
            'p' => {
                let pid = value
                    .parse()
                    .map_err(|_| anyhow!("invalid 'p' field in lsof output: {:?}", value))?;
                current = CurrentProcess {
                    pid,
                    ..Default::default()
                };
            }
            'c' => current.name = value.to_string(),
            'f' => current.protocol = None,
            'P' => {
                current.protocol = match value {
                    "TCP" => Some(Protocol::TCP),
                    "UDP" => Some(Protocol::UDP),
                    _ => None,
                }
            }
            'n' => {
                let Some(protocol) = current.protocol else {
                    continue;
                };
                if let Some((local_port, remote_port)) = parse_name(value) {
                    entries.push(SocketEntry {
                        protocol,
                        local_port,
                        remote_port,
                        pid: current.pid,
                        process_name: current.name.clone(),
                    });
                } else {
                    log::trace!("lsof: skipping unparseable address {:?}", value);
                }
            }
            // Other tags may appear depending on the lsof build; none carry ports
            _ => {}
        }
    }

    Ok(entries)
}

/// Ports from "local->remote" or a lone local address (listening/unconnected).
fn parse_name(name: &str) -> Option<(u16, u16)> {
    match name.split_once("->") {
        Some((local, remote)) => Some((parse_port(local)?, parse_port(remote)?)),
        None => Some((parse_port(name)?, 0)),
    }
}

/// Port of "1.2.3.4:80", "[::1]:6600" or "*:*" (wildcard is 0)
fn parse_port(addr: &str) -> Option<u16> {
    let (_, port) = addr.rsplit_once(':')?;
    if port == "*" {
        return Some(0);
    }
    port.parse().ok()
}
