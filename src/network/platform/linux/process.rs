// network/platform/linux/process.rs - Linux procfs-based socket enumeration

use crate::network::platform::ConnectionEnumerator;
use crate::network::types::{Protocol, SocketEntry};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Map of socket inode to (PID, process name)
type InodeProcessMap = HashMap<u64, (u32, String)>;

const NET_TABLES: [(&str, Protocol); 4] = [
    ("net/tcp", Protocol::TCP),
    ("net/tcp6", Protocol::TCP),
    ("net/udp", Protocol::UDP),
    ("net/udp6", Protocol::UDP),
];

pub struct LinuxConnectionEnumerator {
    proc_root: PathBuf,
}

impl Default for LinuxConnectionEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxConnectionEnumerator {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Enumerate against another procfs mount (containers, tests).
    pub fn with_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    /// Build inode -> (pid, process_name) mapping
    fn build_inode_map(&self) -> Result<InodeProcessMap> {
        let mut inode_map = HashMap::new();

        let entries = fs::read_dir(&self.proc_root)
            .with_context(|| format!("failed to read {}", self.proc_root.display()))?;

        for entry in entries {
            let entry = entry?;
            let path = entry.path();

            if let Some(pid_str) = path.file_name().and_then(|s| s.to_str())
                && let Ok(pid) = pid_str.parse::<u32>()
            {
                if pid == 0 {
                    continue;
                }

                let process_name = fs::read_to_string(path.join("comm"))
                    .unwrap_or_else(|_| "unknown".to_string())
                    .trim()
                    .to_string();

                // Processes we may not inspect are skipped, not fatal
                let fd_dir = path.join("fd");
                if let Ok(fd_entries) = fs::read_dir(&fd_dir) {
                    for fd_entry in fd_entries.flatten() {
                        if let Ok(link) = fs::read_link(fd_entry.path())
                            && let Some(link_str) = link.to_str()
                            && let Some(inode) = extract_socket_inode(link_str)
                        {
                            inode_map.insert(inode, (pid, process_name.clone()));
                        }
                    }
                }
            }
        }

        Ok(inode_map)
    }

    /// Parse a /proc/net table and emit one entry per socket owned by a known process
    fn parse_and_map(
        path: &Path,
        protocol: Protocol,
        inode_map: &InodeProcessMap,
        result: &mut Vec<SocketEntry>,
    ) {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return, // IPv6 tables are absent on some kernels
        };
        parse_net_table(&content, protocol, inode_map, result);
    }
}

impl ConnectionEnumerator for LinuxConnectionEnumerator {
    fn enumerate(&self) -> Result<Vec<SocketEntry>> {
        let inode_map = self.build_inode_map()?;

        let mut entries = Vec::new();
        for (table, protocol) in NET_TABLES {
            Self::parse_and_map(
                &self.proc_root.join(table),
                protocol,
                &inode_map,
                &mut entries,
            );
        }

        log::trace!(
            "procfs: {} sockets across {} socket inodes",
            entries.len(),
            inode_map.len()
        );
        Ok(entries)
    }

    fn command_line(&self, pid: u32) -> Result<String> {
        let path = self.proc_root.join(pid.to_string()).join("cmdline");
        let raw = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        Ok(join_cmdline(&raw))
    }

    fn get_detection_method(&self) -> &str {
        "procfs"
    }
}

fn parse_net_table(
    content: &str,
    protocol: Protocol,
    inode_map: &InodeProcessMap,
    result: &mut Vec<SocketEntry>,
) {
    for line in content.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }

        let (Some(local_addr), Some(remote_addr)) =
            (parse_hex_address(parts[1]), parse_hex_address(parts[2]))
        else {
            continue;
        };

        if let Ok(inode) = parts[9].parse::<u64>()
            && let Some((pid, name)) = inode_map.get(&inode)
        {
            result.push(SocketEntry {
                protocol,
                local_port: local_addr.port(),
                remote_port: remote_addr.port(),
                pid: *pid,
                process_name: name.clone(),
            });
        }
    }
}

/// /proc/<pid>/cmdline is NUL separated with a trailing NUL
fn join_cmdline(raw: &[u8]) -> String {
    raw.split(|&b| b == 0)
        .filter(|arg| !arg.is_empty())
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_hex_address(hex_addr: &str) -> Option<SocketAddr> {
    let (ip_hex, port_hex) = hex_addr.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;

    if ip_hex.len() == 8 {
        // IPv4
        let ip_bytes = u32::from_str_radix(ip_hex, 16).ok()?;
        let ip = Ipv4Addr::from(ip_bytes.to_le_bytes());
        Some(SocketAddr::new(IpAddr::V4(ip), port))
    } else if ip_hex.len() == 32 {
        // IPv6
        let mut bytes = [0u8; 16];
        for i in 0..4 {
            let chunk = &ip_hex[i * 8..(i + 1) * 8];
            let value = u32::from_str_radix(chunk, 16).ok()?;
            bytes[i * 4..(i + 1) * 4].copy_from_slice(&value.to_le_bytes());
        }
        let ip = Ipv6Addr::from(bytes);
        Some(SocketAddr::new(IpAddr::V6(ip), port))
    } else {
        None
    }
}

fn extract_socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?.strip_suffix(']')?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TCP_TABLE: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:01BB 0100007F:C738 01 00000000:00000000 00:00000000 00000000     0        0 4242 1 0000000000000000 20 4 30 10 -1
   1: 00000000:0016 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 1717 1 0000000000000000 100 0 0 10 0
   2: 0100007F:0050 0100007F:D000 01 00000000:00000000 00:00000000 00000000     0        0 9999 1 0000000000000000 20 4 30 10 -1
";

    #[test]
    fn test_parse_hex_address_ipv4() {
        let addr = parse_hex_address("0100007F:01BB").unwrap();
        assert_eq!(addr, "127.0.0.1:443".parse().unwrap());
    }

    #[test]
    fn test_parse_hex_address_ipv6() {
        let addr = parse_hex_address("00000000000000000000000001000000:0035").unwrap();
        assert_eq!(addr, "[::1]:53".parse().unwrap());
    }

    #[test]
    fn test_parse_hex_address_rejects_garbage() {
        assert!(parse_hex_address("nonsense").is_none());
        assert!(parse_hex_address("0100:01BB").is_none());
    }

    #[test]
    fn test_extract_socket_inode() {
        assert_eq!(extract_socket_inode("socket:[12345]"), Some(12345));
        assert_eq!(extract_socket_inode("pipe:[12345]"), None);
        assert_eq!(extract_socket_inode("/dev/null"), None);
    }

    #[test]
    fn test_parse_net_table_keeps_owned_sockets() {
        let mut inodes = InodeProcessMap::new();
        inodes.insert(4242, (1234, "nginx".to_string()));
        inodes.insert(1717, (1, "sshd".to_string()));

        let mut entries = Vec::new();
        parse_net_table(TCP_TABLE, Protocol::TCP, &inodes, &mut entries);

        assert_eq!(
            entries,
            vec![
                SocketEntry {
                    protocol: Protocol::TCP,
                    local_port: 443,
                    remote_port: 51000,
                    pid: 1234,
                    process_name: "nginx".to_string(),
                },
                SocketEntry {
                    protocol: Protocol::TCP,
                    local_port: 22,
                    remote_port: 0,
                    pid: 1,
                    process_name: "sshd".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_join_cmdline() {
        assert_eq!(
            join_cmdline(b"/usr/bin/python3\0-m\0http.server\0"),
            "/usr/bin/python3 -m http.server"
        );
        assert_eq!(join_cmdline(b""), "");
    }

    #[test]
    fn test_enumerate_missing_root_is_error() {
        let enumerator = LinuxConnectionEnumerator::with_root("/nonexistent/proc/root");
        assert!(enumerator.enumerate().is_err());
        assert!(enumerator.command_line(1).is_err());
    }

    #[test]
    fn test_command_line_of_self() {
        let enumerator = LinuxConnectionEnumerator::new();
        let cmdline = enumerator.command_line(std::process::id()).unwrap();
        assert!(!cmdline.is_empty());
    }
}
