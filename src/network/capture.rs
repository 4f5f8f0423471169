// network/capture.rs - Packet capture setup and utilities
use crate::network::link_layer;
use anyhow::{Context, Result, anyhow};
use pcap::{Active, Capture, Device, Error as PcapError};
use std::time::Duration;

/// Packet capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Network interface name
    pub interface: String,
    /// Snapshot length (bytes to capture per packet)
    pub snaplen: i32,
    /// Capture traffic not addressed to this host
    pub promisc: bool,
    /// Read timeout in milliseconds
    pub timeout_ms: i32,
    /// BPF filter string
    pub filter: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: "lo".to_string(),
            snaplen: 65536,
            promisc: true,
            timeout_ms: 500,
            filter: None,
        }
    }
}

/// A frame as delivered by the capture source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    /// Arrival time since the Unix epoch
    pub timestamp: Duration,
    pub data: Vec<u8>,
}

/// Anything yielding captured link-layer frames in arrival order.
pub trait PacketSource {
    /// Block until the next frame. `Ok(None)` means the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>>;
}

/// Open a live capture on the configured interface.
///
/// Only Ethernet links are accepted: the rebuilder re-emits Ethernet headers.
pub fn setup_packet_capture(config: &CaptureConfig) -> Result<Capture<Active>> {
    log::info!("Using Device: {}", config.interface);

    let mut cap = Capture::from_device(config.interface.as_str())
        .with_context(|| format!("failed to open interface '{}'", config.interface))?
        .promisc(config.promisc)
        .snaplen(config.snaplen)
        .timeout(config.timeout_ms)
        .immediate_mode(true)
        .open()
        .with_context(|| format!("failed to start capture on '{}'", config.interface))?;

    let linktype = cap.get_datalink();
    if !link_layer::is_ethernet(linktype.0) {
        return Err(anyhow!(
            "interface '{}' has link type {} ({}); only Ethernet interfaces are supported",
            config.interface,
            linktype.0,
            linktype.get_name().unwrap_or_else(|_| "unknown".to_string())
        ));
    }

    if let Some(filter) = &config.filter {
        log::info!("Filter: {}", filter);
        cap.filter(filter, true)
            .with_context(|| format!("invalid BPF filter '{}'", filter))?;
    }

    Ok(cap)
}

/// Packet reader over a live pcap handle
pub struct PacketReader {
    capture: Capture<Active>,
}

impl PacketReader {
    pub fn new(capture: Capture<Active>) -> Self {
        Self { capture }
    }

    pub fn open(config: &CaptureConfig) -> Result<Self> {
        Ok(Self::new(setup_packet_capture(config)?))
    }
}

impl PacketSource for PacketReader {
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        loop {
            match self.capture.next_packet() {
                Ok(packet) => {
                    let ts = packet.header.ts;
                    let timestamp =
                        Duration::new(ts.tv_sec as u64, (ts.tv_usec as u32).saturating_mul(1_000));
                    return Ok(Some(CapturedFrame {
                        timestamp,
                        data: packet.data.to_vec(),
                    }));
                }
                // Read timeouts only mean the link was quiet
                Err(PcapError::TimeoutExpired) => continue,
                Err(PcapError::NoMorePackets) => return Ok(None),
                Err(e) => return Err(e).context("failed to read from capture source"),
            }
        }
    }
}

/// Summary of a capture device for `--list-interfaces`
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub name: String,
    pub description: Option<String>,
    pub addresses: Vec<std::net::IpAddr>,
    pub up: bool,
    pub loopback: bool,
}

impl std::fmt::Display for InterfaceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(desc) = &self.description {
            write!(f, " ({})", desc)?;
        }
        let mut flags = Vec::new();
        if self.up {
            flags.push("up");
        }
        if self.loopback {
            flags.push("loopback");
        }
        if !flags.is_empty() {
            write!(f, " [{}]", flags.join(", "))?;
        }
        for addr in &self.addresses {
            write!(f, "\n    {}", addr)?;
        }
        Ok(())
    }
}

/// List capture devices known to libpcap
pub fn list_interfaces() -> Result<Vec<InterfaceInfo>> {
    let devices = Device::list().map_err(|e| {
        anyhow!(
            "Failed to list network devices: {}. This may indicate insufficient privileges.",
            e
        )
    })?;

    Ok(devices
        .into_iter()
        .map(|d| InterfaceInfo {
            up: d.flags.is_up(),
            loopback: d.flags.is_loopback(),
            addresses: d.addresses.iter().map(|a| a.addr).collect(),
            description: d.desc,
            name: d.name,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CaptureConfig::default();
        assert_eq!(config.interface, "lo");
        assert_eq!(config.snaplen, 65536);
        assert!(config.promisc);
        assert!(config.filter.is_none());
    }

    #[test]
    fn test_interface_display() {
        let info = InterfaceInfo {
            name: "eth0".to_string(),
            description: None,
            addresses: vec!["192.168.1.2".parse().unwrap()],
            up: true,
            loopback: false,
        };
        assert_eq!(info.to_string(), "eth0 [up]\n    192.168.1.2");
    }
}
