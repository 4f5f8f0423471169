use std::fmt;

/// Magic value opening every trailer. Dissectors key on it to find the record.
pub const MAGIC: u32 = 0xA1BF_F3D4;

/// Transport protocol of an enumerated socket.
///
/// Only used for logging: the flow key itself is protocol-blind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)] // Protocol names are standardized
pub enum Protocol {
    TCP,
    UDP,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::TCP => write!(f, "TCP"),
            Protocol::UDP => write!(f, "UDP"),
        }
    }
}

/// Flow identity used by the connection table.
///
/// Neither the transport protocol nor the IP addresses take part in the key, so a
/// TCP and a UDP flow sharing the same port pair collide and the last inserted wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub local_port: u16,
    pub remote_port: u16,
}

impl FlowKey {
    pub fn new(local_port: u16, remote_port: u16) -> Self {
        Self {
            local_port,
            remote_port,
        }
    }

    /// The same flow seen from the other end.
    pub fn reversed(self) -> Self {
        Self {
            local_port: self.remote_port,
            remote_port: self.local_port,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.local_port, self.remote_port)
    }
}

/// Process attribution carried in a frame trailer.
///
/// Length prefixes are not stored: they are derived from `command` and
/// `arguments` when encoding, so they can never disagree with the strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub magic: u32,
    pub pid: u32,
    pub command: String,
    pub arguments: String,
}

impl ProcessRecord {
    pub fn new(pid: u32, command: impl Into<String>) -> Self {
        Self {
            magic: MAGIC,
            pid,
            command: command.into(),
            arguments: String::new(),
        }
    }

    /// Record emitted when no owning process is known.
    pub fn unknown() -> Self {
        Self::new(0, String::new())
    }

    pub fn is_unknown(&self) -> bool {
        self.pid == 0 && self.command.is_empty()
    }
}

impl Default for ProcessRecord {
    fn default() -> Self {
        Self::unknown()
    }
}

/// How much process detail goes into each trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// pid only
    Pid,
    /// pid and command name
    #[default]
    Command,
    /// pid, command name and full command line
    Arguments,
}

impl Verbosity {
    pub fn level(self) -> u8 {
        match self {
            Verbosity::Pid => 0,
            Verbosity::Command => 1,
            Verbosity::Arguments => 2,
        }
    }
}

impl TryFrom<u8> for Verbosity {
    type Error = anyhow::Error;

    fn try_from(level: u8) -> anyhow::Result<Self> {
        match level {
            0 => Ok(Verbosity::Pid),
            1 => Ok(Verbosity::Command),
            2 => Ok(Verbosity::Arguments),
            other => Err(anyhow::anyhow!(
                "invalid verbosity {}: expected 0, 1 or 2",
                other
            )),
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verbosity::Pid => "pid",
            Verbosity::Command => "pid+command",
            Verbosity::Arguments => "pid+command+arguments",
        };
        write!(f, "{} ({})", self.level(), name)
    }
}

/// A socket reported by the OS enumeration facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEntry {
    pub protocol: Protocol,
    pub local_port: u16,
    pub remote_port: u16,
    pub pid: u32,
    pub process_name: String,
}
