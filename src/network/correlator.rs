//! Flow -> process correlation for the packet path

use crate::network::parser::Transport;
use crate::network::platform::ConnectionEnumerator;
use crate::network::table::TableHandle;
use crate::network::types::{FlowKey, ProcessRecord, Verbosity};
use std::sync::Arc;

pub struct Correlator {
    table: Arc<TableHandle>,
    enumerator: Arc<dyn ConnectionEnumerator>,
    verbosity: Verbosity,
}

impl Correlator {
    pub fn new(
        table: Arc<TableHandle>,
        enumerator: Arc<dyn ConnectionEnumerator>,
        verbosity: Verbosity,
    ) -> Self {
        Self {
            table,
            enumerator,
            verbosity,
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Record for an exact (local, remote) port pair in the current snapshot.
    pub fn lookup(&self, local_port: u16, remote_port: u16) -> ProcessRecord {
        let record = self
            .table
            .current()
            .get(&FlowKey::new(local_port, remote_port))
            .cloned()
            .unwrap_or_default();
        self.apply_verbosity(record)
    }

    /// Record for a decoded packet.
    ///
    /// The packet's source port is tried as the local side first; inbound
    /// packets miss that and are matched with the ports swapped.
    pub fn correlate(&self, transport: &Transport) -> ProcessRecord {
        let Some((src_port, dst_port)) = transport.ports() else {
            return ProcessRecord::unknown();
        };

        let key = FlowKey::new(src_port, dst_port);
        let table = self.table.current();
        let record = table
            .get(&key)
            .or_else(|| table.get(&key.reversed()))
            .cloned();
        drop(table);

        match record {
            Some(record) => self.apply_verbosity(record),
            None => {
                log::trace!("No process for flow {}", key);
                ProcessRecord::unknown()
            }
        }
    }

    fn apply_verbosity(&self, mut record: ProcessRecord) -> ProcessRecord {
        match self.verbosity {
            Verbosity::Pid => {
                record.command.clear();
                record.arguments.clear();
            }
            Verbosity::Command => record.arguments.clear(),
            Verbosity::Arguments => {
                record.arguments.clear();
                if record.pid != 0 {
                    // The process may be gone already; an empty field is fine
                    match self.enumerator.command_line(record.pid) {
                        Ok(cmdline) => record.arguments = cmdline,
                        Err(e) => log::trace!("No command line for pid {}: {:#}", record.pid, e),
                    }
                }
            }
        }
        record
    }
}
