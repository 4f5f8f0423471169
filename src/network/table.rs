//! Flow -> process table and its background refresher
//!
//! The refresher thread is the only writer. It builds a complete table off to
//! the side and publishes it with a single `Arc` swap; readers clone the current
//! `Arc` and work on that snapshot, so a lookup never sees a half-built table
//! and never holds a lock while it uses one.

use crate::network::platform::ConnectionEnumerator;
use crate::network::types::{FlowKey, ProcessRecord, SocketEntry};
use anyhow::Result;
use crossbeam::channel::{self, Sender};
use crossbeam::select;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Immutable snapshot of socket ownership keyed by port pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionTable {
    entries: HashMap<FlowKey, ProcessRecord>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from enumerated sockets.
    ///
    /// Later entries overwrite earlier ones with the same port pair, whatever
    /// their protocol. Arguments are never stored here.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a SocketEntry>) -> Self {
        let mut table = HashMap::new();
        for entry in entries {
            let key = FlowKey::new(entry.local_port, entry.remote_port);
            let record = ProcessRecord::new(entry.pid, &entry.process_name);
            if let Some(previous) = table.insert(key, record)
                && previous.pid != entry.pid
            {
                log::trace!(
                    "Flow {} ({}) now owned by pid {} instead of {}",
                    key,
                    entry.protocol,
                    entry.pid,
                    previous.pid
                );
            }
        }
        Self { entries: table }
    }

    pub fn get(&self, key: &FlowKey) -> Option<&ProcessRecord> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared handle to "the current table".
///
/// The lock only guards the pointer swap. It is never held while a table is
/// built, read or freed, so a reader waits at most briefly for a swap in progress.
#[derive(Debug, Default)]
pub struct TableHandle {
    current: RwLock<Arc<ConnectionTable>>,
}

impl TableHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently published snapshot.
    pub fn current(&self) -> Arc<ConnectionTable> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the current snapshot. The old one is freed once its last reader drops it.
    pub fn publish(&self, table: ConnectionTable) {
        let previous = self.replace(table);
        drop(previous);
    }

    /// Swap in a new snapshot and hand back the previous one.
    ///
    /// The write lock is released before returning, so dropping the returned
    /// table never stalls readers.
    pub fn replace(&self, table: ConnectionTable) -> Arc<ConnectionTable> {
        let table = Arc::new(table);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, table)
    }
}

/// Run one enumeration and publish the result.
///
/// On failure the previous snapshot stays in place and the error is returned
/// for the caller to log.
pub fn refresh_once(enumerator: &dyn ConnectionEnumerator, handle: &TableHandle) -> Result<usize> {
    let start = Instant::now();
    let entries = enumerator.enumerate()?;
    let table = ConnectionTable::from_entries(&entries);
    let len = table.len();
    handle.publish(table);
    debug!(
        "Connection table refreshed via {}: {} flows from {} sockets in {:?}",
        enumerator.get_detection_method(),
        len,
        entries.len(),
        start.elapsed()
    );
    Ok(len)
}

/// Background thread refreshing a `TableHandle` on a fixed interval.
///
/// Stops when dropped.
pub struct TableRefresher {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TableRefresher {
    pub fn spawn(
        enumerator: Arc<dyn ConnectionEnumerator>,
        handle: Arc<TableHandle>,
        interval: Duration,
    ) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let ticker = channel::tick(interval);

        let thread = thread::Builder::new()
            .name("table-refresher".into())
            .spawn(move || {
                info!("Connection table refresher started ({:?} interval)", interval);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            if let Err(e) = refresh_once(enumerator.as_ref(), &handle) {
                                warn!(
                                    "Connection enumeration failed, keeping previous table: {:#}",
                                    e
                                );
                            }
                        }
                        // Disconnected when the refresher is dropped
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                debug!("Connection table refresher stopped");
            })?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn stop(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("Connection table refresher panicked");
        }
    }
}

impl Drop for TableRefresher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::types::Protocol;
    use anyhow::anyhow;
    use std::sync::Mutex;

    fn entry(protocol: Protocol, local: u16, remote: u16, pid: u32, name: &str) -> SocketEntry {
        SocketEntry {
            protocol,
            local_port: local,
            remote_port: remote,
            pid,
            process_name: name.to_string(),
        }
    }

    /// Enumerator replaying a scripted sequence of results.
    struct Scripted {
        results: Mutex<Vec<Result<Vec<SocketEntry>>>>,
    }

    impl ConnectionEnumerator for Scripted {
        fn enumerate(&self) -> Result<Vec<SocketEntry>> {
            let mut results = self.results.lock().unwrap();
            if results.is_empty() {
                Ok(Vec::new())
            } else {
                results.remove(0)
            }
        }

        fn command_line(&self, _pid: u32) -> Result<String> {
            Err(anyhow!("not scripted"))
        }

        fn get_detection_method(&self) -> &str {
            "scripted"
        }
    }

    #[test]
    fn test_from_entries_last_insert_wins_across_protocols() {
        let entries = vec![
            entry(Protocol::TCP, 5000, 6000, 10, "tcp-owner"),
            entry(Protocol::UDP, 5000, 6000, 20, "udp-owner"),
        ];
        let table = ConnectionTable::from_entries(&entries);
        assert_eq!(table.len(), 1);
        let record = table.get(&FlowKey::new(5000, 6000)).unwrap();
        assert_eq!(record.pid, 20);
        assert_eq!(record.command, "udp-owner");
        assert!(record.arguments.is_empty());
    }

    #[test]
    fn test_handle_starts_empty() {
        let handle = TableHandle::new();
        assert!(handle.current().is_empty());
    }

    #[test]
    fn test_old_snapshot_survives_publish() {
        let handle = TableHandle::new();
        handle.publish(ConnectionTable::from_entries(&[entry(
            Protocol::TCP,
            1,
            2,
            100,
            "old",
        )]));
        let before = handle.current();

        handle.publish(ConnectionTable::from_entries(&[entry(
            Protocol::TCP,
            3,
            4,
            200,
            "new",
        )]));

        // A reader holding the old snapshot still sees it whole
        assert_eq!(before.get(&FlowKey::new(1, 2)).unwrap().pid, 100);
        assert!(before.get(&FlowKey::new(3, 4)).is_none());

        let after = handle.current();
        assert!(after.get(&FlowKey::new(1, 2)).is_none());
        assert_eq!(after.get(&FlowKey::new(3, 4)).unwrap().pid, 200);
    }

    #[test]
    fn test_previous_table_freed_outside_lock() {
        let handle = TableHandle::new();
        let entries: Vec<_> = (0..10_000u16)
            .map(|port| entry(Protocol::TCP, port, 80, u32::from(port), "bulk"))
            .collect();
        handle.publish(ConnectionTable::from_entries(&entries));

        let previous = handle.replace(ConnectionTable::new());

        // We hold the last reference, and readers can already get the new table
        assert_eq!(Arc::strong_count(&previous), 1);
        assert_eq!(previous.len(), 10_000);
        assert!(handle.current.try_read().is_ok());
        assert!(handle.current().is_empty());
        drop(previous);
    }

    #[test]
    fn test_reader_not_stalled_while_old_table_is_freed() {
        let handle = Arc::new(TableHandle::new());
        let entries: Vec<_> = (0..50_000u32)
            .map(|i| entry(Protocol::TCP, (i % 65_536) as u16, (i / 65_536) as u16, i, "bulk"))
            .collect();
        handle.publish(ConnectionTable::from_entries(&entries));

        let previous = handle.replace(ConnectionTable::new());
        let reader_handle = Arc::clone(&handle);
        let reader = thread::spawn(move || {
            let start = Instant::now();
            let table = reader_handle.current();
            (table.is_empty(), start.elapsed())
        });

        // Keep the old table alive until the reader is done
        let (empty, waited) = reader.join().unwrap();
        drop(previous);
        assert!(empty);
        assert!(waited < Duration::from_secs(1), "reader waited {:?}", waited);
    }

    #[test]
    fn test_failed_refresh_keeps_previous_table() {
        let enumerator = Scripted {
            results: Mutex::new(vec![
                Ok(vec![entry(Protocol::TCP, 443, 51000, 1234, "nginx")]),
                Err(anyhow!("permission denied")),
            ]),
        };
        let handle = TableHandle::new();

        assert_eq!(refresh_once(&enumerator, &handle).unwrap(), 1);
        assert!(refresh_once(&enumerator, &handle).is_err());

        let table = handle.current();
        assert_eq!(table.get(&FlowKey::new(443, 51000)).unwrap().pid, 1234);
    }

    /// Enumerator returning the same sockets every time.
    struct Fixed(Vec<SocketEntry>);

    impl ConnectionEnumerator for Fixed {
        fn enumerate(&self) -> Result<Vec<SocketEntry>> {
            Ok(self.0.clone())
        }

        fn command_line(&self, _pid: u32) -> Result<String> {
            Ok(String::new())
        }

        fn get_detection_method(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn test_refresher_publishes_and_stops() {
        let enumerator: Arc<dyn ConnectionEnumerator> =
            Arc::new(Fixed(vec![entry(Protocol::UDP, 53, 40000, 7, "dnsmasq")]));
        let handle = Arc::new(TableHandle::new());

        let mut refresher =
            TableRefresher::spawn(enumerator, Arc::clone(&handle), Duration::from_millis(10))
                .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.current().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        refresher.stop();

        assert!(refresher.thread.is_none());
        let record = handle.current().get(&FlowKey::new(53, 40000)).cloned();
        assert_eq!(record, Some(ProcessRecord::new(7, "dnsmasq")));
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        // Every published table maps all of its keys to the same pid, so a
        // mixed snapshot would show up as two different pids.
        let handle = Arc::new(TableHandle::new());
        let writer_handle = Arc::clone(&handle);

        let writer = thread::spawn(move || {
            for generation in 1..=200u32 {
                let entries: Vec<_> = (0..64u16)
                    .map(|port| entry(Protocol::TCP, port, 1, generation, "gen"))
                    .collect();
                writer_handle.publish(ConnectionTable::from_entries(&entries));
            }
        });

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handle = Arc::clone(&handle);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let table = handle.current();
                        let pids: std::collections::HashSet<u32> = (0..64u16)
                            .filter_map(|port| table.get(&FlowKey::new(port, 1)).map(|r| r.pid))
                            .collect();
                        assert!(pids.len() <= 1, "mixed snapshot: {:?}", pids);
                        if !table.is_empty() {
                            assert_eq!(table.len(), 64);
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
