use anyhow::{Context, Result};
use log::{debug, info, trace, warn};

use crate::network::capture::{CapturedFrame, PacketSource};
use crate::network::correlator::Correlator;
use crate::network::error::FormatError;
use crate::network::frame::{self, EnrichedFrame, RebuildOptions};
use crate::network::parser;
use crate::network::sink::PacketSink;
use crate::network::trailer;
use crate::network::types::ProcessRecord;

/// Capture loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Initializing,
    Running,
    /// The source is exhausted; remaining output is being flushed
    Draining,
    Terminated,
}

/// Counters kept by the capture loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Frames written to the sink
    pub processed: u64,
    /// Frames whose trailer names a process
    pub attributed: u64,
    /// Frames dropped because they could not be decoded or rebuilt
    pub dropped: u64,
}

impl std::fmt::Display for CaptureStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} packets written, {} attributed to a process, {} dropped",
            self.processed, self.attributed, self.dropped
        )
    }
}

/// Per-packet pipeline: capture source -> decode -> correlate -> trailer ->
/// rebuild -> sink.
pub struct CaptureLoop<S: PacketSource, K: PacketSink> {
    source: S,
    sink: K,
    correlator: Correlator,
    options: RebuildOptions,
    state: CaptureState,
    stats: CaptureStats,
}

impl<S: PacketSource, K: PacketSink> CaptureLoop<S, K> {
    pub fn new(source: S, sink: K, correlator: Correlator) -> Self {
        Self {
            source,
            sink,
            correlator,
            options: RebuildOptions::default(),
            state: CaptureState::Initializing,
            stats: CaptureStats::default(),
        }
    }

    pub fn with_rebuild_options(mut self, options: RebuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    fn enrich(&self, data: &[u8]) -> Result<(EnrichedFrame, ProcessRecord), FormatError> {
        let decoded = parser::decode(data)?;
        let record = self.correlator.correlate(&decoded.transport);
        trace!(
            "{:?} -> pid {} ({})",
            decoded.transport, record.pid, record.command
        );
        let trailer = trailer::encode(&record);
        let frame = frame::rebuild(&decoded.ethernet, decoded.payload, &trailer, self.options)?;
        Ok((frame, record))
    }

    /// Run until the source is exhausted.
    ///
    /// Source and sink errors end the loop and are returned. Frames that fail
    /// to decode are logged and dropped.
    pub fn run(&mut self) -> Result<CaptureStats> {
        self.state = CaptureState::Running;
        info!(
            "Capture loop running (verbosity {})",
            self.correlator.verbosity()
        );

        let result = self.run_inner();
        self.state = CaptureState::Terminated;
        result.map(|()| self.stats)
    }

    fn run_inner(&mut self) -> Result<()> {
        while let Some(CapturedFrame { timestamp, data }) = self.source.next_frame()? {
            let (enriched, record) = match self.enrich(&data) {
                Ok(enriched) => enriched,
                Err(e) => {
                    warn!("Dropping {} byte packet: {}", data.len(), e);
                    self.stats.dropped += 1;
                    continue;
                }
            };

            self.sink.write_frame(timestamp, enriched.as_bytes())?;
            self.sink.flush()?;

            self.stats.processed += 1;
            if !record.is_unknown() {
                self.stats.attributed += 1;
            }
        }

        self.state = CaptureState::Draining;
        debug!("Capture source exhausted, flushing output");
        self.sink.flush().context("failed to flush output at end of capture")?;
        Ok(())
    }
}
