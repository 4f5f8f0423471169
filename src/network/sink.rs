//! pcapng output
//!
//! One section, one Ethernet interface, one Enhanced Packet Block per frame.

use anyhow::{Context, Result};
use pcap_file::DataLink;
use pcap_file::PcapError;
use pcap_file::pcapng::PcapNgWriter;
use pcap_file::pcapng::blocks::PcapNgBlock;
use pcap_file::pcapng::blocks::enhanced_packet::EnhancedPacketBlock;
use pcap_file::pcapng::blocks::interface_description::{
    InterfaceDescriptionBlock, InterfaceDescriptionOption,
};
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

/// Snap length advertised in the interface description
pub const OUTPUT_SNAPLEN: u32 = 0xFFFF;

/// Packet timestamps are written in nanoseconds (10^-9)
const TIMESTAMP_RESOLUTION: u8 = 9;

/// Destination for enriched frames.
pub trait PacketSink {
    fn write_frame(&mut self, timestamp: Duration, frame: &[u8]) -> Result<()>;

    /// Push buffered frames to the underlying writer.
    fn flush(&mut self) -> Result<()>;
}

pub struct PcapNgSink<W: Write> {
    writer: PcapNgWriter<W>,
    frames: u64,
}

impl<W: Write> PcapNgSink<W> {
    /// Write the section header and the single Ethernet interface description.
    pub fn new(writer: W) -> Result<Self> {
        let mut writer = PcapNgWriter::new(writer)
            .map_err(into_io_error)
            .context("failed to write pcapng section header")?;

        let interface = InterfaceDescriptionBlock {
            linktype: DataLink::ETHERNET,
            snaplen: OUTPUT_SNAPLEN,
            options: vec![InterfaceDescriptionOption::IfTsResol(TIMESTAMP_RESOLUTION)],
        };
        writer
            .write_block(&interface.into_block())
            .map_err(into_io_error)
            .context("failed to write pcapng interface description")?;

        Ok(Self { writer, frames: 0 })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write> PacketSink for PcapNgSink<W> {
    fn write_frame(&mut self, timestamp: Duration, frame: &[u8]) -> Result<()> {
        let packet = EnhancedPacketBlock {
            interface_id: 0,
            timestamp,
            original_len: frame.len() as u32,
            data: Cow::Borrowed(frame),
            options: vec![],
        };
        self.writer
            .write_block(&packet.into_block())
            .map_err(into_io_error)
            .context("failed to write packet to output")?;
        self.frames += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .get_mut()
            .flush()
            .context("failed to flush output")
    }
}

/// Keep the io::Error itself so callers can still see `BrokenPipe`.
fn into_io_error(err: PcapError) -> io::Error {
    match err {
        PcapError::IoError(e) => e,
        other => io::Error::other(other.to_string()),
    }
}

/// Open the output for writing: "-" is stdout, anything else a file.
pub fn open_output(path: &str) -> Result<Box<dyn Write + Send>> {
    if path == "-" {
        return Ok(Box::new(BufWriter::new(io::stdout())));
    }
    let file = File::create(Path::new(path))
        .with_context(|| format!("failed to create output file '{}'", path))?;
    Ok(Box::new(BufWriter::new(file)))
}

/// True when the reader on the other end of a pipe went away.
pub fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<io::Error>())
        .any(|e| e.kind() == io::ErrorKind::BrokenPipe)
}
