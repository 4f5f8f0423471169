// network/mod.rs - capture, decode, correlation and output
pub mod capture;
pub mod correlator;
pub mod error;
pub mod frame;
pub mod link_layer;
pub mod parser;
pub mod platform;
pub mod sink;
pub mod table;
pub mod trailer;
pub mod types;

pub use error::FormatError;
pub use types::{FlowKey, MAGIC, ProcessRecord, Protocol, SocketEntry, Verbosity};
