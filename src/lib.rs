//! tcpshark library
//!
//! Captures Ethernet frames, looks up the local process owning each TCP/UDP
//! flow and re-emits every frame as pcapng with a process trailer appended.

pub mod app;
pub mod cli;
pub mod config;
pub mod network;

/// Wireshark Lua post-dissector decoding the trailer
pub const DISSECTOR: &str = include_str!("../dissector/tcpshark.lua");
