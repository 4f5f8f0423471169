use clap::{Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("tcpshark")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Capture packets and tag each frame with the process that owns its flow")
        .arg(
            Arg::new("outfile")
                .short('o')
                .long("outfile")
                .value_name("FILE")
                .help("Write pcapng output to FILE ('-' for stdout)")
                .required_unless_present_any(["list-interfaces", "print-dissector"]),
        )
        .arg(
            Arg::new("interface")
                .short('i')
                .long("interface")
                .value_name("INTERFACE")
                .help("Interface to capture on")
                .default_value("lo"),
        )
        .arg(
            Arg::new("bpf")
                .short('f')
                .long("bpf")
                .value_name("FILTER")
                .help("BPF filter expression (e.g. \"tcp port 443\")"),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbosity")
                .value_name("LEVEL")
                .help("Process detail per packet: 0 = pid, 1 = pid and command, 2 = also arguments")
                .value_parser(clap::value_parser!(u8).range(0..=2))
                .default_value("1"),
        )
        .arg(
            Arg::new("list-interfaces")
                .short('l')
                .long("list-interfaces")
                .help("List capture interfaces and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("print-dissector")
                .long("print-dissector")
                .help("Print the Wireshark Lua dissector for the trailer and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("refresh-interval")
                .short('r')
                .long("refresh-interval")
                .value_name("MILLISECONDS")
                .help("Connection table refresh interval in milliseconds")
                .value_parser(clap::value_parser!(u64).range(1..))
                .default_value("1000"),
        )
        .arg(
            Arg::new("snaplen")
                .short('s')
                .long("snaplen")
                .value_name("BYTES")
                .help("Bytes to capture per packet")
                .value_parser(clap::value_parser!(i32).range(64..))
                .default_value("65536"),
        )
        .arg(
            Arg::new("no-promisc")
                .long("no-promisc")
                .help("Do not put the interface into promiscuous mode")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("fix-lengths")
                .long("fix-lengths")
                .help("Rewrite 802.3 length fields to match the payload actually written")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level written to stderr")
                .value_parser(["off", "error", "warn", "info", "debug", "trace"])
                .default_value("info"),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .value_name("FILE")
                .help("Write logs to FILE instead of stderr"),
        )
}
