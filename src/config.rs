use anyhow::{Result, anyhow};
use clap::ArgMatches;
use log::LevelFilter;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::network::capture::CaptureConfig;
use crate::network::frame::RebuildOptions;
use crate::network::table::DEFAULT_REFRESH_INTERVAL;
use crate::network::types::Verbosity;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Network interface to capture on
    pub interface: String,
    /// Output path, "-" for stdout
    pub output: Option<String>,
    /// BPF filter expression
    pub filter: Option<String>,
    pub verbosity: Verbosity,
    /// Connection table refresh interval
    pub refresh_interval: Duration,
    pub snaplen: i32,
    pub promisc: bool,
    /// Recompute 802.3 length fields when rebuilding frames
    pub fix_lengths: bool,
    pub log_level: LevelFilter,
    /// Log to this file instead of stderr
    pub log_file: Option<PathBuf>,
    pub list_interfaces: bool,
    pub print_dissector: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: "lo".to_string(),
            output: None,
            filter: None,
            verbosity: Verbosity::default(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            snaplen: 65536,
            promisc: true,
            fix_lengths: false,
            log_level: LevelFilter::Info,
            log_file: None,
            list_interfaces: false,
            print_dissector: false,
        }
    }
}

impl Config {
    /// Build the configuration from parsed command line arguments
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let mut config = Config::default();

        if let Some(interface) = matches.get_one::<String>("interface") {
            config.interface = interface.clone();
        }

        config.output = matches.get_one::<String>("outfile").cloned();

        // An empty filter means "capture everything"
        config.filter = matches
            .get_one::<String>("bpf")
            .filter(|f| !f.trim().is_empty())
            .cloned();

        if let Some(level) = matches.get_one::<u8>("verbosity") {
            config.verbosity = Verbosity::try_from(*level)?;
        }

        if let Some(interval) = matches.get_one::<u64>("refresh-interval") {
            config.refresh_interval = Duration::from_millis(*interval);
        }

        if let Some(snaplen) = matches.get_one::<i32>("snaplen") {
            config.snaplen = *snaplen;
        }

        config.promisc = !matches.get_flag("no-promisc");
        config.fix_lengths = matches.get_flag("fix-lengths");

        if let Some(level) = matches.get_one::<String>("log-level") {
            config.log_level = LevelFilter::from_str(level)
                .map_err(|_| anyhow!("invalid log level '{}'", level))?;
        }

        config.log_file = matches.get_one::<String>("log-file").map(PathBuf::from);
        config.list_interfaces = matches.get_flag("list-interfaces");
        config.print_dissector = matches.get_flag("print-dissector");

        Ok(config)
    }

    /// Output path, required for capture mode
    pub fn output_path(&self) -> Result<&str> {
        self.output
            .as_deref()
            .ok_or_else(|| anyhow!("no output file given (use -o FILE or -o -)"))
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            interface: self.interface.clone(),
            snaplen: self.snaplen,
            promisc: self.promisc,
            filter: self.filter.clone(),
            ..CaptureConfig::default()
        }
    }

    pub fn rebuild_options(&self) -> RebuildOptions {
        RebuildOptions {
            fix_lengths: self.fix_lengths,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::build_cli;

    fn parse(args: &[&str]) -> Config {
        let matches = build_cli().try_get_matches_from(args).unwrap();
        Config::from_matches(&matches).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["tcpshark", "-o", "out.pcapng"]);
        assert_eq!(config.interface, "lo");
        assert_eq!(config.output.as_deref(), Some("out.pcapng"));
        assert_eq!(config.verbosity, Verbosity::Command);
        assert_eq!(config.refresh_interval, Duration::from_secs(1));
        assert_eq!(config.snaplen, 65536);
        assert!(config.promisc);
        assert_eq!(config.log_level, LevelFilter::Info);
        assert!(config.filter.is_none());
        assert!(!config.list_interfaces);
        assert!(!config.rebuild_options().fix_lengths);
    }

    #[test]
    fn test_all_flags() {
        let config = parse(&[
            "tcpshark",
            "-o",
            "-",
            "-i",
            "eth0",
            "-f",
            "tcp port 443",
            "-v",
            "2",
            "-r",
            "250",
            "-s",
            "1500",
            "--no-promisc",
            "--fix-lengths",
            "--log-level",
            "debug",
            "--log-file",
            "/tmp/tcpshark.log",
        ]);
        assert_eq!(config.interface, "eth0");
        assert_eq!(config.output_path().unwrap(), "-");
        assert_eq!(config.filter.as_deref(), Some("tcp port 443"));
        assert_eq!(config.verbosity, Verbosity::Arguments);
        assert_eq!(config.refresh_interval, Duration::from_millis(250));
        assert_eq!(config.snaplen, 1500);
        assert!(!config.promisc);
        assert!(config.rebuild_options().fix_lengths);
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/tcpshark.log")));

        let capture = config.capture_config();
        assert_eq!(capture.interface, "eth0");
        assert_eq!(capture.snaplen, 1500);
        assert!(!capture.promisc);
    }

    #[test]
    fn test_empty_filter_is_none() {
        let config = parse(&["tcpshark", "-o", "x", "-f", "  "]);
        assert!(config.filter.is_none());
    }

    #[test]
    fn test_outfile_required_for_capture() {
        assert!(build_cli().try_get_matches_from(["tcpshark"]).is_err());
        let config = parse(&["tcpshark", "--list-interfaces"]);
        assert!(config.list_interfaces);
        assert!(config.output_path().is_err());
        assert!(parse(&["tcpshark", "--print-dissector"]).print_dissector);
    }

    #[test]
    fn test_verbosity_out_of_range_rejected() {
        assert!(
            build_cli()
                .try_get_matches_from(["tcpshark", "-o", "x", "-v", "3"])
                .is_err()
        );
    }
}
