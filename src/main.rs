use anyhow::{Context, Result};
use log::{LevelFilter, error, info, warn};
use simplelog::{Config as LogConfig, WriteLogger};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::process;
use std::sync::Arc;

use tcpshark::app::CaptureLoop;
use tcpshark::cli::build_cli;
use tcpshark::config::Config;
use tcpshark::network::capture::{self, PacketReader};
use tcpshark::network::correlator::Correlator;
use tcpshark::network::platform::{self, ConnectionEnumerator};
use tcpshark::network::sink::{self, PcapNgSink};
use tcpshark::network::table::{self, TableHandle, TableRefresher};

fn main() {
    // clap prints its own message and exits with code 2 on bad arguments
    let matches = build_cli().get_matches();

    let code = match run(&matches) {
        Ok(()) => 0,
        Err(e) if sink::is_broken_pipe(&e) => {
            info!("Output closed by reader, stopping capture");
            0
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            1
        }
    };
    log::logger().flush();
    process::exit(code);
}

fn run(matches: &clap::ArgMatches) -> Result<()> {
    let config = Config::from_matches(matches)?;
    setup_logging(config.log_level, config.log_file.as_deref())?;

    if config.print_dissector {
        io::stdout()
            .write_all(tcpshark::DISSECTOR.as_bytes())
            .context("failed to print dissector")?;
        return Ok(());
    }

    if config.list_interfaces {
        return list_interfaces();
    }

    info!("Starting tcpshark {}", env!("CARGO_PKG_VERSION"));
    capture(&config)
}

fn setup_logging(level: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    // stdout may be carrying the capture, so logs never go there
    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create log file '{}'", path.display()))?;
            WriteLogger::init(level, LogConfig::default(), file)?;
        }
        None => WriteLogger::init(level, LogConfig::default(), io::stderr())?,
    }
    Ok(())
}

fn list_interfaces() -> Result<()> {
    let interfaces = capture::list_interfaces()?;
    let mut out = io::stdout().lock();
    for interface in interfaces {
        writeln!(out, "{}", interface)?;
    }
    Ok(())
}

fn capture(config: &Config) -> Result<()> {
    // Initializing: everything that can fail on bad input happens before the loop
    let enumerator: Arc<dyn ConnectionEnumerator> =
        Arc::from(platform::create_connection_enumerator()?);
    let handle = Arc::new(TableHandle::new());

    match table::refresh_once(enumerator.as_ref(), &handle) {
        Ok(flows) => info!(
            "Initial connection table: {} flows via {}",
            flows,
            enumerator.get_detection_method()
        ),
        Err(e) => warn!("Initial connection enumeration failed: {:#}", e),
    }

    let reader = PacketReader::open(&config.capture_config())?;

    let output = config.output_path()?;
    let sink = PcapNgSink::new(sink::open_output(output)?)?;
    info!(
        "Writing pcapng to {}",
        if output == "-" { "stdout" } else { output }
    );

    let _refresher = TableRefresher::spawn(
        Arc::clone(&enumerator),
        Arc::clone(&handle),
        config.refresh_interval,
    )?;

    ctrlc::set_handler(|| {
        info!("Interrupt received, stopping capture");
        log::logger().flush();
        process::exit(0);
    })
    .context("failed to install interrupt handler")?;

    let correlator = Correlator::new(handle, enumerator, config.verbosity);
    let mut capture_loop = CaptureLoop::new(reader, sink, correlator)
        .with_rebuild_options(config.rebuild_options());

    let result = capture_loop.run();
    info!("{}", capture_loop.stats());
    result.map(|_| ())
}
