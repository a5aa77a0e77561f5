mod options;

use std::io::{self, BufRead};

use clap::Parser;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, EnvFilter};
use um25c_logger::collector::start_collection;
use um25c_logger::devices::LinkConnector;

use crate::options::Options;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = Options::parse();

    // Keep the guard alive so buffered log lines are written on exit
    let _guard = setup_logging(&options);
    info!("Starting application");

    let config = options.collection_config()?;
    let address = config.address.clone();

    let collection = start_collection(LinkConnector, config, |reading| {
        match serde_json::to_string(&reading) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!("Failed to serialize reading {}: {}", reading.sequence, e),
        }
    })?;

    // Enter (or end of input) stops the collection
    let stop = collection.stop_signal();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = io::stdin().lock().read_line(&mut line);
        stop.stop();
    });
    eprintln!("\nPress Enter to stop collecting from {address}\n");

    match collection.join() {
        Ok(summary) => {
            info!("Collection finished: {:?}", summary);
            eprintln!(
                "Collected {} frames ({} transport errors, {} bad frames)",
                summary.frames, summary.transport_errors, summary.decode_errors
            );
        }
        Err(e) => {
            error!("Collection failed: {}", e);
            eprintln!("Collection failed: {}", e);
            return Err(Box::new(e));
        }
    }

    info!("Application shutting down");
    Ok(())
}

fn setup_logging(options: &Options) -> WorkerGuard {
    // Set up file-based logging with daily rotation
    let file_appender = rolling::daily(options.log_dir(), "um25c.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if options.verbose() { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false) // Disable ANSI colors in log files
        .with_level(true)
        .init();
    guard
}
