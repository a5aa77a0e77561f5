use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use um25c_logger::collector::{default_setup_commands, CollectionConfig};
use um25c_logger::devices::Command;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Poll a UM-series USB meter over Bluetooth and print readings as JSON lines")]
pub struct Options {
    ///Serial device bound to the meter (e.g. /dev/rfcomm0) or host:port of a serial-to-TCP bridge
    address: String,
    #[arg(short, long, default_value = "0.3")]
    ///Seconds between polls
    interval: f64,
    #[arg(long = "setup", value_name = "COMMAND")]
    ///Command sent once after connecting, repeatable: next, rotate, prev, clear, group=N, threshold=A.AA, backlight=N, screensaver=N or 0xNN.
    ///Defaults to backlight=3 group=5 screensaver=0
    setup: Vec<Command>,
    #[arg(long, default_value = "false", conflicts_with = "setup")]
    ///Do not send any setup commands
    no_setup: bool,
    #[arg(long, default_value = "10")]
    ///Connection attempts before giving up
    attempts: u32,
    #[arg(long, default_value = "1.0")]
    ///Seconds to wait for a full frame
    read_timeout: f64,
    #[arg(long, default_value = "logs")]
    ///Directory for the rolling log file
    log_dir: PathBuf,
    #[arg(short, long, default_value = "false")]
    ///Log at debug level
    verbose: bool,
}

impl Options {
    pub fn log_dir(&self) -> &std::path::Path {
        &self.log_dir
    }

    pub const fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn collection_config(&self) -> Result<CollectionConfig, String> {
        let setup_commands = if self.no_setup {
            Vec::new()
        } else if self.setup.is_empty() {
            default_setup_commands()
        } else {
            self.setup.clone()
        };
        Ok(CollectionConfig {
            address: self.address.clone(),
            poll_interval: seconds("interval", self.interval)?,
            setup_commands,
            connect_attempts: self.attempts.max(1),
            read_timeout: seconds("read-timeout", self.read_timeout)?,
            ..CollectionConfig::default()
        })
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration, String> {
    Duration::try_from_secs_f64(value).map_err(|e| format!("invalid --{name} {value}: {e}"))
}
