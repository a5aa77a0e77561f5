pub mod data;

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::devices::{Command, ConnectPolicy, Connector, Result, Um25cError, UM25C};
use data::{CollectionSummary, Reading};

/// Configuration for a collection run
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    pub address: String,             // serial device path or host:port of a TCP bridge
    pub poll_interval: Duration,     // Sleep between successful polls
    pub setup_commands: Vec<Command>, // Sent once, in order, after connecting
    pub connect_attempts: u32,
    pub attempt_delay: Duration,
    pub read_timeout: Duration,      // Per frame request
    pub transport_backoff: Duration, // Sleep after a failed request
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            address: "/dev/rfcomm0".to_string(),
            poll_interval: Duration::from_millis(300),
            setup_commands: default_setup_commands(),
            connect_attempts: 10,
            attempt_delay: Duration::from_millis(200),
            read_timeout: Duration::from_secs(1),
            transport_backoff: Duration::from_millis(200),
        }
    }
}

/// Backlight level 3, data group 5, screensaver off.
pub fn default_setup_commands() -> Vec<Command> {
    vec![
        Command::SetBacklight(3),
        Command::SelectDataGroup(5),
        Command::disable_screensaver(),
    ]
}

impl CollectionConfig {
    fn connect_policy(&self) -> ConnectPolicy {
        ConnectPolicy {
            max_attempts: self.connect_attempts,
            attempt_delay: self.attempt_delay,
        }
    }
}

/// Cancellation flag shared between the collection thread and its owner.
/// Sleeps taken through [`StopSignal::wait`] end as soon as it is raised.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let (flag, wakeup) = &*self.inner;
        *flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = true;
        wakeup.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sleep for up to `timeout`. Returns true if a stop was requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (flag, wakeup) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (stopped, _) = wakeup
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *stopped
    }
}

/// Connect, apply the setup commands and poll until `stop` is raised.
///
/// Only a failed connect or a failed setup command ends the run with an
/// error. Failed requests once polling has started are logged and retried.
pub fn run_collection<C, F>(
    connector: C,
    config: &CollectionConfig,
    stop: &StopSignal,
    mut sink: F,
) -> Result<CollectionSummary>
where
    C: Connector,
    F: FnMut(Reading),
{
    info!("Starting collection with configuration: {:?}", config);
    let mut um = UM25C::new(connector, &config.address, config.read_timeout);
    um.connect(&config.connect_policy())?;
    info!(
        "Applying {} setup commands to {}",
        config.setup_commands.len(),
        um.address()
    );

    for command in &config.setup_commands {
        if let Err(e) = um.send(command) {
            error!("Setup command {} failed: {}", command, e);
            um.close();
            return Err(e);
        }
    }

    let mut summary = CollectionSummary::default();
    while !stop.is_stopped() {
        match um.request_frame() {
            Ok(frame) => {
                summary.frames += 1;
                sink(Reading {
                    timestamp: Utc::now(),
                    sequence: summary.frames,
                    frame,
                });
                if stop.wait(config.poll_interval) {
                    break;
                }
            }
            Err(e) if e.is_transport() => {
                summary.transport_errors += 1;
                warn!("Frame request failed, backing off: {}", e);
                if stop.wait(config.transport_backoff) {
                    break;
                }
            }
            Err(e) if e.is_decode() => {
                summary.decode_errors += 1;
                warn!("Discarding bad frame: {}", e);
            }
            Err(Um25cError::SessionClosed) => {
                error!("Session closed while collecting");
                return Err(Um25cError::SessionClosed);
            }
            Err(e) => {
                error!("Unexpected error while collecting: {}", e);
            }
        }
    }

    debug!("Stop requested, closing session");
    um.close();
    info!(
        "Collection stopped: {} frames, {} transport errors, {} bad frames",
        summary.frames, summary.transport_errors, summary.decode_errors
    );
    Ok(summary)
}

/// A collection run on its own thread.
pub struct Collection {
    stop: StopSignal,
    handle: JoinHandle<Result<CollectionSummary>>,
}

impl Collection {
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Wait for the run to end. Does not request a stop by itself.
    pub fn join(self) -> Result<CollectionSummary> {
        self.handle
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
    }

    pub fn stop_and_join(self) -> Result<CollectionSummary> {
        self.stop();
        self.join()
    }
}

pub fn start_collection<C, F>(
    connector: C,
    config: CollectionConfig,
    sink: F,
) -> std::io::Result<Collection>
where
    C: Connector + Send + 'static,
    F: FnMut(Reading) + Send + 'static,
{
    let stop = StopSignal::new();
    let thread_stop = stop.clone();
    let handle = thread::Builder::new()
        .name("um25c-collector".to_string())
        .spawn(move || run_collection(connector, &config, &thread_stop, sink))?;
    Ok(Collection { stop, handle })
}
