use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::command::{encode_command, Command, REQUEST_DATA};
use super::error::{Result, Um25cError};
use super::frame::{decode_frame, MeasurementFrame, FRAME_LEN};
use super::transport::{Connector, Transport};

/// Per-read wait while discarding stale input.
const DRAIN_READ_TIMEOUT: Duration = Duration::from_millis(50);
/// Upper bound on one drain.
const DRAIN_LIMIT: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Ready,
    Closed,
}

/// Bounds for connecting to the meter.
#[derive(Debug, Clone, Copy)]
pub struct ConnectPolicy {
    pub max_attempts: u32,
    pub attempt_delay: Duration,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            attempt_delay: Duration::from_millis(200),
        }
    }
}

/// Session with one UM-series meter. Owns the link for its whole lifetime.
pub struct UM25C<C: Connector> {
    connector: C,
    link: Option<C::Link>,
    address: String,
    state: SessionState,
    read_timeout: Duration,
    // Set when an exchange failed and part of a reply may still be queued.
    stale_input: bool,
}

impl<C: Connector> UM25C<C> {
    pub fn new(connector: C, address: &str, read_timeout: Duration) -> Self {
        info!("Initializing UM25C session for address: {}", address);
        UM25C {
            connector,
            link: None,
            address: address.to_string(),
            state: SessionState::Disconnected,
            read_timeout,
            stale_input: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Open the link and probe it with a data request until one frame decodes.
    /// Transport failures are retried after `attempt_delay`, up to
    /// `max_attempts` in total.
    pub fn connect(&mut self, policy: &ConnectPolicy) -> Result<MeasurementFrame> {
        if self.state == SessionState::Closed {
            return Err(Um25cError::SessionClosed);
        }
        info!("Attempting to connect to UM25C at {}", self.address);
        self.state = SessionState::Connecting;

        let attempts = policy.max_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.try_connect() {
                Ok(frame) => {
                    self.state = SessionState::Ready;
                    info!(
                        "UM25C connected on attempt {}. Model: {:?}",
                        attempt,
                        frame.model()
                    );
                    return Ok(frame);
                }
                Err(e) if e.is_transport() || e.is_decode() => {
                    warn!("Connect attempt {}/{} failed: {}", attempt, attempts, e);
                    if e.is_transport() && !e.is_timeout() {
                        // The link itself is broken, reopen it on the next attempt
                        self.drop_link();
                    }
                    last_error = Some(e);
                    if attempt < attempts {
                        std::thread::sleep(policy.attempt_delay);
                    }
                }
                Err(e) => {
                    self.state = SessionState::Disconnected;
                    return Err(e);
                }
            }
        }

        self.drop_link();
        self.state = SessionState::Disconnected;
        error!("Giving up on UM25C at {} after {} attempts", self.address, attempts);
        Err(Um25cError::ConnectFailed {
            attempts,
            source: Box::new(last_error.unwrap_or(Um25cError::SessionClosed)),
        })
    }

    fn try_connect(&mut self) -> Result<MeasurementFrame> {
        if self.link.is_none() {
            self.link = Some(self.connector.open(&self.address)?);
        }
        self.exchange()
    }

    /// Write one control command. No reply is expected.
    pub fn send(&mut self, command: &Command) -> Result<()> {
        let byte = encode_command(command)?;
        info!(
            "Sending {:?} command to UM25C: {} (0x{:02X})",
            command.family(),
            command,
            byte
        );
        self.ready_link()?.send(&[byte])?;
        Ok(())
    }

    /// Request one measurement dump and decode it.
    pub fn request_frame(&mut self) -> Result<MeasurementFrame> {
        self.ready_link()?;
        self.exchange()
    }

    fn exchange(&mut self) -> Result<MeasurementFrame> {
        let read_timeout = self.read_timeout;
        let link = self.link.as_mut().ok_or(Um25cError::SessionClosed)?;
        if self.stale_input {
            let discarded = drain_input(link)?;
            debug!("Discarded {} stale bytes before requesting data", discarded);
            self.stale_input = false;
        }

        let result = link
            .send(&[REQUEST_DATA])
            .map_err(Um25cError::from)
            .and_then(|()| read_frame_bytes(link, read_timeout));
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                self.stale_input = true;
                return Err(e);
            }
        };
        debug!("Received {} bytes from UM25C", bytes.len());
        decode_frame(&bytes)
    }

    fn ready_link(&mut self) -> Result<&mut C::Link> {
        if self.state != SessionState::Ready {
            error!("Attempted to use UM25C session in state {:?}", self.state);
            return Err(Um25cError::SessionClosed);
        }
        self.link.as_mut().ok_or(Um25cError::SessionClosed)
    }

    /// Release the link. Safe to call more than once.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.drop_link();
        self.state = SessionState::Closed;
        info!("UM25C session for {} closed", self.address);
    }

    fn drop_link(&mut self) {
        self.stale_input = false;
        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.close() {
                warn!("Error while closing link to {}: {}", self.address, e);
            }
        }
    }
}

impl<C: Connector> Drop for UM25C<C> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read and discard whatever is already queued on the link, stopping once it
/// goes quiet, the peer closes, or `DRAIN_LIMIT` has passed.
fn drain_input<T: Transport>(link: &mut T) -> io::Result<usize> {
    let mut buf = [0u8; 256];
    let start = Instant::now();
    let mut discarded = 0;
    for _ in 0..64 {
        match link.recv(&mut buf, DRAIN_READ_TIMEOUT) {
            Ok(0) => break,
            Ok(n) => discarded += n,
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                break
            }
            Err(e) => return Err(e),
        }
        if start.elapsed() > DRAIN_LIMIT {
            break;
        }
    }
    Ok(discarded)
}

/// Accumulate reads until a whole frame is in hand or `timeout` passes.
fn read_frame_bytes<T: Transport>(link: &mut T, timeout: Duration) -> Result<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut frame = Vec::with_capacity(FRAME_LEN);
    let mut buf = [0u8; 1024];

    while frame.len() < FRAME_LEN {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("got {} of {} bytes before timeout", frame.len(), FRAME_LEN),
            )
            .into());
        }
        let want = FRAME_LEN - frame.len();
        let n = link.recv(&mut buf[..want], remaining)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "Connection closed by remote",
            )
            .into());
        }
        frame.extend_from_slice(&buf[..n]);
    }

    Ok(frame)
}
