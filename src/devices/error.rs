use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Um25cError {
    #[error("Failed to connect after {attempts} attempts: {source}")]
    ConnectFailed {
        attempts: u32,
        #[source]
        source: Box<Um25cError>,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    TruncatedFrame { expected: usize, actual: usize },

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Invalid command byte 0x{0:02X}")]
    InvalidCommand(u8),

    #[error("{what} out of range: {value}")]
    OutOfRange { what: &'static str, value: String },

    #[error("Session closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, Um25cError>;

impl Um25cError {
    pub(crate) fn out_of_range(what: &'static str, value: impl ToString) -> Self {
        Um25cError::OutOfRange {
            what,
            value: value.to_string(),
        }
    }

    /// Read, write and timeout failures on the link.
    pub fn is_transport(&self) -> bool {
        matches!(self, Um25cError::Transport(_))
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Um25cError::Transport(e) => {
                matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
            }
            _ => false,
        }
    }

    /// A frame arrived but could not be turned into a measurement.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            Um25cError::TruncatedFrame { .. } | Um25cError::MalformedFrame(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_a_transport_error() {
        let err = Um25cError::from(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
        assert!(err.is_transport());
        assert!(err.is_timeout());
        assert!(!err.is_decode());
    }

    #[test]
    fn decode_errors_are_not_transport_errors() {
        let err = Um25cError::TruncatedFrame {
            expected: 130,
            actual: 12,
        };
        assert!(err.is_decode());
        assert!(!err.is_transport());
        assert_eq!(err.to_string(), "Truncated frame: expected 130 bytes, got 12");
    }

    #[test]
    fn connect_failed_keeps_the_last_cause() {
        let err = Um25cError::ConnectFailed {
            attempts: 3,
            source: Box::new(Um25cError::from(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "refused",
            ))),
        };
        assert!(err.to_string().starts_with("Failed to connect after 3 attempts"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
