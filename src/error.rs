//! Error types for interface lifecycle and packet I/O

use crate::status::HostStatus;
use thiserror::Error;

/// Errors surfaced to the embedding caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Start completion reported a failure or produced no interface
    #[error("failed to start interface: {0}")]
    HostStartFailure(HostStatus),

    /// Stop was rejected or its completion reported a failure
    ///
    /// The host side of the interface is in an unknown state afterwards;
    /// the instance should not be retried.
    #[error("failed to stop interface: {0}")]
    HostStopFailure(HostStatus),

    #[error("read reported success but no packet was transferred")]
    SpuriousReadSuccess,

    #[error("write reported success but no packet was transferred")]
    SpuriousWriteSuccess,

    /// Any other non-success status from read or write
    #[error("packet i/o failed: {0}")]
    HostIo(HostStatus),

    #[error("interface is not open")]
    NotOpen,

    #[error("interface is already open")]
    AlreadyOpen,

    #[error("buffer of {capacity} bytes is smaller than max packet size {required}")]
    BufferTooSmall { capacity: usize, required: usize },

    #[error("packet of {len} bytes exceeds max packet size {max}")]
    PacketTooLarge { len: usize, max: usize },

    #[error("host reported malformed MAC address {0:?}")]
    InvalidMacAddress(String),

    #[error("failed to spawn {label} queue: {reason}")]
    QueueSpawn { label: String, reason: String },
}

impl Error {
    /// Status code associated with this error, if any
    ///
    /// Spurious transfers map to their sentinel codes.
    pub fn status(&self) -> Option<HostStatus> {
        match self {
            Error::HostStartFailure(status)
            | Error::HostStopFailure(status)
            | Error::HostIo(status) => Some(*status),
            Error::SpuriousReadSuccess => Some(HostStatus::SPURIOUS_READ),
            Error::SpuriousWriteSuccess => Some(HostStatus::SPURIOUS_WRITE),
            _ => None,
        }
    }

    /// Whether repeating the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::SpuriousReadSuccess | Error::SpuriousWriteSuccess)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;

        let kind = match &err {
            Error::NotOpen => ErrorKind::NotConnected,
            Error::BufferTooSmall { .. } | Error::PacketTooLarge { .. } => ErrorKind::InvalidInput,
            Error::SpuriousReadSuccess | Error::SpuriousWriteSuccess => ErrorKind::WouldBlock,
            _ => ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}
