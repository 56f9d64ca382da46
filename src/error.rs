//! Errors raised by the protocol core.
use std::{io, time::Duration};

use crate::register::Register;

/// Failures of the underlying byte channel.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The device node could not be opened, nothing was sent.
    #[error("failed to open device: {0}")]
    OpenFailed(#[source] io::Error),

    #[error("failed to write packet: {0}")]
    WriteFailed(#[source] io::Error),

    #[error("failed to read response frame: {0}")]
    ReadFailed(#[source] io::Error),

    /// Only ever logged by the driver, never returned from a flush.
    #[error("failed to close device: {0}")]
    CloseFailed(#[source] io::Error),

    #[error("device is not open")]
    NotOpen,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The device did not answer within the configured read timeout.
    #[error("no response frame within {0:?}")]
    Timeout(Duration),

    #[error("packet capacity exceeded: operation needs {needed} bytes, {remaining} remaining")]
    CapacityExceeded { needed: usize, remaining: usize },

    #[error("register {0:?} is not writable")]
    ReadOnlyRegister(Register),

    #[error("malformed packet at offset {offset}: {reason}")]
    MalformedPacket { offset: usize, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;
