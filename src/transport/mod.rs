//! Abstract device transport interface.
use std::{
    io,
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::Duration,
};

use crate::error::{Error, Result, TransportError};

pub use self::hidraw::HidrawTransport;
pub use self::usb::UsbTransport;

mod hidraw;
mod usb;

/// Abstraction of the raw HID channel.
/// Might be a hidraw node or a libusb handle.
///
/// A transaction is `open`, `listen`, `send_raw`, wait on the pending read,
/// then `close`. The read must be armed by `listen` before any byte is sent.
pub trait Transport {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    /// Start reading one response frame. The read gives up after `timeout`.
    fn listen(&mut self, timeout: Duration) -> Result<PendingRead>;
    fn send_raw(&mut self, raw: &[u8]) -> Result<()>;
}

/// A response frame being read on a listener thread.
#[derive(Debug)]
pub struct PendingRead {
    rx: mpsc::Receiver<io::Result<Vec<u8>>>,
}

impl PendingRead {
    /// Run `read` on a listener thread.
    ///
    /// Returns once the thread has started and is about to call `read`.
    /// Whether a reply sent before the read is actually issued still reaches
    /// it depends on the transport buffering input.
    pub fn spawn<F>(read: F) -> Result<Self>
    where
        F: FnOnce() -> io::Result<Vec<u8>> + Send + 'static,
    {
        let (armed_tx, armed_rx) = mpsc::sync_channel(0);
        let (tx, rx) = mpsc::sync_channel(1);
        thread::Builder::new()
            .name("corsairlink-listen".into())
            .spawn(move || {
                let _ = armed_tx.send(());
                // The receiver is gone when the transaction timed out.
                let _ = tx.send(read());
            })
            .map_err(TransportError::ReadFailed)?;

        armed_rx
            .recv()
            .map_err(|_| TransportError::ReadFailed(io::Error::other("listener thread died")))?;
        Ok(PendingRead { rx })
    }

    /// A read that already completed with `frame`.
    pub fn ready(frame: Vec<u8>) -> Self {
        let (tx, rx) = mpsc::sync_channel(1);
        let _ = tx.send(Ok(frame));
        PendingRead { rx }
    }

    /// Block until the frame arrives or `timeout` elapses.
    pub fn wait(self, timeout: Duration) -> Result<Vec<u8>> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(frame)) => Ok(frame),
            // The transport gave up on its own read timeout.
            Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => Err(Error::Timeout(timeout)),
            Ok(Err(e)) => Err(TransportError::ReadFailed(e).into()),
            Err(RecvTimeoutError::Timeout) => Err(Error::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::ReadFailed(
                io::Error::other("listener thread exited without a frame"),
            )
            .into()),
        }
    }
}

/// Keeps at most one listener thread of a transport alive.
///
/// A new read is armed only after the previous one has returned, so a read
/// abandoned by a timed-out transaction can not take the next reply.
#[derive(Debug, Default)]
pub struct ListenerSlot {
    previous: Option<mpsc::Receiver<()>>,
}

impl ListenerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, read: F) -> Result<PendingRead>
    where
        F: FnOnce() -> io::Result<Vec<u8>> + Send + 'static,
    {
        if let Some(previous) = self.previous.take() {
            // Disconnects when the previous read returns.
            let _ = previous.recv();
        }
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let pending = PendingRead::spawn(move || {
            let _done = done_tx;
            read()
        })?;
        self.previous = Some(done_rx);
        Ok(pending)
    }
}
