//! Transaction runner: sends queued packets and keeps their responses.

use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::protocol::{self, parse_packet};
use crate::queue::CommandQueue;
use crate::transport::Transport;

const DEFAULT_READ_TIMEOUT_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// How long a flush waits for the response frame.
    pub read_timeout: Duration,
    /// Serialize `Write2` with the `Read2` opcode, as the vendor software does.
    pub legacy_write2_opcode: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            legacy_write2_opcode: false,
        }
    }
}

/// Driver of one Corsair Link device.
///
/// Only one packet is in flight at a time. Callers sharing a driver between
/// threads must serialize access, e.g. behind a `Mutex`.
pub struct Driver<T: Transport> {
    transport: T,
    config: DriverConfig,
    queue: CommandQueue,
    /// Response frames received since the last `clear`, oldest first.
    frames: Vec<Vec<u8>>,
}

impl<T: Transport> Driver<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, DriverConfig::default())
    }

    pub fn with_config(transport: T, config: DriverConfig) -> Self {
        let mut queue = CommandQueue::new();
        queue.set_legacy_write2(config.legacy_write2_opcode);
        Driver {
            transport,
            config,
            queue,
            frames: vec![],
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Operations of the next packet.
    pub fn queue(&mut self) -> &mut CommandQueue {
        &mut self.queue
    }

    pub fn remaining_capacity(&self) -> usize {
        self.queue.remaining_capacity()
    }

    /// Send the queued operations as one packet and store the response frame.
    ///
    /// The queue is emptied whether or not the transaction succeeds.
    pub fn flush(&mut self) -> Result<()> {
        if self.queue.is_empty() {
            log::debug!("flush: nothing queued");
            return Ok(());
        }
        let packet = self.queue.take_packet();

        self.transport.open()?;
        let result = self.transact(&packet);
        if let Err(e) = self.transport.close() {
            log::warn!("{}", e);
        }

        self.frames.push(result?);
        Ok(())
    }

    fn transact(&mut self, packet: &[u8]) -> Result<Vec<u8>> {
        let timeout = self.config.read_timeout;
        let deadline = Instant::now() + timeout;
        let mut pending = self.transport.listen(timeout)?;

        log::debug!("=> {}", hex::encode(packet));
        if log::log_enabled!(log::Level::Trace) {
            if let Ok(ops) = parse_packet(packet) {
                for op in ops {
                    log::trace!("   {:?}", op);
                }
            }
        }
        self.transport.send_raw(packet)?;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let frame = pending.wait(remaining).map_err(|e| match e {
                Error::Timeout(_) => Error::Timeout(timeout),
                e => e,
            })?;
            log::debug!("<= {}", hex::encode(&frame));
            if !is_stale(packet, &frame) {
                return Ok(frame);
            }
            // A reply to an earlier packet that timed out.
            log::warn!("dropping response frame of operation #{}", frame[0]);
            pending = self.transport.listen(remaining)?;
        }
    }

    /// Payload answering operation `id`, searched from the oldest frame.
    pub fn get(&self, id: u8) -> Option<&[u8]> {
        self.frames
            .iter()
            .find_map(|frame| protocol::decode(frame, id))
    }

    pub fn last_frame(&self) -> Option<&[u8]> {
        self.frames.last().map(Vec::as_slice)
    }

    /// Drop queued operations and stored responses. Ids keep counting.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.frames.clear();
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

/// The frame opens with a tuple for an id other than the first one sent.
/// All-zero frames carry no ids and are never stale.
fn is_stale(packet: &[u8], frame: &[u8]) -> bool {
    match (packet.get(1), frame.first()) {
        (Some(&sent), Some(&got)) => got != 0 && got != sent,
        _ => false,
    }
}
