//! Packet builder: queues operations for one outbound packet.

use crate::constants::MAX_PAYLOAD_SIZE;
use crate::error::{Error, Result};
use crate::protocol::{Command, Opcode};
use crate::register::Register;

/// Pending operations of the next packet plus the correlation id counter.
///
/// Ids start at 1 and wrap modulo 256 skipping 0, which is never assigned so
/// that zero padding in a response frame can not match a real operation.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    buf: Vec<u8>,
    last_id: u8,
    legacy_write2: bool,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `Write2` with the `Read2` opcode byte, see [`Command::encode_into`].
    pub fn set_legacy_write2(&mut self, enabled: bool) {
        self.legacy_write2 = enabled;
    }

    /// Queue a command and return its correlation id.
    ///
    /// Fails with [`Error::CapacityExceeded`] without touching the queue or
    /// the id counter when the record does not fit.
    pub fn enqueue(&mut self, command: Command) -> Result<u8> {
        let needed = command.encoded_len();
        let remaining = self.remaining_capacity();
        if needed > remaining {
            return Err(Error::CapacityExceeded { needed, remaining });
        }

        let id = self.next_id();
        if needed == 0 {
            log::debug!("#{} {:?} takes an id but no packet bytes", id, command);
        }
        command.encode_into(id, self.legacy_write2, &mut self.buf);
        Ok(id)
    }

    /// Read `width` bytes, with the fixed width opcodes when they fit.
    pub fn enqueue_read(&mut self, register: Register, width: u8) -> Result<u8> {
        match width {
            1 => self.read1(register),
            2 => self.read2(register),
            n => self.read(register, n),
        }
    }

    pub fn enqueue_variable_read(&mut self, register: Register, count: u8) -> Result<u8> {
        self.read(register, count)
    }

    /// Write `data`, picking `Write1`/`Write2` for 1 and 2 byte values.
    ///
    /// An empty `data` consumes an id and adds nothing to the packet.
    pub fn enqueue_write(&mut self, register: Register, data: &[u8]) -> Result<u8> {
        match *data {
            [value] => self.write1(register, value),
            [lo, hi] => self.write2(register, u16::from_le_bytes([lo, hi])),
            _ => self.write(register, data),
        }
    }

    pub fn enqueue_direct(&mut self, opcode: Opcode, args: &[u8]) -> Result<u8> {
        self.enqueue(Command::direct(opcode, args.to_vec()))
    }

    /// Raw bytes right after the id, no opcode added.
    pub fn enqueue_raw(&mut self, data: &[u8]) -> Result<u8> {
        self.enqueue(Command::Raw(data.to_vec()))
    }

    pub fn read1(&mut self, register: Register) -> Result<u8> {
        self.enqueue(Command::read1(register))
    }

    pub fn read2(&mut self, register: Register) -> Result<u8> {
        self.enqueue(Command::read2(register))
    }

    pub fn read(&mut self, register: Register, count: u8) -> Result<u8> {
        self.enqueue(Command::read(register, count))
    }

    pub fn write1(&mut self, register: Register, value: u8) -> Result<u8> {
        ensure_writable(register)?;
        self.enqueue(Command::write1(register, value))
    }

    pub fn write2(&mut self, register: Register, value: u16) -> Result<u8> {
        ensure_writable(register)?;
        self.enqueue(Command::write2(register, value))
    }

    pub fn write(&mut self, register: Register, data: &[u8]) -> Result<u8> {
        ensure_writable(register)?;
        self.enqueue(Command::write(register, data.to_vec()))
    }

    /// Bytes still available for operation records in this packet.
    pub fn remaining_capacity(&self) -> usize {
        MAX_PAYLOAD_SIZE - self.buf.len()
    }

    /// Serialized size of the queued records, length byte excluded.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Most recently assigned id, 0 before the first operation.
    pub fn last_id(&self) -> u8 {
        self.last_id
    }

    /// Drop pending operations, the id counter keeps running.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// The packet as it goes on the wire, length byte first.
    pub fn packet(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(1 + self.buf.len());
        packet.push(self.buf.len() as u8);
        packet.extend_from_slice(&self.buf);
        packet
    }

    /// Like [`CommandQueue::packet`], leaving the queue empty.
    pub fn take_packet(&mut self) -> Vec<u8> {
        let packet = self.packet();
        self.clear();
        packet
    }

    fn next_id(&mut self) -> u8 {
        self.last_id = match self.last_id.wrapping_add(1) {
            0 => 1,
            id => id,
        };
        self.last_id
    }
}

fn ensure_writable(register: Register) -> Result<()> {
    if register.is_writable() {
        Ok(())
    } else {
        Err(Error::ReadOnlyRegister(register))
    }
}
