//! The underlying binary protocol of Corsair Link controllers.
//!
//! One outbound packet carries several operations, each tagged with a
//! correlation id. The device answers with a frame holding one
//! `[id][opcode][len if Read][payload]` tuple per operation, in order.

use std::fmt;

use scroll::{LE, Pread};

use crate::constants::opcodes;
use crate::error::{Error, Result};
use crate::register::Register;

/// Operation codes understood by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Opcode {
    Write1 = opcodes::WRITE1,
    Read1 = opcodes::READ1,
    Write2 = opcodes::WRITE2,
    Read2 = opcodes::READ2,
    /// Variable length write, the length travels in the request.
    Write = opcodes::WRITE,
    /// Variable length read, the length travels in the response.
    Read = opcodes::READ,
    /// Vendor command without arguments.
    ///
    /// Answers with `0f 05 ff ff ff ff ff ff ff`, looks like a self-test.
    SelfTest = opcodes::SELF_TEST,
}

/// How many payload bytes follow `[id][opcode]` in a response tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLen {
    Fixed(u8),
    /// The next byte of the response holds the payload length.
    Prefixed,
}

impl Opcode {
    pub const fn response_len(self) -> ResponseLen {
        match self {
            Opcode::Write1 => ResponseLen::Fixed(0),
            Opcode::Read1 => ResponseLen::Fixed(1),
            Opcode::Write2 => ResponseLen::Fixed(0),
            Opcode::Read2 => ResponseLen::Fixed(2),
            Opcode::Write => ResponseLen::Fixed(0),
            Opcode::Read => ResponseLen::Prefixed,
            Opcode::SelfTest => ResponseLen::Fixed(0),
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        Ok(match value {
            opcodes::WRITE1 => Opcode::Write1,
            opcodes::READ1 => Opcode::Read1,
            opcodes::WRITE2 => Opcode::Write2,
            opcodes::READ2 => Opcode::Read2,
            opcodes::WRITE => Opcode::Write,
            opcodes::READ => Opcode::Read,
            opcodes::SELF_TEST => Opcode::SelfTest,
            other => return Err(other),
        })
    }
}

/// A single register operation, without its correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    Read1 { register: u8 },
    Read2 { register: u8 },
    Read { register: u8, count: u8 },
    Write1 { register: u8, value: u8 },
    /// Little-endian on the wire.
    Write2 { register: u8, value: u16 },
    /// An empty `data` still takes an id but puts no bytes on the wire.
    Write { register: u8, data: Vec<u8> },
    Direct { opcode: Opcode, args: Vec<u8> },
    /// Bytes sent verbatim after the id.
    Raw(Vec<u8>),
}

impl Command {
    pub fn read1(register: Register) -> Self {
        Command::Read1 {
            register: register.address(),
        }
    }

    pub fn read2(register: Register) -> Self {
        Command::Read2 {
            register: register.address(),
        }
    }

    pub fn read(register: Register, count: u8) -> Self {
        Command::Read {
            register: register.address(),
            count,
        }
    }

    pub fn write1(register: Register, value: u8) -> Self {
        Command::Write1 {
            register: register.address(),
            value,
        }
    }

    pub fn write2(register: Register, value: u16) -> Self {
        Command::Write2 {
            register: register.address(),
            value,
        }
    }

    pub fn write(register: Register, data: Vec<u8>) -> Self {
        Command::Write {
            register: register.address(),
            data,
        }
    }

    pub fn direct(opcode: Opcode, args: Vec<u8>) -> Self {
        Command::Direct { opcode, args }
    }

    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            Command::Read1 { .. } => Some(Opcode::Read1),
            Command::Read2 { .. } => Some(Opcode::Read2),
            Command::Read { .. } => Some(Opcode::Read),
            Command::Write1 { .. } => Some(Opcode::Write1),
            Command::Write2 { .. } => Some(Opcode::Write2),
            Command::Write { .. } => Some(Opcode::Write),
            Command::Direct { opcode, .. } => Some(*opcode),
            Command::Raw(_) => None,
        }
    }

    /// Serialized size of the record, id byte included.
    pub fn encoded_len(&self) -> usize {
        match self {
            Command::Read1 { .. } | Command::Read2 { .. } => 3,
            Command::Read { .. } | Command::Write1 { .. } => 4,
            Command::Write2 { .. } => 5,
            Command::Write { data, .. } if data.is_empty() => 0,
            Command::Write { data, .. } => 4 + data.len(),
            Command::Direct { args, .. } => 2 + args.len(),
            Command::Raw(data) => 1 + data.len(),
        }
    }

    /// Append the record for `id` to `buf`.
    ///
    /// With `legacy_write2` set, `Write2` records carry the `Read2` opcode
    /// byte like the vendor serializer.
    pub fn encode_into(&self, id: u8, legacy_write2: bool, buf: &mut Vec<u8>) {
        match self {
            Command::Read1 { register } => {
                buf.extend_from_slice(&[id, Opcode::Read1 as u8, *register]);
            }
            Command::Read2 { register } => {
                buf.extend_from_slice(&[id, Opcode::Read2 as u8, *register]);
            }
            Command::Read { register, count } => {
                buf.extend_from_slice(&[id, Opcode::Read as u8, *register, *count]);
            }
            Command::Write1 { register, value } => {
                buf.extend_from_slice(&[id, Opcode::Write1 as u8, *register, *value]);
            }
            Command::Write2 { register, value } => {
                let opcode = if legacy_write2 {
                    Opcode::Read2
                } else {
                    Opcode::Write2
                };
                buf.extend_from_slice(&[id, opcode as u8, *register]);
                buf.extend_from_slice(&value.to_le_bytes());
            }
            Command::Write { data, .. } if data.is_empty() => (),
            Command::Write { register, data } => {
                // ID, CMD, REG, LEN, DATA
                buf.extend_from_slice(&[id, Opcode::Write as u8, *register, data.len() as u8]);
                buf.extend_from_slice(data);
            }
            Command::Direct { opcode, args } => {
                buf.extend_from_slice(&[id, *opcode as u8]);
                buf.extend_from_slice(args);
            }
            Command::Raw(data) => {
                buf.push(id);
                buf.extend_from_slice(data);
            }
        }
    }
}

/// A command tagged with its correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operation {
    pub id: u8,
    pub command: Command,
}

/// Parse a serialized packet, length byte included, back into operations.
///
/// Direct commands are assumed to carry no arguments, raw records cannot be
/// told apart from other records and are rejected.
pub fn parse_packet(raw: &[u8]) -> Result<Vec<Operation>> {
    let malformed = |offset: usize, reason: &'static str| Error::MalformedPacket { offset, reason };

    let (&len, body) = raw.split_first().ok_or(malformed(0, "empty packet"))?;
    if body.len() != len as usize {
        return Err(malformed(0, "length byte does not match packet size"));
    }

    let truncated = |offset: usize| move |_: scroll::Error| malformed(offset, "truncated record");

    let mut ops = vec![];
    let mut offset = 0;
    while offset < body.len() {
        let start = offset;
        let id: u8 = body.gread(&mut offset).map_err(truncated(start))?;
        let opcode: u8 = body.gread(&mut offset).map_err(truncated(start))?;
        let opcode = Opcode::try_from(opcode).map_err(|_| malformed(start + 1, "unknown opcode"))?;

        let command = match opcode {
            Opcode::Read1 | Opcode::Read2 => {
                let register = body.gread(&mut offset).map_err(truncated(start))?;
                if opcode == Opcode::Read1 {
                    Command::Read1 { register }
                } else {
                    Command::Read2 { register }
                }
            }
            Opcode::Read => Command::Read {
                register: body.gread(&mut offset).map_err(truncated(start))?,
                count: body.gread(&mut offset).map_err(truncated(start))?,
            },
            Opcode::Write1 => Command::Write1 {
                register: body.gread(&mut offset).map_err(truncated(start))?,
                value: body.gread(&mut offset).map_err(truncated(start))?,
            },
            Opcode::Write2 => Command::Write2 {
                register: body.gread(&mut offset).map_err(truncated(start))?,
                value: body.gread_with(&mut offset, LE).map_err(truncated(start))?,
            },
            Opcode::Write => {
                let register: u8 = body.gread(&mut offset).map_err(truncated(start))?;
                let len: u8 = body.gread(&mut offset).map_err(truncated(start))?;
                let data = body
                    .get(offset..offset + len as usize)
                    .ok_or(malformed(start, "truncated record"))?
                    .to_vec();
                offset += data.len();
                Command::Write { register, data }
            }
            Opcode::SelfTest => Command::Direct {
                opcode,
                args: vec![],
            },
        };
        ops.push(Operation { id, command });
    }
    Ok(ops)
}

/// One `(id, opcode, payload)` tuple of a response frame.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Tuple<'a> {
    pub id: u8,
    pub opcode: u8,
    pub payload: &'a [u8],
    /// The frame ended before the announced payload length.
    pub truncated: bool,
}

impl fmt::Debug for Tuple<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{}({:02x})[{}]{}",
            self.id,
            self.opcode,
            hex::encode(self.payload),
            if self.truncated { "..." } else { "" }
        )
    }
}

/// Iterator over the tuples of one response frame.
#[derive(Debug, Clone)]
pub struct Tuples<'a> {
    remain: &'a [u8],
}

impl<'a> Tuples<'a> {
    pub fn new(frame: &'a [u8]) -> Self {
        Tuples { remain: frame }
    }
}

impl<'a> Iterator for Tuples<'a> {
    type Item = Tuple<'a>;

    fn next(&mut self) -> Option<Tuple<'a>> {
        let remain = self.remain;
        let [id, opcode, rest @ ..] = remain else {
            self.remain = &[];
            return None;
        };

        // Unknown opcodes (and zero padding) carry no payload.
        let (len, rest, no_len) = match Opcode::try_from(*opcode).map(Opcode::response_len) {
            Ok(ResponseLen::Fixed(n)) => (n as usize, rest, false),
            Ok(ResponseLen::Prefixed) => match rest.split_first() {
                Some((&n, rest)) => (n as usize, rest, false),
                // The frame ends before the length byte.
                None => (0, rest, true),
            },
            Err(_) => (0, rest, false),
        };

        let available = len.min(rest.len());
        let (payload, rest) = rest.split_at(available);
        self.remain = rest;
        Some(Tuple {
            id: *id,
            opcode: *opcode,
            payload,
            truncated: no_len || available < len,
        })
    }
}

/// Find the payload answering operation `id` in a response frame.
///
/// `None` means the device sent nothing for that id, which is not an error.
/// Id 0 is never assigned, so it is always `None`.
pub fn decode(frame: &[u8], id: u8) -> Option<&[u8]> {
    if id == 0 {
        return None;
    }
    let tuple = Tuples::new(frame).find(|t| t.id == id)?;
    if tuple.truncated {
        log::warn!("response to #{} truncated: {:?}", id, tuple);
    }
    Some(tuple.payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    const READ1: u8 = opcodes::READ1;
    const READ2: u8 = opcodes::READ2;
    const READ: u8 = opcodes::READ;
    const WRITE1: u8 = opcodes::WRITE1;

    #[test]
    fn decode_every_present_id() {
        let frame = [
            1, WRITE1, // no payload
            2, READ1, 0x2a, //
            3, READ2, 0x10, 0x00, //
            4, READ, 3, 0xff, 0x00, 0xff, //
            5, READ1, 0x07,
        ];
        assert_eq!(decode(&frame, 1), Some(&[][..]));
        assert_eq!(decode(&frame, 2), Some(&[0x2a][..]));
        assert_eq!(decode(&frame, 3), Some(&[0x10, 0x00][..]));
        assert_eq!(decode(&frame, 4), Some(&[0xff, 0x00, 0xff][..]));
        assert_eq!(decode(&frame, 5), Some(&[0x07][..]));
        assert_eq!(decode(&frame, 6), None);
        assert_eq!(decode(&frame, 0x2a), None);
    }

    #[test]
    fn prefixed_read_skips_exact_length() {
        // A 5 byte read payload full of bytes that look like tuples.
        let frame = [9, READ, 5, 10, READ1, 11, READ2, 12, 10, READ1, 0x55];
        assert_eq!(decode(&frame, 9), Some(&[10, READ1, 11, READ2, 12][..]));
        assert_eq!(decode(&frame, 10), Some(&[0x55][..]));
        assert_eq!(decode(&frame, 11), None);
    }

    #[test]
    fn zero_length_read_is_distinct_from_absent() {
        let frame = [7, READ, 0, 8, READ1, 1];
        assert_eq!(decode(&frame, 7), Some(&[][..]));
        assert_eq!(decode(&frame, 8), Some(&[1][..]));
        assert_eq!(decode(&frame, 42), None);
    }

    #[test]
    fn decode_is_idempotent() {
        let frame = [1, READ2, 0xbe, 0xef];
        let first = decode(&frame, 1);
        let second = decode(&frame, 1);
        assert_eq!(first, second);
        assert_eq!(first, Some(&[0xbe, 0xef][..]));
    }

    #[test]
    fn padding_never_matches_real_ids() {
        let mut frame = [0u8; 32];
        frame[..3].copy_from_slice(&[1, READ1, 0x2a]);
        assert_eq!(decode(&frame, 1), Some(&[0x2a][..]));
        assert_eq!(decode(&frame, 2), None);
        assert_eq!(Tuples::new(&frame).count(), 15);
    }

    #[test]
    fn truncated_payload_is_returned_partially() {
        let frame = [3, READ, 8, b'H', b'8'];
        let tuple = Tuples::new(&frame).next().unwrap();
        assert!(tuple.truncated);
        assert_eq!(decode(&frame, 3), Some(&b"H8"[..]));
    }

    #[test]
    fn read_without_length_byte_is_truncated() {
        let frame = [1, READ1, 0x2a, 4, READ];
        let tuple = Tuples::new(&frame).nth(1).unwrap();
        assert_eq!(tuple.id, 4);
        assert!(tuple.truncated);
        assert_eq!(tuple.payload, &[][..]);
    }

    #[test]
    fn id_zero_is_never_decoded() {
        let mut frame = [0u8; 32];
        frame[..3].copy_from_slice(&[1, READ1, 0x2a]);
        assert_eq!(decode(&frame, 0), None);
        assert_eq!(decode(&[0, READ1, 0x2a], 0), None);
    }

    #[test]
    fn opcode_table() {
        assert_eq!(Opcode::Read1.response_len(), ResponseLen::Fixed(1));
        assert_eq!(Opcode::Read2.response_len(), ResponseLen::Fixed(2));
        assert_eq!(Opcode::Write.response_len(), ResponseLen::Fixed(0));
        assert_eq!(Opcode::Read.response_len(), ResponseLen::Prefixed);
        assert_eq!(Opcode::try_from(0x0b), Ok(Opcode::Read));
        assert_eq!(Opcode::try_from(0x00), Err(0x00));
    }

    #[test]
    fn encoding_layouts() {
        let mut buf = vec![];
        Command::read1(Register::Id).encode_into(1, false, &mut buf);
        Command::read(Register::Name, 8).encode_into(2, false, &mut buf);
        Command::write1(Register::SelectedFan, 3).encode_into(3, false, &mut buf);
        Command::write2(Register::Rpm, 0x0640).encode_into(4, false, &mut buf);
        Command::write(Register::Colors, vec![1, 2, 3]).encode_into(5, false, &mut buf);
        Command::direct(Opcode::SelfTest, vec![]).encode_into(6, false, &mut buf);
        assert_eq!(
            buf,
            [
                1, 0x07, 0x00, //
                2, 0x0b, 0x02, 8, //
                3, 0x06, 0x10, 3, //
                4, 0x08, 0x14, 0x40, 0x06, //
                5, 0x0a, 0x0b, 3, 1, 2, 3, //
                6, 0x4f,
            ]
        );
    }

    #[test]
    fn legacy_write2_uses_read2_opcode() {
        let mut buf = vec![];
        Command::write2(Register::Rpm, 0x1234).encode_into(9, true, &mut buf);
        assert_eq!(buf, [9, 0x09, 0x14, 0x34, 0x12]);
    }

    #[test]
    fn empty_write_encodes_nothing() {
        let cmd = Command::write(Register::Colors, vec![]);
        let mut buf = vec![];
        cmd.encode_into(1, false, &mut buf);
        assert!(buf.is_empty());
        assert_eq!(cmd.encoded_len(), 0);
    }

    #[test]
    fn parse_rejects_bad_packets() {
        assert!(parse_packet(&[]).is_err());
        assert!(parse_packet(&[4, 1, 0x07]).is_err());
        assert!(parse_packet(&[2, 1, 0x07]).is_err());
        assert!(parse_packet(&[3, 1, 0x55, 0x00]).is_err());
        assert_eq!(parse_packet(&[0]).unwrap(), vec![]);
    }
}
