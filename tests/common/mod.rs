#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    io,
    sync::{Arc, Mutex, mpsc},
    thread,
    time::Duration,
};

use corsairlink::constants::{RESPONSE_FRAME_SIZE, opcodes};
use corsairlink::protocol::{Command, parse_packet};
use corsairlink::transport::{ListenerSlot, PendingRead};
use corsairlink::{Register, Result, Transport, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open,
    Listen,
    Send(Vec<u8>),
    Close,
}

pub enum Reply {
    /// Answer with these bytes, zero padded to a full frame.
    Frame(Vec<u8>),
    /// Answer with these bytes once the delay has passed.
    Late(Vec<u8>, Duration),
    /// Never answer.
    Silent,
}

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// Scripted transport.
///
/// Like a USB device, frames wait in one input queue until some read takes
/// them, whichever transaction that read belongs to.
pub struct FakeTransport {
    pub events: Vec<Event>,
    pub fail_open: bool,
    pub fail_write: bool,
    pub fail_close: bool,
    replies: VecDeque<Reply>,
    responder: Option<Responder>,
    input_tx: mpsc::Sender<Vec<u8>>,
    input_rx: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
    listener: ListenerSlot,
}

impl FakeTransport {
    pub fn new() -> Self {
        let (input_tx, input_rx) = mpsc::channel();
        FakeTransport {
            events: vec![],
            fail_open: false,
            fail_write: false,
            fail_close: false,
            replies: VecDeque::new(),
            responder: None,
            input_tx,
            input_rx: Arc::new(Mutex::new(input_rx)),
            listener: ListenerSlot::new(),
        }
    }

    pub fn with_replies(replies: impl IntoIterator<Item = Reply>) -> Self {
        FakeTransport {
            replies: replies.into_iter().collect(),
            ..Self::new()
        }
    }

    pub fn with_responder(responder: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) -> Self {
        FakeTransport {
            responder: Some(Box::new(responder)),
            ..Self::new()
        }
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Send(packet) => Some(packet.clone()),
                _ => None,
            })
            .collect()
    }
}

fn full_frame(mut frame: Vec<u8>) -> Vec<u8> {
    frame.resize(RESPONSE_FRAME_SIZE.max(frame.len()), 0);
    frame.truncate(RESPONSE_FRAME_SIZE);
    frame
}

impl Transport for FakeTransport {
    fn open(&mut self) -> Result<()> {
        if self.fail_open {
            return Err(TransportError::OpenFailed(io::Error::from(io::ErrorKind::NotFound)).into());
        }
        self.events.push(Event::Open);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.events.push(Event::Close);
        if self.fail_close {
            return Err(TransportError::CloseFailed(io::Error::from(io::ErrorKind::BrokenPipe)).into());
        }
        Ok(())
    }

    fn listen(&mut self, timeout: Duration) -> Result<PendingRead> {
        self.events.push(Event::Listen);
        let input = Arc::clone(&self.input_rx);
        self.listener.spawn(move || {
            let input = input
                .lock()
                .map_err(|_| io::Error::other("input queue poisoned"))?;
            input.recv_timeout(timeout).map_err(|e| match e {
                mpsc::RecvTimeoutError::Timeout => io::ErrorKind::TimedOut.into(),
                e => io::Error::other(e),
            })
        })
    }

    fn send_raw(&mut self, raw: &[u8]) -> Result<()> {
        if self.fail_write {
            return Err(TransportError::WriteFailed(io::Error::from(io::ErrorKind::BrokenPipe)).into());
        }
        self.events.push(Event::Send(raw.to_vec()));

        let reply = match self.replies.pop_front() {
            Some(reply) => reply,
            None => match self.responder.as_mut() {
                Some(responder) => Reply::Frame(responder(raw)),
                None => Reply::Silent,
            },
        };
        match reply {
            Reply::Frame(frame) => {
                let _ = self.input_tx.send(full_frame(frame));
            }
            Reply::Late(frame, delay) => {
                let input = self.input_tx.clone();
                thread::spawn(move || {
                    thread::sleep(delay);
                    let _ = input.send(full_frame(frame));
                });
            }
            Reply::Silent => (),
        }
        Ok(())
    }
}

/// Register file of a simulated controller with 2 fans, 1 sensor and 1 LED.
pub struct SimDevice {
    pub registers: HashMap<(u8, u8), Vec<u8>>,
    selected_fan: u8,
    selected_led: u8,
    selected_sensor: u8,
}

impl SimDevice {
    pub fn new() -> Self {
        let mut sim = SimDevice {
            registers: HashMap::new(),
            selected_fan: 0,
            selected_led: 0,
            selected_sensor: 0,
        };
        sim.set(Register::Id, 0, &[0x3b]);
        sim.set(Register::Name, 0, b"H100i\0\0\0");
        sim.set(Register::FirmwareId, 0, &[0x12, 0x05]);
        sim.set(Register::Status, 0, &[0]);
        sim.set(Register::FansCount, 0, &[2]);
        sim.set(Register::LedsCount, 0, &[1]);
        sim.set(Register::SensorsCount, 0, &[1]);
        sim
    }

    pub fn set(&mut self, register: Register, index: u8, value: &[u8]) {
        self.registers
            .insert((register.address(), index), value.to_vec());
    }

    pub fn get(&self, register: Register, index: u8) -> Option<&[u8]> {
        self.registers
            .get(&(register.address(), index))
            .map(Vec::as_slice)
    }

    fn index_for(&self, register: u8) -> u8 {
        match register {
            0x06..=0x0b => self.selected_led,
            0x0e..=0x0f => self.selected_sensor,
            0x12..=0x1a => self.selected_fan,
            _ => 0,
        }
    }

    fn read(&self, register: u8, len: usize) -> Vec<u8> {
        let mut value = self
            .registers
            .get(&(register, self.index_for(register)))
            .cloned()
            .unwrap_or_default();
        value.resize(len, 0);
        value
    }

    fn write(&mut self, register: u8, value: Vec<u8>) {
        match register {
            0x04 => self.selected_led = value[0],
            0x0c => self.selected_sensor = value[0],
            0x10 => self.selected_fan = value[0],
            _ => (),
        }
        let index = self.index_for(register);
        self.registers.insert((register, index), value);
    }

    /// Answer one packet the way the controller does.
    pub fn respond(&mut self, packet: &[u8]) -> Vec<u8> {
        let mut frame = vec![];
        for op in parse_packet(packet).expect("simulator got a malformed packet") {
            frame.push(op.id);
            match op.command {
                Command::Read1 { register } => {
                    frame.push(opcodes::READ1);
                    frame.extend(self.read(register, 1));
                }
                Command::Read2 { register } => {
                    frame.push(opcodes::READ2);
                    frame.extend(self.read(register, 2));
                }
                Command::Read { register, count } => {
                    frame.extend([opcodes::READ, count]);
                    frame.extend(self.read(register, count as usize));
                }
                Command::Write1 { register, value } => {
                    frame.push(opcodes::WRITE1);
                    self.write(register, vec![value]);
                }
                Command::Write2 { register, value } => {
                    frame.push(opcodes::WRITE2);
                    self.write(register, value.to_le_bytes().to_vec());
                }
                Command::Write { register, data } => {
                    frame.push(opcodes::WRITE);
                    self.write(register, data);
                }
                Command::Direct { opcode, .. } => frame.push(opcode as u8),
                Command::Raw(_) => unreachable!(),
            }
        }
        frame
    }
}

/// A transport backed by a shared simulator.
pub fn simulated() -> (FakeTransport, Arc<Mutex<SimDevice>>) {
    let sim = Arc::new(Mutex::new(SimDevice::new()));
    let device = Arc::clone(&sim);
    let transport =
        FakeTransport::with_responder(move |packet| device.lock().unwrap().respond(packet));
    (transport, sim)
}
