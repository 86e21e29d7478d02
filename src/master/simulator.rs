/*!
    in-memory servo bus, for testing without hardware

    a [Simulator] holds virtual servos and records everything happening on the wire. Its [SimulatedLink] implements [Link] so a regular [Bus] runs on it unchanged.

    instruction frames are interpreted when the host drains its transmission, the answers then wait in the reception buffer until the host reads them. Reading with nothing pending never completes, exactly like a silent bus, so the host's own timeout decides.
*/

use std::{
    io,
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    };
use packbytes::{FromBytes, ToBytes, ByteArray};
use log::*;

use crate::{
    frame::{Frame, ErrorFlags, Instruction, BROADCAST},
    registers::{self, Register, Access, CONTROL_TABLE_SIZE},
    };
use super::{
    link::{Link, Direction},
    networking::Bus,
    settings::Timing,
    };


/// something observed on the simulated wire, in order
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WireEvent {
    /// the host switched the transceiver
    Direction(Direction),
    /// the host dropped its pending input
    DiscardInput,
    /// one byte sent by the host
    Transmit(u8),
    /// the host waited for its transmission to complete
    Drain,
    /// the host read that many bytes
    Receive(usize),
    /// the host transmitted while not driving the line, or released it before draining
    Collision,
}

/// misbehavior of a virtual servo, applied to each of its answers until changed
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Fault {
    #[default]
    None,
    /// never answer
    Silent,
    /// answer with a damaged header
    BadHeader,
    /// answer with a wrong checksum
    CorruptChecksum,
    /// only the first bytes of the answer reach the host
    Truncate(usize),
    /// that many noise bytes precede the answer
    Garbage(usize),
    /// answer with this error byte and ignore the instruction
    Reject(u8),
}

/// noise byte used by [Fault::Garbage], it cannot be taken for a header
const NOISE: u8 = 0x55;


/// a protocol 1.0 servo reduced to its control table
#[derive(Clone, Debug, PartialEq)]
pub struct VirtualServo {
    table: [u8; CONTROL_TABLE_SIZE],
    fault: Fault,
}
impl VirtualServo {
    /// servo with factory settings of an AX-12: 1 Mbit/s, centered, torque off
    pub fn new(id: u8, model: u16) -> Self {
        let mut servo = Self {table: [0; CONTROL_TABLE_SIZE], fault: Fault::None};
        servo.set(registers::MODEL_NUMBER, model);
        servo.set(registers::FIRMWARE_VERSION, 0x18);
        servo.set(registers::ID, id);
        servo.set(registers::BAUD_RATE, 1);
        servo.set(registers::RETURN_DELAY_TIME, 250);
        servo.set(registers::CW_ANGLE_LIMIT, 0);
        servo.set(registers::CCW_ANGLE_LIMIT, registers::AX_RESOLUTION);
        servo.set(registers::TEMPERATURE_LIMIT, 70);
        servo.set(registers::MIN_VOLTAGE_LIMIT, 60);
        servo.set(registers::MAX_VOLTAGE_LIMIT, 140);
        servo.set(registers::MAX_TORQUE, registers::AX_RESOLUTION);
        servo.set(registers::STATUS_RETURN_LEVEL, 2);
        servo.set(registers::ALARM_LED, 0x24);
        servo.set(registers::SHUTDOWN, 0x24);
        servo.set(registers::CW_COMPLIANCE_MARGIN, 1);
        servo.set(registers::CCW_COMPLIANCE_MARGIN, 1);
        servo.set(registers::CW_COMPLIANCE_SLOPE, 32);
        servo.set(registers::CCW_COMPLIANCE_SLOPE, 32);
        servo.set(registers::GOAL_POSITION, 512);
        servo.set(registers::TORQUE_LIMIT, registers::AX_RESOLUTION);
        servo.set(registers::PRESENT_POSITION, 512);
        servo.set(registers::PRESENT_VOLTAGE, 120);
        servo.set(registers::PRESENT_TEMPERATURE, 35);
        servo.set(registers::PUNCH, 32);
        servo
    }
    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = fault;
        self
    }
    pub fn id(&self) -> u8  {self.table[usize::from(registers::ID.address())]}
    pub fn fault(&self) -> Fault  {self.fault}
    pub fn table(&self) -> &[u8; CONTROL_TABLE_SIZE]  {&self.table}

    /// get the current register's value, panics if the register exceeds the control table
    pub fn get<T: FromBytes>(&self, register: Register<T>) -> T {
        let mut dst = T::Bytes::zeroed();
        dst.as_mut().copy_from_slice(&self.table[usize::from(register.address()) ..][.. T::Bytes::SIZE]);
        T::from_le_bytes(dst)
    }
    /// set the given register's value, panics if the register exceeds the control table
    pub fn set<T: ToBytes>(&mut self, register: Register<T>, value: T) {
        let src = value.to_le_bytes();
        self.table[usize::from(register.address()) ..][.. T::Bytes::SIZE].copy_from_slice(src.as_ref());
    }

    /// run an instruction, returning the status frame to send if any
    fn execute(&mut self, frame: &Frame) -> Option<Frame> {
        let id = self.id();
        let broadcast = frame.target() == BROADCAST;
        let level = self.get(registers::STATUS_RETURN_LEVEL);
        let fault = self.fault;
        let (error, params) = match fault {
            Fault::Reject(code) => (ErrorFlags::from(code), self.peek(frame)),
            _ => self.apply(frame),
        };
        let answer = match frame.instruction() {
            _ if broadcast => false,
            Some(Instruction::Read) => level >= 1,
            _ => level >= 2,
        };
        if !answer || fault == Fault::Silent
            {return None}
        Frame::status(id, error, &params).ok()
    }
    /// bytes a read would return, without effect
    fn peek(&self, frame: &Frame) -> Vec<u8> {
        match (frame.instruction(), frame.params()) {
            (Some(Instruction::Read), &[address, length]) => {
                let range = usize::from(address) .. usize::from(address) + usize::from(length);
                self.table.get(range).map(<[u8]>::to_vec)
                    .unwrap_or_else(|| vec![0; usize::from(length)])
            },
            _ => Vec::new(),
        }
    }
    fn apply(&mut self, frame: &Frame) -> (ErrorFlags, Vec<u8>) {
        let range = ErrorFlags::from(0x08);
        let instruction = ErrorFlags::from(0x40);
        match (frame.instruction(), frame.params()) {
            (Some(Instruction::Read), &[address, length]) => {
                if usize::from(address) + usize::from(length) > CONTROL_TABLE_SIZE
                    {return (range, vec![0; usize::from(length)])}
                (ErrorFlags::from(0), self.peek(frame))
            },
            (Some(Instruction::Write), &[address, ref data @ ..]) if !data.is_empty() => {
                let start = usize::from(address);
                let end = start + data.len();
                if end > CONTROL_TABLE_SIZE
                    {return (range, Vec::new())}
                let read_only = (start .. end)
                    .filter_map(|address| u8::try_from(address).ok())
                    .filter_map(registers::describe_address)
                    .any(|register| register.access == Access::ReadOnly);
                if read_only
                    {return (instruction, Vec::new())}
                self.table[start .. end].copy_from_slice(data);
                // positions are reached instantly
                let goal = usize::from(registers::GOAL_POSITION.address());
                if start < goal + 2 && goal < end {
                    let position = self.get(registers::GOAL_POSITION);
                    self.set(registers::PRESENT_POSITION, position);
                }
                (ErrorFlags::from(0), Vec::new())
            },
            _ => (instruction, Vec::new()),
        }
    }
}

/// damage an answer as the fault says
fn distort(fault: Fault, answer: &[u8]) -> Vec<u8> {
    let mut bytes = answer.to_vec();
    match fault {
        Fault::BadHeader => bytes[1] = 0xfe,
        Fault::CorruptChecksum => {
            let last = bytes.len() - 1;
            bytes[last] ^= 0x01;
        },
        Fault::Truncate(count) => bytes.truncate(count),
        Fault::Garbage(count) => {
            let mut noisy = vec![NOISE; count];
            noisy.extend_from_slice(&bytes);
            bytes = noisy;
        },
        Fault::None | Fault::Silent | Fault::Reject(_) => {},
    }
    bytes
}


#[derive(Debug)]
struct Wire {
    servos: Vec<VirtualServo>,
    direction: Direction,
    /// bytes transmitted since the last drain
    sending: Vec<u8>,
    /// bytes waiting to be read by the host
    pending: VecDeque<u8>,
    events: Vec<WireEvent>,
    frames: Vec<Vec<u8>>,
    /// the adapter is gone, writes fail
    unplugged: bool,
}
impl Wire {
    /// deliver what the host transmitted to the servos
    fn deliver(&mut self) {
        let sent = std::mem::take(&mut self.sending);
        if sent.is_empty()
            {return}
        self.frames.push(sent.clone());
        let frame = match Frame::parse(&sent) {
            Ok(frame) => frame,
            Err(error) => {
                debug!("simulator: servos ignore {:02x?}: {}", sent, error);
                return
            },
        };
        let target = frame.target();
        for servo in self.servos.iter_mut() {
            if target != BROADCAST && servo.id() != target
                {continue}
            if let Some(answer) = servo.execute(&frame) {
                let bytes = distort(servo.fault, answer.as_bytes());
                self.pending.extend(bytes);
            }
        }
    }
}

/// simulated bus with its virtual servos, clones share the same bus
#[derive(Clone, Debug)]
pub struct Simulator {
    wire: Arc<Mutex<Wire>>,
}
/// host end of a [Simulator]
#[derive(Clone, Debug)]
pub struct SimulatedLink {
    wire: Arc<Mutex<Wire>>,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}
impl Simulator {
    /// empty bus, the line starts released
    pub fn new() -> Self {
        Self {wire: Arc::new(Mutex::new(Wire {
            servos: Vec::new(),
            direction: Direction::Receive,
            sending: Vec::new(),
            pending: VecDeque::new(),
            events: Vec::new(),
            frames: Vec::new(),
            unplugged: false,
            }))}
    }
    fn lock(&self) -> MutexGuard<'_, Wire> {
        self.wire.lock().unwrap_or_else(PoisonError::into_inner)
    }
    /// plug a servo, replacing any servo with the same identifier
    pub fn add_servo(&self, servo: VirtualServo) -> &Self {
        let mut wire = self.lock();
        let id = servo.id();
        wire.servos.retain(|other| other.id() != id);
        wire.servos.push(servo);
        self
    }
    pub fn link(&self) -> SimulatedLink {
        SimulatedLink {wire: self.wire.clone()}
    }
    /// bus master running on this simulator
    pub fn bus(&self, timing: Timing) -> Bus<SimulatedLink> {
        Bus::new(self.link(), timing)
    }
    /// snapshot of a servo
    pub fn servo(&self, id: u8) -> Option<VirtualServo> {
        self.lock().servos.iter().find(|servo| servo.id() == id).cloned()
    }
    /// modify a servo in place, returns false if there is no such servo
    pub fn update(&self, id: u8, change: impl FnOnce(&mut VirtualServo)) -> bool {
        let mut wire = self.lock();
        match wire.servos.iter_mut().find(|servo| servo.id() == id) {
            Some(servo) => {change(servo); true},
            None => false,
        }
    }
    pub fn set_fault(&self, id: u8, fault: Fault) -> bool {
        self.update(id, |servo| servo.fault = fault)
    }
    /// make every host write fail, like a disconnected adapter
    pub fn set_unplugged(&self, unplugged: bool) {
        self.lock().unplugged = unplugged;
    }
    /// everything seen on the wire since the last [Self::clear_events]
    pub fn events(&self) -> Vec<WireEvent> {
        self.lock().events.clone()
    }
    /// bytes transmitted by the host, split at each drain
    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        self.lock().frames.clone()
    }
    pub fn clear_events(&self) {
        let mut wire = self.lock();
        wire.events.clear();
        wire.frames.clear();
    }
}

impl SimulatedLink {
    fn lock(&self) -> MutexGuard<'_, Wire> {
        self.wire.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
impl Link for SimulatedLink {
    fn set_direction(&mut self, direction: Direction) -> io::Result<()> {
        let mut wire = self.lock();
        wire.events.push(WireEvent::Direction(direction));
        if direction == Direction::Receive && !wire.sending.is_empty() {
            // the end of the transmission is cut off
            wire.events.push(WireEvent::Collision);
            wire.sending.clear();
        }
        wire.direction = direction;
        Ok(())
    }
    fn discard_input(&mut self) -> io::Result<()> {
        let mut wire = self.lock();
        wire.events.push(WireEvent::DiscardInput);
        wire.pending.clear();
        Ok(())
    }
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        for &byte in data {
            {
                let mut wire = self.lock();
                if wire.unplugged
                    {return Err(io::ErrorKind::BrokenPipe.into())}
                if wire.direction != Direction::Transmit {
                    wire.events.push(WireEvent::Collision);
                    return Err(io::Error::other("transmitting while the line is released"));
                }
                wire.events.push(WireEvent::Transmit(byte));
                wire.sending.push(byte);
            }
            // let concurrent tasks run between bytes, as a slow uart would
            tokio::task::yield_now().await;
        }
        Ok(())
    }
    async fn drain(&mut self) -> io::Result<()> {
        let mut wire = self.lock();
        wire.events.push(WireEvent::Drain);
        wire.deliver();
        Ok(())
    }
    async fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        {
            let mut wire = self.lock();
            if wire.direction != Direction::Receive
                {return Err(io::Error::other("receiving while driving the line"))}
            if !wire.pending.is_empty() {
                let count = buffer.len().min(wire.pending.len());
                for (dst, src) in buffer.iter_mut().zip(wire.pending.drain(.. count)) {
                    *dst = src;
                }
                wire.events.push(WireEvent::Receive(count));
                return Ok(count)
            }
        }
        // answers only arrive on drain, nothing more will come in this transaction
        std::future::pending().await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_table() {
        let servo = VirtualServo::new(1, 0x0c);
        assert_eq!(servo.id(), 1);
        assert_eq!(servo.get(registers::MODEL_NUMBER), 0x0c);
        assert_eq!(servo.get(registers::PRESENT_POSITION), 512);
        assert_eq!(&servo.table()[36 .. 38], &[0x00, 0x02]);
        assert_eq!(servo.get(registers::STATUS_RETURN_LEVEL), 2);
    }

    #[test]
    fn read_instruction() {
        let mut servo = VirtualServo::new(1, 0x0c);
        let request = Frame::read(crate::frame::Target::Id(1), 0, 2).unwrap();
        let answer = servo.execute(&request).unwrap();
        assert_eq!(answer.as_bytes(), &[0xff, 0xff, 0x01, 0x04, 0x00, 0x0c, 0x00, 0xee]);
    }

    #[test]
    fn write_instruction() {
        let mut servo = VirtualServo::new(1, 0x0c);
        let request = Frame::write(crate::frame::Target::Id(1), 30, &[0x00, 0x01]).unwrap();
        let answer = servo.execute(&request).unwrap();
        assert!(answer.error().is_empty());
        assert_eq!(servo.get(registers::GOAL_POSITION), 256);
        assert_eq!(servo.get(registers::PRESENT_POSITION), 256);

        // read-only and out of range
        let request = Frame::write(crate::frame::Target::Id(1), 36, &[0, 0]).unwrap();
        assert!(servo.execute(&request).unwrap().error().instruction());
        let request = Frame::read(crate::frame::Target::Id(1), 49, 2).unwrap();
        let answer = servo.execute(&request).unwrap();
        assert!(answer.error().range());
        assert_eq!(answer.params().len(), 2);
    }

    #[test]
    fn return_level() {
        let mut servo = VirtualServo::new(1, 0x0c);
        servo.set(registers::STATUS_RETURN_LEVEL, 1);
        let write = Frame::write(crate::frame::Target::Id(1), 25, &[1]).unwrap();
        let read = Frame::read(crate::frame::Target::Id(1), 25, 1).unwrap();
        assert!(servo.execute(&write).is_none());
        assert_eq!(servo.execute(&read).unwrap().params(), &[1]);
        servo.set(registers::STATUS_RETURN_LEVEL, 0);
        assert!(servo.execute(&read).is_none());
    }

    #[test]
    fn distortions() {
        let answer = Frame::status(1, ErrorFlags::from(0), &[]).unwrap();
        let bytes = answer.as_bytes();
        assert_eq!(distort(Fault::None, bytes), bytes);
        assert_eq!(distort(Fault::Truncate(3), bytes), &bytes[..3]);
        assert_eq!(distort(Fault::Garbage(2), bytes).len(), bytes.len() + 2);
        assert_ne!(distort(Fault::CorruptChecksum, bytes)[5], bytes[5]);
        assert_eq!(distort(Fault::BadHeader, bytes)[1], 0xfe);
    }
}
