/*!
    protocol 1.0 packet framing

    instruction packets (host to servo) and status packets (servo to host) share the same layout

    ```text
    FF FF <target> <length> <instruction or error> [params ...] <checksum>
    ```

    `length` counts the instruction/error byte, the parameters and the checksum. The checksum is the complement of the byte sum of everything between the header and itself.
*/

use core::fmt;
use bilge::prelude::*;
use thiserror::Error;


/// two bytes starting every frame
pub const HEADER: [u8; 2] = [0xff, 0xff];
/// target identifier addressing all servos at once, they never answer it
pub const BROADCAST: u8 = 0xfe;
/// highest identifier a single servo can have
pub const MAX_ID: u8 = 0xfd;
/// smallest possible frame: header, target, length, code and checksum
pub const MIN_FRAME: usize = 6;
/// biggest possible frame, its length byte is saturated
pub const MAX_FRAME: usize = 4 + u8::MAX as usize;
/// biggest parameter section a frame can carry
pub const MAX_PARAMS: usize = MAX_FRAME - MIN_FRAME;
/// size of the status frame answering a write
pub const STATUS_SIZE: usize = MIN_FRAME;
/// maximum number of bytes one read can fetch, the status frame length byte must fit
pub const MAX_READ: u8 = MAX_PARAMS as u8;
/// maximum number of bytes one write can store, the address takes one parameter
pub const MAX_WRITE: usize = MAX_PARAMS - 1;

/// bytes of a frame, fixed capacity so frames never allocate
pub type FrameBytes = heapless::Vec<u8, MAX_FRAME>;
/// parameter bytes carried by a status frame
pub type Params = heapless::Vec<u8, MAX_PARAMS>;


/// failure to build or validate a frame
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// caller supplied an out-of-range field, nothing was sent
    #[error("invalid request: {0}")]
    Construction(&'static str),
    /// nothing arrived before the deadline
    #[error("no response within timeout")]
    Timeout,
    /// the frame is not as long as it should be
    #[error("frame has {received} bytes where {expected} were expected")]
    ShortFrame { expected: usize, received: usize },
    #[error("frame does not start with FF FF")]
    BadHeader,
    #[error("checksum mismatch (computed {computed:#04x}, received {received:#04x})")]
    ChecksumMismatch { computed: u8, received: u8 },
}

/// instruction codes understood by the servos
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Instruction {
    Read = 0x02,
    Write = 0x03,
}
impl TryFrom<u8> for Instruction {
    type Error = u8;
    fn try_from(code: u8) -> Result<Self, u8> {
        match code {
            0x02 => Ok(Self::Read),
            0x03 => Ok(Self::Write),
            other => Err(other),
        }
    }
}

/// error byte of a status frame, each bit is a separate alarm
#[bitsize(8)]
#[derive(Copy, Clone, FromBits, DebugBits, PartialEq)]
pub struct ErrorFlags {
    /// supply voltage is out of the configured limits
    pub input_voltage: bool,
    /// goal position is out of the angle limits
    pub angle_limit: bool,
    /// internal temperature is over the limit
    pub overheating: bool,
    /// a parameter is out of its range
    pub range: bool,
    /// the servo received an instruction with a bad checksum
    pub checksum: bool,
    /// the load cannot be held with the configured torque
    pub overload: bool,
    /// undefined instruction, or write on a read-only address
    pub instruction: bool,
    reserved: bool,
}
impl ErrorFlags {
    /// no alarm raised, the command was accepted
    pub fn is_empty(self) -> bool {
        u8::from(self) == 0
    }
}

/// destination of an instruction frame
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    /// a single servo, `0 ..= MAX_ID`
    Id(u8),
    /// all servos, no answer is ever sent
    Broadcast,
}
impl Target {
    pub fn is_broadcast(self) -> bool {
        matches!(self, Self::Broadcast)
    }
    /// identifier byte to put on the wire
    pub fn byte(self) -> Result<u8, FrameError> {
        match self {
            Self::Id(id) if id <= MAX_ID => Ok(id),
            Self::Id(_) => Err(FrameError::Construction("servo identifier must be in 0..=253")),
            Self::Broadcast => Ok(BROADCAST),
        }
    }
}
impl TryFrom<u8> for Target {
    type Error = FrameError;
    fn try_from(id: u8) -> Result<Self, FrameError> {
        match id {
            BROADCAST => Ok(Self::Broadcast),
            id if id <= MAX_ID => Ok(Self::Id(id)),
            _ => Err(FrameError::Construction("identifier 255 is not addressable")),
        }
    }
}


/// complement of the byte sum, shared by both directions
pub fn checksum(body: &[u8]) -> u8 {
    !body.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}


/**
    an immutable, well-formed frame

    the length and checksum bytes are always derived from the content, a [Frame] can only be obtained from the constructors below or from [Frame::parse] which checks them.
*/
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: FrameBytes,
}
impl Frame {
    /// instruction frame asking `length` bytes starting at `address`
    pub fn read(target: Target, address: u8, length: u8) -> Result<Self, FrameError> {
        if target.is_broadcast()
            {return Err(FrameError::Construction("broadcast target cannot be read"))}
        if length == 0 || length > MAX_READ
            {return Err(FrameError::Construction("read length must be in 1..=253"))}
        Self::build(target.byte()?, Instruction::Read as u8, &[address, length])
    }
    /// instruction frame storing `data` starting at `address`
    pub fn write(target: Target, address: u8, data: &[u8]) -> Result<Self, FrameError> {
        if data.is_empty()
            {return Err(FrameError::Construction("write data cannot be empty"))}
        if data.len() > MAX_WRITE
            {return Err(FrameError::Construction("write data must be at most 252 bytes"))}
        Self::build_with(target.byte()?, Instruction::Write as u8, &[address], data)
    }
    /// status frame as a servo would send it
    pub fn status(target: u8, error: ErrorFlags, params: &[u8]) -> Result<Self, FrameError> {
        Self::build(target, u8::from(error), params)
    }

    fn build(target: u8, code: u8, params: &[u8]) -> Result<Self, FrameError> {
        Self::build_with(target, code, &[], params)
    }
    fn build_with(target: u8, code: u8, prefix: &[u8], data: &[u8]) -> Result<Self, FrameError> {
        let length = u8::try_from(prefix.len() + data.len() + 2)
            .map_err(|_| FrameError::Construction("parameters do not fit in one frame"))?;
        let mut bytes = FrameBytes::new();
        for chunk in [&HEADER[..], &[target, length, code][..], prefix, data] {
            bytes.extend_from_slice(chunk)
                .map_err(|_| FrameError::Construction("parameters do not fit in one frame"))?;
        }
        let sum = checksum(&bytes[HEADER.len() ..]);
        bytes.push(sum)
            .map_err(|_| FrameError::Construction("parameters do not fit in one frame"))?;
        Ok(Self {bytes})
    }

    /// check a received frame: header, checksum and declared length
    pub fn parse(raw: &[u8]) -> Result<Self, FrameError> {
        if raw.len() < MIN_FRAME
            {return Err(FrameError::ShortFrame {expected: MIN_FRAME, received: raw.len()})}
        if raw[.. HEADER.len()] != HEADER
            {return Err(FrameError::BadHeader)}
        let (body, received) = raw[HEADER.len() ..].split_at(raw.len() - HEADER.len() - 1);
        let computed = checksum(body);
        if computed != received[0]
            {return Err(FrameError::ChecksumMismatch {computed, received: received[0]})}
        let expected = usize::from(raw[3]) + 4;
        if expected != raw.len()
            {return Err(FrameError::ShortFrame {expected, received: raw.len()})}
        let mut bytes = FrameBytes::new();
        bytes.extend_from_slice(raw)
            .map_err(|_| FrameError::ShortFrame {expected, received: raw.len()})?;
        Ok(Self {bytes})
    }

    pub fn as_bytes(&self) -> &[u8]  {&self.bytes}
    pub fn len(&self) -> usize  {self.bytes.len()}
    pub fn target(&self) -> u8  {self.bytes[2]}
    /// the length byte as on the wire
    pub fn length(&self) -> u8  {self.bytes[3]}
    /// instruction code or error byte depending on direction
    pub fn code(&self) -> u8  {self.bytes[4]}
    pub fn instruction(&self) -> Option<Instruction>  {Instruction::try_from(self.code()).ok()}
    pub fn error(&self) -> ErrorFlags  {ErrorFlags::from(self.code())}
    pub fn params(&self) -> &[u8]  {&self.bytes[5 .. self.bytes.len()-1]}
    pub fn checksum(&self) -> u8  {self.bytes[self.bytes.len()-1]}
}
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:02x?})", self.as_bytes())
    }
}
impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8]  {self.as_bytes()}
}


/// content of a validated status frame
#[derive(Clone, Debug, PartialEq)]
pub struct Status {
    /// servo who answered
    pub target: u8,
    /// alarms reported, empty if the command was accepted
    pub error: ErrorFlags,
    /// requested bytes for a read, empty for a write
    pub params: Params,
}

/// instruction frame for reading, see [Frame::read]
pub fn encode_read(target: Target, address: u8, length: u8) -> Result<Frame, FrameError> {
    Frame::read(target, address, length)
}
/// instruction frame for writing, see [Frame::write]
pub fn encode_write(target: Target, address: u8, data: &[u8]) -> Result<Frame, FrameError> {
    Frame::write(target, address, data)
}
/**
    validate the bytes received after an instruction

    partial or empty receptions are regular outcomes here: nothing received is a timeout, anything else than the expected size is a short frame.
*/
pub fn decode_status(raw: &[u8], expected_len: usize) -> Result<Status, FrameError> {
    if raw.is_empty()
        {return Err(FrameError::Timeout)}
    if raw.len() != expected_len
        {return Err(FrameError::ShortFrame {expected: expected_len, received: raw.len()})}
    let frame = Frame::parse(raw)?;
    let mut params = Params::new();
    params.extend_from_slice(frame.params())
        .map_err(|_| FrameError::ShortFrame {expected: expected_len, received: raw.len()})?;
    Ok(Status {
        target: frame.target(),
        error: frame.error(),
        params,
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_model_number_packet() {
        let frame = encode_read(Target::Id(1), 0, 2).unwrap();
        assert_eq!(frame.as_bytes(), &[0xff, 0xff, 0x01, 0x04, 0x02, 0x00, 0x02, 0xf6]);
        assert_eq!(frame.length(), 4);
    }

    #[test]
    fn write_goal_position_packet() {
        let frame = encode_write(Target::Id(1), 30, &[0x00, 0x02]).unwrap();
        assert_eq!(frame.as_bytes(), &[0xff, 0xff, 0x01, 0x05, 0x03, 0x1e, 0x00, 0x02, 0xd6]);
        assert_eq!(frame.instruction(), Some(Instruction::Write));
        assert_eq!(frame.params(), &[0x1e, 0x00, 0x02]);
    }

    #[test]
    fn broadcast_write_packet() {
        let frame = encode_write(Target::Broadcast, 24, &[0]).unwrap();
        assert_eq!(frame.target(), BROADCAST);
        assert_eq!(frame.checksum(), checksum(&frame.as_bytes()[2 .. frame.len()-1]));
    }

    #[test]
    fn construction_errors() {
        assert!(matches!(encode_read(Target::Broadcast, 36, 2), Err(FrameError::Construction(_))));
        assert!(matches!(encode_read(Target::Id(1), 36, 0), Err(FrameError::Construction(_))));
        assert!(matches!(encode_read(Target::Id(1), 36, MAX_READ + 1), Err(FrameError::Construction(_))));
        assert!(matches!(encode_read(Target::Id(0xff), 36, 1), Err(FrameError::Construction(_))));
        assert!(matches!(encode_write(Target::Id(1), 30, &[]), Err(FrameError::Construction(_))));
        assert!(matches!(encode_write(Target::Id(1), 30, &[0; MAX_WRITE + 1]), Err(FrameError::Construction(_))));
        assert!(encode_write(Target::Id(1), 0, &[0; MAX_WRITE]).is_ok());
        assert!(matches!(Target::try_from(0xff), Err(FrameError::Construction(_))));
        assert_eq!(Target::try_from(0xfe), Ok(Target::Broadcast));
    }

    #[test]
    fn decode_accepted_status() {
        let status = decode_status(&[0xff, 0xff, 0x01, 0x02, 0x00, 0xfc], STATUS_SIZE).unwrap();
        assert_eq!(status.target, 1);
        assert!(status.error.is_empty());
        assert!(status.params.is_empty());
    }

    #[test]
    fn decode_failures() {
        let valid = Frame::status(3, ErrorFlags::from(0), &[0x00, 0x02]).unwrap();
        let raw = valid.as_bytes();
        assert_eq!(decode_status(&[], 8), Err(FrameError::Timeout));
        assert_eq!(decode_status(&raw[..5], 8), Err(FrameError::ShortFrame {expected: 8, received: 5}));

        let mut header = [0u8; 8];
        header.copy_from_slice(raw);
        header[1] = 0xfd;
        assert_eq!(decode_status(&header, 8), Err(FrameError::BadHeader));

        let mut corrupted = header;
        corrupted[1] = 0xff;
        corrupted[6] ^= 0x10;
        assert!(matches!(decode_status(&corrupted, 8), Err(FrameError::ChecksumMismatch {..})));
    }

    #[test]
    fn declared_length_must_match() {
        // valid checksum but the length byte claims one parameter too many
        let mut raw = [0xff, 0xff, 0x01, 0x05, 0x00, 0x00, 0x02, 0x00];
        raw[7] = checksum(&raw[2..7]);
        assert_eq!(decode_status(&raw, 8), Err(FrameError::ShortFrame {expected: 9, received: 8}));
    }

    #[test]
    fn any_single_bit_flip_is_detected() {
        let frame = Frame::status(7, ErrorFlags::from(0), &[0x10, 0x20, 0x30]).unwrap();
        for byte in 0 .. frame.len() {
            for bit in 0 .. 8 {
                let mut raw = [0u8; 9];
                raw.copy_from_slice(frame.as_bytes());
                raw[byte] ^= 1 << bit;
                assert!(decode_status(&raw, frame.len()).is_err(), "flip {}:{} undetected", byte, bit);
            }
        }
    }

    #[test]
    fn error_flags_bits() {
        let flags = ErrorFlags::from(0x04);
        assert!(flags.overheating());
        assert!(!flags.overload());
        assert!(!flags.is_empty());
        assert_eq!(u8::from(ErrorFlags::from(0x60)), 0x60);
        assert!(ErrorFlags::from(0x40).instruction());
    }
}
