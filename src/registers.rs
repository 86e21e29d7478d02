/*!
    control table of protocol 1.0 servos (AX series layout)

    each register is available in two forms:

    - a typed constant of type [Register] used to read and write values with their native integer type
    - a [RegisterDescriptor] in [CONTROL_TABLE], found by name with [describe], carrying the unit conversion to physical values

    nothing here performs I/O, the table is immutable and shared by everyone
*/

use core::{fmt, marker::PhantomData};
use packbytes::{FromBytes, ToBytes, ByteArray};
use bilge::prelude::*;
use crate::pack_bilge;


/**
    a register is a typed pointer in a servo's control table

    it only holds the address of the starting byte of the referenced value, hence can be created, copied or destroyed at no cost
*/
#[derive(PartialEq, Eq, Hash)]
pub struct Register<T> {
    addr: u8,
    ty: PhantomData<T>,
}
impl<T> Register<T> {
    /// create a register from its starting byte
    pub const fn new(address: u8) -> Self {
        Self{addr: address, ty: PhantomData}
    }
    /// starting byte in the control table
    pub const fn address(&self) -> u8 {self.addr}
}
impl<T: FromBytes> Register<T> {
    /// number of bytes covered by the register
    pub const fn size(&self) -> u8 {<T::Bytes as ByteArray>::SIZE as u8}
}
impl<T> Clone for Register<T> {
    fn clone(&self) -> Self {
        Self::new(self.address())
    }
}
impl<T> Copy for Register<T> {}
impl<T> fmt::Debug for Register<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Register({})", self.addr)
    }
}


/// model number, see [model_name]
pub const MODEL_NUMBER: Register<u16> = Register::new(0);
pub const FIRMWARE_VERSION: Register<u8> = Register::new(2);
/// servo identifier on the bus
pub const ID: Register<u8> = Register::new(3);
pub const BAUD_RATE: Register<u8> = Register::new(4);
/// delay before the status frame is sent, in units of 2 µs
pub const RETURN_DELAY_TIME: Register<u8> = Register::new(5);
pub const CW_ANGLE_LIMIT: Register<u16> = Register::new(6);
pub const CCW_ANGLE_LIMIT: Register<u16> = Register::new(8);
pub const TEMPERATURE_LIMIT: Register<u8> = Register::new(11);
pub const MIN_VOLTAGE_LIMIT: Register<u8> = Register::new(12);
pub const MAX_VOLTAGE_LIMIT: Register<u8> = Register::new(13);
pub const MAX_TORQUE: Register<u16> = Register::new(14);
/// which instructions get a status frame back: 0 none, 1 ping only, 2 all
pub const STATUS_RETURN_LEVEL: Register<u8> = Register::new(16);
pub const ALARM_LED: Register<u8> = Register::new(17);
pub const SHUTDOWN: Register<u8> = Register::new(18);
/// 1 to hold position, 0 to let the horn free
pub const TORQUE_ENABLE: Register<u8> = Register::new(24);
pub const LED: Register<u8> = Register::new(25);
pub const CW_COMPLIANCE_MARGIN: Register<u8> = Register::new(26);
pub const CCW_COMPLIANCE_MARGIN: Register<u8> = Register::new(27);
pub const CW_COMPLIANCE_SLOPE: Register<u8> = Register::new(28);
pub const CCW_COMPLIANCE_SLOPE: Register<u8> = Register::new(29);
pub const GOAL_POSITION: Register<u16> = Register::new(30);
pub const MOVING_SPEED: Register<u16> = Register::new(32);
pub const TORQUE_LIMIT: Register<u16> = Register::new(34);
pub const PRESENT_POSITION: Register<u16> = Register::new(36);
pub const PRESENT_SPEED: Register<u16> = Register::new(38);
pub const PRESENT_LOAD: Register<Load> = Register::new(40);
pub const PRESENT_VOLTAGE: Register<u8> = Register::new(42);
pub const PRESENT_TEMPERATURE: Register<u8> = Register::new(43);
pub const REGISTERED: Register<u8> = Register::new(44);
pub const MOVING: Register<u8> = Register::new(46);
pub const LOCK: Register<u8> = Register::new(47);
pub const PUNCH: Register<u16> = Register::new(48);
/// contiguous block of present state, from position to temperature
pub const FEEDBACK: Register<Feedback> = Register::new(36);

/// number of bytes in the control table
pub const CONTROL_TABLE_SIZE: usize = 50;
/// position units per 300° on 10-bit servos
pub const AX_RESOLUTION: u16 = 1023;


/// present load register, the direction bit splits the magnitude range in two
#[bitsize(16)]
#[derive(Copy, Clone, FromBits, DebugBits, PartialEq)]
pub struct Load {
    /// fraction of the maximum torque, over 1023
    pub magnitude: u10,
    /// set when the load is applied clockwise
    pub clockwise: bool,
    reserved: u5,
}
pack_bilge!(Load, u16);
impl Load {
    /// signed percentage of the maximum torque, negative when clockwise
    pub fn percent(self) -> f32 {
        let percent = f32::from(self.magnitude().value()) * 100. / 1023.;
        if self.clockwise() {-percent} else {percent}
    }
}

/// present state of a servo, as laid out in its control table
#[derive(Copy, Clone, Debug, FromBytes, ToBytes)]
pub struct Feedback {
    pub position: u16,
    pub speed: u16,
    pub load: Load,
    pub voltage: u8,
    pub temperature: u8,
}


/// byte width of a register
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Width {
    Byte,
    Word,
}
impl Width {
    pub const fn bytes(self) -> u8 {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
        }
    }
    /// biggest raw value the width can hold
    pub const fn max(self) -> u16 {
        match self {
            Self::Byte => u8::MAX as u16,
            Self::Word => u16::MAX,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// physical meaning of a register's raw value
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Unit {
    /// no conversion
    Raw,
    /// boolean switch, reported as 0 or 1
    Flag,
    /// angle in degrees over a 300° travel split in `resolution` units
    Degrees { resolution: u16 },
    /// rotation speed, 0.111 RPM per unit
    Rpm,
    /// signed load percentage, see [Load]
    LoadPercent,
    /// tenth of volts
    Volts,
    /// degrees Celsius, one per unit
    Celsius,
}
impl Unit {
    /// convert a raw register value, every raw value has a physical meaning
    pub fn to_physical(self, raw: u16) -> f32 {
        match self {
            Self::Raw => f32::from(raw),
            Self::Flag => if raw != 0 {1.} else {0.},
            Self::Degrees {resolution} => f32::from(raw) * 300. / f32::from(resolution),
            Self::Rpm => f32::from(raw) * 0.111,
            Self::LoadPercent => Load::from(raw).percent(),
            Self::Volts => f32::from(raw) / 10.,
            Self::Celsius => f32::from(raw),
        }
    }
    /// convert a physical value to the nearest raw value, saturating at `max`
    pub fn to_raw(self, value: f32, max: u16) -> u16 {
        let scaled = match self {
            Self::Raw | Self::Celsius => value,
            Self::Flag => if value != 0. {1.} else {0.},
            Self::Degrees {resolution} => value * f32::from(resolution) / 300.,
            Self::Rpm => value / 0.111,
            Self::LoadPercent => {
                let (magnitude, direction) = if value < 0. {(-value, 1 << 10)} else {(value, 0)};
                let magnitude = saturate(magnitude * 1023. / 100., 1023);
                return (magnitude | direction).min(max);
            },
            Self::Volts => value * 10.,
        };
        saturate(scaled, max)
    }
}

/// round to nearest, clamping in `0 ..= max`
fn saturate(value: f32, max: u16) -> u16 {
    (value.clamp(0., f32::from(max)) + 0.5) as u16
}


/// register description used by generic tools to build and interpret frames
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RegisterDescriptor {
    pub name: &'static str,
    pub address: u8,
    pub width: Width,
    pub access: Access,
    pub unit: Unit,
}
impl RegisterDescriptor {
    const fn new(name: &'static str, address: u8, width: Width, access: Access, unit: Unit) -> Self {
        Self {name, address, width, access, unit}
    }
    /// raw value from its little endian bytes, `None` if the byte count does not match the width
    pub fn raw(&self, bytes: &[u8]) -> Option<u16> {
        match (self.width, bytes) {
            (Width::Byte, &[low]) => Some(u16::from(low)),
            (Width::Word, &[low, high]) => Some(u16::from_le_bytes([low, high])),
            _ => None,
        }
    }
    /// physical value from the register bytes
    pub fn to_physical(&self, bytes: &[u8]) -> Option<f32> {
        self.raw(bytes).map(|raw| self.unit.to_physical(raw))
    }
    /// little endian bytes storing the given physical value, only the first [Width::bytes] are meaningful
    pub fn to_bytes(&self, value: f32) -> [u8; 2] {
        self.unit.to_raw(value, self.width.max()).to_le_bytes()
    }
}

use Width::*;
use Access::*;

/// angle unit of AX position registers
pub const DEGREES: Unit = Unit::Degrees {resolution: AX_RESOLUTION};

/// every register of the control table, in address order
pub static CONTROL_TABLE: [RegisterDescriptor; 34] = [
    RegisterDescriptor::new("model_number", MODEL_NUMBER.address(), Word, ReadOnly, Unit::Raw),
    RegisterDescriptor::new("firmware_version", FIRMWARE_VERSION.address(), Byte, ReadOnly, Unit::Raw),
    RegisterDescriptor::new("id", ID.address(), Byte, ReadWrite, Unit::Raw),
    RegisterDescriptor::new("baud_rate", BAUD_RATE.address(), Byte, ReadWrite, Unit::Raw),
    RegisterDescriptor::new("return_delay_time", RETURN_DELAY_TIME.address(), Byte, ReadWrite, Unit::Raw),
    RegisterDescriptor::new("cw_angle_limit", CW_ANGLE_LIMIT.address(), Word, ReadWrite, DEGREES),
    RegisterDescriptor::new("ccw_angle_limit", CCW_ANGLE_LIMIT.address(), Word, ReadWrite, DEGREES),
    RegisterDescriptor::new("temperature_limit", TEMPERATURE_LIMIT.address(), Byte, ReadWrite, Unit::Celsius),
    RegisterDescriptor::new("min_voltage_limit", MIN_VOLTAGE_LIMIT.address(), Byte, ReadWrite, Unit::Volts),
    RegisterDescriptor::new("max_voltage_limit", MAX_VOLTAGE_LIMIT.address(), Byte, ReadWrite, Unit::Volts),
    RegisterDescriptor::new("max_torque", MAX_TORQUE.address(), Word, ReadWrite, Unit::Raw),
    RegisterDescriptor::new("status_return_level", STATUS_RETURN_LEVEL.address(), Byte, ReadWrite, Unit::Raw),
    RegisterDescriptor::new("alarm_led", ALARM_LED.address(), Byte, ReadWrite, Unit::Raw),
    RegisterDescriptor::new("shutdown", SHUTDOWN.address(), Byte, ReadWrite, Unit::Raw),
    RegisterDescriptor::new("torque_enable", TORQUE_ENABLE.address(), Byte, ReadWrite, Unit::Flag),
    RegisterDescriptor::new("led", LED.address(), Byte, ReadWrite, Unit::Flag),
    RegisterDescriptor::new("cw_compliance_margin", CW_COMPLIANCE_MARGIN.address(), Byte, ReadWrite, Unit::Raw),
    RegisterDescriptor::new("ccw_compliance_margin", CCW_COMPLIANCE_MARGIN.address(), Byte, ReadWrite, Unit::Raw),
    RegisterDescriptor::new("cw_compliance_slope", CW_COMPLIANCE_SLOPE.address(), Byte, ReadWrite, Unit::Raw),
    RegisterDescriptor::new("ccw_compliance_slope", CCW_COMPLIANCE_SLOPE.address(), Byte, ReadWrite, Unit::Raw),
    RegisterDescriptor::new("goal_position", GOAL_POSITION.address(), Word, ReadWrite, DEGREES),
    RegisterDescriptor::new("moving_speed", MOVING_SPEED.address(), Word, ReadWrite, Unit::Rpm),
    RegisterDescriptor::new("torque_limit", TORQUE_LIMIT.address(), Word, ReadWrite, Unit::Raw),
    RegisterDescriptor::new("present_position", PRESENT_POSITION.address(), Word, ReadOnly, DEGREES),
    RegisterDescriptor::new("present_speed", PRESENT_SPEED.address(), Word, ReadOnly, Unit::Rpm),
    RegisterDescriptor::new("present_load", PRESENT_LOAD.address(), Word, ReadOnly, Unit::LoadPercent),
    RegisterDescriptor::new("present_voltage", PRESENT_VOLTAGE.address(), Byte, ReadOnly, Unit::Volts),
    RegisterDescriptor::new("present_temperature", PRESENT_TEMPERATURE.address(), Byte, ReadOnly, Unit::Celsius),
    RegisterDescriptor::new("registered", REGISTERED.address(), Byte, ReadOnly, Unit::Flag),
    RegisterDescriptor::new("moving", MOVING.address(), Byte, ReadOnly, Unit::Flag),
    RegisterDescriptor::new("lock", LOCK.address(), Byte, ReadWrite, Unit::Flag),
    RegisterDescriptor::new("punch", PUNCH.address(), Word, ReadWrite, Unit::Raw),
    // short names accepted by the web API
    RegisterDescriptor::new("return_level", STATUS_RETURN_LEVEL.address(), Byte, ReadWrite, Unit::Raw),
    RegisterDescriptor::new("present_temp", PRESENT_TEMPERATURE.address(), Byte, ReadOnly, Unit::Celsius),
];

/// find a register by name, ignoring case
pub fn describe(name: &str) -> Option<&'static RegisterDescriptor> {
    CONTROL_TABLE.iter().find(|register| register.name.eq_ignore_ascii_case(name))
}
/// find the register starting at the given address
pub fn describe_address(address: u8) -> Option<&'static RegisterDescriptor> {
    CONTROL_TABLE.iter().find(|register| register.address == address)
}

/// commercial name of a known model number
pub fn model_name(number: u16) -> Option<&'static str> {
    match number {
        0x000c => Some("AX-12A"),
        0x0012 => Some("AX-18A"),
        0x012c => Some("AX-12W"),
        _ => None,
    }
}
