use core::fmt;
use packbytes::{FromBytes, ToBytes, ByteArray};
use log::*;

use crate::{
    frame::{FrameError, Target, BROADCAST},
    registers::{self, Register, RegisterDescriptor, Access, Feedback, Unit, DEGREES},
    };
use super::{
    Error,
    link::Link,
    networking::{Bus, Acknowledge},
    };


/// lightweight reference to one servo on a [Bus]
pub struct Servo<'b, L> {
    bus: &'b Bus<L>,
    id: u8,
}
/// lightweight reference to all servos on a [Bus], writes only since nobody answers
pub struct Broadcast<'b, L> {
    bus: &'b Bus<L>,
}

/// model number read from a servo
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Model {
    pub number: u16,
}
impl Model {
    pub fn name(self) -> Option<&'static str> {
        registers::model_name(self.number)
    }
}
impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:04X})", name, self.number),
            None => write!(f, "unknown (0x{:04X})", self.number),
        }
    }
}

/// human readable state of a servo, fields are `None` when their read failed
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Inspection {
    pub return_level: Option<u8>,
    pub torque_enabled: Option<bool>,
    /// degrees
    pub position: Option<f32>,
    /// RPM
    pub speed: Option<f32>,
    /// signed percentage of maximum torque
    pub load: Option<f32>,
    /// volts
    pub voltage: Option<f32>,
    /// degrees Celsius
    pub temperature: Option<f32>,
}


impl<L: Link> Bus<L> {
    /// access to servo `id`, in `0 ..= 253`
    pub fn servo(&self, id: u8) -> Result<Servo<'_, L>, Error> {
        match Target::try_from(id)? {
            Target::Id(id) => Ok(Servo {bus: self, id}),
            Target::Broadcast => Err(FrameError::Construction("use broadcast() to address all servos").into()),
        }
    }
    pub fn broadcast(&self) -> Broadcast<'_, L> {
        Broadcast {bus: self}
    }
    /**
        read the model number of each given id, one transaction per id

        ids that do not answer are skipped, other failures abort the scan
    */
    pub async fn scan(&self, ids: impl IntoIterator<Item=u8>) -> Result<Vec<(u8, Model)>, Error> {
        let mut found = Vec::new();
        for id in ids {
            match self.servo(id)?.model().await {
                Ok(model) => {
                    info!("servo {}: {}", id, model);
                    found.push((id, model));
                },
                Err(error) if error.is_unreachable() => debug!("servo {}: {}", id, error),
                Err(error) => return Err(error),
            }
        }
        Ok(found)
    }
}

impl<'b, L: Link> Servo<'b, L> {
    pub fn id(&self) -> u8  {self.id}

    /// read a typed register
    pub async fn read<T: FromBytes>(&self, register: Register<T>) -> Result<T, Error> {
        let mut buffer = T::Bytes::zeroed();
        let params = self.bus.read_register(self.id, register.address(), register.size()).await?;
        let dst = buffer.as_mut();
        if dst.len() != params.len()
            {return Err(FrameError::ShortFrame {expected: dst.len(), received: params.len()}.into())}
        dst.copy_from_slice(&params);
        Ok(T::from_le_bytes(buffer))
    }
    /// write a typed register
    pub async fn write<T: ToBytes>(&self, register: Register<T>, value: T) -> Result<Acknowledge, Error> {
        let bytes = value.to_le_bytes();
        self.bus.write_register(self.id, register.address(), bytes.as_ref()).await
    }
    /// read a register and convert it to its physical unit
    pub async fn read_physical(&self, register: &RegisterDescriptor) -> Result<f32, Error> {
        let width = register.width.bytes();
        let params = self.bus.read_register(self.id, register.address, width).await?;
        register.to_physical(&params)
            .ok_or(FrameError::ShortFrame {expected: usize::from(width), received: params.len()}.into())
    }
    /// write a physical value, rounded to the nearest raw value
    pub async fn write_physical(&self, register: &RegisterDescriptor, value: f32) -> Result<Acknowledge, Error> {
        if register.access == Access::ReadOnly
            {return Err(FrameError::Construction("register is read-only").into())}
        let bytes = register.to_bytes(value);
        self.bus.write_register(self.id, register.address, &bytes[.. usize::from(register.width.bytes())]).await
    }

    pub async fn model(&self) -> Result<Model, Error> {
        Ok(Model {number: self.read(registers::MODEL_NUMBER).await?})
    }
    /// present state in one transaction
    pub async fn feedback(&self) -> Result<Feedback, Error> {
        self.read(registers::FEEDBACK).await
    }
    /// read the usual monitoring registers, each in its own transaction so other callers can interleave
    pub async fn inspect(&self) -> Inspection {
        Inspection {
            return_level: self.field("return level", self.read(registers::STATUS_RETURN_LEVEL).await),
            torque_enabled: self.field("torque", self.read(registers::TORQUE_ENABLE).await.map(|raw| raw != 0)),
            position: self.field("position", self.read(registers::PRESENT_POSITION).await.map(|raw| DEGREES.to_physical(raw))),
            speed: self.field("speed", self.read(registers::PRESENT_SPEED).await.map(|raw| Unit::Rpm.to_physical(raw))),
            load: self.field("load", self.read(registers::PRESENT_LOAD).await.map(|load| load.percent())),
            voltage: self.field("voltage", self.read(registers::PRESENT_VOLTAGE).await.map(|raw| Unit::Volts.to_physical(raw.into()))),
            temperature: self.field("temperature", self.read(registers::PRESENT_TEMPERATURE).await.map(|raw| Unit::Celsius.to_physical(raw.into()))),
        }
    }
    fn field<T>(&self, name: &str, result: Result<T, Error>) -> Option<T> {
        result.map_err(|error| warn!("servo {}: no {}: {}", self.id, name, error)).ok()
    }

    pub async fn set_torque(&self, enable: bool) -> Result<Acknowledge, Error> {
        self.write(registers::TORQUE_ENABLE, u8::from(enable)).await
    }
    /**
        enable torque and move to the given angle in `0 ..= 300` degrees

        returns the goal position actually written, in servo units
    */
    pub async fn rotate_to(&self, degrees: f32) -> Result<u16, Error> {
        if !(0. ..= 300.).contains(&degrees)
            {return Err(FrameError::Construction("angle must be in 0..=300 degrees").into())}
        let units = DEGREES.to_raw(degrees, registers::AX_RESOLUTION);
        self.set_torque(true).await?;
        self.write(registers::GOAL_POSITION, units).await?;
        Ok(units)
    }
}

impl<'b, L: Link> Broadcast<'b, L> {
    /// write a typed register on all servos at once
    pub async fn write<T: ToBytes>(&self, register: Register<T>, value: T) -> Result<(), Error> {
        let bytes = value.to_le_bytes();
        self.bus.write_register(BROADCAST, register.address(), bytes.as_ref()).await?;
        Ok(())
    }
    /// release (emergency stop) or hold all servos
    pub async fn set_torque(&self, enable: bool) -> Result<(), Error> {
        self.write(registers::TORQUE_ENABLE, u8::from(enable)).await
    }
}
