use std::{
    env,
    str::FromStr,
    time::Duration,
    };
use super::{Error, Direction};


/**
    pause between the end of transmission and the switch to reception

    the line driver keeps the bus for a moment after the last stop bit left the UART. Switching earlier truncates our own last byte and corrupts the first bytes read, switching later eats into the servo's return delay (500 µs by default) and the answer's head is lost.
*/
pub const TURNAROUND: Duration = Duration::from_micros(50);
/**
    time allowed to receive the status frame of a read

    covers the servo's return delay, the frame itself (up to 259 bytes, 2.6 ms at 1 Mbit/s) and the latency of USB serial adapters which deliver bytes in packets
*/
pub const READ_TIMEOUT: Duration = Duration::from_millis(20);
/// time allowed to receive the 6 bytes status frame of a write
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(5);
/// factory baud rate of AX servos
pub const BAUD_RATE: u32 = 1_000_000;
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";


/// timing parameters of transactions
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timing {
    /// see [TURNAROUND]
    pub turnaround: Duration,
    /// see [READ_TIMEOUT]
    pub read_timeout: Duration,
    /// see [WRITE_TIMEOUT]
    pub write_timeout: Duration,
}
impl Default for Timing {
    fn default() -> Self {
        Self {
            turnaround: TURNAROUND,
            read_timeout: READ_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
        }
    }
}

/// modem line switching the transceiver direction
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControlLine {
    Dtr,
    Rts,
}
impl FromStr for ControlLine {
    type Err = ();
    fn from_str(value: &str) -> Result<Self, ()> {
        if value.eq_ignore_ascii_case("dtr") {Ok(Self::Dtr)}
        else if value.eq_ignore_ascii_case("rts") {Ok(Self::Rts)}
        else {Err(())}
    }
}

/// how the direction of the half-duplex transceiver is driven
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DirectionControl {
    pub line: ControlLine,
    /// line state enabling the transmitter, the opposite state enables the receiver
    pub transmit_level: bool,
}
impl Default for DirectionControl {
    /// FT232RL with a 74LS125 buffer: DTR deasserted drives the bus
    fn default() -> Self {
        Self {
            line: ControlLine::Dtr,
            transmit_level: false,
        }
    }
}
impl DirectionControl {
    /// line state to set for the given direction
    pub fn level(&self, direction: Direction) -> bool {
        match direction {
            Direction::Transmit => self.transmit_level,
            Direction::Receive => !self.transmit_level,
        }
    }
}

/// everything needed to open a [Bus](super::Bus) on a serial port
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// serial port path, like `/dev/ttyUSB0` or `COM4`
    pub port: String,
    pub baud_rate: u32,
    pub direction: DirectionControl,
    pub timing: Timing,
}
impl Settings {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            direction: DirectionControl::default(),
            timing: Timing::default(),
        }
    }
    /**
        settings from the environment, unset variables keep their default

        - `DXL_PORT` serial port path
        - `DXL_BAUD` baud rate
        - `DXL_CONTROL_LINE` `dtr` or `rts`
        - `DXL_TRANSMIT_LEVEL` `0` or `1`, line state while transmitting
        - `DXL_TURNAROUND_US` turnaround delay in microseconds
        - `DXL_READ_TIMEOUT_MS`, `DXL_WRITE_TIMEOUT_MS` status timeouts in milliseconds
    */
    pub fn from_env() -> Result<Self, Error> {
        let mut settings = Self::new(
            variable::<String>("DXL_PORT")?.unwrap_or_else(|| DEFAULT_PORT.to_string()),
            variable("DXL_BAUD")?.unwrap_or(BAUD_RATE),
            );
        if let Some(line) = variable("DXL_CONTROL_LINE")?
            {settings.direction.line = line}
        if let Some(level) = variable::<u8>("DXL_TRANSMIT_LEVEL")?
            {settings.direction.transmit_level = level != 0}
        if let Some(micros) = variable("DXL_TURNAROUND_US")?
            {settings.timing.turnaround = Duration::from_micros(micros)}
        if let Some(millis) = variable("DXL_READ_TIMEOUT_MS")?
            {settings.timing.read_timeout = Duration::from_millis(millis)}
        if let Some(millis) = variable("DXL_WRITE_TIMEOUT_MS")?
            {settings.timing.write_timeout = Duration::from_millis(millis)}
        Ok(settings)
    }
}

fn variable<T: FromStr>(name: &'static str) -> Result<Option<T>, Error> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map(Some)
            .map_err(|_| Error::Settings {name, value}),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(value)) => Err(Error::Settings {
            name,
            value: value.to_string_lossy().into_owned(),
            }),
    }
}
