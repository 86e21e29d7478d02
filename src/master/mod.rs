/*!
    host side of the servo bus, in a `std` environment with tokio

    The central resource is the [Bus] struct which owns the serial line and serializes all transactions: one instruction frame goes out, its status frame (if any) comes back, and only then the next caller gets the line.

    layers, from the wire up:

    - [Link] is the physical half-duplex connection, implemented by [SerialLink] for real adapters and by [simulator::SimulatedLink] for tests
    - [Transceiver] enforces the direction switching order and timing on a [Link]
    - [Bus] runs transactions, see [Bus::execute], [Bus::read_register], [Bus::write_register]
    - [Servo] and [Broadcast] are lightweight references to a [Bus] for convenient typed access
*/

/// the physical connection and its direction control line
mod link;
/// direction switching discipline, this is the timing sensitive part of the code
mod transceiver;
/// serialized transactions on the bus
mod networking;
/// convenient methods to read/write servo registers
mod accessing;
/// connection and timing configuration
mod settings;
/// simulated bus with virtual servos
pub mod simulator;


pub use link::{Link, SerialLink, Direction};
pub use transceiver::Transceiver;
pub use networking::*;
pub use accessing::*;
pub use settings::*;


use thiserror::Error;
use crate::frame::{FrameError, ErrorFlags};

/// error regarding bus communication
#[derive(Error, Debug)]
pub enum Error {
    /// the serial device itself failed
    #[error("problem with serial bus")]
    Bus(std::io::Error),
    /// nothing was sent, or what came back is not a valid answer
    #[error(transparent)]
    Frame(FrameError),
    /// the servo answered with a non-empty error byte
    #[error("servo rejected the command: {0:?}")]
    Device(ErrorFlags),
    #[error("invalid setting {name}={value:?}")]
    Settings { name: &'static str, value: String },
}
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Bus(error)
    }
}
impl From<FrameError> for Error {
    fn from(error: FrameError) -> Self {
        Self::Frame(error)
    }
}
impl Error {
    /// the target did not answer properly: absent, wrong baud rate, or line noise
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Frame(
            FrameError::Timeout
            | FrameError::ShortFrame {..}
            | FrameError::BadHeader
            | FrameError::ChecksumMismatch {..}
            ))
    }
    /// the target answered but refused the command
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Device(_))
    }
}
