use std::{
    io,
    future::Future,
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
    };
use serial2_tokio::{SerialPort, CharSize, StopBits, Parity, FlowControl};

use super::{
    settings::{DirectionControl, ControlLine},
    transceiver::spin_until,
    };


/// state of the half-duplex transceiver
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    /// our driver is on the line, servos only listen
    Transmit,
    /// our driver is released, servos can answer
    Receive,
}

/**
    physical half-duplex connection

    implementors only move bytes and drive the direction line, the order and timing of these operations is the business of [Transceiver](super::Transceiver)
*/
pub trait Link: Send + 'static {
    /// drive the direction control line
    fn set_direction(&mut self, direction: Direction) -> io::Result<()>;
    /// drop bytes received but not read yet
    fn discard_input(&mut self) -> io::Result<()>;
    /// hand all bytes to the transmitter
    fn write_all(&mut self, data: &[u8]) -> impl Future<Output=io::Result<()>> + Send;
    /// wait until the last byte written has left the wire
    fn drain(&mut self) -> impl Future<Output=io::Result<()>> + Send;
    /// wait for at least one byte and return how many were read
    fn read(&mut self, buffer: &mut [u8]) -> impl Future<Output=io::Result<usize>> + Send;
}


/// [Link] on a uart adapter whose half-duplex buffer is switched by a modem line
pub struct SerialLink {
    port: SerialPort,
    /// blocking handle on the same device, only used to wait for the output queue to empty
    drain: Arc<serial2::SerialPort>,
    direction: DirectionControl,
    /// duration of one character on the wire: start, 8 data and stop bits
    character: Duration,
    /// earliest time the last byte handed to the port can have left the wire
    transmitted: Instant,
}
impl SerialLink {
    /// open the port in 8N1 raw mode and release the line
    pub fn open(path: impl AsRef<Path>, rate: u32, direction: DirectionControl) -> io::Result<Self> {
        let port = SerialPort::open(path.as_ref(), |mut settings: serial2_tokio::Settings| {
                settings.set_raw();
                settings.set_baud_rate(rate)?;
                settings.set_char_size(CharSize::Bits8);
                settings.set_stop_bits(StopBits::One);
                settings.set_parity(Parity::None);
                settings.set_flow_control(FlowControl::None);
                Ok(settings)
                })?;
        let drain = serial2::SerialPort::open(path.as_ref(), serial2::KeepSettings)?;
        let mut link = Self {
            port,
            drain: Arc::new(drain),
            direction,
            character: Duration::from_secs(10) / rate.max(1),
            transmitted: Instant::now(),
        };
        link.set_direction(Direction::Receive)?;
        Ok(link)
    }
}
impl Link for SerialLink {
    fn set_direction(&mut self, direction: Direction) -> io::Result<()> {
        let level = self.direction.level(direction);
        match self.direction.line {
            ControlLine::Dtr => self.port.set_dtr(level),
            ControlLine::Rts => self.port.set_rts(level),
        }
    }
    fn discard_input(&mut self) -> io::Result<()> {
        self.port.discard_input_buffer()
    }
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let start = Instant::now().max(self.transmitted);
        self.port.write_all(data).await?;
        self.transmitted = start + self.character * u32::try_from(data.len()).unwrap_or(u32::MAX);
        Ok(())
    }
    async fn drain(&mut self) -> io::Result<()> {
        // the async port cannot wait for the kernel queue (tcdrain), the blocking handle does
        let drain = self.drain.clone();
        tokio::task::spawn_blocking(move || drain.flush()).await
            .map_err(io::Error::other)??;
        // the driver may report an empty queue while the last character is still shifting out
        spin_until(self.transmitted);
        Ok(())
    }
    async fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        self.port.read(buffer).await
    }
}
