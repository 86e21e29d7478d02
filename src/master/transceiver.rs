use std::{
    io,
    time::{Duration, Instant},
    };
use log::*;

use crate::frame::{Frame, MAX_FRAME};
use super::link::{Link, Direction};


/**
    half-duplex discipline on top of a [Link]

    the only valid sequence on the line is

    ```text
    transmit-enable -> discard stale input -> write -> drain -> turnaround delay -> receive-enable -> read
    ```

    flipping the direction while bytes are still in flight makes us read our own reflected transmission, so [Transceiver::send] does not return before the link is drained.
*/
pub struct Transceiver<L> {
    link: L,
    turnaround: Duration,
    receive: [u8; MAX_FRAME],
}
impl<L: Link> Transceiver<L> {
    pub fn new(link: L, turnaround: Duration) -> Self {
        Self {
            link,
            turnaround,
            receive: [0; MAX_FRAME],
        }
    }
    /// take the line, send every byte of the frame and wait until they all left
    pub async fn send(&mut self, frame: &Frame) -> io::Result<()> {
        self.link.set_direction(Direction::Transmit)?;
        self.link.discard_input()?;
        trace!("transmit {:02x?}", frame.as_bytes());
        self.link.write_all(frame.as_bytes()).await?;
        self.link.drain().await
    }
    /**
        fixed pause letting the line driver settle after the drain

        it is a few tens of microseconds, far below the timer resolution of the async runtime, so this spins
    */
    pub fn turnaround_delay(&self) {
        spin_until(Instant::now() + self.turnaround);
    }
    /**
        read up to `expected_len` bytes before `timeout` elapses, the line must have been released

        whatever arrived is returned, an empty or partial reception is not an error at this level
    */
    pub async fn receive(&mut self, expected_len: usize, timeout: Duration) -> io::Result<&[u8]> {
        let expected = expected_len.min(MAX_FRAME);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut received = 0;
        while received < expected {
            match tokio::time::timeout_at(deadline, self.link.read(&mut self.receive[received .. expected])).await {
                Ok(Ok(0)) => break,
                Ok(Ok(count)) => received += count,
                Ok(Err(error)) if error.kind() == io::ErrorKind::TimedOut => break,
                Ok(Err(error)) => return Err(error),
                Err(_) => break,
            }
        }
        trace!("received {:02x?}", &self.receive[.. received]);
        Ok(&self.receive[.. received])
    }
    /// switch to reception without reading, answers nobody waits for are discarded by the next [Self::send]
    pub fn release(&mut self) -> io::Result<()> {
        self.link.set_direction(Direction::Receive)
    }

    pub fn into_link(self) -> L  {self.link}
}

/// busy wait, timers of the async runtime are millisecond grained
pub(crate) fn spin_until(deadline: Instant) {
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}
