use std::{
    io,
    sync::Arc,
    time::Duration,
    };
use tokio::sync::Mutex;
use log::*;

use crate::frame::{
    self, Frame, FrameError, Status, Target, Params,
    STATUS_SIZE,
    };
use super::{
    Error,
    link::{Link, SerialLink},
    transceiver::Transceiver,
    settings::{Settings, Timing},
    };


/**
    servo bus master

    owns the serial line and runs one transaction at a time: every caller (task or thread, through an `Arc<Bus>`) waits its turn on a FIFO lock, which is held from the first byte sent to the last byte received. A transaction that fails is reported once, retrying is the caller's choice.

    transactions need a tokio runtime, the transmission runs in a task of its own
*/
pub struct Bus<L> {
    transceiver: Arc<Mutex<Transceiver<L>>>,
    timing: Timing,
}

/// one transaction to run on the bus
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request<'d> {
    /// fetch `length` bytes of the control table starting at `address`
    Read { target: Target, address: u8, length: u8 },
    /// store `data` in the control table starting at `address`
    Write { target: Target, address: u8, data: &'d [u8] },
}

/// outcome of an accepted write
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Acknowledge {
    /// the servo answered with an empty error byte
    Accepted,
    /// broadcast, nobody answers
    Unconfirmed,
}

/// steps of a transaction, for tracing
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Sending,
    AwaitingTurnaround,
    Receiving,
    Completed,
}


impl<'d> Request<'d> {
    /// read request, broadcast cannot be read
    pub fn read(target: u8, address: u8, length: u8) -> Result<Self, Error> {
        match Target::try_from(target)? {
            Target::Broadcast => Err(FrameError::Construction("broadcast target cannot be read").into()),
            target => Ok(Self::Read {target, address, length}),
        }
    }
    /// write request, `target` may be the broadcast identifier
    pub fn write(target: u8, address: u8, data: &'d [u8]) -> Result<Self, Error> {
        Ok(Self::Write {target: Target::try_from(target)?, address, data})
    }
    pub fn target(&self) -> Target {
        match self {
            Self::Read {target, ..} | Self::Write {target, ..} => *target,
        }
    }
    pub fn encode(&self) -> Result<Frame, FrameError> {
        match *self {
            Self::Read {target, address, length} => frame::encode_read(target, address, length),
            Self::Write {target, address, data} => frame::encode_write(target, address, data),
        }
    }
    /// size of the status frame answering this request, zero when none will come
    pub fn response_size(&self) -> usize {
        match *self {
            Self::Read {length, ..} => STATUS_SIZE + usize::from(length),
            Self::Write {target: Target::Broadcast, ..} => 0,
            Self::Write {..} => STATUS_SIZE,
        }
    }
}


impl Bus<SerialLink> {
    /// open the serial port, it stays open until the bus is dropped
    pub fn open(settings: &Settings) -> Result<Self, Error> {
        let link = SerialLink::open(&settings.port, settings.baud_rate, settings.direction)?;
        info!("opened servo bus on {} at {} bit/s", settings.port, settings.baud_rate);
        Ok(Self::new(link, settings.timing))
    }
}

impl<L: Link> Bus<L> {
    pub fn new(link: L, timing: Timing) -> Self {
        Self {
            transceiver: Arc::new(Mutex::new(Transceiver::new(link, timing.turnaround))),
            timing,
        }
    }
    pub fn timing(&self) -> &Timing  {&self.timing}
    /// close the bus and give back the link, `None` while an abandoned transmission is still finishing
    pub fn into_link(self) -> Option<L> {
        Arc::into_inner(self.transceiver)
            .map(|transceiver| transceiver.into_inner().into_link())
    }

    /// timeout applying to the given request with the current timing
    pub fn timeout(&self, request: &Request<'_>) -> Duration {
        match request {
            Request::Read {..} => self.timing.read_timeout,
            Request::Write {..} => self.timing.write_timeout,
        }
    }

    /**
        run one transaction with the default timeout for its kind

        returns the validated status frame, or `None` for a broadcast since nobody answers it. A status carrying a non-empty error byte is still returned here, see [accepted].

        dropping the returned future is safe at any point. Once this transaction holds the line, its frame is still sent entirely, followed by the turnaround and the release of the line, and the next transaction waits for it. An answer nobody reads anymore is discarded by the next transaction.
    */
    pub async fn execute(&self, request: &Request<'_>) -> Result<Option<Status>, Error> {
        self.execute_within(request, self.timeout(request)).await
    }
    /// same as [Self::execute] with an explicit timeout for the reception
    pub async fn execute_within(&self, request: &Request<'_>, timeout: Duration) -> Result<Option<Status>, Error> {
        let mut transceiver = self.transceiver.clone().lock_owned().await;
        let target = request.target();

        let frame = request.encode()?;
        let expected = request.response_size();

        // the task owns the lock until the line is released, even if our caller went away
        let sending = tokio::spawn(async move {
            let mut phase = Phase::Idle;
            advance(target, &mut phase, Phase::Sending);
            let sent = transceiver.send(&frame).await;
            if sent.is_ok() {
                advance(target, &mut phase, Phase::AwaitingTurnaround);
                transceiver.turnaround_delay();
            }
            let released = transceiver.release();
            (transceiver, phase, sent.and(released))
        });
        let (mut transceiver, mut phase, sent) = sending.await.map_err(io::Error::other)?;
        if let Err(error) = sent {
            debug!("{:?} {:?} not sent: {}", target, request, error);
            return Err(error.into())
        }

        if expected == 0 {
            advance(target, &mut phase, Phase::Completed);
            debug!("{:?} {:?} sent without answer", target, request);
            return Ok(None)
        }

        advance(target, &mut phase, Phase::Receiving);
        let raw = transceiver.receive(expected, timeout).await?;
        let result = frame::decode_status(raw, expected);
        drop(transceiver);
        advance(target, &mut phase, Phase::Completed);

        match result {
            Ok(status) => {
                if Target::Id(status.target) != target {
                    warn!("{:?} answered by servo {}", target, status.target);
                }
                debug!("{:?} {:?} -> {:?}", target, request, status);
                Ok(Some(status))
            },
            Err(error) => {
                debug!("{:?} {:?} failed: {}", target, request, error);
                Err(error.into())
            },
        }
    }

    /// read `length` bytes starting at `address` of servo `target`
    pub async fn read_register(&self, target: u8, address: u8, length: u8) -> Result<Params, Error> {
        let request = Request::read(target, address, length)?;
        let status = self.execute(&request).await?
            .ok_or(Error::Frame(FrameError::Timeout))?;
        Ok(accepted(status)?.params)
    }
    /// store `data` starting at `address` of servo `target`, or of all servos for the broadcast identifier
    pub async fn write_register(&self, target: u8, address: u8, data: &[u8]) -> Result<Acknowledge, Error> {
        let request = Request::write(target, address, data)?;
        match self.execute(&request).await? {
            Some(status) => accepted(status).map(|_| Acknowledge::Accepted),
            None => Ok(Acknowledge::Unconfirmed),
        }
    }
}

/// turn a status reporting alarms into [Error::Device]
pub fn accepted(status: Status) -> Result<Status, Error> {
    if status.error.is_empty()
        {Ok(status)}
    else
        {Err(Error::Device(status.error))}
}

fn advance(target: Target, phase: &mut Phase, next: Phase) {
    trace!("{:?}: {:?} -> {:?}", target, phase, next);
    *phase = next;
}
