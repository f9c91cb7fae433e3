// Framed request/response transport to the alarm microcontroller
//
// Owns the device handle exclusively. Every call returns an explicit outcome:
// a closed transport, a short write, a timeout and a malformed reply are all
// distinguishable and none of them aborts the caller.

pub mod link;

pub use link::{ByteLink, SerialLink};

use crate::protocol::{self, Command, DeviceStatus, FrameError, ParsedFrame, SOF};
use std::time::{Duration, Instant};
use thiserror::Error;

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("serial link is not open")]
    Closed,

    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("no complete frame within {0:?}")]
    Timeout(Duration),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Serial link settings
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Per-read wait while scanning for reply bytes
    pub poll_quantum: Duration,
    /// Overall deadline for a reply
    pub response_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            poll_quantum: Duration::from_millis(50),
            response_timeout: Duration::from_millis(2000),
        }
    }
}

/// Wrapping 8-bit request counter
#[derive(Debug, Default, Clone)]
pub struct SequenceCounter {
    next: u8,
}

impl SequenceCounter {
    pub fn next(&mut self) -> u8 {
        let seq = self.next;
        self.next = self.next.wrapping_add(1);
        seq
    }
}

/// A request together with the well-formed reply that answered it
#[derive(Debug, Clone)]
pub struct Exchange {
    pub command: Command,
    pub sequence: u8,
    pub reply: ParsedFrame,
}

impl Exchange {
    pub fn is_ack(&self) -> bool {
        self.reply.answers(self.command, self.sequence)
    }
}

pub struct SerialTransport {
    link: Option<Box<dyn ByteLink>>,
    label: String,
    sequence: SequenceCounter,
    poll_quantum: Duration,
    response_timeout: Duration,
}

impl SerialTransport {
    /// Open the configured device. Failure leaves the transport closed and is
    /// logged here, once; callers check [`is_open`](Self::is_open).
    pub fn open(config: &SerialConfig) -> Self {
        match SerialLink::open(&config.port, config.baud_rate, config.poll_quantum) {
            Ok(link) => {
                log::info!(
                    "Serial port {} opened at {} baud",
                    config.port,
                    config.baud_rate
                );
                Self::with_link(Box::new(link), config)
            }
            Err(e) => {
                log::warn!(
                    "Serial port {} unavailable ({}), alarm signalling disabled",
                    config.port,
                    e
                );
                Self::closed(config)
            }
        }
    }

    pub fn with_link(link: Box<dyn ByteLink>, config: &SerialConfig) -> Self {
        Self {
            link: Some(link),
            ..Self::closed(config)
        }
    }

    pub fn closed(config: &SerialConfig) -> Self {
        Self {
            link: None,
            label: config.port.clone(),
            sequence: SequenceCounter::default(),
            poll_quantum: config.poll_quantum,
            response_timeout: config.response_timeout,
        }
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn next_sequence(&mut self) -> u8 {
        self.sequence.next()
    }

    /// Write a whole frame in one attempt, no retry
    pub fn send(&mut self, frame: &[u8]) -> TransportResult<()> {
        let link = self.link.as_mut().ok_or(TransportError::Closed)?;

        log::debug!("[TX] {}", protocol::to_hex(frame));
        let written = link.write_bytes(frame)?;
        if written != frame.len() {
            return Err(TransportError::ShortWrite {
                written,
                expected: frame.len(),
            });
        }
        Ok(())
    }

    /// Write a frame, then wait up to `timeout` for one complete, valid frame
    pub fn send_and_receive(
        &mut self,
        frame: &[u8],
        timeout: Duration,
    ) -> TransportResult<ParsedFrame> {
        self.discard_input();
        self.send(frame)?;
        self.receive_frame(Instant::now() + timeout, timeout)
    }

    /// Encode `command` with the next sequence number and wait for the reply
    /// carrying the same command and sequence. Frames that answer something
    /// else are skipped until the deadline.
    pub fn request(&mut self, command: Command, payload: &[u8]) -> TransportResult<Exchange> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }

        let sequence = self.next_sequence();
        let frame = protocol::encode_request(command, sequence, payload)?;

        let result = self.exchange(command, sequence, &frame);
        if let Err(e) = &result {
            log::warn!(
                "[{}] {} (seq={}) failed: {}",
                self.label,
                command.name(),
                sequence,
                e
            );
        }
        result
    }

    fn exchange(
        &mut self,
        command: Command,
        sequence: u8,
        frame: &[u8],
    ) -> TransportResult<Exchange> {
        let timeout = self.response_timeout;
        self.discard_input();
        self.send(frame)?;

        let deadline = Instant::now() + timeout;
        loop {
            let reply = self.receive_frame(deadline, timeout)?;
            if reply.answers(command, sequence) {
                log::debug!("[RX] {} ACK (seq={})", command.name(), sequence);
                return Ok(Exchange {
                    command,
                    sequence,
                    reply,
                });
            }
            log::debug!(
                "[RX] skipping frame while waiting for {} (seq={}): cmd=0x{:02x} seq={} type={}",
                command.name(),
                sequence,
                reply.command,
                reply.sequence,
                reply.frame_type
            );
        }
    }

    pub fn toggle_alarm(&mut self) -> TransportResult<Exchange> {
        self.request(Command::ToggleAlarm, &[])
    }

    pub fn reset(&mut self) -> TransportResult<Exchange> {
        self.request(Command::Reset, &[])
    }

    pub fn notify_anomaly(&mut self, active: bool) -> TransportResult<Exchange> {
        self.request(Command::AnomalyNotify, &[active as u8])
    }

    /// Ask for the sensor snapshot. `Ok(None)` means the reply arrived but its
    /// payload was not a usable status snapshot.
    pub fn check_status(&mut self) -> TransportResult<Option<DeviceStatus>> {
        let exchange = self.request(Command::StatusCheck, &[])?;
        Ok(DeviceStatus::from_frame(&exchange.reply))
    }

    /// Drop stale input so the next reply read belongs to the next request
    fn discard_input(&mut self) {
        if let Some(link) = self.link.as_mut() {
            if let Err(e) = link.discard_input() {
                log::debug!("[{}] could not discard pending input: {}", self.label, e);
            }
        }
    }

    fn receive_frame(
        &mut self,
        deadline: Instant,
        timeout: Duration,
    ) -> TransportResult<ParsedFrame> {
        let raw = self.read_raw_frame(deadline, timeout)?;
        log::debug!("[RX] {}", protocol::to_hex(&raw));
        Ok(protocol::decode(&raw)?)
    }

    /// Scan for SOF, then accumulate until the LEN byte is satisfied. A LEN too
    /// small for any frame marks a false start and scanning resumes.
    fn read_raw_frame(&mut self, deadline: Instant, timeout: Duration) -> TransportResult<Vec<u8>> {
        let poll_quantum = self.poll_quantum;
        let link = self.link.as_mut().ok_or(TransportError::Closed)?;

        let mut buf: Vec<u8> = Vec::new();
        let mut started = false;

        loop {
            let now = Instant::now();
            if now >= deadline {
                if started {
                    log::debug!("[RX] timed out with {} partial bytes", buf.len());
                }
                return Err(TransportError::Timeout(timeout));
            }

            let quantum = poll_quantum.min(deadline - now);
            let Some(byte) = link.read_byte(quantum)? else {
                continue;
            };

            if !started {
                if byte == SOF {
                    started = true;
                    buf.clear();
                    buf.push(byte);
                }
                continue;
            }

            buf.push(byte);
            if buf.len() == 2 && protocol::frame_len_from_header(byte) < protocol::MIN_FRAME_LEN {
                log::debug!("[RX] false start, LEN=0x{:02x}", byte);
                started = false;
                continue;
            }
            if buf.len() >= 2 && buf.len() >= protocol::frame_len_from_header(buf[1]) {
                return Ok(buf);
            }
        }
    }
}
