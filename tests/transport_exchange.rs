use parking_lot::Mutex;
use sitewatch::protocol::{self, Command, FrameType};
use sitewatch::transport::{ByteLink, SerialConfig};
use sitewatch::{DeviceStatus, SerialTransport, TransportError};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How the simulated microcontroller answers each request
#[derive(Clone, Copy)]
enum Behaviour {
    Ack,
    Silent,
    Garbled,
}

#[derive(Default)]
struct McuLog {
    requests: Vec<(u8, u8, Vec<u8>)>,
    alarm_on: bool,
    discards: usize,
}

/// Byte-level stand-in for the alarm firmware: decodes each written request
/// and queues the reply bytes
struct SimulatedMcu {
    behaviour: Behaviour,
    outbound: VecDeque<u8>,
    /// Whether a discard request actually empties `outbound`, like a UART
    /// input flush
    flushable: bool,
    log: Arc<Mutex<McuLog>>,
}

impl SimulatedMcu {
    fn new(behaviour: Behaviour) -> (Self, Arc<Mutex<McuLog>>) {
        let log = Arc::new(Mutex::new(McuLog::default()));
        (
            Self {
                behaviour,
                outbound: VecDeque::new(),
                flushable: false,
                log: Arc::clone(&log),
            },
            log,
        )
    }

    /// Bytes already waiting on the line before the first request
    fn with_pending(mut self, bytes: &[u8]) -> Self {
        self.outbound.extend(bytes.iter().copied());
        self
    }

    fn respond(&mut self, command: u8, sequence: u8, payload: &[u8]) {
        let mut log = self.log.lock();
        log.requests.push((command, sequence, payload.to_vec()));

        let data = match Command::from_code(command) {
            Some(Command::ToggleAlarm) => {
                log.alarm_on = !log.alarm_on;
                vec![]
            }
            Some(Command::Reset) => {
                log.alarm_on = false;
                vec![]
            }
            Some(Command::StatusCheck) => {
                let mut data = vec![log.alarm_on as u8, log.alarm_on as u8];
                data.extend_from_slice(&512u16.to_le_bytes());
                data.extend_from_slice(&23.5f32.to_le_bytes());
                data
            }
            Some(Command::AnomalyNotify) | None => vec![],
        };
        drop(log);

        let mut reply =
            protocol::encode(command, sequence, FrameType::Response.code(), &data).unwrap();
        match self.behaviour {
            Behaviour::Ack => self.outbound.extend(reply),
            Behaviour::Silent => {}
            Behaviour::Garbled => {
                let last = reply.len() - 1;
                reply[last] ^= 0x5A;
                self.outbound.extend(reply);
            }
        }
    }
}

impl ByteLink for SimulatedMcu {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let frame = protocol::decode(bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        assert_eq!(frame.frame_type, FrameType::Request.code());
        self.respond(frame.command, frame.sequence, &frame.payload);
        Ok(bytes.len())
    }

    fn read_byte(&mut self, quantum: Duration) -> io::Result<Option<u8>> {
        match self.outbound.pop_front() {
            Some(b) => Ok(Some(b)),
            None => {
                std::thread::sleep(quantum);
                Ok(None)
            }
        }
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.log.lock().discards += 1;
        if self.flushable {
            self.outbound.clear();
        }
        Ok(())
    }
}

fn config(timeout: Duration) -> SerialConfig {
    SerialConfig {
        port: "sim".to_string(),
        poll_quantum: Duration::from_millis(10),
        response_timeout: timeout,
        ..Default::default()
    }
}

fn transport(behaviour: Behaviour, timeout: Duration) -> (SerialTransport, Arc<Mutex<McuLog>>) {
    let (mcu, log) = SimulatedMcu::new(behaviour);
    (SerialTransport::with_link(Box::new(mcu), &config(timeout)), log)
}

#[test]
fn test_toggle_then_status_reflects_alarm_state() {
    let (mut transport, log) = transport(Behaviour::Ack, Duration::from_millis(500));

    let exchange = transport.toggle_alarm().unwrap();
    assert!(exchange.is_ack());

    let status = transport.check_status().unwrap().unwrap();
    assert_eq!(
        status,
        DeviceStatus {
            led_on: true,
            buzzer_on: true,
            light_level: 512,
            temperature: 23.5,
        }
    );

    transport.reset().unwrap();
    let status = transport.check_status().unwrap().unwrap();
    assert!(!status.led_on);

    let requests = &log.lock().requests;
    let sequences: Vec<u8> = requests.iter().map(|r| r.1).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3]);
}

#[test]
fn test_anomaly_notify_carries_state_byte() {
    let (mut transport, log) = transport(Behaviour::Ack, Duration::from_millis(500));

    assert!(transport.notify_anomaly(true).unwrap().is_ack());
    assert!(transport.notify_anomaly(false).unwrap().is_ack());

    let requests = &log.lock().requests;
    assert_eq!(requests[0], (0x13, 0, vec![1]));
    assert_eq!(requests[1], (0x13, 1, vec![0]));
}

#[test]
fn test_sequence_wraps_after_256_requests() {
    let (mut transport, _) = transport(Behaviour::Ack, Duration::from_millis(500));

    for expected in 0..=255u8 {
        assert_eq!(transport.toggle_alarm().unwrap().sequence, expected);
    }
    assert_eq!(transport.toggle_alarm().unwrap().sequence, 0);
}

#[test]
fn test_silent_peer_times_out_within_bound() {
    let timeout = Duration::from_millis(300);
    let (mut transport, log) = transport(Behaviour::Silent, timeout);

    let started = Instant::now();
    let err = transport.toggle_alarm().unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, TransportError::Timeout(t) if t == timeout));
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_millis(250));
    // The request itself still went out
    assert_eq!(log.lock().requests.len(), 1);
}

#[test]
fn test_default_timeout_is_two_seconds() {
    assert_eq!(
        SerialConfig::default().response_timeout,
        Duration::from_millis(2000)
    );
}

#[test]
fn test_garbled_reply_is_distinct_from_timeout() {
    let (mut transport, _) = transport(Behaviour::Garbled, Duration::from_millis(500));

    let started = Instant::now();
    let err = transport.toggle_alarm().unwrap_err();

    assert!(matches!(err, TransportError::Frame(_)));
    assert!(!err.is_timeout());
    // Rejected as soon as the frame completed, not after the deadline
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[test]
fn test_transport_recovers_after_failure() {
    let (mcu, _) = SimulatedMcu::new(Behaviour::Ack);
    let mut transport =
        SerialTransport::with_link(Box::new(mcu), &config(Duration::from_millis(200)));

    transport.send(&[0x00]).unwrap_err();
    assert!(transport.toggle_alarm().unwrap().is_ack());
}

fn stale_reply(sequence: u8) -> Vec<u8> {
    protocol::encode(
        Command::ToggleAlarm.code(),
        sequence,
        FrameType::Response.code(),
        &[],
    )
    .unwrap()
}

#[test]
fn test_late_reply_from_earlier_request_is_skipped() {
    let (mcu, log) = SimulatedMcu::new(Behaviour::Ack);
    let mcu = mcu.with_pending(&stale_reply(200));
    let mut transport =
        SerialTransport::with_link(Box::new(mcu), &config(Duration::from_millis(300)));

    let acks: Vec<bool> = (0..5)
        .map(|_| transport.toggle_alarm().unwrap().is_ack())
        .collect();
    assert_eq!(acks, vec![true; 5]);

    let log = log.lock();
    let sequences: Vec<u8> = log.requests.iter().map(|r| r.1).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
    assert_eq!(log.discards, 5);
}

#[test]
fn test_pending_input_is_flushed_before_request() {
    // Corrupt leftovers would fail the exchange if they were read
    let mut leftover = stale_reply(0);
    let last = leftover.len() - 1;
    leftover[last] ^= 0xFF;

    let (mut mcu, _) = SimulatedMcu::new(Behaviour::Ack);
    mcu.flushable = true;
    let mcu = mcu.with_pending(&leftover);
    let mut transport =
        SerialTransport::with_link(Box::new(mcu), &config(Duration::from_millis(300)));

    let exchange = transport.toggle_alarm().unwrap();
    assert!(exchange.is_ack());
    assert_eq!(exchange.sequence, 0);
}

#[test]
fn test_stray_marker_with_short_len_does_not_desync() {
    let (mcu, _) = SimulatedMcu::new(Behaviour::Ack);
    let mcu = mcu.with_pending(&[0x7E, 0x00]);
    let mut transport =
        SerialTransport::with_link(Box::new(mcu), &config(Duration::from_millis(300)));

    assert!(transport.toggle_alarm().unwrap().is_ack());
    assert!(transport.toggle_alarm().unwrap().is_ack());
}
