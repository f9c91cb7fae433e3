// Binary frame codec for the alarm microcontroller link
//
// Wire format (all frames, both directions):
//
//   [SOF=0x7E][LEN][CMD][SEQ][TYPE][DATA...][CRC_LO][CRC_HI]
//
// LEN counts the bytes from CMD through CRC_HI inclusive, so a complete frame
// is always LEN + 2 bytes long. The CRC covers CMD..end of DATA and is sent
// little-endian. Decoding is all-or-nothing: a buffer either validates fully
// or is rejected.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Start-of-frame marker
pub const SOF: u8 = 0x7E;

/// SOF + LEN + CMD + SEQ + TYPE + CRC(2)
pub const MIN_FRAME_LEN: usize = 7;

/// CMD + SEQ + TYPE + CRC(2), i.e. LEN for an empty payload
const LEN_OVERHEAD: usize = 5;

/// Largest payload whose LEN still fits in one byte
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - LEN_OVERHEAD;

/// Command codes understood by the microcontroller firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Command {
    ToggleAlarm = 0x10,
    StatusCheck = 0x11,
    Reset = 0x12,
    AnomalyNotify = 0x13,
}

impl Command {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x10 => Some(Self::ToggleAlarm),
            0x11 => Some(Self::StatusCheck),
            0x12 => Some(Self::Reset),
            0x13 => Some(Self::AnomalyNotify),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ToggleAlarm => "TOGGLE",
            Self::StatusCheck => "CHECK",
            Self::Reset => "RESET",
            Self::AnomalyNotify => "ANOMALY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FrameType {
    Request = 0x00,
    Response = 0x01,
}

impl FrameType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::Request),
            0x01 => Some(Self::Response),
            _ => None,
        }
    }
}

/// Reasons a buffer is rejected by [`decode`] or [`encode`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame too short: {0} bytes (minimum {MIN_FRAME_LEN})")]
    TooShort(usize),

    #[error("bad start-of-frame marker: 0x{0:02x}")]
    BadMarker(u8),

    #[error("length mismatch: LEN field says {declared} bytes follow, buffer holds {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("checksum mismatch: expected 0x{expected:04x}, received 0x{received:04x}")]
    ChecksumMismatch { expected: u16, received: u16 },

    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD_LEN}-byte frame limit")]
    PayloadTooLarge(usize),
}

/// A fully validated frame.
///
/// Command and type are kept as raw codes so that replies carrying codes this
/// build does not know about can still be inspected and correlated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFrame {
    pub command: u8,
    pub sequence: u8,
    pub frame_type: u8,
    pub payload: Vec<u8>,
}

impl ParsedFrame {
    pub fn command(&self) -> Option<Command> {
        Command::from_code(self.command)
    }

    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_code(self.frame_type)
    }

    /// True if this frame is the response to a request with `command` and `sequence`
    pub fn answers(&self, command: Command, sequence: u8) -> bool {
        self.command == command.code()
            && self.sequence == sequence
            && self.frame_type == FrameType::Response.code()
    }
}

/// CRC-16 with init 0xFFFF and reflected polynomial 0xA001, processed one bit
/// at a time, LSB first (the MODBUS parameter set).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Build a complete frame
pub fn encode(
    command: u8,
    sequence: u8,
    frame_type: u8,
    payload: &[u8],
) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge(payload.len()));
    }

    let length = (payload.len() + LEN_OVERHEAD) as u8;
    let mut frame = Vec::with_capacity(payload.len() + MIN_FRAME_LEN);
    frame.extend_from_slice(&[SOF, length, command, sequence, frame_type]);
    frame.extend_from_slice(payload);

    let crc = crc16(&frame[2..]);
    let mut crc_bytes = [0u8; 2];
    LittleEndian::write_u16(&mut crc_bytes, crc);
    frame.extend_from_slice(&crc_bytes);

    Ok(frame)
}

/// Build a request frame for one of the known commands
pub fn encode_request(
    command: Command,
    sequence: u8,
    payload: &[u8],
) -> Result<Vec<u8>, FrameError> {
    encode(command.code(), sequence, FrameType::Request.code(), payload)
}

/// Validate and split a complete frame
pub fn decode(bytes: &[u8]) -> Result<ParsedFrame, FrameError> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(FrameError::TooShort(bytes.len()));
    }
    if bytes[0] != SOF {
        return Err(FrameError::BadMarker(bytes[0]));
    }

    let declared = bytes[1] as usize;
    if declared + 2 != bytes.len() {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: bytes.len() - 2,
        });
    }

    let crc_at = bytes.len() - 2;
    let expected = crc16(&bytes[2..crc_at]);
    let received = LittleEndian::read_u16(&bytes[crc_at..]);
    if expected != received {
        return Err(FrameError::ChecksumMismatch { expected, received });
    }

    Ok(ParsedFrame {
        command: bytes[2],
        sequence: bytes[3],
        frame_type: bytes[4],
        payload: bytes[5..crc_at].to_vec(),
    })
}

/// Number of bytes a frame occupies given its LEN byte
pub fn frame_len_from_header(len_field: u8) -> usize {
    len_field as usize + 2
}

/// Space-separated lowercase hex, for TX/RX logging
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sensor snapshot returned by the microcontroller for a status check
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub led_on: bool,
    pub buzzer_on: bool,
    pub light_level: u16,
    pub temperature: f32,
}

impl DeviceStatus {
    /// Minimum status payload: LED, buzzer, light (u16 LE), temperature (f32 LE)
    pub const PAYLOAD_LEN: usize = 8;

    /// Decode a status-check response; anything else yields `None`
    pub fn from_frame(frame: &ParsedFrame) -> Option<Self> {
        if frame.command != Command::StatusCheck.code()
            || frame.frame_type != FrameType::Response.code()
            || frame.payload.len() < Self::PAYLOAD_LEN
        {
            return None;
        }

        let data = &frame.payload;
        Some(Self {
            led_on: data[0] == 0x01,
            buzzer_on: data[1] == 0x01,
            light_level: LittleEndian::read_u16(&data[2..4]),
            temperature: LittleEndian::read_f32(&data[4..8]),
        })
    }
}
