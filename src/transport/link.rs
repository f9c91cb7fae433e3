// Byte-level access to the MCU link
//
// The transport needs one write attempt, "give me the next byte if one shows up
// within this quantum", and a way to drop whatever is already buffered before a
// new request goes out. Keeping the seam this small lets tests script the peer
// byte by byte.

use std::io::{self, Read, Write};
use std::time::Duration;
use tokio_serial::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

pub trait ByteLink: Send {
    /// One write attempt; returns how many bytes the device accepted
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Wait at most `quantum` for a single byte. `Ok(None)` means nothing arrived.
    fn read_byte(&mut self, quantum: Duration) -> io::Result<Option<u8>>;

    /// Drop bytes received but not yet read, such as a late reply to an
    /// earlier request
    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Serial device opened raw (non-canonical), 8N1, no flow control
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl SerialLink {
    pub fn open(path: &str, baud_rate: u32, quantum: Duration) -> io::Result<Self> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(quantum)
            .open()
            .map_err(io::Error::from)?;

        Ok(Self {
            port,
            timeout: quantum,
        })
    }
}

impl ByteLink for SerialLink {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let written = self.port.write(bytes)?;
        self.port.flush()?;
        Ok(written)
    }

    fn read_byte(&mut self, quantum: Duration) -> io::Result<Option<u8>> {
        if quantum != self.timeout {
            self.port.set_timeout(quantum).map_err(io::Error::from)?;
            self.timeout = quantum;
        }

        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(byte[0])),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}
