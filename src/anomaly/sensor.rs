// Acoustic sample source (ADS1115 behind a character device)

use byteorder::{ByteOrder, NativeEndian};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Full-scale range of the ADC programmable gain amplifier, in volts
pub const PGA_RANGE_VOLTS: f64 = 4.096;

/// Positive full-scale count of a signed 16-bit conversion
pub const ADC_RESOLUTION: f64 = 32768.0;

pub fn raw_to_voltage(raw: i16) -> f64 {
    raw as f64 * PGA_RANGE_VOLTS / ADC_RESOLUTION
}

/// Anything that yields one raw conversion per call
pub trait SampleSource: Send {
    fn read_raw(&mut self) -> io::Result<i16>;

    fn to_voltage(&self, raw: i16) -> f64 {
        raw_to_voltage(raw)
    }
}

/// The ADC driver returns one native-endian `i16` per read
pub struct AdcDevice {
    file: File,
}

impl AdcDevice {
    pub const DEFAULT_PATH: &'static str = "/dev/adc_device";

    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path.as_ref())?;
        log::info!("ADC device opened: {}", path.as_ref().display());
        Ok(Self { file })
    }
}

impl SampleSource for AdcDevice {
    fn read_raw(&mut self) -> io::Result<i16> {
        let mut buf = [0u8; 2];
        self.file.read_exact(&mut buf)?;
        Ok(NativeEndian::read_i16(&buf))
    }
}
