// LED PWM fade device
//
// The kernel driver exposes a misc character device that accepts a single
// fade ioctl; the fade itself runs in the driver's workqueue, so the call
// returns immediately.

use crate::debounce::Actuator;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Mirrors `struct ledpwm_fade_req` in the driver
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct FadeRequest {
    period_ns: u64,
    duration_ms: u64,
    steps: u8,
    polarity: u8,
    reserved: [u8; 6],
}

const LEDPWM_IOC_MAGIC: u8 = b'L';
const LEDPWM_IOC_FADE_NR: u8 = 0x02;

/// `_IOW(type, nr, size)` from the Linux asm-generic ioctl encoding
const fn iow(ty: u8, nr: u8, size: usize) -> u32 {
    const IOC_WRITE: u32 = 1;
    (IOC_WRITE << 30) | ((size as u32) << 16) | ((ty as u32) << 8) | nr as u32
}

pub const LEDPWM_IOC_FADE: u32 = iow(
    LEDPWM_IOC_MAGIC,
    LEDPWM_IOC_FADE_NR,
    std::mem::size_of::<FadeRequest>(),
);

pub struct LedPwmDevice {
    file: File,
}

impl LedPwmDevice {
    pub const DEFAULT_PATH: &'static str = "/dev/ledpwm0";

    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        log::info!("LED PWM device opened: {}", path.as_ref().display());
        Ok(Self { file })
    }
}

impl Actuator for LedPwmDevice {
    fn fade(
        &mut self,
        period_ns: u64,
        duration_ms: u64,
        steps: u8,
        polarity: u8,
    ) -> io::Result<()> {
        let req = FadeRequest {
            period_ns,
            duration_ms,
            steps,
            polarity,
            reserved: [0; 6],
        };

        // SAFETY: the fd is owned by `self.file` and stays open for the call;
        // `req` is a #[repr(C)] value matching the driver's request layout and
        // outlives the ioctl, which only reads from it.
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                LEDPWM_IOC_FADE as _,
                &req as *const FadeRequest,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_layout_matches_driver() {
        assert_eq!(std::mem::size_of::<FadeRequest>(), 24);
    }

    #[test]
    fn test_fade_ioctl_number() {
        // _IOW('L', 0x02, 24 bytes)
        assert_eq!(LEDPWM_IOC_FADE, 0x4018_4C02);
    }

    #[test]
    fn test_open_missing_device_fails() {
        assert!(LedPwmDevice::open("/nonexistent/ledpwm0").is_err());
    }
}
