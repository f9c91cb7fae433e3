// Frame sources feeding the orchestrator loop
//
// The capture pipeline itself lives outside this crate; frames arrive as raw
// BGR24 on a byte stream (typically stdin piped from a camera process).

use crate::types::Frame;
use std::io::{self, Read};

pub trait FrameSource: Send {
    /// Blocks until the next frame. `Ok(None)` means the stream ended.
    fn next_frame(&mut self) -> io::Result<Option<Frame>>;
}

/// Fixed-size BGR24 frames read back to back
pub struct RawVideoSource<R> {
    reader: R,
    width: u32,
    height: u32,
    frames_read: u64,
}

impl<R: Read + Send> RawVideoSource<R> {
    pub const CHANNELS: u8 = 3;

    pub fn new(reader: R, width: u32, height: u32) -> Self {
        Self {
            reader,
            width,
            height,
            frames_read: 0,
        }
    }

    pub fn frame_bytes(&self) -> usize {
        Frame::byte_len(self.width, self.height, Self::CHANNELS)
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

impl<R: Read + Send> FrameSource for RawVideoSource<R> {
    fn next_frame(&mut self) -> io::Result<Option<Frame>> {
        let mut data = vec![0u8; self.frame_bytes()];
        let mut filled = 0;

        while filled < data.len() {
            match self.reader.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if filled == 0 {
            log::info!("Video stream ended after {} frames", self.frames_read);
            return Ok(None);
        }
        if filled < data.len() {
            log::warn!(
                "Video stream ended mid-frame ({} of {} bytes), discarding",
                filled,
                data.len()
            );
            return Ok(None);
        }

        self.frames_read += 1;
        Ok(Some(Frame::new(self.width, self.height, Self::CHANNELS, data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out at most `chunk` bytes per read
    struct Trickle {
        inner: Cursor<Vec<u8>>,
        chunk: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.chunk);
            self.inner.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_reads_whole_frames_then_ends() {
        let bytes: Vec<u8> = (0..2 * 4 * 2 * 3).map(|i| i as u8).collect();
        let mut source = RawVideoSource::new(Cursor::new(bytes), 4, 2);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.data.len(), 24);
        assert_eq!(first.data[0], 0);
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.data[0], 24);
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.frames_read(), 2);
    }

    #[test]
    fn test_short_reads_are_accumulated() {
        let reader = Trickle {
            inner: Cursor::new(vec![7u8; 24]),
            chunk: 5,
        };
        let mut source = RawVideoSource::new(reader, 4, 2);
        let frame = source.next_frame().unwrap().unwrap();
        assert!(frame.data.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_partial_trailing_frame_is_dropped() {
        let mut source = RawVideoSource::new(Cursor::new(vec![0u8; 30]), 4, 2);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }
}
