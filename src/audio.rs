// Single-flight audio alert playback
//
// At most one playback thread exists; the finished one is joined before the
// next is spawned.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Blocking playback of one clip
pub trait Player: Send + Sync {
    fn play(&self, clip: &Path) -> io::Result<()>;
}

/// Shells out to ALSA's `aplay`
pub struct AplayPlayer {
    device: String,
}

impl AplayPlayer {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl Player for AplayPlayer {
    fn play(&self, clip: &Path) -> io::Result<()> {
        let output = Command::new("aplay")
            .args(["-q", "-D", &self.device])
            .arg(clip)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("aplay exited with {}: {}", output.status, stderr.trim()),
            ));
        }
        Ok(())
    }
}

pub struct AudioNotifier {
    player: Arc<dyn Player>,
    clip: PathBuf,
    playing: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AudioNotifier {
    pub fn new(player: Arc<dyn Player>, clip: impl Into<PathBuf>) -> Self {
        Self {
            player,
            clip: clip.into(),
            playing: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn clip(&self) -> &Path {
        &self.clip
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Start playback unless a clip is already playing. Returns whether a new
    /// playback thread was started.
    pub fn play(&mut self) -> bool {
        if self.is_playing() {
            return false;
        }

        if let Some(previous) = self.handle.take() {
            if previous.join().is_err() {
                log::warn!("Audio playback thread panicked");
            }
        }

        self.playing.store(true, Ordering::Release);
        let player = Arc::clone(&self.player);
        let playing = Arc::clone(&self.playing);
        let clip = self.clip.clone();

        let spawned = thread::Builder::new()
            .name("audio-alert".to_string())
            .spawn(move || {
                if let Err(e) = player.play(&clip) {
                    log::warn!("Audio alert {} failed: {}", clip.display(), e);
                }
                playing.store(false, Ordering::Release);
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                true
            }
            Err(e) => {
                log::warn!("Failed to spawn audio thread: {}", e);
                self.playing.store(false, Ordering::Release);
                false
            }
        }
    }

    /// Block until the current clip (if any) finishes
    pub fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Audio playback thread panicked");
            }
        }
    }
}

impl Drop for AudioNotifier {
    fn drop(&mut self) {
        self.wait();
    }
}
