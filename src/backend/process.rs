// Inference bridge over a child process's stdio
//
// Handshake: the child prints one JSON line `{"class_names": [...]}`.
// Per frame: one JSON header line, the raw pixel bytes, then one JSON reply
// line holding an array of detections.

use super::{BackendError, BackendFactory, BackendResult, DetectionBackend};
use crate::types::{Detection, Frame, OperatingMode, Region};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

#[derive(Debug, Deserialize)]
struct Handshake {
    class_names: Vec<String>,
}

#[derive(Debug, Serialize)]
struct FrameHeader {
    width: u32,
    height: u32,
    channels: u8,
    bytes: usize,
    confidence: f32,
    nms: f32,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
    confidence: f32,
    class_id: usize,
}

impl From<WireDetection> for Detection {
    fn from(d: WireDetection) -> Self {
        Detection {
            region: Region {
                x: d.x,
                y: d.y,
                w: d.w,
                h: d.h,
            },
            confidence: d.confidence,
            class_id: d.class_id,
        }
    }
}

pub struct ProcessBackend {
    mode: OperatingMode,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    class_names: Vec<String>,
}

impl ProcessBackend {
    /// Spawn `command --mode <mode>` and complete the handshake
    pub fn spawn(command: &str, mode: OperatingMode) -> BackendResult<Self> {
        let unavailable = |reason: String| BackendError::Unavailable { mode, reason };

        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| unavailable("empty backend command".to_string()))?;

        let mut child = Command::new(program)
            .args(parts)
            .args(["--mode", mode.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| unavailable(format!("failed to spawn {}: {}", program, e)))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(unavailable("child stdio not captured".to_string()));
        };
        let mut stdout = BufReader::new(stdout);

        let mut line = String::new();
        let handshake = match stdout.read_line(&mut line) {
            Ok(0) => Err("backend exited before handshake".to_string()),
            Ok(_) => serde_json::from_str::<Handshake>(line.trim())
                .map_err(|e| format!("bad handshake {:?}: {}", line.trim(), e)),
            Err(e) => Err(format!("handshake read failed: {}", e)),
        };

        let handshake = match handshake {
            Ok(h) => h,
            Err(reason) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(unavailable(reason));
            }
        };

        log::info!(
            "Inference backend for {} mode ready ({} classes)",
            mode,
            handshake.class_names.len()
        );

        Ok(Self {
            mode,
            child,
            stdin,
            stdout,
            class_names: handshake.class_names,
        })
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    fn exchange(
        &mut self,
        frame: &Frame,
        confidence: f32,
        nms: f32,
    ) -> BackendResult<Vec<Detection>> {
        let header = FrameHeader {
            width: frame.width,
            height: frame.height,
            channels: frame.channels,
            bytes: frame.data.len(),
            confidence,
            nms,
        };
        let mut header_line = serde_json::to_string(&header)
            .map_err(|e| BackendError::Protocol(e.to_string()))?;
        header_line.push('\n');

        self.stdin.write_all(header_line.as_bytes())?;
        self.stdin.write_all(&frame.data)?;
        self.stdin.flush()?;

        let mut reply = String::new();
        if self.stdout.read_line(&mut reply)? == 0 {
            return Err(BackendError::Inference("backend closed its output".to_string()));
        }

        let wire: Vec<WireDetection> = serde_json::from_str(reply.trim())
            .map_err(|e| BackendError::Protocol(format!("bad reply: {}", e)))?;
        Ok(wire.into_iter().map(Detection::from).collect())
    }
}

impl DetectionBackend for ProcessBackend {
    fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
        nms_threshold: f32,
    ) -> BackendResult<Vec<Detection>> {
        self.exchange(frame, confidence_threshold, nms_threshold)
            .map_err(|e| match e {
                BackendError::Io(io) => BackendError::Inference(io.to_string()),
                other => other,
            })
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }
}

impl Drop for ProcessBackend {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        log::debug!("Inference backend for {} mode released", self.mode);
    }
}

/// Spawns one bridge process per mode entry
pub struct ProcessBackendFactory {
    command: String,
}

impl ProcessBackendFactory {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl BackendFactory for ProcessBackendFactory {
    fn create(&mut self, mode: OperatingMode) -> BackendResult<Box<dyn DetectionBackend>> {
        Ok(Box::new(ProcessBackend::spawn(&self.command, mode)?))
    }
}
