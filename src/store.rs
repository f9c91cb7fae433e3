// Persistence collaborator and its JSON-lines implementation

use crate::types::{
    local_timestamp, BlurRecord, DetectionRecord, DetectionSummary, FallRecord, TrespassRecord,
};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Every save returns the stored record, or `None` when nothing was stored
pub trait LogStore: Send {
    fn save_detection_log(
        &mut self,
        camera_id: u32,
        summary: &DetectionSummary,
    ) -> Option<DetectionRecord>;

    fn save_blur_log(&mut self, camera_id: u32, count: usize) -> Option<BlurRecord>;

    fn save_fall_log(&mut self, camera_id: u32, count: usize) -> Option<FallRecord>;

    fn save_trespass_log(&mut self, camera_id: u32, count: usize) -> Option<TrespassRecord>;
}

pub struct JsonlLogStore {
    dir: PathBuf,
}

impl JsonlLogStore {
    pub const DETECTIONS_FILE: &'static str = "detections.jsonl";
    pub const BLUR_FILE: &'static str = "person_counts.jsonl";
    pub const FALL_FILE: &'static str = "fall_counts.jsonl";
    pub const TRESPASS_FILE: &'static str = "trespass_logs.jsonl";

    /// Creates `dir` if it does not exist
    pub fn open<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        log::info!("Log store at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append<T: Serialize>(&self, file: &str, record: &T) -> io::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file))?;
        out.write_all(line.as_bytes())
    }

    fn store<T: Serialize>(&self, file: &str, record: T) -> Option<T> {
        match self.append(file, &record) {
            Ok(()) => Some(record),
            Err(e) => {
                log::error!("Failed to append to {}: {}", file, e);
                None
            }
        }
    }
}

impl LogStore for JsonlLogStore {
    fn save_detection_log(
        &mut self,
        camera_id: u32,
        summary: &DetectionSummary,
    ) -> Option<DetectionRecord> {
        if summary.detection_count == 0 {
            return None;
        }

        let record = DetectionRecord {
            camera_id,
            timestamp: local_timestamp(),
            all_objects: summary.all_objects.clone(),
            person_count: summary.person_count,
            helmet_count: summary.helmet_count,
            safety_vest_count: summary.safety_vest_count,
            avg_confidence: summary.avg_confidence,
            image_path: None,
        };
        self.store(Self::DETECTIONS_FILE, record)
    }

    fn save_blur_log(&mut self, camera_id: u32, count: usize) -> Option<BlurRecord> {
        let record = BlurRecord {
            camera_id,
            timestamp: local_timestamp(),
            count,
        };
        self.store(Self::BLUR_FILE, record)
    }

    fn save_fall_log(&mut self, camera_id: u32, count: usize) -> Option<FallRecord> {
        let record = FallRecord {
            camera_id,
            timestamp: local_timestamp(),
            count,
        };
        self.store(Self::FALL_FILE, record)
    }

    fn save_trespass_log(&mut self, camera_id: u32, count: usize) -> Option<TrespassRecord> {
        let record = TrespassRecord {
            camera_id,
            timestamp: local_timestamp(),
            count,
        };
        self.store(Self::TRESPASS_FILE, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_detection_log_appends_json_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlLogStore::open(dir.path().join("data")).unwrap();

        let summary = DetectionSummary {
            detection_count: 3,
            all_objects: "helmet, person, safety-vest".to_string(),
            person_count: 1,
            helmet_count: 1,
            safety_vest_count: 1,
            avg_confidence: 0.75,
        };
        let record = store.save_detection_log(2, &summary).unwrap();
        assert_eq!(record.camera_id, 2);
        assert!(record.image_path.is_none());
        store.save_detection_log(2, &summary).unwrap();

        let lines = read_lines(&store.dir().join(JsonlLogStore::DETECTIONS_FILE));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["person_count"], 1);
        assert_eq!(lines[0]["all_objects"], "helmet, person, safety-vest");
        assert_eq!(lines[0]["timestamp"], record.timestamp.as_str());
    }

    #[test]
    fn test_empty_detection_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlLogStore::open(dir.path()).unwrap();

        assert!(store
            .save_detection_log(1, &DetectionSummary::default())
            .is_none());
        assert!(!dir.path().join(JsonlLogStore::DETECTIONS_FILE).exists());
    }

    #[test]
    fn test_count_logs_go_to_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlLogStore::open(dir.path()).unwrap();

        assert_eq!(store.save_blur_log(1, 4).unwrap().count, 4);
        assert_eq!(store.save_fall_log(1, 0).unwrap().count, 0);
        assert_eq!(store.save_trespass_log(1, 2).unwrap().count, 2);

        for file in [
            JsonlLogStore::BLUR_FILE,
            JsonlLogStore::FALL_FILE,
            JsonlLogStore::TRESPASS_FILE,
        ] {
            assert_eq!(read_lines(&dir.path().join(file)).len(), 1);
        }
    }

    #[test]
    fn test_write_failure_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlLogStore::open(dir.path()).unwrap();
        // A directory where the log file should be makes the open fail
        fs::create_dir(dir.path().join(JsonlLogStore::FALL_FILE)).unwrap();

        assert!(store.save_fall_log(1, 1).is_none());
    }
}
