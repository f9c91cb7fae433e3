// Callback registry for orchestrator events
//
// Handlers run synchronously on the orchestrator thread. They must return
// quickly and must not call back into the orchestrator.

use crate::types::{BlurRecord, DetectionRecord, FallRecord, SystemInfo, TrespassRecord};

type Handler<T> = Box<dyn Fn(&T) + Send>;

#[derive(Default)]
pub struct Observers {
    anomaly_status: Vec<Handler<bool>>,
    detection_records: Vec<Handler<DetectionRecord>>,
    blur_records: Vec<Handler<BlurRecord>>,
    fall_records: Vec<Handler<FallRecord>>,
    trespass_records: Vec<Handler<TrespassRecord>>,
    system_info: Vec<Handler<SystemInfo>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_anomaly_status_changed(&mut self, f: impl Fn(&bool) + Send + 'static) {
        self.anomaly_status.push(Box::new(f));
    }

    pub fn on_detection_record(&mut self, f: impl Fn(&DetectionRecord) + Send + 'static) {
        self.detection_records.push(Box::new(f));
    }

    pub fn on_blur_record(&mut self, f: impl Fn(&BlurRecord) + Send + 'static) {
        self.blur_records.push(Box::new(f));
    }

    pub fn on_fall_record(&mut self, f: impl Fn(&FallRecord) + Send + 'static) {
        self.fall_records.push(Box::new(f));
    }

    pub fn on_trespass_record(&mut self, f: impl Fn(&TrespassRecord) + Send + 'static) {
        self.trespass_records.push(Box::new(f));
    }

    pub fn on_system_info(&mut self, f: impl Fn(&SystemInfo) + Send + 'static) {
        self.system_info.push(Box::new(f));
    }

    pub(crate) fn anomaly_status_changed(&self, active: bool) {
        emit(&self.anomaly_status, &active);
    }

    pub(crate) fn detection_record(&self, record: &DetectionRecord) {
        emit(&self.detection_records, record);
    }

    pub(crate) fn blur_record(&self, record: &BlurRecord) {
        emit(&self.blur_records, record);
    }

    pub(crate) fn fall_record(&self, record: &FallRecord) {
        emit(&self.fall_records, record);
    }

    pub(crate) fn trespass_record(&self, record: &TrespassRecord) {
        emit(&self.trespass_records, record);
    }

    pub(crate) fn system_info(&self, info: &SystemInfo) {
        emit(&self.system_info, info);
    }
}

fn emit<T>(handlers: &[Handler<T>], value: &T) {
    for handler in handlers {
        handler(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_every_handler_sees_the_event() {
        let mut observers = Observers::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let hits = Arc::clone(&hits);
            observers.on_anomaly_status_changed(move |active| {
                assert!(*active);
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        observers.anomaly_status_changed(true);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_events_are_routed_by_kind() {
        let mut observers = Observers::new();
        let falls = Arc::new(AtomicUsize::new(0));
        {
            let falls = Arc::clone(&falls);
            observers.on_fall_record(move |r| {
                falls.fetch_add(r.count, Ordering::SeqCst);
            });
        }

        observers.blur_record(&BlurRecord {
            camera_id: 1,
            timestamp: String::new(),
            count: 5,
        });
        observers.fall_record(&FallRecord {
            camera_id: 1,
            timestamp: String::new(),
            count: 2,
        });
        assert_eq!(falls.load(Ordering::SeqCst), 2);
    }
}
