// Per-mode safety classification of a frame's detections

use crate::types::{Detection, DetectionSummary, OperatingMode};
use std::collections::BTreeSet;

pub const PERSON: &str = "person";
pub const HELMET: &str = "helmet";
pub const SAFETY_VEST: &str = "safety-vest";
pub const FALL: &str = "fall";

#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub unsafe_condition: bool,
    /// Persons for Detect/Blur/Trespass, falls for Fall
    pub count: usize,
    /// Present in Detect mode only
    pub summary: Option<DetectionSummary>,
}

impl Assessment {
    pub fn safe() -> Self {
        Self {
            unsafe_condition: false,
            count: 0,
            summary: None,
        }
    }
}

fn name_of<'a>(class_names: &'a [String], detection: &Detection) -> Option<&'a str> {
    class_names.get(detection.class_id).map(String::as_str)
}

/// Detections whose class id is out of range are ignored
pub fn count_class(detections: &[Detection], class_names: &[String], class: &str) -> usize {
    detections
        .iter()
        .filter(|d| name_of(class_names, d) == Some(class))
        .count()
}

pub fn summarize_ppe(detections: &[Detection], class_names: &[String]) -> DetectionSummary {
    let mut summary = DetectionSummary {
        detection_count: detections.len(),
        ..Default::default()
    };
    let mut seen = BTreeSet::new();
    let mut total_confidence = 0.0f32;

    for detection in detections {
        total_confidence += detection.confidence;
        let Some(name) = name_of(class_names, detection) else {
            continue;
        };
        match name {
            PERSON => summary.person_count += 1,
            HELMET => summary.helmet_count += 1,
            SAFETY_VEST => summary.safety_vest_count += 1,
            _ => {}
        }
        seen.insert(name);
    }

    if !detections.is_empty() {
        summary.avg_confidence = total_confidence / detections.len() as f32;
    }
    summary.all_objects = seen.into_iter().collect::<Vec<_>>().join(", ");
    summary
}

pub fn assess(mode: OperatingMode, detections: &[Detection], class_names: &[String]) -> Assessment {
    match mode {
        OperatingMode::Detect => {
            let summary = summarize_ppe(detections, class_names);
            let persons = summary.person_count;
            Assessment {
                unsafe_condition: summary.helmet_count < persons
                    || summary.safety_vest_count < persons,
                count: persons,
                summary: Some(summary),
            }
        }
        OperatingMode::Blur => Assessment {
            unsafe_condition: false,
            count: count_class(detections, class_names, PERSON),
            summary: None,
        },
        OperatingMode::Fall => {
            let falls = count_class(detections, class_names, FALL);
            Assessment {
                unsafe_condition: falls > 0,
                count: falls,
                summary: None,
            }
        }
        OperatingMode::Trespass => {
            let persons = count_class(detections, class_names, PERSON);
            Assessment {
                unsafe_condition: persons > 0,
                count: persons,
                summary: None,
            }
        }
        OperatingMode::Raw | OperatingMode::Stop => Assessment::safe(),
    }
}
