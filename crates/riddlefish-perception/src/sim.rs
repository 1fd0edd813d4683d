//! Scripted face models for headless runs.
//!
//! [`ScriptedFaceAnalyzer`] pretends a rotating cast of visitors walks up to
//! the fish: each visitor stands in front of the camera for `present`, then
//! nobody is there for `absent`, then the next visitor arrives.  Visitor `k`
//! always has the same encoding, so the second lap exercises recognition of
//! returning visitors.

use std::time::{Duration, Instant};

use riddlefish_hal::camera::CameraFrame;
use riddlefish_types::FishError;

use crate::analyzer::{AttributeClassifier, AttributeLabel, FaceAnalyzer, FaceDetection, FaceRegion};

/// Length of the encodings produced by the scripted analyzer.
pub const SIM_ENCODING_LEN: usize = 8;

pub struct ScriptedFaceAnalyzer {
    started: Instant,
    present: Duration,
    absent: Duration,
    visitors: usize,
}

impl ScriptedFaceAnalyzer {
    pub fn new(present: Duration, absent: Duration, visitors: usize) -> Self {
        Self::starting_at(Instant::now(), present, absent, visitors)
    }

    pub fn starting_at(started: Instant, present: Duration, absent: Duration, visitors: usize) -> Self {
        Self {
            started,
            present,
            absent,
            visitors: visitors.max(1),
        }
    }

    /// Index of the visitor in view at `now`, if any.
    pub fn visitor_at(&self, now: Instant) -> Option<usize> {
        let period = (self.present + self.absent).as_millis().max(1);
        let elapsed = now.saturating_duration_since(self.started).as_millis();
        let lap = (elapsed / period) as usize;
        if elapsed % period < self.present.as_millis() {
            Some(lap % self.visitors)
        } else {
            None
        }
    }

    /// Encoding of visitor `k`: a unit vector along axis `k`, so any two
    /// visitors are `sqrt(2)` apart.
    pub fn encoding_of(k: usize) -> Vec<f32> {
        let mut encoding = vec![0.0; SIM_ENCODING_LEN.max(k + 1)];
        encoding[k] = 1.0;
        encoding
    }
}

impl FaceAnalyzer for ScriptedFaceAnalyzer {
    fn detect(&mut self, frame: &CameraFrame) -> Result<Vec<FaceDetection>, FishError> {
        Ok(self
            .visitor_at(Instant::now())
            .map(|k| FaceDetection {
                region: FaceRegion {
                    x: 0,
                    y: 0,
                    width: frame.width,
                    height: frame.height,
                },
                confidence: 0.9,
                encoding: Self::encoding_of(k),
            })
            .into_iter()
            .collect())
    }
}

/// Classifier that always answers with the same label.
pub struct FixedAttributeClassifier {
    label: String,
    confidence: f32,
}

impl FixedAttributeClassifier {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

impl AttributeClassifier for FixedAttributeClassifier {
    fn classify(&mut self, _frame: &CameraFrame, _region: &FaceRegion) -> Result<AttributeLabel, FishError> {
        Ok(AttributeLabel {
            label: self.label.clone(),
            confidence: self.confidence,
        })
    }
}
