//! Seams for the face detection and attribute classification models.

use riddlefish_hal::camera::CameraFrame;
use riddlefish_types::FishError;

/// Pixel rectangle of a detected face inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One face found in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceDetection {
    pub region: FaceRegion,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
    /// Feature vector of the face, empty when the region could not be
    /// encoded.
    pub encoding: Vec<f32>,
}

/// Top label of the attribute classifier for one face.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeLabel {
    /// Age bucket, e.g. `"(8-12)"`.
    pub label: String,
    pub confidence: f32,
}

/// Face detector plus encoder.
pub trait FaceAnalyzer: Send {
    /// Every face found in `frame`, in detector order.
    fn detect(&mut self, frame: &CameraFrame) -> Result<Vec<FaceDetection>, FishError>;
}

/// Secondary attribute (age) classifier.
pub trait AttributeClassifier: Send {
    fn classify(&mut self, frame: &CameraFrame, region: &FaceRegion) -> Result<AttributeLabel, FishError>;
}

impl<F: FaceAnalyzer + ?Sized> FaceAnalyzer for Box<F> {
    fn detect(&mut self, frame: &CameraFrame) -> Result<Vec<FaceDetection>, FishError> {
        (**self).detect(frame)
    }
}

impl<A: AttributeClassifier + ?Sized> AttributeClassifier for Box<A> {
    fn classify(&mut self, frame: &CameraFrame, region: &FaceRegion) -> Result<AttributeLabel, FishError> {
        (**self).classify(frame, region)
    }
}
