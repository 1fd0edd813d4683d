//! Generic `Camera` trait and supporting types for the presence camera.

use riddlefish_types::FishError;

/// A raw image frame returned by a camera driver.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    /// Monotonic capture counter, starting at 0.
    pub sequence: u64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Raw pixel data (RGB24).
    pub data: Vec<u8>,
}

/// A video capture device.
///
/// The presence tracker owns exactly one camera for its whole lifetime and
/// calls [`release`](Camera::release) once when it stops.
pub trait Camera: Send {
    /// Stable identifier for this camera, e.g. `"/dev/video0"`.
    fn id(&self) -> &str;

    /// Capture and return the next available frame.
    ///
    /// # Errors
    ///
    /// Returns [`FishError::HardwareFault`] if the frame cannot be captured
    /// (e.g. the device is disconnected or the buffer is unavailable).
    fn capture(&mut self) -> Result<CameraFrame, FishError>;

    /// Release the device.  Further captures may fail.
    fn release(&mut self) {}
}

impl<C: Camera + ?Sized> Camera for Box<C> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn capture(&mut self) -> Result<CameraFrame, FishError> {
        (**self).capture()
    }

    fn release(&mut self) {
        (**self).release()
    }
}
