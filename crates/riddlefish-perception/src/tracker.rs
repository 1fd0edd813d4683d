//! [`PresenceTracker`] – the presence worker.
//!
//! Runs on a dedicated OS thread.  Every `process_interval`-th frame is
//! handed to the face analyzer; the first confident face is matched against
//! the [`IdentityRegistry`] and reported as a [`PresenceEvent`].  Unknown
//! faces are enrolled only when the attribute classifier is confident
//! enough, and only after the new identity has been persisted.
//!
//! The camera is wrapped in a guard that releases it when the tracker is
//! dropped, whichever way the worker exits.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use riddlefish_hal::camera::{Camera, CameraFrame};
use riddlefish_memory::StoreError;
use riddlefish_memory::identity::IdentityStore;
use riddlefish_types::{Attributes, Identity, PresenceEvent};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::analyzer::{AttributeClassifier, FaceAnalyzer, FaceDetection};
use crate::debounce::DepartureDebounce;
use crate::registry::IdentityRegistry;

/// Tuning of the presence worker.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Only every Nth captured frame is analysed.
    pub process_interval: u32,
    /// Faces at or below this detector confidence are ignored.
    pub detection_threshold: f32,
    /// Maximum Euclidean distance for two encodings to be the same person.
    pub similarity_threshold: f32,
    /// The attribute classifier must be strictly more confident than this
    /// before a new identity is enrolled.
    pub attribute_confidence_gate: f32,
    /// Nobody seen for longer than this means the visitor left.
    pub absence_timeout: Duration,
    /// Pause after each analysed frame.
    pub cycle_sleep: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            process_interval: 5,
            detection_threshold: 0.6,
            similarity_threshold: 0.6,
            attribute_confidence_gate: 0.6,
            absence_timeout: Duration::from_secs(3),
            cycle_sleep: Duration::from_millis(500),
        }
    }
}

/// Releases the wrapped camera on drop.
struct CameraGuard<C: Camera>(C);

impl<C: Camera> Drop for CameraGuard<C> {
    fn drop(&mut self) {
        self.0.release();
        info!(camera = self.0.id(), "camera released");
    }
}

pub struct PresenceTracker<C, F, A, S>
where
    C: Camera,
    F: FaceAnalyzer,
    A: AttributeClassifier,
    S: IdentityStore,
{
    camera: CameraGuard<C>,
    analyzer: F,
    classifier: A,
    store: S,
    registry: IdentityRegistry,
    debounce: DepartureDebounce,
    config: PresenceConfig,
    events: UnboundedSender<PresenceEvent>,
    shutdown: Arc<AtomicBool>,
    frame_count: u64,
}

impl<C, F, A, S> PresenceTracker<C, F, A, S>
where
    C: Camera,
    F: FaceAnalyzer,
    A: AttributeClassifier,
    S: IdentityStore,
{
    /// Build a tracker, loading every known identity from `store`.
    pub fn new(
        camera: C,
        analyzer: F,
        classifier: A,
        store: S,
        config: PresenceConfig,
        events: UnboundedSender<PresenceEvent>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, StoreError> {
        let known = store.load_all()?;
        let registry = IdentityRegistry::with_identities(config.similarity_threshold, known);
        info!(known = registry.len(), "presence tracker ready");
        Ok(Self {
            camera: CameraGuard(camera),
            analyzer,
            classifier,
            store,
            registry,
            debounce: DepartureDebounce::new(config.absence_timeout, Instant::now()),
            config,
            events,
            shutdown,
            frame_count: 0,
        })
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// Analyse one sampled frame captured at `now`.
    pub fn observe(&mut self, frame: &CameraFrame, now: Instant) -> Option<PresenceEvent> {
        let detections = match self.analyzer.detect(frame) {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "face analysis failed");
                return None;
            }
        };

        let threshold = self.config.detection_threshold;
        let mut confident = detections
            .into_iter()
            .filter(|d| d.confidence > threshold)
            .peekable();
        if confident.peek().is_none() {
            if self.debounce.unseen(now) {
                info!("no person for longer than the absence timeout");
                return Some(PresenceEvent::NoPersonSustained);
            }
            return None;
        }
        self.debounce.seen(now);

        let face = confident.find(|d| !d.encoding.is_empty())?;
        if let Some(known) = self.registry.find_match(&face.encoding) {
            debug!(id = %known.id, "known person detected");
            return Some(PresenceEvent::PersonDetected {
                id: known.id,
                is_new: false,
                attributes: known.attributes.clone(),
            });
        }
        self.enroll(frame, face)
    }

    fn enroll(&mut self, frame: &CameraFrame, face: FaceDetection) -> Option<PresenceEvent> {
        let label = match self.classifier.classify(frame, &face.region) {
            Ok(label) => label,
            Err(e) => {
                warn!(error = %e, "attribute classification failed");
                return None;
            }
        };
        if label.confidence <= self.config.attribute_confidence_gate {
            debug!(confidence = label.confidence, "not confident enough to enroll yet");
            return None;
        }

        let identity = Identity::new(
            Attributes {
                age_bucket: label.label,
                confidence: face.confidence,
            },
            face.encoding,
        );
        if let Err(e) = self.store.put(&identity) {
            warn!(error = %e, "could not persist new identity, will retry");
            return None;
        }
        info!(id = %identity.id, age = %identity.attributes.age_bucket, "new person enrolled");
        let event = PresenceEvent::PersonDetected {
            id: identity.id,
            is_new: true,
            attributes: identity.attributes.clone(),
        };
        self.registry.insert(identity);
        Some(event)
    }

    /// Capture, sample and analyse frames until shutdown or until the event
    /// receiver is gone.
    pub fn run(mut self) {
        let interval = u64::from(self.config.process_interval.max(1));
        while !self.shutdown.load(Ordering::SeqCst) {
            let frame = match self.camera.0.capture() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "camera capture failed");
                    thread::sleep(self.config.cycle_sleep);
                    continue;
                }
            };
            self.frame_count += 1;
            if self.frame_count % interval != 0 {
                continue;
            }

            if let Some(event) = self.observe(&frame, Instant::now()) {
                if self.events.send(event).is_err() {
                    info!("presence receiver gone, tracker stopping");
                    break;
                }
            }
            thread::sleep(self.config.cycle_sleep);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AttributeLabel, FaceRegion};
    use riddlefish_hal::sim::SimCamera;
    use riddlefish_memory::identity::MemoryIdentityStore;
    use riddlefish_types::FishError;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    const REGION: FaceRegion = FaceRegion {
        x: 0,
        y: 0,
        width: 2,
        height: 2,
    };

    fn face(confidence: f32, encoding: Vec<f32>) -> FaceDetection {
        FaceDetection {
            region: REGION,
            confidence,
            encoding,
        }
    }

    /// Returns queued detections, then nothing.
    struct QueuedAnalyzer(VecDeque<Vec<FaceDetection>>);

    impl FaceAnalyzer for QueuedAnalyzer {
        fn detect(&mut self, _: &CameraFrame) -> Result<Vec<FaceDetection>, FishError> {
            Ok(self.0.pop_front().unwrap_or_default())
        }
    }

    struct FixedClassifier(f32);

    impl AttributeClassifier for FixedClassifier {
        fn classify(&mut self, _: &CameraFrame, _: &FaceRegion) -> Result<AttributeLabel, FishError> {
            Ok(AttributeLabel {
                label: "(8-12)".into(),
                confidence: self.0,
            })
        }
    }

    /// Identity store shared with the test, optionally failing writes.
    #[derive(Clone, Default)]
    struct SharedStore {
        inner: Arc<Mutex<MemoryIdentityStore>>,
        failing_puts: Arc<Mutex<u32>>,
    }

    impl SharedStore {
        fn ids(&self) -> Vec<uuid::Uuid> {
            let store = self.inner.lock().unwrap();
            store.load_all().unwrap().into_iter().map(|i| i.id).collect()
        }
    }

    impl IdentityStore for SharedStore {
        fn load_all(&self) -> Result<Vec<Identity>, StoreError> {
            self.inner.lock().unwrap().load_all()
        }

        fn put(&mut self, identity: &Identity) -> Result<(), StoreError> {
            let mut failing = self.failing_puts.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(StoreError::Corrupt {
                    key: identity.id.to_string(),
                    details: "disk full".into(),
                });
            }
            self.inner.lock().unwrap().put(identity)
        }
    }

    type Tracker = PresenceTracker<SimCamera, QueuedAnalyzer, FixedClassifier, SharedStore>;

    fn tracker(
        script: Vec<Vec<FaceDetection>>,
        attribute_confidence: f32,
        store: SharedStore,
    ) -> (Tracker, UnboundedReceiver<PresenceEvent>) {
        let (tx, rx) = unbounded_channel();
        let config = PresenceConfig {
            process_interval: 1,
            cycle_sleep: Duration::from_millis(1),
            ..PresenceConfig::default()
        };
        let tracker = PresenceTracker::new(
            SimCamera::new("test"),
            QueuedAnalyzer(script.into()),
            FixedClassifier(attribute_confidence),
            store,
            config,
            tx,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
        (tracker, rx)
    }

    fn frame() -> CameraFrame {
        CameraFrame {
            sequence: 0,
            width: 2,
            height: 2,
            data: vec![0; 12],
        }
    }

    #[test]
    fn new_person_is_persisted_before_emission() {
        let store = SharedStore::default();
        let (mut t, _rx) = tracker(vec![vec![face(0.9, vec![0.0, 0.0])]], 0.8, store.clone());
        let ev = t.observe(&frame(), Instant::now()).unwrap();
        match ev {
            PresenceEvent::PersonDetected {
                id,
                is_new,
                attributes,
            } => {
                assert!(is_new);
                assert_eq!(store.ids(), vec![id]);
                assert_eq!(attributes.age_bucket, "(8-12)");
                // Face detection confidence, not the classifier's.
                assert_eq!(attributes.confidence, 0.9);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn redetection_reuses_identity_without_persisting() {
        let store = SharedStore::default();
        let (mut t, _rx) = tracker(
            vec![
                vec![face(0.9, vec![0.0, 0.0])],
                vec![face(0.8, vec![0.25, 0.0])],
            ],
            0.8,
            store.clone(),
        );
        let now = Instant::now();
        let first = t.observe(&frame(), now).unwrap();
        let second = t.observe(&frame(), now).unwrap();
        let (PresenceEvent::PersonDetected { id: a, .. }, PresenceEvent::PersonDetected { id: b, is_new, .. }) =
            (first, second)
        else {
            panic!("expected two detections");
        };
        assert_eq!(a, b);
        assert!(!is_new);
        assert_eq!(store.ids().len(), 1);
    }

    #[test]
    fn known_identities_are_loaded_from_store() {
        let mut store = SharedStore::default();
        let known = Identity::new(
            Attributes {
                age_bucket: "(60-100)".into(),
                confidence: 0.75,
            },
            vec![1.0, 1.0],
        );
        store.put(&known).unwrap();
        let (mut t, _rx) = tracker(vec![vec![face(0.9, vec![1.0, 1.0])]], 0.8, store);
        assert_eq!(t.registry().len(), 1);
        assert_eq!(
            t.observe(&frame(), Instant::now()),
            Some(PresenceEvent::PersonDetected {
                id: known.id,
                is_new: false,
                attributes: known.attributes,
            })
        );
    }

    #[test]
    fn low_attribute_confidence_defers_enrollment() {
        let store = SharedStore::default();
        let (mut t, _rx) = tracker(vec![vec![face(0.9, vec![0.0])]], 0.6, store.clone());
        assert_eq!(t.observe(&frame(), Instant::now()), None);
        assert!(store.ids().is_empty());
        assert!(t.registry().is_empty());
    }

    #[test]
    fn persist_failure_emits_nothing_and_retries_later() {
        let store = SharedStore::default();
        *store.failing_puts.lock().unwrap() = 1;
        let (mut t, _rx) = tracker(
            vec![vec![face(0.9, vec![0.0])], vec![face(0.9, vec![0.0])]],
            0.8,
            store.clone(),
        );
        let now = Instant::now();
        assert_eq!(t.observe(&frame(), now), None);
        assert!(t.registry().is_empty());
        assert!(matches!(
            t.observe(&frame(), now),
            Some(PresenceEvent::PersonDetected { is_new: true, .. })
        ));
        assert_eq!(store.ids().len(), 1);
    }

    #[test]
    fn weak_and_unencoded_faces() {
        let store = SharedStore::default();
        let (mut t, _rx) = tracker(
            vec![
                vec![face(0.6, vec![0.0])],
                vec![face(0.9, vec![]), face(0.95, vec![2.0])],
            ],
            0.8,
            store.clone(),
        );
        let now = Instant::now();
        // At the threshold counts as nobody.
        assert_eq!(t.observe(&frame(), now), None);
        // The first encodable confident face is used.
        assert!(t.observe(&frame(), now).is_some());
        let stored = store.inner.lock().unwrap().load_all().unwrap();
        assert_eq!(stored[0].encoding, vec![2.0]);
    }

    #[test]
    fn single_absence_event_per_departure() {
        let store = SharedStore::default();
        let (mut t, _rx) = tracker(vec![vec![face(0.9, vec![0.0])]], 0.8, store);
        let t0 = Instant::now();
        assert!(t.observe(&frame(), t0).is_some());
        assert_eq!(t.observe(&frame(), t0 + Duration::from_secs(2)), None);
        assert_eq!(
            t.observe(&frame(), t0 + Duration::from_millis(3001)),
            Some(PresenceEvent::NoPersonSustained)
        );
        assert_eq!(t.observe(&frame(), t0 + Duration::from_secs(10)), None);
        assert_eq!(t.observe(&frame(), t0 + Duration::from_secs(20)), None);
    }

    #[test]
    fn run_emits_in_order_and_releases_camera() {
        let (tx, mut rx) = unbounded_channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let camera = SimCamera::new("test").with_failures(2);
        let released = camera.released_flag();
        let config = PresenceConfig {
            process_interval: 2,
            cycle_sleep: Duration::from_millis(1),
            absence_timeout: Duration::from_millis(200),
            ..PresenceConfig::default()
        };
        let t = PresenceTracker::new(
            camera,
            QueuedAnalyzer(vec![vec![face(0.9, vec![0.0])], vec![face(0.9, vec![0.1])]].into()),
            FixedClassifier(0.8),
            SharedStore::default(),
            config,
            tx,
            Arc::clone(&shutdown),
        )
        .unwrap();
        let worker = thread::spawn(move || t.run());

        let first = rx.blocking_recv().unwrap();
        let second = rx.blocking_recv().unwrap();
        let third = rx.blocking_recv().unwrap();
        shutdown.store(true, Ordering::SeqCst);
        worker.join().unwrap();

        assert!(matches!(first, PresenceEvent::PersonDetected { is_new: true, .. }));
        assert!(matches!(second, PresenceEvent::PersonDetected { is_new: false, .. }));
        assert_eq!(third, PresenceEvent::NoPersonSustained);
        assert!(released.load(Ordering::SeqCst));
    }
}
