//! Shared kiosk state: status line, overlay and the check-in slot.
//!
//! Written by the detection loop and the check-in handler, read by the
//! D-Bus interface. The lock is never held across an `.await`.

use crate::engine::{CameraInfo, EngineError};
use facecheck_core::{BestMatch, BoundingBox, FaceDescription, FaceMatcher};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const STATUS_NO_FACE: &str = "No face detected. Please face the camera.";
pub const STATUS_UNKNOWN: &str = "Face detected, but user unknown.";
pub const STATUS_NOT_ENROLLED: &str = "Face detected, but no users are enrolled.";
pub const STATUS_NO_DESCRIPTORS: &str =
    "WARNING: No face descriptors loaded. Recognition will not work. Check the images directory.";

/// Box drawn over the live frame, captioned with the match result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub caption: String,
}

impl Overlay {
    fn new(face: &BoundingBox, caption: String) -> Self {
        Self {
            x: face.x,
            y: face.y,
            width: face.width,
            height: face.height,
            caption,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CameraState {
    Pending,
    Streaming(CameraInfo),
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct KioskState {
    pub status: String,
    pub overlay: Option<Overlay>,
    /// Label attached to the check-in action; `Some` means check-in is enabled.
    pub checkin_label: Option<String>,
    pub camera: CameraState,
    pub enrolled_labels: Vec<String>,
    /// Matcher distance threshold, once the reference descriptors are built.
    pub distance_threshold: Option<f32>,
}

/// Result of applying one detection tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    NoFace,
    Unknown(BestMatch),
    Recognized(BestMatch),
}

pub struct Kiosk {
    state: Mutex<KioskState>,
}

impl Default for Kiosk {
    fn default() -> Self {
        Self::new()
    }
}

impl Kiosk {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(KioskState {
                status: "Loading models...".to_string(),
                overlay: None,
                checkin_label: None,
                camera: CameraState::Pending,
                enrolled_labels: Vec::new(),
                distance_threshold: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, KioskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> KioskState {
        self.lock().clone()
    }

    pub fn status(&self) -> String {
        self.lock().status.clone()
    }

    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        tracing::info!(status = %status, "status");
        self.lock().status = status;
    }

    pub fn checkin_label(&self) -> Option<String> {
        self.lock().checkin_label.clone()
    }

    pub fn checkin_enabled(&self) -> bool {
        self.lock().checkin_label.is_some()
    }

    pub fn enrolled_labels(&self) -> Vec<String> {
        self.lock().enrolled_labels.clone()
    }

    /// Record the matcher's labels and announce whether recognition is possible.
    pub fn set_enrolled(&self, matcher: &FaceMatcher) {
        let labels: Vec<String> = matcher.labels().map(String::from).collect();
        if labels.is_empty() {
            tracing::warn!("matcher has no labels; check-in stays disabled");
            self.set_status(STATUS_NO_DESCRIPTORS);
        } else {
            self.set_status(format!(
                "Successfully loaded {} user labels. Starting video...",
                labels.len()
            ));
        }
        let mut state = self.lock();
        state.enrolled_labels = labels;
        state.distance_threshold = Some(matcher.distance_threshold());
    }

    pub fn camera_started(&self, info: CameraInfo) {
        let mut state = self.lock();
        state.camera = CameraState::Streaming(info);
        state.status = "Video started. Detecting faces...".to_string();
    }

    /// The live pipeline is over: report and keep check-in disabled.
    pub fn camera_failed(&self, error: &EngineError) {
        tracing::error!(error = %error, "cannot access camera");
        let mut state = self.lock();
        state.camera = CameraState::Failed {
            error: error.to_string(),
        };
        state.status = format!("Error accessing camera: {error}.");
        state.overlay = None;
        state.checkin_label = None;
    }

    /// Update status, overlay and check-in slot from one detection tick.
    pub fn apply_detection(
        &self,
        matcher: &FaceMatcher,
        detection: Option<FaceDescription>,
    ) -> TickOutcome {
        let Some(found) = detection else {
            let mut state = self.lock();
            state.overlay = None;
            state.status = STATUS_NO_FACE.to_string();
            state.checkin_label = None;
            return TickOutcome::NoFace;
        };

        let best = matcher.find_best_match(&found.descriptor);
        let overlay = Overlay::new(&found.face, best.to_string());

        let mut state = self.lock();
        state.overlay = Some(overlay);
        match best.label.as_known() {
            Some(label) => {
                state.status = format!("Welcome, {}! Ready to check-in.", label.to_uppercase());
                state.checkin_label = Some(label.to_string());
                TickOutcome::Recognized(best)
            }
            None => {
                state.status = if matcher.is_empty() {
                    STATUS_NOT_ENROLLED.to_string()
                } else {
                    STATUS_UNKNOWN.to_string()
                };
                state.checkin_label = None;
                TickOutcome::Unknown(best)
            }
        }
    }

    /// A tick failed; nothing is recognized until the next good tick.
    pub fn detection_failed(&self, error: &EngineError) {
        let mut state = self.lock();
        state.overlay = None;
        state.checkin_label = None;
        state.status = format!("Detection error: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facecheck_core::{Embedding, LabeledDescriptors, MatchLabel};

    fn matcher() -> FaceMatcher {
        FaceMatcher::new(
            vec![LabeledDescriptors::new(
                "alice",
                vec![
                    Embedding::new(vec![0.0, 0.0]),
                    Embedding::new(vec![0.0, 0.0]),
                    Embedding::new(vec![0.0, 0.0]),
                ],
            )
            .unwrap()],
            0.6,
        )
    }

    fn face_at(distance: f32) -> Option<FaceDescription> {
        Some(FaceDescription {
            face: BoundingBox {
                x: 10.0,
                y: 20.0,
                width: 100.0,
                height: 120.0,
                confidence: 0.98,
                landmarks: None,
            },
            descriptor: Embedding::new(vec![distance, 0.0]),
        })
    }

    #[test]
    fn test_recognized_enables_checkin() {
        let kiosk = Kiosk::new();
        let outcome = kiosk.apply_detection(&matcher(), face_at(0.3));

        let best = match outcome {
            TickOutcome::Recognized(best) => best,
            other => panic!("expected a recognized face, got {other:?}"),
        };
        assert_eq!(best.label, MatchLabel::Known("alice".into()));
        let state = kiosk.snapshot();
        assert_eq!(state.status, "Welcome, ALICE! Ready to check-in.");
        assert_eq!(state.checkin_label.as_deref(), Some("alice"));
        let overlay = state.overlay.unwrap();
        assert_eq!(overlay.caption, "alice (0.30)");
        assert_eq!((overlay.x, overlay.width), (10.0, 100.0));
    }

    #[test]
    fn test_unknown_disables_checkin() {
        let kiosk = Kiosk::new();
        kiosk.apply_detection(&matcher(), face_at(0.3));
        let outcome = kiosk.apply_detection(&matcher(), face_at(0.9));

        assert!(matches!(outcome, TickOutcome::Unknown(_)));
        let state = kiosk.snapshot();
        assert_eq!(state.status, STATUS_UNKNOWN);
        assert!(state.checkin_label.is_none());
        assert_eq!(state.overlay.unwrap().caption, "unknown (0.90)");
    }

    #[test]
    fn test_no_face_clears_overlay_and_checkin() {
        let kiosk = Kiosk::new();
        kiosk.apply_detection(&matcher(), face_at(0.1));
        assert!(kiosk.checkin_enabled());

        assert_eq!(kiosk.apply_detection(&matcher(), None), TickOutcome::NoFace);
        let state = kiosk.snapshot();
        assert_eq!(state.status, STATUS_NO_FACE);
        assert!(state.overlay.is_none());
        assert!(state.checkin_label.is_none());
    }

    #[test]
    fn test_empty_matcher_never_enables_checkin() {
        let kiosk = Kiosk::new();
        let empty = FaceMatcher::new(vec![], 0.6);
        kiosk.set_enrolled(&empty);
        assert_eq!(kiosk.status(), STATUS_NO_DESCRIPTORS);

        for d in [0.0, 0.3, 0.9] {
            kiosk.apply_detection(&empty, face_at(d));
            assert!(!kiosk.checkin_enabled());
        }
        assert_eq!(kiosk.status(), STATUS_NOT_ENROLLED);
    }

    #[test]
    fn test_set_enrolled_reports_label_count() {
        let kiosk = Kiosk::new();
        kiosk.set_enrolled(&matcher());
        assert_eq!(kiosk.enrolled_labels(), vec!["alice".to_string()]);
        assert_eq!(kiosk.status(), "Successfully loaded 1 user labels. Starting video...");
        assert_eq!(kiosk.snapshot().distance_threshold, Some(0.6));
    }

    #[test]
    fn test_camera_failure() {
        let kiosk = Kiosk::new();
        kiosk.apply_detection(&matcher(), face_at(0.1));
        kiosk.camera_failed(&EngineError::CameraNotOpen);

        let state = kiosk.snapshot();
        assert_eq!(state.status, "Error accessing camera: camera is not open.");
        assert!(matches!(state.camera, CameraState::Failed { .. }));
        assert!(state.checkin_label.is_none());
    }
}
