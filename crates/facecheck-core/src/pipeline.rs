//! Single-face detection + descriptor pipeline.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{FaceDescription, GrayView};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Turns an image into the descriptor of its most prominent face.
///
/// `Ok(None)` means no face was found, which is a normal outcome.
pub trait FaceEncoder {
    fn encode(&mut self, image: GrayView<'_>) -> Result<Option<FaceDescription>, PipelineError>;
}

/// SCRFD detection followed by ArcFace extraction.
pub struct FacePipeline {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl FacePipeline {
    pub fn new(detector: FaceDetector, recognizer: FaceRecognizer) -> Self {
        Self {
            detector,
            recognizer,
        }
    }

    /// Load both models. Fails if either file is missing or invalid.
    pub fn load(detector_path: &str, recognizer_path: &str) -> Result<Self, PipelineError> {
        let detector = FaceDetector::load(detector_path)?;
        let recognizer = FaceRecognizer::load(recognizer_path)?;
        Ok(Self::new(detector, recognizer))
    }
}

impl FaceEncoder for FacePipeline {
    fn encode(&mut self, image: GrayView<'_>) -> Result<Option<FaceDescription>, PipelineError> {
        let Some(face) = self.detector.detect_single(image)? else {
            return Ok(None);
        };
        tracing::trace!(confidence = face.confidence, "face detected");
        let descriptor = self.recognizer.extract(image, &face)?;
        Ok(Some(FaceDescription { face, descriptor }))
    }
}
