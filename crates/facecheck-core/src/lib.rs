//! facecheck-core — face detection, descriptors and labeled matching.
//!
//! SCRFD finds faces and their landmarks, ArcFace turns an aligned face into
//! a descriptor, and [`FaceMatcher`] classifies descriptors against the
//! reference sets built by [`gallery::build_matcher`].

pub mod alignment;
pub mod detector;
pub mod gallery;
pub mod matcher;
pub mod pipeline;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use detector::FaceDetector;
pub use gallery::{build_matcher, is_plain_label, GalleryReport, LabelProgress, ReferenceStore};
pub use matcher::FaceMatcher;
pub use pipeline::{FaceEncoder, FacePipeline, PipelineError};
pub use recognizer::FaceRecognizer;
pub use types::{
    BestMatch, BoundingBox, Embedding, FaceDescription, GrayView, LabeledDescriptors, MatchLabel,
};

/// File name of the SCRFD detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// Default model directory: `$XDG_DATA_HOME/facecheck/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facecheck/models")
}
