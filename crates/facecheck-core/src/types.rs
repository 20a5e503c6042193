use serde::{Deserialize, Serialize};
use std::fmt;

/// Borrowed 8-bit grayscale image, row-major, `width * height` bytes.
#[derive(Debug, Clone, Copy)]
pub struct GrayView<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
}

impl<'a> GrayView<'a> {
    /// Wrap a pixel buffer. Returns `None` if the buffer is shorter than
    /// `width * height` or either dimension is zero.
    pub fn new(data: &'a [u8], width: u32, height: u32) -> Option<Self> {
        let pixels = width as usize * height as usize;
        if pixels == 0 || data.len() < pixels {
            return None;
        }
        Some(Self { data, width, height })
    }

    #[inline]
    pub(crate) fn at(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width as usize + x]
    }
}

impl<'a> From<&'a image::GrayImage> for GrayView<'a> {
    fn from(img: &'a image::GrayImage) -> Self {
        Self {
            data: img.as_raw(),
            width: img.width(),
            height: img.height(),
        }
    }
}

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Face descriptor (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this descriptor (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Euclidean distance between two descriptors. Lower = more similar.
    ///
    /// Descriptors of different length are compared over the shared prefix.
    pub fn distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A detected face together with its descriptor.
#[derive(Debug, Clone)]
pub struct FaceDescription {
    pub face: BoundingBox,
    pub descriptor: Embedding,
}

/// Reference descriptors for one enrolled identity. Never empty.
#[derive(Debug, Clone)]
pub struct LabeledDescriptors {
    label: String,
    descriptors: Vec<Embedding>,
}

impl LabeledDescriptors {
    /// Returns `None` when `descriptors` is empty: an identity without any
    /// reference descriptor cannot be matched.
    pub fn new(label: impl Into<String>, descriptors: Vec<Embedding>) -> Option<Self> {
        if descriptors.is_empty() {
            return None;
        }
        Some(Self {
            label: label.into(),
            descriptors,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn descriptors(&self) -> &[Embedding] {
        &self.descriptors
    }

    /// Mean Euclidean distance from `probe` to every reference descriptor.
    pub fn mean_distance(&self, probe: &Embedding) -> f32 {
        let total: f32 = self.descriptors.iter().map(|d| probe.distance(d)).sum();
        total / self.descriptors.len() as f32
    }
}

/// Outcome label of a live match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchLabel {
    Known(String),
    Unknown,
}

impl MatchLabel {
    pub fn as_known(&self) -> Option<&str> {
        match self {
            MatchLabel::Known(label) => Some(label),
            MatchLabel::Unknown => None,
        }
    }
}

impl fmt::Display for MatchLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchLabel::Known(label) => f.write_str(label),
            MatchLabel::Unknown => f.write_str("unknown"),
        }
    }
}

/// Best match for one probe descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct BestMatch {
    pub label: MatchLabel,
    /// Distance to the best labeled set; `f32::INFINITY` when nothing was compared.
    pub distance: f32,
}

/// Renders as `"alice (0.31)"`, used as the overlay caption.
impl fmt::Display for BestMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.distance.is_finite() {
            write!(f, "{} ({:.2})", self.label, self.distance)
        } else {
            write!(f, "{}", self.label)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_identical() {
        let a = Embedding::new(vec![0.5, 0.5, 0.0]);
        assert!(a.distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_distance_pythagorean() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_labeled_descriptors_rejects_empty() {
        assert!(LabeledDescriptors::new("alice", vec![]).is_none());
    }

    #[test]
    fn test_mean_distance() {
        let set = LabeledDescriptors::new(
            "alice",
            vec![Embedding::new(vec![1.0, 0.0]), Embedding::new(vec![3.0, 0.0])],
        )
        .unwrap();
        let probe = Embedding::new(vec![0.0, 0.0]);
        assert!((set.mean_distance(&probe) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_best_match_display() {
        let known = BestMatch {
            label: MatchLabel::Known("alice".into()),
            distance: 0.3,
        };
        assert_eq!(known.to_string(), "alice (0.30)");
        let unknown = BestMatch {
            label: MatchLabel::Unknown,
            distance: 0.912,
        };
        assert_eq!(unknown.to_string(), "unknown (0.91)");
        let empty = BestMatch {
            label: MatchLabel::Unknown,
            distance: f32::INFINITY,
        };
        assert_eq!(empty.to_string(), "unknown");
    }

    #[test]
    fn test_gray_view_rejects_short_buffer() {
        assert!(GrayView::new(&[0u8; 5], 2, 3).is_none());
        assert!(GrayView::new(&[0u8; 6], 2, 3).is_some());
        assert!(GrayView::new(&[], 0, 0).is_none());
    }
}
