//! Reference-descriptor builder.
//!
//! Reads each identity's reference images from the store, extracts one
//! descriptor per image with a detectable face, and assembles the
//! [`FaceMatcher`]. Individual failures are logged and skipped; an identity
//! without a single descriptor is left out of the matcher.

use crate::matcher::FaceMatcher;
use crate::pipeline::FaceEncoder;
use crate::types::{GrayView, LabeledDescriptors};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("cannot load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// On-disk reference images: `<root>/<label>/<n>.jpg` for `n` in `1..=per_label`.
#[derive(Debug, Clone)]
pub struct ReferenceStore {
    root: PathBuf,
    per_label: usize,
}

impl ReferenceStore {
    pub fn new(root: impl Into<PathBuf>, per_label: usize) -> Self {
        Self {
            root: root.into(),
            per_label,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Candidate reference image paths for `label`, in load order.
    pub fn candidates(&self, label: &str) -> Vec<PathBuf> {
        let dir = self.root.join(label);
        (1..=self.per_label)
            .map(|n| dir.join(format!("{n}.jpg")))
            .collect()
    }

    /// Decode a reference image to 8-bit grayscale. The format is sniffed
    /// from the file contents, not the extension.
    pub fn load(&self, path: &Path) -> Result<image::GrayImage, GalleryError> {
        let decoded = image::ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(image::ImageError::IoError)
            .and_then(|reader| reader.decode());
        decoded
            .map(|img| img.to_luma8())
            .map_err(|source| GalleryError::Load {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// A label must name exactly one directory under the store root.
pub fn is_plain_label(label: &str) -> bool {
    let mut components = Path::new(label).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Emitted once per label after all of its candidates were tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelProgress {
    pub label: String,
    /// Descriptors successfully extracted.
    pub loaded: usize,
    /// Candidate images tried.
    pub attempted: usize,
}

impl LabelProgress {
    pub fn included(&self) -> bool {
        self.loaded > 0
    }
}

#[derive(Debug)]
pub struct GalleryReport {
    pub matcher: FaceMatcher,
    /// Labels left out because no reference image produced a descriptor.
    pub skipped_labels: Vec<String>,
}

/// Build the labeled matcher for `labels`.
///
/// Never fails: callers check [`FaceMatcher::is_empty`] to find out whether
/// recognition is possible at all.
pub fn build_matcher<E, P>(
    labels: &[String],
    store: &ReferenceStore,
    encoder: &mut E,
    distance_threshold: f32,
    mut progress: P,
) -> GalleryReport
where
    E: FaceEncoder + ?Sized,
    P: FnMut(&LabelProgress),
{
    let mut labeled = Vec::with_capacity(labels.len());
    let mut skipped_labels = Vec::new();
    let mut seen = HashSet::new();

    for label in labels {
        // Two identical reference sets always tie, so a repeated label could never match
        if !seen.insert(label.as_str()) {
            tracing::warn!(label = %label, "label listed more than once; ignoring repeat");
            continue;
        }
        if !is_plain_label(label) {
            tracing::warn!(label = %label, "label is not a plain directory name; skipping");
            skipped_labels.push(label.clone());
            continue;
        }

        let candidates = store.candidates(label);
        let mut descriptors = Vec::new();

        for path in &candidates {
            let image = match store.load(path) {
                Ok(image) => image,
                Err(e) => {
                    tracing::error!(label = %label, error = %e, "reference image not loaded; check the images directory");
                    continue;
                }
            };

            match encoder.encode(GrayView::from(&image)) {
                Ok(Some(found)) => descriptors.push(found.descriptor),
                Ok(None) => {
                    tracing::warn!(label = %label, path = %path.display(), "no face detected in reference image");
                }
                Err(e) => {
                    tracing::error!(label = %label, path = %path.display(), error = %e, "descriptor extraction failed");
                }
            }
        }

        let report = LabelProgress {
            label: label.clone(),
            loaded: descriptors.len(),
            attempted: candidates.len(),
        };
        match LabeledDescriptors::new(label.clone(), descriptors) {
            Some(set) => {
                tracing::info!(label = %label, loaded = report.loaded, "reference descriptors loaded");
                labeled.push(set);
            }
            None => {
                tracing::warn!(label = %label, "no usable reference images; label excluded");
                skipped_labels.push(label.clone());
            }
        }
        progress(&report);
    }

    GalleryReport {
        matcher: FaceMatcher::new(labeled, distance_threshold),
        skipped_labels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineError;
    use crate::types::{BoundingBox, Embedding, FaceDescription};
    use std::fs;

    /// Treats dark images as faceless and encodes brightness as the descriptor.
    struct BrightnessEncoder {
        calls: usize,
    }

    impl FaceEncoder for BrightnessEncoder {
        fn encode(
            &mut self,
            image: GrayView<'_>,
        ) -> Result<Option<FaceDescription>, PipelineError> {
            self.calls += 1;
            let mean = image.data.iter().map(|&p| p as f32).sum::<f32>() / image.data.len() as f32;
            if mean < 32.0 {
                return Ok(None);
            }
            Ok(Some(FaceDescription {
                face: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: image.width as f32,
                    height: image.height as f32,
                    confidence: 0.9,
                    landmarks: None,
                },
                descriptor: Embedding::new(vec![mean / 255.0, 0.0]),
            }))
        }
    }

    fn write_image(root: &Path, label: &str, n: usize, value: u8) {
        let dir = root.join(label);
        fs::create_dir_all(&dir).unwrap();
        image::GrayImage::from_pixel(8, 8, image::Luma([value]))
            .save(dir.join(format!("{n}.jpg")))
            .unwrap();
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_candidates_are_numbered_from_one() {
        let store = ReferenceStore::new("/srv/images", 3);
        let paths = store.candidates("alice");
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/srv/images/alice/1.jpg"),
                PathBuf::from("/srv/images/alice/2.jpg"),
                PathBuf::from("/srv/images/alice/3.jpg"),
            ]
        );
    }

    #[test]
    fn test_partial_reference_set_is_included() {
        let dir = tempfile::tempdir().unwrap();
        // 1, 2, 4 have faces; 3 is dark; 5 is missing
        write_image(dir.path(), "alice", 1, 200);
        write_image(dir.path(), "alice", 2, 180);
        write_image(dir.path(), "alice", 3, 0);
        write_image(dir.path(), "alice", 4, 190);

        let store = ReferenceStore::new(dir.path(), 5);
        let mut encoder = BrightnessEncoder { calls: 0 };
        let mut reports = Vec::new();
        let report = build_matcher(&labels(&["alice"]), &store, &mut encoder, 0.6, |p| {
            reports.push(p.clone())
        });

        assert_eq!(report.matcher.label_count(), 1);
        let alice = &report.matcher.labeled_descriptors()[0];
        assert_eq!(alice.label(), "alice");
        assert_eq!(alice.descriptors().len(), 3);
        assert_eq!(encoder.calls, 4, "missing file must not reach the encoder");
        assert_eq!(
            reports,
            vec![LabelProgress {
                label: "alice".into(),
                loaded: 3,
                attempted: 5,
            }]
        );
    }

    #[test]
    fn test_label_without_faces_is_excluded() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "alice", 1, 200);
        write_image(dir.path(), "bob", 1, 0);
        write_image(dir.path(), "bob", 2, 5);
        // carol has no directory at all

        let store = ReferenceStore::new(dir.path(), 3);
        let mut encoder = BrightnessEncoder { calls: 0 };
        let report = build_matcher(
            &labels(&["alice", "bob", "carol"]),
            &store,
            &mut encoder,
            0.6,
            |_| {},
        );

        let included: Vec<&str> = report.matcher.labels().collect();
        assert_eq!(included, vec!["alice"]);
        assert_eq!(report.skipped_labels, labels(&["bob", "carol"]));
    }

    #[test]
    fn test_all_labels_failing_yields_empty_matcher() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("alice")).unwrap();
        fs::write(dir.path().join("alice/1.jpg"), b"not an image").unwrap();

        let store = ReferenceStore::new(dir.path(), 3);
        let mut encoder = BrightnessEncoder { calls: 0 };
        let report = build_matcher(&labels(&["alice"]), &store, &mut encoder, 0.6, |_| {});

        assert!(report.matcher.is_empty());
        assert_eq!(encoder.calls, 0);
    }

    #[test]
    fn test_repeated_label_still_matches() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "alice", 1, 200);

        let store = ReferenceStore::new(dir.path(), 1);
        let mut encoder = BrightnessEncoder { calls: 0 };
        let mut reports = Vec::new();
        let report = build_matcher(&labels(&["alice", "alice"]), &store, &mut encoder, 0.6, |p| {
            reports.push(p.label.clone())
        });

        assert_eq!(report.matcher.label_count(), 1);
        assert_eq!(encoder.calls, 1);
        assert_eq!(reports, labels(&["alice"]));
        assert!(report.skipped_labels.is_empty());

        let reference = report.matcher.labeled_descriptors()[0].descriptors()[0].clone();
        let probe = Embedding::new(vec![reference.values[0] + 0.1, 0.0]);
        let result = report.matcher.find_best_match(&probe);
        assert_eq!(result.label.as_known(), Some("alice"));
    }

    #[test]
    fn test_path_like_labels_are_rejected() {
        assert!(is_plain_label("alice"));
        assert!(!is_plain_label("../etc"));
        assert!(!is_plain_label("a/b"));
        assert!(!is_plain_label(""));
        assert!(!is_plain_label("/abs"));
    }
}
