//! Labeled face matcher.
//!
//! Classifies a probe descriptor as one of the enrolled identities or as
//! unknown. Each identity is scored by the mean Euclidean distance from the
//! probe to its reference descriptors; the closest identity wins when its
//! distance is strictly below the threshold.

use crate::types::{BestMatch, Embedding, LabeledDescriptors, MatchLabel};

/// Immutable snapshot of enrolled identities plus a distance threshold.
#[derive(Debug, Clone)]
pub struct FaceMatcher {
    labeled: Vec<LabeledDescriptors>,
    distance_threshold: f32,
}

impl FaceMatcher {
    pub fn new(labeled: Vec<LabeledDescriptors>, distance_threshold: f32) -> Self {
        Self {
            labeled,
            distance_threshold,
        }
    }

    pub fn distance_threshold(&self) -> f32 {
        self.distance_threshold
    }

    pub fn labeled_descriptors(&self) -> &[LabeledDescriptors] {
        &self.labeled
    }

    /// Number of identities included in the matcher.
    pub fn label_count(&self) -> usize {
        self.labeled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labeled.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labeled.iter().map(|l| l.label())
    }

    /// Find the identity closest to `probe`.
    ///
    /// Every identity is scored; there is no early exit. Resolves to
    /// [`MatchLabel::Unknown`] when the matcher is empty, when the best
    /// distance is not below the threshold, or when two identities tie for
    /// the best distance.
    pub fn find_best_match(&self, probe: &Embedding) -> BestMatch {
        let mut best_distance = f32::INFINITY;
        let mut best_idx: Option<usize> = None;
        let mut tied = false;

        for (i, set) in self.labeled.iter().enumerate() {
            let distance = set.mean_distance(probe);
            if distance < best_distance {
                best_distance = distance;
                best_idx = Some(i);
                tied = false;
            } else if distance == best_distance {
                tied = true;
            }
        }

        match best_idx {
            Some(idx) if !tied && best_distance < self.distance_threshold => BestMatch {
                label: MatchLabel::Known(self.labeled[idx].label().to_string()),
                distance: best_distance,
            },
            _ => BestMatch {
                label: MatchLabel::Unknown,
                distance: best_distance,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(label: &str, descriptors: &[&[f32]]) -> LabeledDescriptors {
        LabeledDescriptors::new(
            label,
            descriptors.iter().map(|d| Embedding::new(d.to_vec())).collect(),
        )
        .unwrap()
    }

    fn probe(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_match_within_threshold() {
        let matcher = FaceMatcher::new(
            vec![set("alice", &[&[0.0, 0.0]]), set("bob", &[&[5.0, 0.0]])],
            0.6,
        );
        let result = matcher.find_best_match(&probe(&[0.3, 0.0]));
        assert_eq!(result.label, MatchLabel::Known("alice".into()));
        assert!((result.distance - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_beyond_threshold_is_unknown() {
        let matcher = FaceMatcher::new(vec![set("alice", &[&[0.0, 0.0]])], 0.6);
        let result = matcher.find_best_match(&probe(&[0.9, 0.0]));
        assert_eq!(result.label, MatchLabel::Unknown);
        assert!((result.distance - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_distance_equal_to_threshold_is_unknown() {
        let matcher = FaceMatcher::new(vec![set("alice", &[&[0.0, 0.0]])], 0.5);
        let result = matcher.find_best_match(&probe(&[0.5, 0.0]));
        assert_eq!(result.label, MatchLabel::Unknown);
    }

    #[test]
    fn test_tie_is_unknown() {
        let matcher = FaceMatcher::new(
            vec![set("alice", &[&[-0.1, 0.0]]), set("bob", &[&[0.1, 0.0]])],
            0.6,
        );
        let result = matcher.find_best_match(&probe(&[0.0, 0.0]));
        assert_eq!(result.label, MatchLabel::Unknown);
    }

    #[test]
    fn test_scores_all_entries() {
        // Best match is the last entry
        let matcher = FaceMatcher::new(
            vec![
                set("decoy1", &[&[0.0, 1.0, 0.0]]),
                set("decoy2", &[&[0.0, 0.0, 1.0]]),
                set("match", &[&[1.0, 0.0, 0.0]]),
            ],
            0.6,
        );
        let result = matcher.find_best_match(&probe(&[1.0, 0.0, 0.0]));
        assert_eq!(result.label.as_known(), Some("match"));
    }

    #[test]
    fn test_mean_over_reference_set() {
        // alice's references average 0.45 from the probe, bob's single reference 0.5
        let matcher = FaceMatcher::new(
            vec![
                set("alice", &[&[0.3, 0.0], &[0.6, 0.0]]),
                set("bob", &[&[0.0, 0.5]]),
            ],
            0.6,
        );
        let result = matcher.find_best_match(&probe(&[0.0, 0.0]));
        assert_eq!(result.label.as_known(), Some("alice"));
        assert!((result.distance - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_empty_matcher() {
        let matcher = FaceMatcher::new(vec![], 0.6);
        assert!(matcher.is_empty());
        assert_eq!(matcher.label_count(), 0);
        let result = matcher.find_best_match(&probe(&[0.0, 0.0]));
        assert_eq!(result.label, MatchLabel::Unknown);
        assert!(result.distance.is_infinite());
    }
}
