//! Candidate selection.
//!
//! A [`SelectionPolicy`] reduces the raw candidates of one page to the ones
//! actually reported. Ordering is total and deterministic: descending score,
//! then larger bounding-box area, then the order the candidates were
//! proposed in.

use crate::domain::Candidate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How raw candidates are reduced to accepted ones.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Keep only the best candidate.
    #[default]
    SingleBest,
    /// Keep every candidate scoring at least `min_score`.
    AllAboveThreshold { min_score: f32 },
}

impl SelectionPolicy {
    /// Applies the policy. Candidates must be given in invocation order.
    pub fn apply(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        match *self {
            SelectionPolicy::SingleBest => {
                rank_candidates(candidates).into_iter().take(1).collect()
            }
            SelectionPolicy::AllAboveThreshold { min_score } => rank_candidates(
                candidates
                    .into_iter()
                    .filter(|c| c.score >= min_score)
                    .collect(),
            ),
        }
    }

    /// Whether at most one candidate can be accepted.
    pub fn is_single(&self) -> bool {
        matches!(self, SelectionPolicy::SingleBest)
    }
}

fn compare(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.bbox.area().cmp(&a.bbox.area()))
}

/// Sorts candidates by descending score, then descending bounding-box area.
/// The sort is stable, so remaining ties keep their input order.
pub fn rank_candidates(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(compare);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BoundingBox, StrategyKind};

    fn candidate(side: u32, score: f32, source: StrategyKind) -> Candidate {
        Candidate::new(BoundingBox::new(0, 0, side, side).unwrap(), score, source).unwrap()
    }

    #[test]
    fn test_single_best_keeps_highest_score() {
        let picked = SelectionPolicy::SingleBest.apply(vec![
            candidate(10, 1.0, StrategyKind::ColorThreshold),
            candidate(10, 3.0, StrategyKind::ColorThreshold),
            candidate(10, 2.0, StrategyKind::ColorThreshold),
        ]);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].score, 3.0);
    }

    #[test]
    fn test_single_best_of_nothing_is_nothing() {
        assert!(SelectionPolicy::SingleBest.apply(Vec::new()).is_empty());
    }

    #[test]
    fn test_ties_prefer_larger_box_then_invocation_order() {
        let picked = SelectionPolicy::SingleBest.apply(vec![
            candidate(10, 5.0, StrategyKind::ColorThreshold),
            candidate(20, 5.0, StrategyKind::ColorThreshold),
        ]);
        assert_eq!(picked[0].bbox.width(), 20);

        let picked = SelectionPolicy::SingleBest.apply(vec![
            candidate(10, 5.0, StrategyKind::ObjectDetection),
            candidate(10, 5.0, StrategyKind::ColorThreshold),
        ]);
        assert_eq!(picked[0].source, StrategyKind::ObjectDetection);
    }

    #[test]
    fn test_threshold_is_inclusive_and_sorted() {
        let policy = SelectionPolicy::AllAboveThreshold { min_score: 2.0 };
        let picked = policy.apply(vec![
            candidate(10, 2.0, StrategyKind::ColorThreshold),
            candidate(10, 1.9, StrategyKind::ColorThreshold),
            candidate(10, 4.0, StrategyKind::ColorThreshold),
        ]);
        let scores: Vec<f32> = picked.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![4.0, 2.0]);
    }

    #[test]
    fn test_policy_serde() {
        let json = r#"{"policy":"all_above_threshold","min_score":0.5}"#;
        let policy: SelectionPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy, SelectionPolicy::AllAboveThreshold { min_score: 0.5 });
        assert!(!policy.is_single());

        let single: SelectionPolicy = serde_json::from_str(r#"{"policy":"single_best"}"#).unwrap();
        assert!(single.is_single());
    }
}
