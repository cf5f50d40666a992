//! Scoring of per-test results
//!
//! All arithmetic happens over rationals so that equal splits sum exactly
//! (100 split over 7 OK tests must come back to exactly 100); conversion to
//! floats happens once, at the wire boundary.

use num_rational::Ratio;
use num_traits::{ToPrimitive, Zero};

use crate::models::{RunResult, Status, TestGroup};

type Score = Ratio<i64>;

/// Turns a vector of per-test results into a total and per-test scores
pub enum Scorer {
    /// Every test carries equal weight; checker scores flow through
    PerTest,
    /// Tests are partitioned into ordered groups with their own point rules
    Subtask(Vec<TestGroup>),
}

impl Scorer {
    pub fn from_request(test_groups: Option<&[TestGroup]>) -> Self {
        match test_groups {
            Some(groups) if !groups.is_empty() => Scorer::Subtask(groups.to_vec()),
            _ => Scorer::PerTest,
        }
    }

    /// Returns `(total, per_test)`; `per_test` is aligned with `test_results`
    pub fn score(&self, test_results: &[RunResult]) -> (f64, Vec<f64>) {
        let per_test = match self {
            Scorer::PerTest => self.per_test_scores(test_results),
            Scorer::Subtask(groups) => self.subtask_scores(groups, test_results),
        };
        let total: Score = per_test.iter().sum();
        (
            to_f64(total),
            per_test.into_iter().map(to_f64).collect(),
        )
    }

    fn per_test_scores(&self, test_results: &[RunResult]) -> Vec<Score> {
        let count = test_results.len() as i64;
        if count == 0 {
            return Vec::new();
        }
        test_results
            .iter()
            .map(|result| ratio_from(result.score) / count)
            .collect()
    }

    fn subtask_scores(&self, groups: &[TestGroup], test_results: &[RunResult]) -> Vec<Score> {
        let mut per_test = Vec::with_capacity(test_results.len());
        let mut cursor = 0usize;
        for group in groups {
            let end = (cursor + group.count).min(test_results.len());
            let oks: Vec<i64> = test_results[cursor..end]
                .iter()
                .map(|result| i64::from(result.status == Status::Ok))
                .collect();
            let all_ok = oks.iter().min().copied().unwrap_or(0);

            let points_per_test = ratio_from(group.points_per_test);
            let group_share = if group.count > 0 {
                ratio_from(group.points) * Ratio::new(all_ok, group.count as i64)
            } else {
                Score::zero()
            };
            for ok in oks {
                per_test.push(points_per_test * ok + group_share);
            }
            cursor = end;
        }
        // Anything beyond the declared groups earns nothing
        per_test.resize(test_results.len(), Score::zero());
        per_test
    }
}

fn ratio_from(value: f64) -> Score {
    Ratio::approximate_float(value).unwrap_or_else(Score::zero)
}

fn to_f64(value: Score) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: Status, score: f64) -> RunResult {
        let mut result = RunResult::with_status(status);
        result.memory = 1.0;
        result.time = 1.0;
        result.score = score;
        result
    }

    #[test]
    fn test_per_test_scorer() {
        let scorer = Scorer::PerTest;
        let results = vec![result(Status::Wa, 20.0), result(Status::Ok, 100.0)];
        assert_eq!(scorer.score(&results), (60.0, vec![10.0, 50.0]));
    }

    #[test]
    fn test_per_test_scorer_splits_exactly() {
        let scorer = Scorer::PerTest;
        let results: Vec<RunResult> = (0..7).map(|_| result(Status::Ok, 100.0)).collect();
        let (total, per_test) = scorer.score(&results);
        assert_eq!(total, 100.0);
        assert_eq!(per_test.len(), 7);
    }

    #[test]
    fn test_subtask_scorer_with_points() {
        let groups = vec![
            TestGroup::new(40.0, 0.0, 2).unwrap(),
            TestGroup::new(60.0, 0.0, 4).unwrap(),
        ];
        let scorer = Scorer::Subtask(groups);

        let mut results: Vec<RunResult> = (0..6).map(|_| result(Status::Ok, 100.0)).collect();
        assert_eq!(
            scorer.score(&results),
            (100.0, vec![20.0, 20.0, 15.0, 15.0, 15.0, 15.0])
        );

        results[0].status = Status::Wa;
        assert_eq!(
            scorer.score(&results),
            (60.0, vec![0.0, 0.0, 15.0, 15.0, 15.0, 15.0])
        );
    }

    #[test]
    fn test_subtask_scorer_with_points_per_test() {
        let groups = vec![
            TestGroup::new(0.0, 20.0, 2).unwrap(),
            TestGroup::new(0.0, 15.0, 4).unwrap(),
        ];
        let scorer = Scorer::Subtask(groups);

        let mut results: Vec<RunResult> = (0..6).map(|_| result(Status::Ok, 100.0)).collect();
        results[0].status = Status::Wa;
        assert_eq!(
            scorer.score(&results),
            (80.0, vec![0.0, 20.0, 15.0, 15.0, 15.0, 15.0])
        );
    }

    #[test]
    fn test_skipped_tests_score_zero() {
        let groups = vec![TestGroup::new(0.0, 25.0, 4).unwrap()];
        let scorer = Scorer::Subtask(groups);
        let results = vec![
            result(Status::Ok, 100.0),
            result(Status::Wa, 0.0),
            result(Status::Skipped, 0.0),
            result(Status::Skipped, 0.0),
        ];
        assert_eq!(scorer.score(&results), (25.0, vec![25.0, 0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_from_request() {
        assert!(matches!(Scorer::from_request(None), Scorer::PerTest));
        assert!(matches!(Scorer::from_request(Some(&[])), Scorer::PerTest));
        let groups = [TestGroup::new(100.0, 0.0, 1).unwrap()];
        assert!(matches!(
            Scorer::from_request(Some(&groups)),
            Scorer::Subtask(_)
        ));
    }
}
