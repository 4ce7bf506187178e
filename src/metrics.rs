//! Client-side derived metrics.
//!
//! These are computed only to fill gaps in what the training service sent:
//! a fallback MSE/RMSE when the regression payload lacks them, and the
//! confusion matrix for classification results. Both functions are pure.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::logging::{log_fallback, ProfileScope};
use crate::result::{coerce_number, Label, RawResult};

/// Anything a regression series element can be read as.
pub trait AsNumber {
    /// Finite numeric value, or `None` if the element does not coerce.
    fn as_number(&self) -> Option<f64>;
}

impl AsNumber for f64 {
    fn as_number(&self) -> Option<f64> {
        self.is_finite().then_some(*self)
    }
}

impl AsNumber for Option<f64> {
    fn as_number(&self) -> Option<f64> {
        self.and_then(|v| v.as_number())
    }
}

impl AsNumber for Value {
    fn as_number(&self) -> Option<f64> {
        coerce_number(self)
    }
}

// =============================================================================
// Regression fallback
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegressionFallback {
    pub mse: f64,
    pub rmse: f64,
    /// Length-matched prefix used as the divisor.
    pub samples: usize,
    /// Pairs dropped because one side did not coerce to a finite number.
    pub skipped: usize,
}

/// MSE and RMSE over the length-matched prefix of the two series.
///
/// Pairs where either side is not a finite number are skipped, but the
/// divisor stays the full prefix length `n`, so with invalid pairs present
/// the result understates the mean error over the valid pairs.
///
/// Returns `None` when the prefix is empty.
pub fn regression_fallback<P: AsNumber, A: AsNumber>(
    predictions: &[P],
    actual: &[A],
) -> Option<RegressionFallback> {
    let n = predictions.len().min(actual.len());
    if n == 0 {
        return None;
    }
    let mut sum = 0.0;
    let mut skipped = 0;
    for (pred, act) in predictions.iter().zip(actual).take(n) {
        match (pred.as_number(), act.as_number()) {
            (Some(p), Some(a)) => {
                let diff = p - a;
                sum += diff * diff;
            }
            _ => skipped += 1,
        }
    }
    let mse = sum / n as f64;
    Some(RegressionFallback {
        mse,
        rmse: mse.sqrt(),
        samples: n,
        skipped,
    })
}

// =============================================================================
// Confusion matrix
// =============================================================================

/// Actual × predicted count table over the union of observed labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfusionMatrix {
    labels: Vec<Label>,
    /// `counts[a][p]`, indexed like `labels`.
    counts: Vec<Vec<u64>>,
    #[serde(skip)]
    index: HashMap<Label, usize>,
}

impl ConfusionMatrix {
    /// Labels in first-seen order, `actual` scanned before `predictions`.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn count(&self, actual: &Label, predicted: &Label) -> Option<u64> {
        let a = *self.index.get(actual)?;
        let p = *self.index.get(predicted)?;
        Some(self.counts[a][p])
    }

    /// Counts for one actual label, ordered like [`labels`](Self::labels).
    pub fn row(&self, actual: &Label) -> Option<&[u64]> {
        self.index.get(actual).map(|&a| self.counts[a].as_slice())
    }

    pub fn rows(&self) -> impl Iterator<Item = (&Label, &[u64])> {
        self.labels.iter().zip(self.counts.iter().map(Vec::as_slice))
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    fn with_labels(labels: Vec<Label>) -> Self {
        let index = labels.iter().cloned().enumerate().map(|(i, l)| (l, i)).collect();
        let n = labels.len();
        Self {
            labels,
            counts: vec![vec![0; n]; n],
            index,
        }
    }

    fn increment(&mut self, actual: &Label, predicted: &Label) {
        if let (Some(&a), Some(&p)) = (self.index.get(actual), self.index.get(predicted)) {
            self.counts[a][p] += 1;
        }
    }
}

/// Build the confusion matrix; `None` if either series is missing.
///
/// Iterates over every index of `actual`. An index with no matching
/// prediction is skipped rather than counted.
pub fn confusion_matrix(
    predictions: Option<&[Label]>,
    actual: Option<&[Label]>,
) -> Option<ConfusionMatrix> {
    let (predictions, actual) = (predictions?, actual?);

    let mut labels: Vec<Label> = Vec::new();
    for label in actual.iter().chain(predictions) {
        if !labels.contains(label) {
            labels.push(label.clone());
        }
    }

    let mut matrix = ConfusionMatrix::with_labels(labels);
    for (i, a) in actual.iter().enumerate() {
        if let Some(p) = predictions.get(i) {
            matrix.increment(a, p);
        }
    }
    Some(matrix)
}

// =============================================================================
// Per-result derivation
// =============================================================================

/// Everything derived client-side for one result. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DerivedMetrics {
    Classification { confusion: Option<ConfusionMatrix> },
    /// `fallback` is only computed when the payload lacks MSE or RMSE.
    Regression { fallback: Option<RegressionFallback> },
    Clustering,
}

impl DerivedMetrics {
    pub fn derive(result: &RawResult) -> Self {
        let _scope = ProfileScope::with_context("derive_metrics", &[("type", Value::from(result.kind()))]);
        match result {
            RawResult::Classification(c) => DerivedMetrics::Classification {
                confusion: confusion_matrix(c.predictions.as_deref(), c.actual.as_deref()),
            },
            RawResult::Regression(r) => {
                let fallback = if r.mse.is_some() && r.rmse.is_some() {
                    None
                } else {
                    match (r.predictions.as_deref(), r.actual.as_deref()) {
                        (Some(p), Some(a)) => regression_fallback(p, a),
                        _ => None,
                    }
                };
                if let Some(fb) = &fallback {
                    log_fallback("mse", fb.mse, fb.samples, fb.skipped);
                }
                DerivedMetrics::Regression { fallback }
            }
            RawResult::Clustering(_) => DerivedMetrics::Clustering,
        }
    }

    pub fn confusion(&self) -> Option<&ConfusionMatrix> {
        match self {
            DerivedMetrics::Classification { confusion } => confusion.as_ref(),
            _ => None,
        }
    }

    pub fn regression_fallback(&self) -> Option<&RegressionFallback> {
        match self {
            DerivedMetrics::Regression { fallback } => fallback.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::RegressionResult;
    use rand::Rng;
    use serde_json::json;

    fn num(n: i64) -> Label {
        Label::Number(n.to_string())
    }

    #[test]
    fn test_fallback_basic() {
        let fb = regression_fallback(&[1.0, 2.0, 4.0], &[1.0, 3.0, 2.0]).unwrap();
        assert!((fb.mse - 5.0 / 3.0).abs() < 1e-12);
        assert_eq!(fb.rmse, fb.mse.sqrt());
        assert_eq!(fb.skipped, 0);
    }

    #[test]
    fn test_fallback_random_finite_series() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let n = rng.gen_range(1..64);
            let preds: Vec<f64> = (0..n).map(|_| rng.gen_range(-1e3..1e3)).collect();
            let actual: Vec<f64> = (0..n).map(|_| rng.gen_range(-1e3..1e3)).collect();
            let fb = regression_fallback(&preds, &actual).unwrap();

            let expected = preds.iter().zip(&actual).map(|(p, a)| (p - a) * (p - a)).sum::<f64>() / n as f64;
            assert!(fb.mse >= 0.0);
            assert_eq!(fb.rmse, fb.mse.sqrt());
            assert!((fb.mse - expected).abs() <= 1e-9 * expected.max(1.0));
            assert_eq!((fb.samples, fb.skipped), (n, 0));
        }
    }

    #[test]
    fn test_fallback_empty_is_none() {
        let empty: [f64; 0] = [];
        assert!(regression_fallback(&empty, &empty).is_none());
        assert!(regression_fallback(&[1.0], &empty).is_none());
    }

    #[test]
    fn test_fallback_uses_shorter_prefix() {
        let fb = regression_fallback(&[1.0, 2.0, 3.0], &[0.0, 0.0]).unwrap();
        assert_eq!(fb.samples, 2);
        assert!((fb.mse - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_fallback_keeps_full_divisor_when_skipping() {
        let preds = vec![json!(3.0), json!("oops"), json!(1.0), json!([])];
        let actual = vec![json!(1.0), json!(2.0), json!("1"), json!(0)];
        let fb = regression_fallback(&preds, &actual).unwrap();
        // Pairs 0 and 2 are valid: (3-1)^2 + 0 = 4, divided by all four.
        assert_eq!(fb.samples, 4);
        assert_eq!(fb.skipped, 2);
        assert!((fb.mse - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_fallback_skips_non_finite_floats() {
        let fb = regression_fallback(&[f64::NAN, 2.0], &[1.0, 0.0]).unwrap();
        assert_eq!(fb.skipped, 1);
        assert!((fb.mse - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_confusion_matrix_binary() {
        let actual = vec![num(1), num(0), num(1), num(1)];
        let preds = vec![num(1), num(0), num(0), num(1)];
        let cm = confusion_matrix(Some(&preds), Some(&actual)).unwrap();
        assert_eq!(cm.labels(), &[num(1), num(0)]);
        assert_eq!(cm.count(&num(1), &num(1)), Some(2));
        assert_eq!(cm.count(&num(1), &num(0)), Some(1));
        assert_eq!(cm.count(&num(0), &num(0)), Some(1));
        assert_eq!(cm.count(&num(0), &num(1)), Some(0));
        assert_eq!(cm.total(), 4);
    }

    #[test]
    fn test_confusion_labels_include_prediction_only_classes() {
        let actual = vec![Label::Text("a".into())];
        let preds = vec![Label::Text("b".into())];
        let cm = confusion_matrix(Some(&preds), Some(&actual)).unwrap();
        assert_eq!(cm.labels().len(), 2);
        assert_eq!(cm.row(&Label::Text("a".into())), Some(&[0, 1][..]));
    }

    #[test]
    fn test_confusion_skips_indexes_past_predictions() {
        let actual = vec![num(0), num(1), num(1)];
        let preds = vec![num(0)];
        let cm = confusion_matrix(Some(&preds), Some(&actual)).unwrap();
        assert_eq!(cm.total(), 1);
        assert_eq!(cm.labels(), &[num(0), num(1)]);
    }

    #[test]
    fn test_confusion_absent_inputs() {
        let labels = vec![num(1)];
        assert!(confusion_matrix(None, Some(&labels)).is_none());
        assert!(confusion_matrix(Some(&labels), None).is_none());
    }

    #[test]
    fn test_integer_and_float_labels_merge() {
        let actual: Vec<Label> = [json!(1), json!(0)].iter().map(Label::from_value).collect();
        let preds: Vec<Label> = [json!(1.0), json!(0.0)].iter().map(Label::from_value).collect();
        let cm = confusion_matrix(Some(&preds), Some(&actual)).unwrap();
        assert_eq!(cm.labels(), &[num(1), num(0)]);
        assert_eq!(cm.row(&num(1)), Some(&[1, 0][..]));
        assert_eq!(cm.row(&num(0)), Some(&[0, 1][..]));
    }

    #[test]
    fn test_string_and_number_labels_stay_distinct() {
        let actual = vec![num(1), Label::Text("1".into())];
        let preds = vec![num(1), num(1)];
        let cm = confusion_matrix(Some(&preds), Some(&actual)).unwrap();
        assert_eq!(cm.labels().len(), 2);
        assert_eq!(cm.count(&Label::Text("1".into()), &num(1)), Some(1));
    }

    #[test]
    fn test_derive_prefers_payload_metrics() {
        let with_both = RawResult::Regression(RegressionResult {
            mse: Some(1.0),
            rmse: Some(1.0),
            predictions: Some(vec![json!(1.0)]),
            actual: Some(vec![json!(2.0)]),
            ..Default::default()
        });
        assert!(DerivedMetrics::derive(&with_both).regression_fallback().is_none());

        let missing = RawResult::Regression(RegressionResult {
            predictions: Some(vec![json!(1.0)]),
            actual: Some(vec![json!(3.0)]),
            ..Default::default()
        });
        let derived = DerivedMetrics::derive(&missing);
        assert_eq!(derived.regression_fallback().unwrap().mse, 4.0);
    }

    #[test]
    fn test_derive_is_idempotent() {
        let result: RawResult = serde_json::from_value(json!({
            "type": "classification",
            "accuracy": 0.5,
            "predictions": ["a", "b"],
            "actual": ["a", "a"]
        }))
        .unwrap();
        assert_eq!(DerivedMetrics::derive(&result), DerivedMetrics::derive(&result));
    }
}
