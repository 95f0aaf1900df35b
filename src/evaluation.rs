//! Binary classification metrics for post-deployment checks, with `dog` as the
//! positive class.

use serde::{Deserialize, Serialize};

use crate::prediction::Class;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub n_samples: usize,
    /// `[[tn, fp], [fn, tp]]`, rows are true classes.
    pub confusion_matrix: [[usize; 2]; 2],
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

impl EvaluationReport {
    /// Computes the metrics over pairs whose prediction is present.
    ///
    /// `None` marks a failed request; it is left out of every metric.
    /// Returns `None` when no prediction succeeded.
    pub fn from_predictions(truth: &[Class], predicted: &[Option<Class>]) -> Option<Self> {
        let mut matrix = [[0usize; 2]; 2];
        for (actual, predicted) in truth.iter().zip(predicted) {
            if let Some(predicted) = predicted {
                matrix[actual.id() as usize][predicted.id() as usize] += 1;
            }
        }

        let [[tn, fp], [fneg, tp]] = matrix;
        let n_samples = tn + fp + fneg + tp;
        if n_samples == 0 {
            return None;
        }

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fneg);
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        Some(Self {
            accuracy: ratio(tp + tn, n_samples),
            precision,
            recall,
            f1,
            n_samples,
            confusion_matrix: matrix,
        })
    }
}
