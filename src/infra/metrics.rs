// ============================================================
// Layer 6 — Regression Metrics
// ============================================================
// Two responsibilities:
//
//   RunningMetric    — online accumulator for streamed scalars
//                      (loss, batch time, data time); reset at
//                      the start of every epoch.
//
//   EvaluationResult — the five split-level statistics computed
//                      once per full validation/test pass:
//                      MAE, RMSE, Pearson r, Spearman ρ, R².
//
// All five statistics are order-independent aggregates, so the
// result does not depend on how batches were concatenated.

use std::fmt;

// ─── RunningMetric ────────────────────────────────────────────────────────────

/// Online mean of a scalar series with weighted updates
/// (one batch contributes its value weighted by its sample count).
#[derive(Debug, Clone, Default)]
pub struct RunningMetric {
    val:   f64,
    sum:   f64,
    count: f64,
}

impl RunningMetric {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Observe `val` with weight `n`.
    pub fn update(&mut self, val: f64, n: usize) {
        self.val = val;
        self.sum += val * n as f64;
        self.count += n as f64;
    }

    /// Most recent observed value.
    pub fn val(&self) -> f64 {
        self.val
    }

    /// Weighted mean of everything observed since the last reset.
    pub fn avg(&self) -> f64 {
        if self.count > 0.0 {
            self.sum / self.count
        } else {
            0.0
        }
    }
}

// ─── EvaluationResult ─────────────────────────────────────────────────────────

/// The five split-level statistics, fixed order (MAE first — it
/// drives best-checkpoint tracking).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationResult {
    pub mae:      f64,
    pub rmse:     f64,
    pub pearson:  f64,
    pub spearman: f64,
    pub r2:       f64,
}

impl EvaluationResult {
    /// Compute all five statistics over a full split.
    /// `pred` and `truth` are the concatenated per-sample values;
    /// both slices must have equal, non-zero length.
    pub fn compute(pred: &[f32], truth: &[f32]) -> Self {
        assert_eq!(pred.len(), truth.len(), "pred/truth length mismatch");
        assert!(!pred.is_empty(), "cannot evaluate an empty split");

        let pred: Vec<f64>  = pred.iter().map(|&v| v as f64).collect();
        let truth: Vec<f64> = truth.iter().map(|&v| v as f64).collect();
        let n = pred.len() as f64;

        let mae = pred
            .iter()
            .zip(&truth)
            .map(|(p, t)| (p - t).abs())
            .sum::<f64>()
            / n;
        let rmse = (pred
            .iter()
            .zip(&truth)
            .map(|(p, t)| (p - t).powi(2))
            .sum::<f64>()
            / n)
            .sqrt();

        let pearson  = pearson_r(&truth, &pred);
        let spearman = pearson_r(&average_ranks(&truth), &average_ranks(&pred));
        let r2       = r2_score(&pred, &truth);

        Self {
            mae,
            rmse,
            pearson,
            spearman,
            r2,
        }
    }

    /// Best-checkpoint rule: save if and only if validation MAE
    /// STRICTLY improves on the running best.
    pub fn is_improvement(&self, best_error: f64) -> bool {
        self.mae < best_error
    }
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MAE={:.3}, RMSE={:.3}, Pearson={:.3}, Spearman={:.3}, R2={:.3}",
            self.mae, self.rmse, self.pearson, self.spearman, self.r2
        )
    }
}

// ─── Statistics helpers ───────────────────────────────────────────────────────

/// Pearson correlation coefficient. NaN when either side is
/// constant (matching numpy's corrcoef on degenerate input).
pub fn pearson_r(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

/// Coefficient of determination: 1 − SS_res / SS_tot.
pub fn r2_score(pred: &[f64], truth: &[f64]) -> f64 {
    let n = truth.len() as f64;
    let mean_t = truth.iter().sum::<f64>() / n;
    let ss_res: f64 = pred
        .iter()
        .zip(truth)
        .map(|(p, t)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = truth.iter().map(|t| (t - mean_t).powi(2)).sum();
    1.0 - ss_res / ss_tot
}

/// 1-based ranks with ties resolved by averaging (the Spearman
/// convention, matching scipy.stats.spearmanr).
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        // Find the run of tied values [i, j).
        let mut j = i + 1;
        while j < order.len() && values[order[j]] == values[order[i]] {
            j += 1;
        }
        // Average of the 1-based positions i+1 ..= j.
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        for &idx in &order[i..j] {
            ranks[idx] = avg_rank;
        }
        i = j;
    }
    ranks
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_metric_weighted_average() {
        // avg == sum(vi*ci) / sum(ci)
        let mut meter = RunningMetric::new();
        meter.update(2.0, 4);
        meter.update(5.0, 1);
        meter.update(3.0, 5);
        let expected = (2.0 * 4.0 + 5.0 + 3.0 * 5.0) / 10.0;
        assert!((meter.avg() - expected).abs() < 1e-12);
        assert_eq!(meter.val(), 3.0);
    }

    #[test]
    fn test_running_metric_reset() {
        let mut meter = RunningMetric::new();
        meter.update(7.0, 3);
        meter.reset();
        assert_eq!(meter.avg(), 0.0);
        assert_eq!(meter.val(), 0.0);
    }

    #[test]
    fn test_perfect_predictions() {
        let truth = [21.0f32, 35.5, 48.0, 70.0];
        let result = EvaluationResult::compute(&truth, &truth);
        assert!(result.mae.abs() < 1e-12);
        assert!(result.rmse.abs() < 1e-12);
        assert!((result.pearson - 1.0).abs() < 1e-12);
        assert!((result.spearman - 1.0).abs() < 1e-12);
        assert!((result.r2 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_batch_order_invariance() {
        let pred  = [25.0f32, 31.0, 44.0, 52.0, 60.0, 18.0];
        let truth = [24.0f32, 35.0, 40.0, 55.0, 58.0, 20.0];

        // Same pairs, different concatenation order.
        let perm = [3usize, 0, 5, 1, 4, 2];
        let pred_p: Vec<f32>  = perm.iter().map(|&i| pred[i]).collect();
        let truth_p: Vec<f32> = perm.iter().map(|&i| truth[i]).collect();

        let a = EvaluationResult::compute(&pred, &truth);
        let b = EvaluationResult::compute(&pred_p, &truth_p);
        assert!((a.mae - b.mae).abs() < 1e-12);
        assert!((a.rmse - b.rmse).abs() < 1e-12);
        assert!((a.pearson - b.pearson).abs() < 1e-12);
        assert!((a.spearman - b.spearman).abs() < 1e-12);
        assert!((a.r2 - b.r2).abs() < 1e-12);
    }

    #[test]
    fn test_constant_truth_gives_undefined_pearson() {
        let result = EvaluationResult::compute(&[30.0, 31.0, 32.0], &[40.0, 40.0, 40.0]);
        assert!(result.pearson.is_nan());
    }

    #[test]
    fn test_spearman_on_monotone_nonlinear_data() {
        // Spearman sees perfect rank agreement even when the
        // relationship is nonlinear.
        let truth = [1.0f32, 2.0, 3.0, 4.0, 5.0];
        let pred  = [1.0f32, 4.0, 9.0, 16.0, 25.0];
        let result = EvaluationResult::compute(&pred, &truth);
        assert!((result.spearman - 1.0).abs() < 1e-12);
        assert!(result.pearson < 1.0);
    }

    #[test]
    fn test_average_ranks_with_ties() {
        // [10, 20, 20, 30] → ranks [1, 2.5, 2.5, 4]
        let ranks = average_ranks(&[10.0, 20.0, 20.0, 30.0]);
        assert_eq!(ranks, vec![1.0, 2.5, 2.5, 4.0]);
    }

    #[test]
    fn test_best_checkpoint_trigger_sequence() {
        // Validation MAE [5.0, 3.0, 4.0, 2.0] must trigger saves at
        // epochs 1, 2 and 4 only.
        let maes = [5.0, 3.0, 4.0, 2.0];
        let mut best_error = 1e10;
        let mut saved_at = Vec::new();

        for (epoch, &mae) in maes.iter().enumerate() {
            let result = EvaluationResult {
                mae,
                rmse: 0.0,
                pearson: 0.0,
                spearman: 0.0,
                r2: 0.0,
            };
            if result.is_improvement(best_error) {
                best_error = mae;
                saved_at.push(epoch + 1);
            }
        }
        assert_eq!(saved_at, vec![1, 2, 4]);
    }

    #[test]
    fn test_display_format() {
        let result = EvaluationResult {
            mae: 4.5,
            rmse: 6.25,
            pearson: 0.91,
            spearman: 0.9,
            r2: 0.8,
        };
        assert_eq!(
            result.to_string(),
            "MAE=4.500, RMSE=6.250, Pearson=0.910, Spearman=0.900, R2=0.800"
        );
    }
}
