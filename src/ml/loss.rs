// ============================================================
// Layer 5 — Regression Losses
// ============================================================
// Every criterion shares one contract:
//
//   loss(output [B,1], labels [B,1], feat [B,D], alpha) → scalar
//
// The base criterion is elementwise L1. FAR / ConR / ranksim add
// a feature-space regularizer on top of it (weighted by alpha);
// the focal variants replace it entirely (alpha acts as beta).
//
// Loss selection is an exhaustive enum: the CLI rejects unknown
// names outright, so a typo can never silently fall back to L1.
//
// References: Yang et al. (2021) Delving into Deep Imbalanced
//             Regression (focal losses); Keramati et al. (2023)
//             ConR; Gong et al. (2022) RankSim

use std::fmt;
use std::str::FromStr;

use burn::{
    prelude::*,
    tensor::activation::sigmoid,
};
use serde::{Deserialize, Serialize};

// ConR constants from the reference recipe.
const CONR_LABEL_WINDOW: f32 = 1.0;
const CONR_TEMPERATURE: f32 = 0.07;
const CONR_PUSHING_SCALE: f32 = 0.01;

// ─── Loss selection ───────────────────────────────────────────────────────────

/// The closed set of supported training criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossKind {
    /// Mean absolute error (the base criterion)
    L1,
    /// L1 + alpha * feature-alignment regularizer (linear label target)
    Far,
    /// L1 + alpha * feature-alignment regularizer (exp(-|Δy|) target)
    FarExp,
    /// L1 + alpha * contrastive regularizer over features
    ConR,
    /// L1 + alpha * batchwise ranking regularizer
    RankSim,
    /// Weighted focal L1 (alpha acts as beta)
    FocalL1,
    /// Weighted focal MSE (alpha acts as beta)
    FocalMse,
}

pub const ALL_LOSS_KINDS: [LossKind; 7] = [
    LossKind::L1,
    LossKind::Far,
    LossKind::FarExp,
    LossKind::ConR,
    LossKind::RankSim,
    LossKind::FocalL1,
    LossKind::FocalMse,
];

impl FromStr for LossKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L1"        => Ok(LossKind::L1),
            "FAR"       => Ok(LossKind::Far),
            "FAR-EXP"   => Ok(LossKind::FarExp),
            "ConR"      => Ok(LossKind::ConR),
            "ranksim"   => Ok(LossKind::RankSim),
            "focal-l1"  => Ok(LossKind::FocalL1),
            "focal-mse" => Ok(LossKind::FocalMse),
            other => Err(format!(
                "unknown loss '{other}' (expected L1/FAR/FAR-EXP/ConR/ranksim/focal-l1/focal-mse)"
            )),
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LossKind::L1       => "L1",
            LossKind::Far      => "FAR",
            LossKind::FarExp   => "FAR-EXP",
            LossKind::ConR     => "ConR",
            LossKind::RankSim  => "ranksim",
            LossKind::FocalL1  => "focal-l1",
            LossKind::FocalMse => "focal-mse",
        };
        write!(f, "{name}")
    }
}

/// Dispatch to the selected criterion. The match is exhaustive on
/// purpose — adding a LossKind without a formula will not compile.
pub fn compute<B: Backend>(
    kind:   LossKind,
    alpha:  f32,
    output: Tensor<B, 2>,
    labels: Tensor<B, 2>,
    feat:   Tensor<B, 2>,
) -> Tensor<B, 1> {
    match kind {
        LossKind::L1  => l1_loss(output, labels),
        LossKind::Far => {
            l1_loss(output.clone(), labels.clone()) + far_regularizer(feat, labels, false) * alpha
        }
        LossKind::FarExp => {
            l1_loss(output.clone(), labels.clone()) + far_regularizer(feat, labels, true) * alpha
        }
        LossKind::ConR => {
            l1_loss(output.clone(), labels.clone())
                + conr_regularizer(feat, labels, output) * alpha
        }
        LossKind::RankSim => {
            l1_loss(output.clone(), labels.clone()) + ranksim_regularizer(feat, labels) * alpha
        }
        LossKind::FocalL1  => weighted_focal_l1(output, labels, alpha),
        LossKind::FocalMse => weighted_focal_mse(output, labels, alpha),
    }
}

// ─── Base criterion ───────────────────────────────────────────────────────────

/// mean(|output − labels|)
pub fn l1_loss<B: Backend>(output: Tensor<B, 2>, labels: Tensor<B, 2>) -> Tensor<B, 1> {
    (output - labels).abs().mean()
}

// ─── Focal variants ───────────────────────────────────────────────────────────

/// mean(|d| · (2σ(β|d|) − 1)) with d = output − labels.
pub fn weighted_focal_l1<B: Backend>(
    output: Tensor<B, 2>,
    labels: Tensor<B, 2>,
    beta:   f32,
) -> Tensor<B, 1> {
    let abs_err = (output - labels).abs();
    let weight  = sigmoid(abs_err.clone() * beta) * 2.0 - 1.0;
    (abs_err * weight).mean()
}

/// mean(d² · (2σ(β|d|) − 1)) with d = output − labels.
pub fn weighted_focal_mse<B: Backend>(
    output: Tensor<B, 2>,
    labels: Tensor<B, 2>,
    beta:   f32,
) -> Tensor<B, 1> {
    let err     = output - labels;
    let weight  = sigmoid(err.clone().abs() * beta) * 2.0 - 1.0;
    (err.powf_scalar(2.0) * weight).mean()
}

// ─── Feature-alignment regularization (FAR) ───────────────────────────────────

/// Penalizes the squared mismatch between pairwise cosine feature
/// similarity and a label-derived target similarity, off-diagonal
/// pairs only. The linear target is 1 − |Δy|/max|Δy|; the EXP
/// variant uses exp(−|Δy|), which concentrates alignment pressure
/// on near-neighbour pairs.
pub fn far_regularizer<B: Backend>(
    feat:         Tensor<B, 2>,
    labels:       Tensor<B, 2>,
    exp_weighted: bool,
) -> Tensor<B, 1> {
    let [batch_size, _] = feat.dims();
    let device = feat.device();

    let sim    = cosine_similarity_matrix(feat);
    let l_dist = pairwise_distances(labels);

    // Label-similarity target. Labels carry no gradient, so reading the
    // batch maximum as a host scalar is safe.
    let target = if exp_weighted {
        l_dist.clone().neg().exp()
    } else {
        let max_dist: f32 = l_dist.clone().max().into_scalar().elem::<f32>();
        -l_dist.clone() / max_dist.max(f32::EPSILON) + 1.0
    };

    let off_diag = off_diagonal_mask::<B>(batch_size, &device);
    let sq_err   = (sim - target).powf_scalar(2.0) * off_diag.clone();
    sq_err.sum() / off_diag.sum().clamp_min(1.0)
}

// ─── ConR ─────────────────────────────────────────────────────────────────────

/// Contrastive regularizer for regression: anchors pull label-close
/// pairs together and push away label-distant pairs whose predictions
/// nevertheless collide. Anchors without any such negative contribute
/// zero.
pub fn conr_regularizer<B: Backend>(
    feat:   Tensor<B, 2>,
    labels: Tensor<B, 2>,
    output: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let [batch_size, _] = feat.dims();
    let device = feat.device();

    let sim     = cosine_similarity_matrix(feat) / CONR_TEMPERATURE;
    let exp_sim = sim.clone().exp();

    let l_dist = pairwise_distances(labels);
    let p_dist = pairwise_distances(output);

    let off_diag = off_diagonal_mask::<B>(batch_size, &device);
    let pos = l_dist.clone().lower_equal_elem(CONR_LABEL_WINDOW).float() * off_diag;
    let neg = l_dist.clone().greater_elem(CONR_LABEL_WINDOW).float()
        * p_dist.lower_equal_elem(CONR_LABEL_WINDOW).float();

    // Label-distant negatives are pushed harder: weight exp(e · |Δy|).
    let pushing  = (l_dist * CONR_PUSHING_SCALE).exp();
    let neg_sum  = (exp_sim.clone() * neg.clone() * pushing).sum_dim(1); // [B,1]
    let denom    = exp_sim.sum_dim(1) + neg_sum;                         // [B,1]
    let log_prob = sim - denom.log();                                    // [B,B] broadcast

    let per_anchor = (log_prob * pos.clone()).sum_dim(1).neg()
        / pos.sum_dim(1).clamp_min(1.0); // [B,1]
    let has_neg = neg.sum_dim(1).greater_elem(0.0).float(); // [B,1]
    (per_anchor * has_neg).mean()
}

// ─── RankSim ──────────────────────────────────────────────────────────────────

/// Batchwise ranking regularizer: per anchor, regress the
/// row-standardized feature similarities toward the standardized
/// ranks of label closeness. Rank targets are computed host-side
/// (labels carry no gradient); the feature side stays differentiable.
pub fn ranksim_regularizer<B: Backend>(feat: Tensor<B, 2>, labels: Tensor<B, 2>) -> Tensor<B, 1> {
    let [batch_size, _] = feat.dims();
    let device = feat.device();

    if batch_size < 2 {
        return Tensor::zeros([1], &device);
    }

    // Label closeness ranks, standardized per row.
    let label_values: Vec<f32> = labels
        .to_data()
        .to_vec()
        .expect("labels tensor is contiguous f32");
    let mut targets = Vec::with_capacity(batch_size * batch_size);
    for i in 0..batch_size {
        let closeness: Vec<f64> = (0..batch_size)
            .map(|j| -((label_values[i] - label_values[j]).abs() as f64))
            .collect();
        let ranks = crate::infra::metrics::average_ranks(&closeness);
        targets.extend(standardize(&ranks).into_iter().map(|v| v as f32));
    }
    let target = Tensor::<B, 1>::from_floats(targets.as_slice(), &device)
        .reshape([batch_size, batch_size]);

    // Row-standardized feature similarities (differentiable side).
    let sim      = cosine_similarity_matrix(feat);
    let centered = sim.clone() - sim.mean_dim(1);
    let std_dev  = (centered.clone().powf_scalar(2.0).mean_dim(1) + 1e-8).sqrt();
    let sim_std  = centered / std_dev;

    (sim_std - target).powf_scalar(2.0).mean()
}

fn standardize(values: &[f64]) -> Vec<f64> {
    let n    = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var  = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std  = (var + 1e-8).sqrt();
    values.iter().map(|v| (v - mean) / std).collect()
}

// ─── Shared pairwise helpers ──────────────────────────────────────────────────

/// Row-normalized features → cosine similarity matrix [B,B].
fn cosine_similarity_matrix<B: Backend>(feat: Tensor<B, 2>) -> Tensor<B, 2> {
    let norm = (feat.clone().powf_scalar(2.0).sum_dim(1) + 1e-12).sqrt(); // [B,1]
    let unit = feat / norm;
    unit.clone().matmul(unit.transpose())
}

/// |v_i − v_j| for a column vector [B,1] → [B,B].
fn pairwise_distances<B: Backend>(values: Tensor<B, 2>) -> Tensor<B, 2> {
    (values.clone() - values.transpose()).abs()
}

/// Ones everywhere except the diagonal.
fn off_diagonal_mask<B: Backend>(size: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut mask = vec![1.0f32; size * size];
    for i in 0..size {
        mask[i * size + i] = 0.0;
    }
    Tensor::<B, 1>::from_floats(mask.as_slice(), device).reshape([size, size])
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn column(values: &[f32]) -> Tensor<B, 2> {
        let device = Default::default();
        Tensor::<B, 1>::from_floats(values, &device).reshape([values.len(), 1])
    }

    fn scalar(t: Tensor<B, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    #[test]
    fn test_loss_kind_round_trip_is_exhaustive() {
        for kind in ALL_LOSS_KINDS {
            let parsed: LossKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("focal".parse::<LossKind>().is_err());
    }

    #[test]
    fn test_l1_golden_value() {
        let loss = l1_loss(column(&[2.0, 4.0]), column(&[1.0, 2.0]));
        assert!((scalar(loss) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_focal_l1_golden_value() {
        // d = [1, 2], beta = 0.5:
        //   mean(1 * (2σ(0.5) − 1), 2 * (2σ(1.0) − 1)) = 0.5845765
        let loss = weighted_focal_l1(column(&[2.0, 4.0]), column(&[1.0, 2.0]), 0.5);
        assert!((scalar(loss) - 0.584_576_5).abs() < 1e-5);
    }

    #[test]
    fn test_focal_mse_golden_value() {
        // d² = [1, 4], same weights: mean = 1.0466937
        let loss = weighted_focal_mse(column(&[2.0, 4.0]), column(&[1.0, 2.0]), 0.5);
        assert!((scalar(loss) - 1.046_693_7).abs() < 1e-5);
    }

    #[test]
    fn test_focal_weight_vanishes_at_zero_error() {
        let loss = weighted_focal_l1(column(&[3.0, 7.0]), column(&[3.0, 7.0]), 0.5);
        assert!(scalar(loss).abs() < 1e-7);
    }

    #[test]
    fn test_far_adds_nonnegative_regularizer() {
        let device = Default::default();
        let output = column(&[20.0, 30.0, 40.0]);
        let labels = column(&[22.0, 29.0, 41.0]);
        let feat = Tensor::<B, 1>::from_floats(
            [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0].as_slice(),
            &device,
        )
        .reshape([3, 3]);

        let base = scalar(l1_loss(output.clone(), labels.clone()));
        for kind in [LossKind::Far, LossKind::FarExp] {
            let total = scalar(compute(kind, 1.0, output.clone(), labels.clone(), feat.clone()));
            assert!(total.is_finite());
            assert!(total >= base - 1e-6, "{kind}: {total} < {base}");
        }
    }

    #[test]
    fn test_conr_without_negatives_reduces_to_l1() {
        let device = Default::default();
        // Labels within the window w=1 of each other → no negative pairs.
        let output = column(&[10.0, 10.4]);
        let labels = column(&[10.0, 10.5]);
        let feat = Tensor::<B, 1>::from_floats([1.0, 0.0, 0.0, 1.0].as_slice(), &device)
            .reshape([2, 2]);

        let total = scalar(compute(LossKind::ConR, 2.0, output.clone(), labels.clone(), feat));
        let base  = scalar(l1_loss(output, labels));
        assert!((total - base).abs() < 1e-6);
    }

    #[test]
    fn test_conr_penalizes_colliding_predictions() {
        // Two label-close anchors (20.0 / 20.5) plus one label-distant
        // sample at 60. Only an anchor with BOTH a positive pair and a
        // colliding negative contributes, so the regularizer is positive
        // exactly when the distant sample's prediction collapses onto
        // the anchors' predictions.
        let device = Default::default();
        let labels = column(&[20.0, 20.5, 60.0]);
        let feat = Tensor::<B, 1>::from_floats(
            [1.0, 0.0, 0.9, 0.1, 0.0, 1.0].as_slice(),
            &device,
        )
        .reshape([3, 2]);

        let colliding = scalar(conr_regularizer(
            feat.clone(),
            labels.clone(),
            column(&[30.0, 30.3, 30.2]),
        ));
        assert!(colliding > 0.0, "expected positive ConR regularizer, got {colliding}");

        // Same batch with the distant sample predicted far away:
        // no negative pair anywhere, every anchor contributes zero.
        let separated = scalar(conr_regularizer(feat, labels, column(&[30.0, 30.3, 70.0])));
        assert!(separated.abs() < 1e-6, "expected zero regularizer, got {separated}");
    }

    #[test]
    fn test_ranksim_is_finite_and_batch_of_one_is_zero() {
        let device = Default::default();
        let feat = Tensor::<B, 1>::from_floats(
            [1.0, 0.0, 0.9, 0.1, 0.0, 1.0].as_slice(),
            &device,
        )
        .reshape([3, 2]);
        let reg = scalar(ranksim_regularizer(feat, column(&[20.0, 25.0, 70.0])));
        assert!(reg.is_finite() && reg >= 0.0);

        let single = Tensor::<B, 1>::from_floats([1.0, 0.0].as_slice(), &device).reshape([1, 2]);
        assert_eq!(scalar(ranksim_regularizer(single, column(&[30.0]))), 0.0);
    }
}
