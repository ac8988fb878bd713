// ============================================================
// Layer 5 — Learning Rate Schedule
// ============================================================
// Cosine annealing keyed on the epoch number. The floor is tied
// to the decay rate (eta_min = lr * rate³), so `--lr-decay-rate
// 0.1` anneals from lr down to lr/1000 over the run:
//
//   lr_e = eta_min + (lr − eta_min) · (1 + cos(π·e/E)) / 2
//
// Recomputed at the start of every epoch and handed to the
// optimizer step (Burn optimizers take the learning rate per
// step rather than storing it).

use std::f64::consts::PI;

/// Learning rate for `epoch` (1-based, like the training loop).
pub fn annealed_lr(base_lr: f64, decay_rate: f64, epoch: usize, total_epochs: usize) -> f64 {
    let eta_min = base_lr * decay_rate.powi(3);
    if total_epochs == 0 {
        return base_lr;
    }
    let progress = (epoch.min(total_epochs)) as f64 / total_epochs as f64;
    eta_min + (base_lr - eta_min) * (1.0 + (PI * progress).cos()) / 2.0
}
