// ============================================================
// Layer 4 — Age Batcher
// ============================================================
// Implements Burn's Batcher trait to convert a Vec<AgeSample>
// into model-ready tensors.
//
// How batching works here:
//   Input:  Vec of N AgeSamples, each with 3*224*224 pixels
//   Output: AgeBatch with an image tensor [N, 3, 224, 224]
//           and a label tensor [N, 1]
//
// All samples come out of the transform pipeline at a fixed
// resolution, so batching is a flatten + reshape with no
// dynamic padding.

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::dataset::AgeSample;
use crate::data::transforms::IMAGE_SIZE;

// ─── AgeBatch ─────────────────────────────────────────────────────────────────
/// A batch of face images ready for the model forward pass.
/// All tensors have batch_size as their first dimension.
///
/// B is the Burn Backend (e.g. NdArray, Autodiff<NdArray>) —
/// generic so the same batcher works for training and inference.
#[derive(Debug, Clone)]
pub struct AgeBatch<B: Backend> {
    /// Normalized images — shape: [batch_size, 3, 224, 224]
    pub images: Tensor<B, 4>,

    /// Ground truth ages — shape: [batch_size, 1]
    pub labels: Tensor<B, 2>,
}

// ─── AgeBatcher ───────────────────────────────────────────────────────────────
/// The batcher struct — holds the target device so tensors
/// are created on the correct backend device.
#[derive(Clone, Debug)]
pub struct AgeBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> AgeBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<AgeSample, AgeBatch<B>> for AgeBatcher<B> {
    /// Convert a Vec of AgeSamples into a single AgeBatch.
    fn batch(&self, items: Vec<AgeSample>) -> AgeBatch<B> {
        let batch_size = items.len();
        let side       = IMAGE_SIZE as usize;

        // Pixels are already CHW per sample; concatenating them yields
        // the NCHW layout directly.
        let pixel_flat: Vec<f32> = items.iter().flat_map(|s| s.pixels.iter().copied()).collect();
        let label_flat: Vec<f32> = items.iter().map(|s| s.label).collect();

        let images = Tensor::<B, 1>::from_floats(pixel_flat.as_slice(), &self.device)
            .reshape([batch_size, 3, side, side]);
        let labels = Tensor::<B, 1>::from_floats(label_flat.as_slice(), &self.device)
            .reshape([batch_size, 1]);

        AgeBatch { images, labels }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    fn sample(label: f32, fill: f32) -> AgeSample {
        AgeSample {
            pixels: vec![fill; (3 * IMAGE_SIZE * IMAGE_SIZE) as usize],
            label,
        }
    }

    #[test]
    fn test_batch_shapes() {
        let device  = Default::default();
        let batcher = AgeBatcher::<NdArray>::new(device);
        let batch   = batcher.batch(vec![sample(20.0, 0.0), sample(40.0, 1.0), sample(60.0, 2.0)]);

        let side = IMAGE_SIZE as usize;
        assert_eq!(batch.images.dims(), [3, 3, side, side]);
        assert_eq!(batch.labels.dims(), [3, 1]);
    }

    #[test]
    fn test_labels_keep_sample_order() {
        let device  = Default::default();
        let batcher = AgeBatcher::<NdArray>::new(device);
        let batch   = batcher.batch(vec![sample(20.0, 0.0), sample(40.0, 0.0)]);

        let labels: Vec<f32> = batch.labels.into_data().to_vec().unwrap();
        assert_eq!(labels, vec![20.0, 40.0]);
    }
}
