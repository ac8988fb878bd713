// ============================================================
// Layer 4 — Image Transform Pipelines
// ============================================================
// Converts a decoded RGB image into the normalized CHW float
// buffer the model consumes. The train split runs the
// augmentations requested on the command line; val/test only
// resize and normalize, so evaluation is deterministic.
//
// Supported augmentation tokens (--aug crop,flip,color,grayscale):
//   crop      — pad 16px (edge replicate) then random 224 crop
//   flip      — horizontal flip with p = 0.5
//   color     — random brightness / contrast jitter
//   grayscale — full desaturation with p = 0.2
//
// An unknown token is a hard error: augmentation names are part
// of the run configuration (they are embedded in the run name),
// so a typo must not silently change the experiment.

use std::str::FromStr;

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use rand::Rng;

/// Model input resolution (square)
pub const IMAGE_SIZE: u32 = 224;

/// Edge padding applied before the random crop
const CROP_PADDING: u32 = 16;

// ImageNet channel statistics, matching the encoder's pretraining recipe.
const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// One augmentation step of the train pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugOp {
    Crop,
    Flip,
    Color,
    Grayscale,
}

impl FromStr for AugOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crop"      => Ok(AugOp::Crop),
            "flip"      => Ok(AugOp::Flip),
            "color"     => Ok(AugOp::Color),
            "grayscale" => Ok(AugOp::Grayscale),
            other => Err(format!(
                "unknown augmentation '{other}' (expected crop/flip/color/grayscale)"
            )),
        }
    }
}

/// The per-split transform: a fixed resize plus zero or more
/// random augmentation ops, ending in channel normalization.
#[derive(Debug, Clone)]
pub struct TransformPipeline {
    ops: Vec<AugOp>,
}

impl TransformPipeline {
    /// Build the train pipeline from the comma separated --aug list.
    pub fn for_train(aug: &str) -> Result<Self> {
        let ops = aug
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| t.parse::<AugOp>().map_err(anyhow::Error::msg))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("invalid --aug list '{aug}'"))?;
        Ok(Self { ops })
    }

    /// The val/test pipeline: resize + normalize only.
    pub fn for_eval() -> Self {
        Self { ops: Vec::new() }
    }

    /// Number of augmentation ops (0 for the eval pipeline).
    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    /// Apply the pipeline, producing normalized pixels in CHW order
    /// (length 3 * IMAGE_SIZE * IMAGE_SIZE).
    pub fn apply<R: Rng>(&self, img: &RgbImage, rng: &mut R) -> Vec<f32> {
        let mut img = if img.dimensions() == (IMAGE_SIZE, IMAGE_SIZE) {
            img.clone()
        } else {
            imageops::resize(img, IMAGE_SIZE, IMAGE_SIZE, FilterType::Triangle)
        };

        for op in &self.ops {
            img = match op {
                AugOp::Crop => random_crop(&img, rng),
                AugOp::Flip => {
                    if rng.gen_bool(0.5) {
                        imageops::flip_horizontal(&img)
                    } else {
                        img
                    }
                }
                AugOp::Color => {
                    let delta    = rng.gen_range(-32i32..=32);
                    let contrast = rng.gen_range(-20.0f32..20.0);
                    imageops::contrast(&imageops::brighten(&img, delta), contrast)
                }
                AugOp::Grayscale => {
                    if rng.gen_bool(0.2) {
                        desaturate(&img)
                    } else {
                        img
                    }
                }
            };
        }

        normalize_chw(&img)
    }
}

/// Pad by edge replication, then crop back to IMAGE_SIZE at a
/// random offset (the torchvision RandomCrop(224, padding=16) analogue).
fn random_crop<R: Rng>(img: &RgbImage, rng: &mut R) -> RgbImage {
    let (w, h) = img.dimensions();
    let padded = RgbImage::from_fn(w + 2 * CROP_PADDING, h + 2 * CROP_PADDING, |x, y| {
        let sx = x.saturating_sub(CROP_PADDING).min(w - 1);
        let sy = y.saturating_sub(CROP_PADDING).min(h - 1);
        *img.get_pixel(sx, sy)
    });

    let x0 = rng.gen_range(0..=2 * CROP_PADDING);
    let y0 = rng.gen_range(0..=2 * CROP_PADDING);
    imageops::crop_imm(&padded, x0, y0, IMAGE_SIZE, IMAGE_SIZE).to_image()
}

/// Replace every pixel by its Rec.601 luma.
fn desaturate(img: &RgbImage) -> RgbImage {
    let mut out = img.clone();
    for px in out.pixels_mut() {
        let [r, g, b] = px.0;
        let luma = (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8;
        px.0 = [luma, luma, luma];
    }
    out
}

/// Scale to [0,1], normalize per channel, lay out channels-first.
fn normalize_chw(img: &RgbImage) -> Vec<f32> {
    let (w, h) = img.dimensions();
    let mut out = Vec::with_capacity(3 * (w * h) as usize);
    for c in 0..3 {
        for y in 0..h {
            for x in 0..w {
                let v = img.get_pixel(x, y).0[c] as f32 / 255.0;
                out.push((v - CHANNEL_MEAN[c as usize]) / CHANNEL_STD[c as usize]);
            }
        }
    }
    out
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gray_image(value: u8) -> RgbImage {
        RgbImage::from_pixel(IMAGE_SIZE, IMAGE_SIZE, image::Rgb([value, value, value]))
    }

    #[test]
    fn test_parse_full_aug_list() {
        let pipeline = TransformPipeline::for_train("crop,flip,color,grayscale").unwrap();
        assert_eq!(pipeline.op_count(), 4);
    }

    #[test]
    fn test_unknown_aug_token_is_fatal() {
        assert!(TransformPipeline::for_train("crop,cutmix").is_err());
    }

    #[test]
    fn test_eval_pipeline_output_shape_and_values() {
        let mut rng = StdRng::seed_from_u64(7);
        let pixels = TransformPipeline::for_eval().apply(&gray_image(128), &mut rng);
        assert_eq!(pixels.len(), (3 * IMAGE_SIZE * IMAGE_SIZE) as usize);

        // Channel 0 of a uniform 128-gray image: (128/255 - mean) / std.
        let expected = (128.0 / 255.0 - CHANNEL_MEAN[0]) / CHANNEL_STD[0];
        assert!((pixels[0] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_eval_pipeline_is_deterministic() {
        let mut rng_a = StdRng::seed_from_u64(1);
        let mut rng_b = StdRng::seed_from_u64(2);
        let pipeline  = TransformPipeline::for_eval();
        let img = gray_image(40);
        // No augmentation ops means no rng draws at all.
        assert_eq!(pipeline.apply(&img, &mut rng_a), pipeline.apply(&img, &mut rng_b));
    }

    #[test]
    fn test_random_crop_keeps_size() {
        let mut rng = StdRng::seed_from_u64(3);
        let cropped = random_crop(&gray_image(10), &mut rng);
        assert_eq!(cropped.dimensions(), (IMAGE_SIZE, IMAGE_SIZE));
    }
}
