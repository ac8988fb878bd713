// ============================================================
// Layer 4 — Age Dataset (Burn Dataset trait)
// ============================================================
// Wraps the manifest records of one split so Burn's DataLoader
// can call .get(index) and .len() on it. Images are decoded
// lazily per access, which also means the train augmentations
// are re-sampled every epoch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use rand::thread_rng;

use crate::data::transforms::TransformPipeline;
use crate::domain::AgeRecord;

/// One decoded, transformed sample: normalized CHW pixels plus
/// the scalar age label.
#[derive(Debug, Clone)]
pub struct AgeSample {
    pub pixels: Vec<f32>,
    pub label:  f32,
}

pub struct AgeDataset {
    root:      PathBuf,
    records:   Vec<AgeRecord>,
    transform: TransformPipeline,
}

impl AgeDataset {
    pub fn new(root: impl Into<PathBuf>, records: Vec<AgeRecord>, transform: TransformPipeline) -> Self {
        Self {
            root: root.into(),
            records,
            transform,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.records.len()
    }

    fn load_sample(&self, record: &AgeRecord) -> Result<AgeSample> {
        let path = self.root.join(&record.path);
        let img = image::open(&path)
            .with_context(|| format!("cannot open image '{}'", path.display()))?
            .to_rgb8();

        let mut rng = thread_rng();
        Ok(AgeSample {
            pixels: self.transform.apply(&img, &mut rng),
            label:  record.age,
        })
    }
}

impl Dataset<AgeSample> for AgeDataset {
    fn get(&self, index: usize) -> Option<AgeSample> {
        let record = self.records.get(index)?;
        // Dataset::get has no error channel; a missing or corrupt image
        // mid-epoch is unrecoverable, so surface it as a panic with context
        // instead of silently truncating the epoch by returning None.
        match self.load_sample(record) {
            Ok(sample) => Some(sample),
            Err(e) => panic!("failed to load sample {index} ('{}'): {e:#}", record.path),
        }
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
