// ============================================================
// Layer 5 — ResNet Age Regressor (Burn)
// ============================================================
// A ResNet encoder followed by a linear regression head.
// forward() returns BOTH the scalar prediction and the pooled
// feature vector, because the FAR/ConR/ranksim losses consume
// the intermediate representation as well as the output.
//
// Architectures:
//   resnet18 — basic blocks,      stages [2, 2, 2, 2], 512-d features
//   resnet50 — bottleneck blocks, stages [3, 4, 6, 3], 2048-d features
//
// Both are expressed with one ResidualBlock type (the optional
// third conv is the bottleneck expansion), so checkpoints of
// either architecture share the same module tree shape.
//
// Reference: He et al. (2016) Deep Residual Learning

use std::fmt;
use std::str::FromStr;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};
use serde::{Deserialize, Serialize};

/// Bottleneck blocks expand their plane count by this factor.
const BOTTLENECK_EXPANSION: usize = 4;

// ─── Closed choices ───────────────────────────────────────────────────────────

/// Which encoder architecture to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    ResNet18,
    ResNet50,
}

impl ModelKind {
    /// Dimensionality of the pooled feature vector.
    pub fn feat_dim(self) -> usize {
        match self {
            ModelKind::ResNet18 => 512,
            ModelKind::ResNet50 => 512 * BOTTLENECK_EXPANSION,
        }
    }

    fn stage_blocks(self) -> [usize; 4] {
        match self {
            ModelKind::ResNet18 => [2, 2, 2, 2],
            ModelKind::ResNet50 => [3, 4, 6, 3],
        }
    }

    fn bottleneck(self) -> bool {
        matches!(self, ModelKind::ResNet50)
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resnet18" => Ok(ModelKind::ResNet18),
            "resnet50" => Ok(ModelKind::ResNet50),
            other      => Err(format!("unknown model '{other}' (expected resnet18/resnet50)")),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::ResNet18 => write!(f, "resnet18"),
            ModelKind::ResNet50 => write!(f, "resnet50"),
        }
    }
}

/// Which dataset the run trains on. Determines the manifest file
/// name and the label dimensionality of the regression head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetKind {
    AgeDb,
}

impl DatasetKind {
    pub fn label_dim(self) -> usize {
        match self {
            DatasetKind::AgeDb => 1,
        }
    }

    pub fn manifest_file(self) -> &'static str {
        match self {
            DatasetKind::AgeDb => "agedb.csv",
        }
    }
}

impl FromStr for DatasetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AgeDB" => Ok(DatasetKind::AgeDb),
            other   => Err(format!("unknown dataset '{other}' (expected AgeDB)")),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKind::AgeDb => write!(f, "AgeDB"),
        }
    }
}

// ─── Model configuration ──────────────────────────────────────────────────────

/// Architecture hyperparameters. Plain struct (no builder) — both
/// fields are mandatory and come straight from the RunConfig.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AgeModelConfig {
    pub arch:      ModelKind,
    pub label_dim: usize,
}

impl AgeModelConfig {
    pub fn new(arch: ModelKind, label_dim: usize) -> Self {
        Self { arch, label_dim }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> AgeModel<B> {
        let stem_conv = Conv2dConfig::new([3, 64], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);
        let stem_bn = BatchNormConfig::new(64).init(device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let bottleneck = self.arch.bottleneck();
        let blocks     = self.arch.stage_blocks();

        let (stage1, planes) = residual_stage(64, 64, blocks[0], 1, bottleneck, device);
        let (stage2, planes) = residual_stage(planes, 128, blocks[1], 2, bottleneck, device);
        let (stage3, planes) = residual_stage(planes, 256, blocks[2], 2, bottleneck, device);
        let (stage4, planes) = residual_stage(planes, 512, blocks[3], 2, bottleneck, device);
        debug_assert_eq!(planes, self.arch.feat_dim());

        AgeModel {
            stem_conv,
            stem_bn,
            maxpool,
            stage1,
            stage2,
            stage3,
            stage4,
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            head:    LinearConfig::new(planes, self.label_dim).init(device),
        }
    }
}

/// Build one stage of `count` residual blocks; the first block carries
/// the stride (spatial downsampling) and the channel change.
fn residual_stage<B: Backend>(
    in_planes:  usize,
    planes:     usize,
    count:      usize,
    stride:     usize,
    bottleneck: bool,
    device:     &B::Device,
) -> (Vec<ResidualBlock<B>>, usize) {
    let mut blocks = Vec::with_capacity(count);
    let (first, mut out_planes) = ResidualBlock::new(in_planes, planes, stride, bottleneck, device);
    blocks.push(first);
    for _ in 1..count {
        let (block, planes_out) = ResidualBlock::new(out_planes, planes, 1, bottleneck, device);
        out_planes = planes_out;
        blocks.push(block);
    }
    (blocks, out_planes)
}

// ─── Residual block ───────────────────────────────────────────────────────────

/// 1x1 conv + batchnorm used when the identity shortcut cannot be
/// added directly (stride or channel mismatch).
#[derive(Module, Debug)]
pub struct Shortcut<B: Backend> {
    conv: Conv2d<B>,
    bn:   BatchNorm<B, 2>,
}

impl<B: Backend> Shortcut<B> {
    fn new(in_planes: usize, out_planes: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_planes, out_planes], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_planes).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// One residual block. With conv3 absent this is the basic two-conv
/// block (resnet18); with conv3 present it is the 1x1 → 3x3 → 1x1
/// bottleneck (resnet50).
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    conv1:    Conv2d<B>,
    bn1:      BatchNorm<B, 2>,
    conv2:    Conv2d<B>,
    bn2:      BatchNorm<B, 2>,
    conv3:    Option<Conv2d<B>>,
    bn3:      Option<BatchNorm<B, 2>>,
    shortcut: Option<Shortcut<B>>,
}

impl<B: Backend> ResidualBlock<B> {
    /// Returns the block and its output plane count.
    fn new(
        in_planes:  usize,
        planes:     usize,
        stride:     usize,
        bottleneck: bool,
        device:     &B::Device,
    ) -> (Self, usize) {
        let out_planes = if bottleneck {
            planes * BOTTLENECK_EXPANSION
        } else {
            planes
        };

        let (conv1, bn1, conv2, bn2, conv3, bn3) = if bottleneck {
            (
                Conv2dConfig::new([in_planes, planes], [1, 1])
                    .with_bias(false)
                    .init(device),
                BatchNormConfig::new(planes).init(device),
                Conv2dConfig::new([planes, planes], [3, 3])
                    .with_stride([stride, stride])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .with_bias(false)
                    .init(device),
                BatchNormConfig::new(planes).init(device),
                Some(
                    Conv2dConfig::new([planes, out_planes], [1, 1])
                        .with_bias(false)
                        .init(device),
                ),
                Some(BatchNormConfig::new(out_planes).init(device)),
            )
        } else {
            (
                Conv2dConfig::new([in_planes, planes], [3, 3])
                    .with_stride([stride, stride])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .with_bias(false)
                    .init(device),
                BatchNormConfig::new(planes).init(device),
                Conv2dConfig::new([planes, planes], [3, 3])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .with_bias(false)
                    .init(device),
                BatchNormConfig::new(planes).init(device),
                None,
                None,
            )
        };

        let shortcut = (stride != 1 || in_planes != out_planes)
            .then(|| Shortcut::new(in_planes, out_planes, stride, device));

        let block = Self {
            conv1,
            bn1,
            conv2,
            bn2,
            conv3,
            bn3,
            shortcut,
        };
        (block, out_planes)
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.shortcut {
            Some(shortcut) => shortcut.forward(x.clone()),
            None => x.clone(),
        };

        let mut out = relu(self.bn1.forward(self.conv1.forward(x)));
        out = self.bn2.forward(self.conv2.forward(out));
        if let (Some(conv3), Some(bn3)) = (&self.conv3, &self.bn3) {
            out = bn3.forward(conv3.forward(relu(out)));
        }
        relu(out + identity)
    }
}

// ─── Full model ───────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct AgeModel<B: Backend> {
    stem_conv: Conv2d<B>,
    stem_bn:   BatchNorm<B, 2>,
    maxpool:   MaxPool2d,
    stage1:    Vec<ResidualBlock<B>>,
    stage2:    Vec<ResidualBlock<B>>,
    stage3:    Vec<ResidualBlock<B>>,
    stage4:    Vec<ResidualBlock<B>>,
    avgpool:   AdaptiveAvgPool2d,
    head:      Linear<B>,
}

impl<B: Backend> AgeModel<B> {
    /// images: [batch, 3, H, W] → (prediction [batch, label_dim],
    /// pooled features [batch, feat_dim]).
    pub fn forward(&self, images: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let mut x = relu(self.stem_bn.forward(self.stem_conv.forward(images)));
        x = self.maxpool.forward(x);

        for stage in [&self.stage1, &self.stage2, &self.stage3, &self.stage4] {
            for block in stage {
                x = block.forward(x);
            }
        }

        let [batch_size, channels, _, _] = x.dims();
        let feat = self
            .avgpool
            .forward(x)
            .reshape([batch_size, channels]);
        let output = self.head.forward(feat.clone());
        (output, feat)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_resnet18_forward_shapes() {
        let device = Default::default();
        let model: AgeModel<NdArray> = AgeModelConfig::new(ModelKind::ResNet18, 1).init(&device);

        // Adaptive pooling makes the encoder resolution agnostic; a small
        // input keeps this test fast.
        let images = Tensor::<NdArray, 4>::zeros([2, 3, 32, 32], &device);
        let (output, feat) = model.forward(images);

        assert_eq!(output.dims(), [2, 1]);
        assert_eq!(feat.dims(), [2, 512]);
    }

    #[test]
    fn test_model_kind_parsing() {
        assert_eq!("resnet18".parse::<ModelKind>().unwrap(), ModelKind::ResNet18);
        assert_eq!("resnet50".parse::<ModelKind>().unwrap(), ModelKind::ResNet50);
        assert!("resnet34".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_feat_dims() {
        assert_eq!(ModelKind::ResNet18.feat_dim(), 512);
        assert_eq!(ModelKind::ResNet50.feat_dim(), 2048);
    }

    #[test]
    fn test_dataset_kind() {
        let kind: DatasetKind = "AgeDB".parse().unwrap();
        assert_eq!(kind.label_dim(), 1);
        assert_eq!(kind.manifest_file(), "agedb.csv");
        assert!("IMDB-WIKI".parse::<DatasetKind>().is_err());
    }
}
