use burn::{
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::*,
};

use crate::ml::backbone::{Vgg16Features, Vgg16FeaturesConfig};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally, so do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct AlzClassifierConfig {
    pub num_classes: usize,
    /// Side length of the square input images
    pub image_size:  usize,
    pub backbone:    Vgg16FeaturesConfig,
    #[config(default = 256)]
    pub hidden_units: usize,
    #[config(default = 0.5)]
    pub dropout:      f64,
}

impl AlzClassifierConfig {
    /// VGG16 backbone on 224x224 inputs with the default head.
    pub fn vgg16(num_classes: usize) -> Self {
        Self::new(num_classes, 224, Vgg16FeaturesConfig::vgg16())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> AlzClassifier<B> {
        let backbone = self.backbone.init(device);
        let flat     = self.backbone.feature_len(self.image_size);
        let fc1      = LinearConfig::new(flat, self.hidden_units).init(device);
        let fc2      = LinearConfig::new(self.hidden_units, self.num_classes).init(device);
        let dropout  = DropoutConfig::new(self.dropout).init();

        AlzClassifier {
            backbone,
            fc1,
            fc2,
            dropout,
            frozen_blocks: 0,
        }
    }
}

/// VGG16 features → flatten → Dense(hidden, ReLU) → Dropout → Dense(classes)
#[derive(Module, Debug)]
pub struct AlzClassifier<B: Backend> {
    pub backbone:      Vgg16Features<B>,
    pub fc1:           Linear<B>,
    pub fc2:           Linear<B>,
    pub dropout:       Dropout,
    /// Leading backbone blocks that receive no gradient
    pub frozen_blocks: usize,
}

impl<B: Backend> AlzClassifier<B> {
    /// Freeze the first `n` backbone blocks (clamped to the block count).
    pub fn with_frozen_blocks(mut self, n: usize) -> Self {
        self.frozen_blocks = n.min(self.backbone.num_blocks());
        self
    }

    /// images: [batch, 3, H, W] → logits: [batch, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(images, self.frozen_blocks);
        let x = features.flatten::<2>(1, 3);
        let x = burn::tensor::activation::relu(self.fc1.forward(x));
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    /// Sparse categorical cross-entropy over the logits.
    pub fn forward_classification(
        &self,
        images:  Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(images);
        let loss = burn::nn::loss::CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), targets);
        (loss, logits)
    }

    /// Softmax class probabilities: [batch, num_classes]
    pub fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(images), 1)
    }
}

/// Number of rows whose argmax equals the target.
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    // argmax(1) returns shape [batch, 1]; flatten to [batch] before comparing
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    let correct: i64 = predicted
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>();
    correct as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::AutodiffModule;

    type B  = NdArray;
    type AB = Autodiff<NdArray>;

    fn tiny_config() -> AlzClassifierConfig {
        AlzClassifierConfig::new(
            4,
            32,
            Vgg16FeaturesConfig::new(vec![vec![2], vec![2], vec![4], vec![4], vec![4]]),
        )
        .with_hidden_units(8)
    }

    #[test]
    fn test_default_head_matches_vgg16_top() {
        let cfg = AlzClassifierConfig::vgg16(4);
        assert_eq!(cfg.hidden_units, 256);
        assert!((cfg.dropout - 0.5).abs() < f64::EPSILON);
        assert_eq!(cfg.image_size, 224);
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model  = tiny_config().init::<B>(&device);
        let logits = model.forward(Tensor::zeros([3, 3, 32, 32], &device));
        assert_eq!(logits.dims(), [3, 4]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let device = Default::default();
        let model  = tiny_config().init::<B>(&device);
        let images = Tensor::<B, 4>::random(
            [2, 3, 32, 32],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let probs = model.probabilities(images).into_data().to_vec::<f32>().unwrap();
        let row0: f32 = probs[0..4].iter().sum();
        let row1: f32 = probs[4..8].iter().sum();
        assert!((row0 - 1.0).abs() < 1e-4);
        assert!((row1 - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_frozen_blocks_are_clamped() {
        let device = Default::default();
        let model  = tiny_config().init::<B>(&device).with_frozen_blocks(99);
        assert_eq!(model.frozen_blocks, 5);
    }

    #[test]
    fn test_frozen_backbone_gets_no_gradient() {
        let device = Default::default();
        let model  = tiny_config().init::<AB>(&device).with_frozen_blocks(5);
        let images  = Tensor::<AB, 4>::ones([2, 3, 32, 32], &device);
        let targets = Tensor::<AB, 1, Int>::from_ints([0, 1], &device);

        let (loss, _) = model.forward_classification(images, targets);
        let grads = loss.backward();

        assert!(model.backbone.blocks[0].convs[0].weight.grad(&grads).is_none());
        assert!(model.backbone.blocks[4].convs[0].weight.grad(&grads).is_none());
        assert!(model.fc2.weight.grad(&grads).is_some());
    }

    #[test]
    fn test_top_block_trains_when_partially_frozen() {
        let device = Default::default();
        let model  = tiny_config().init::<AB>(&device).with_frozen_blocks(4);
        let images  = Tensor::<AB, 4>::ones([2, 3, 32, 32], &device);
        let targets = Tensor::<AB, 1, Int>::from_ints([2, 3], &device);

        let (loss, _) = model.forward_classification(images, targets);
        let grads = loss.backward();

        assert!(model.backbone.blocks[3].convs[0].weight.grad(&grads).is_none());
        assert!(model.backbone.blocks[4].convs[0].weight.grad(&grads).is_some());
    }

    #[test]
    fn test_valid_model_keeps_frozen_setting() {
        let device = Default::default();
        let model  = tiny_config().init::<AB>(&device).with_frozen_blocks(3);
        assert_eq!(model.valid().frozen_blocks, 3);
    }

    #[test]
    fn test_count_correct() {
        let device  = Default::default();
        let logits  = Tensor::<B, 2>::from_floats([[0.1, 0.9], [0.8, 0.2], [0.3, 0.7]], &device);
        let targets = Tensor::<B, 1, Int>::from_ints([1, 1, 1], &device);
        assert_eq!(count_correct(logits, targets), 2);
    }
}
