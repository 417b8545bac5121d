// ============================================================
// Layer 5 — VGG16 Convolutional Backbone
// ============================================================
// The feature extractor of VGG16 without its dense top:
//
//   block1: conv3-64,  conv3-64,               maxpool 2x2
//   block2: conv3-128, conv3-128,              maxpool 2x2
//   block3: conv3-256, conv3-256, conv3-256,   maxpool 2x2
//   block4: conv3-512, conv3-512, conv3-512,   maxpool 2x2
//   block5: conv3-512, conv3-512, conv3-512,   maxpool 2x2
//
// Every conv is 3x3, stride 1, padding 1, followed by ReLU.
// A 224x224 input leaves the backbone as [512, 7, 7].
//
// The channel layout is a config value so tests can build a
// tiny network with the same structure.
//
// Pretrained ImageNet weights come from one of two files:
//
//   *.safetensors  torchvision / timm VGG16 weights. Convs live in
//                  one flat Sequential, `features.{N}`, where every
//                  conv is followed by a ReLU and every block ends
//                  in a max-pool:
//
//                    block1: features.0,  features.2
//                    block2: features.5,  features.7
//                    block3: features.10, features.12, features.14
//                    block4: features.17, features.19, features.21
//                    block5: features.24, features.26, features.28
//
//   anything else  a Burn record (NamedMpk, full precision) whose
//                  field names follow this module:
//                  blocks.{i}.convs.{j}.{weight,bias}

use anyhow::{anyhow, bail, Context, Result};
use burn::{
    module::Param,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
};
use safetensors::{tensor::Dtype, SafeTensors};
use std::{fs, path::Path};

/// torchvision ImageNet VGG16 weights, mirrored as safetensors by timm.
pub const VGG16_IMAGENET_URL: &str =
    "https://huggingface.co/timm/vgg16.tv_in1k/resolve/main/model.safetensors";

/// File name the downloaded ImageNet weights are cached under.
pub const VGG16_IMAGENET_FILE: &str = "vgg16_imagenet.safetensors";

/// Channel layout of VGG16 (configuration "D").
pub fn vgg16_layout() -> Vec<Vec<usize>> {
    vec![
        vec![64, 64],
        vec![128, 128],
        vec![256, 256, 256],
        vec![512, 512, 512],
        vec![512, 512, 512],
    ]
}

#[derive(Config, Debug)]
pub struct Vgg16FeaturesConfig {
    /// Output channels of each conv, grouped per pooling block
    pub blocks: Vec<Vec<usize>>,
}

impl Vgg16FeaturesConfig {
    pub fn vgg16() -> Self {
        Self::new(vgg16_layout())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg16Features<B> {
        let mut c_in   = 3;
        let mut blocks = Vec::with_capacity(self.blocks.len());

        for channels in &self.blocks {
            let mut convs = Vec::with_capacity(channels.len());
            for &c_out in channels {
                convs.push(
                    Conv2dConfig::new([c_in, c_out], [3, 3])
                        .with_padding(PaddingConfig2d::Explicit(1, 1))
                        .init(device),
                );
                c_in = c_out;
            }
            let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
            blocks.push(ConvBlock { convs, pool });
        }

        Vgg16Features { blocks }
    }

    /// Channels coming out of the last block.
    pub fn out_channels(&self) -> usize {
        self.blocks
            .iter()
            .rev()
            .find_map(|b| b.last().copied())
            .unwrap_or(3)
    }

    /// Length of the flattened feature vector for a square input.
    /// Each block halves the spatial size (floor).
    pub fn feature_len(&self, image_size: usize) -> usize {
        let side = image_size >> self.blocks.len();
        self.out_channels() * side * side
    }
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub convs: Vec<Conv2d<B>>,
    pub pool:  MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = x;
        for conv in &self.convs {
            x = burn::tensor::activation::relu(conv.forward(x));
        }
        self.pool.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct Vgg16Features<B: Backend> {
    pub blocks: Vec<ConvBlock<B>>,
}

impl<B: Backend> Vgg16Features<B> {
    /// images: [batch, 3, H, W] → features: [batch, C, H/32, W/32]
    ///
    /// The output of block `frozen_blocks` (1-based) is detached, so no
    /// gradient reaches the parameters of blocks 1..=frozen_blocks and
    /// the optimiser leaves them untouched.
    pub fn forward(&self, images: Tensor<B, 4>, frozen_blocks: usize) -> Tensor<B, 4> {
        let mut x = images;
        for (i, block) in self.blocks.iter().enumerate() {
            x = block.forward(x);
            if i + 1 == frozen_blocks {
                x = x.detach();
            }
        }
        x
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Replace all weights with pretrained ones from `path`. A
    /// `.safetensors` file is read in the torchvision layout; anything
    /// else as a Burn record (the `.mpk` extension is appended by the
    /// recorder).
    pub fn load_pretrained(self, path: &Path, device: &B::Device) -> Result<Self> {
        let is_safetensors = path.extension().and_then(|e| e.to_str()) == Some("safetensors");

        let loaded = if is_safetensors {
            self.load_torchvision(path, device)
        } else {
            let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
            self.load_file(path.with_extension(""), &recorder, device)
                .map_err(|e| anyhow!("{e:?}"))
        };

        let loaded = loaded.with_context(|| {
            format!("Cannot load pretrained backbone weights from '{}'", path.display())
        })?;

        tracing::info!("Loaded pretrained backbone weights from '{}'", path.display());
        Ok(loaded)
    }

    fn load_torchvision(mut self, path: &Path, device: &B::Device) -> Result<Self> {
        let bytes   = fs::read(path)?;
        let tensors = SafeTensors::deserialize(&bytes)
            .map_err(|e| anyhow!("not a safetensors file: {e}"))?;

        let layout: Vec<usize> = self.blocks.iter().map(|b| b.convs.len()).collect();
        let indices = torchvision_conv_indices(&layout);

        for (block, block_indices) in self.blocks.iter_mut().zip(indices) {
            for (conv, index) in block.convs.iter_mut().zip(block_indices) {
                let shape  = conv.weight.val().dims();
                let values = read_f32(&tensors, &format!("features.{index}.weight"), &shape)?;
                conv.weight = Param::from_tensor(Tensor::from_data(
                    TensorData::new(values, shape),
                    device,
                ));

                let bias_shape = conv.bias.as_ref().map(|b| b.val().dims());
                if let Some(shape) = bias_shape {
                    let values = read_f32(&tensors, &format!("features.{index}.bias"), &shape)?;
                    conv.bias = Some(Param::from_tensor(Tensor::from_data(
                        TensorData::new(values, shape),
                        device,
                    )));
                }
            }
        }

        Ok(self)
    }
}

/// `features.{N}` index of every conv, grouped per block, for a
/// torchvision-style VGG with the given number of convs per block.
pub fn torchvision_conv_indices(convs_per_block: &[usize]) -> Vec<Vec<usize>> {
    let mut next = 0;
    convs_per_block
        .iter()
        .map(|&n| {
            let block: Vec<usize> = (0..n).map(|j| next + 2 * j).collect();
            // conv + ReLU per conv, then the max-pool
            next += 2 * n + 1;
            block
        })
        .collect()
}

/// Little-endian f32 values of tensor `name`, checked against `shape`.
fn read_f32(tensors: &SafeTensors, name: &str, shape: &[usize]) -> Result<Vec<f32>> {
    let view = tensors
        .tensor(name)
        .map_err(|e| anyhow!("missing tensor '{name}': {e}"))?;

    if view.dtype() != Dtype::F32 {
        bail!("tensor '{name}' is {:?}, expected F32", view.dtype());
    }
    if view.shape() != shape {
        bail!("tensor '{name}' has shape {:?}, the backbone expects {:?}", view.shape(), shape);
    }

    Ok(view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
