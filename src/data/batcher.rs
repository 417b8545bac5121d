// ============================================================
// Layer 4 — Scan Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<ScanItem> into
// one image tensor and one label tensor.
//
//   Input:  N ScanItems, each with 3 * S * S pixel values
//   Output: ScanBatch { images: [N, 3, S, S], targets: [N] }
//
// Every item is already resized to the same S × S, so batching
// is a flatten + reshape.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::ScanItem;

// ─── ScanBatch ────────────────────────────────────────────────────────────────
/// A batch of scans ready for the model forward pass.
#[derive(Debug, Clone)]
pub struct ScanBatch<B: Backend> {
    /// Normalised images, shape: [batch_size, 3, size, size]
    pub images: Tensor<B, 4>,

    /// Class indices, shape: [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

// ─── ScanBatcher ──────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct ScanBatcher {
    /// Side length of the (square) input images
    pub image_size: usize,
}

impl ScanBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, ScanItem, ScanBatch<B>> for ScanBatcher {
    fn batch(&self, items: Vec<ScanItem>, device: &B::Device) -> ScanBatch<B> {
        let batch_size = items.len();
        let size       = self.image_size;

        let pixels: Vec<f32> = items
            .iter()
            .flat_map(|item| item.pixels.iter().copied())
            .collect();

        let labels: Vec<i32> = items
            .iter()
            .map(|item| item.label as i32)
            .collect();

        let images = Tensor::<B, 1>::from_floats(pixels.as_slice(), device)
            .reshape([batch_size, 3, size, size]);

        let targets = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), device);

        ScanBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    #[test]
    fn test_batch_shapes() {
        let device  = Default::default();
        let batcher = ScanBatcher::new(2);
        let items = vec![
            ScanItem { pixels: vec![0.5; 12], label: 1 },
            ScanItem { pixels: vec![1.5; 12], label: 3 },
        ];

        let batch: ScanBatch<B> = batcher.batch(items, &device);
        assert_eq!(batch.images.dims(), [2, 3, 2, 2]);
        assert_eq!(batch.targets.dims(), [2]);

        let labels = batch.targets.into_data().to_vec::<i64>().unwrap();
        assert_eq!(labels, vec![1, 3]);
    }
}
