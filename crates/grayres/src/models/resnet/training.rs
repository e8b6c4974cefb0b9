//! # `ResNet` Learner Hooks
//!
//! [`TrainStep`] and [`ValidStep`] impls, so a [`ResNet`] can be handed
//! directly to a `burn::train` learner.
//!
//! Batches are ``(images, targets)`` pairs:
//! ``[batch, in_channels, height, width]`` images and ``[batch]`` class indices.

use crate::models::resnet::resnet_model::ResNet;
use burn::prelude::{Backend, Int, Tensor};
use burn::tensor::backend::AutodiffBackend;
use burn::train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep};

/// A ``(images, targets)`` classification batch.
pub type ClassificationBatch<B> = (Tensor<B, 4>, Tensor<B, 1, Int>);

impl<B: Backend> ResNet<B> {
    /// Forward pass, packaged with the cross-entropy loss.
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = self.loss(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

impl<B: AutodiffBackend> TrainStep<ClassificationBatch<B>, ClassificationOutput<B>> for ResNet<B> {
    fn step(
        &self,
        batch: ClassificationBatch<B>,
    ) -> TrainOutput<ClassificationOutput<B>> {
        let (images, targets) = batch;
        let item = self.forward_classification(images, targets);
        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<ClassificationBatch<B>, ClassificationOutput<B>> for ResNet<B> {
    fn step(
        &self,
        batch: ClassificationBatch<B>,
    ) -> ClassificationOutput<B> {
        let (images, targets) = batch;
        self.forward_classification(images, targets)
    }
}
