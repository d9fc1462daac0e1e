// ============================================================
// Layer 5 — LocaliseNet Architecture
// ============================================================
// A shared convolutional trunk feeding two heads:
//
//   image [?, 28, 28, 3]
//     └─ conv1     5×5×3  → 32,  ReLU      [?, 28, 28, 32]
//     └─ maxpool1  2×2 / 2                 [?, 14, 14, 32]
//     └─ conv2     5×5×32 → 64,  ReLU      [?, 14, 14, 64]
//     └─ maxpool2  2×2 / 2                 [?,  7,  7, 64]   ← trunk
//          ├─ fc_class    3136 → 128, ReLU
//          │    └─ softmax 128 → num_classes
//          └─ fc_regress  3136 → 128, ReLU     (regression scope)
//               └─ box_coord 128 → 4,  ReLU    (regression scope)
//
// The regression head reads the trunk through `detach()`, so a
// regression step can only ever move fc_regress and box_coord.
//
// Reference: Burn Book §3 (Building Blocks)

use burn::{
    module::ParamId,
    prelude::*,
};

use crate::domain::crop::{IMAGE_CHANNELS, IMAGE_HEIGHT, IMAGE_WIDTH};
use crate::domain::error::LocaliseError;
use crate::ml::layers::{
    ConvRelu, FullyConnected, LayerBuilder, MaxPool, ParamScope, ParamShape, SoftmaxHead, StaticShape,
};

pub const KERNEL_SIZE: usize = 5;
pub const CONV1_CHANNELS: usize = 32;
pub const CONV2_CHANNELS: usize = 64;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct LocaliseNetConfig {
    pub num_classes: usize,
    #[config(default = 4)]
    pub num_coordinates: usize,
    #[config(default = 128)]
    pub hidden_units: usize,
}

impl LocaliseNetConfig {
    /// Builds every layer against `image`, the static shape of one fed batch.
    pub fn init<B: Backend>(&self, image: &StaticShape, device: &B::Device) -> Result<LocaliseNet<B>, LocaliseError> {
        if self.num_classes == 0 {
            return Err(LocaliseError::Config("num_classes must be at least 1".to_string()));
        }
        let mut layers = LayerBuilder::<B>::new(device);

        let (conv1, shape) = layers.conv_relu(image, "conv1", [KERNEL_SIZE, KERNEL_SIZE, IMAGE_CHANNELS], CONV1_CHANNELS)?;
        let (maxpool1, shape) = layers.max_pool(&shape, "maxpool1")?;
        let (conv2, shape) = layers.conv_relu(&shape, "conv2", [KERNEL_SIZE, KERNEL_SIZE, CONV1_CHANNELS], CONV2_CHANNELS)?;
        let (maxpool2, trunk) = layers.max_pool(&shape, "maxpool2")?;

        let (fc_class, shape) = layers.fully_connected(&trunk, self.hidden_units, "fc_class", false)?;
        let (softmax, _) = layers.softmax_head(&shape, self.num_classes, "softmax")?;

        let (fc_regress, shape) = layers.fully_connected(&trunk, self.hidden_units, "fc_regress", true)?;
        let (box_coord, _) = layers.fully_connected(&shape, self.num_coordinates, "box_coord", true)?;

        tracing::debug!(
            "Built network on {image}: trunk {trunk}, {} named layers",
            layers.registry().len()
        );

        Ok(LocaliseNet { conv1, maxpool1, conv2, maxpool2, fc_class, softmax, fc_regress, box_coord })
    }
}

/// The default image placeholder: [?, 28, 28, 3].
pub fn image_shape() -> StaticShape {
    StaticShape::batched(&[IMAGE_HEIGHT, IMAGE_WIDTH, IMAGE_CHANNELS])
}

#[derive(Module, Debug)]
pub struct LocaliseNet<B: Backend> {
    pub conv1:      ConvRelu<B>,
    pub maxpool1:   MaxPool,
    pub conv2:      ConvRelu<B>,
    pub maxpool2:   MaxPool,
    pub fc_class:   FullyConnected<B>,
    pub softmax:    SoftmaxHead<B>,
    pub fc_regress: FullyConnected<B>,
    pub box_coord:  FullyConnected<B>,
}

impl<B: Backend> LocaliseNet<B> {
    /// images: [batch, 28, 28, 3] (NHWC) → trunk features [batch, 64, 7, 7]
    pub fn trunk(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = images.permute([0, 3, 1, 2]);
        let x = self.maxpool1.forward(self.conv1.forward(x));
        self.maxpool2.forward(self.conv2.forward(x))
    }

    /// Pre-softmax class scores — shape: [batch, num_classes]
    pub fn class_logits(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        self.softmax.forward_logits(self.fc_class.forward(features))
    }

    /// Box predictions — shape: [batch, 4]
    pub fn box_predictions(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        self.box_coord.forward(self.fc_regress.forward(features))
    }

    /// Parameters the regression optimizer may touch. Collected from the
    /// layers every call, so the ids stay current after a checkpoint load.
    pub fn regression_params(&self) -> Vec<ParamId> {
        [&self.fc_class, &self.fc_regress, &self.box_coord]
            .into_iter()
            .filter(|layer| layer.scope() == ParamScope::Regression)
            .flat_map(|layer| layer.param_ids())
            .collect()
    }

    /// Every parameter tensor in declaration order.
    pub fn layout(&self) -> Vec<ParamShape> {
        let mut layout = self.conv1.layout("conv1");
        layout.extend(self.conv2.layout("conv2"));
        layout.extend(self.fc_class.layout("fc_class"));
        layout.extend(self.softmax.layout("softmax"));
        layout.extend(self.fc_regress.layout("fc_regress"));
        layout.extend(self.box_coord.layout("box_coord"));
        layout
    }
}
