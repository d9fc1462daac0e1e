// ============================================================
// Layer 5 — Layer Builders
// ============================================================
// Factories for the four kinds of layer the network is made of:
//
//   conv_relu        5×5 convolution, same padding, + bias, ReLU
//   max_pool         2×2 window, stride 2, same padding
//   fully_connected  flatten → affine → ReLU
//   softmax_head     affine → softmax
//
// Every builder works on a StaticShape first (the shape a batch
// will have, with `None` for the batch axis) so that rank and
// size errors are reported while the network is being built,
// before any batch is fed. Each call also claims a unique name
// in the LayerRegistry; reusing a name is an error.
//
// Weights use Xavier (Glorot) uniform initialisation. Biases
// are drawn from N(0, BIAS_INIT_STD²).
//
// Tensor layout: static shapes describe NHWC (the layout of the
// fed images); the convolution modules run on NCHW tensors.
//
// Reference: Burn Book §3 (Building Blocks)
//            Glorot & Bengio (2010)

use std::collections::BTreeSet;
use std::fmt;

use burn::{
    module::{Ignored, Param, ParamId},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Initializer, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::{relu, softmax},
};
use serde::{Deserialize, Serialize};

use crate::domain::error::LocaliseError;

/// Standard deviation of the normal distribution biases are drawn from.
pub const BIAS_INIT_STD: f64 = 0.1;

const WEIGHT_INIT: Initializer = Initializer::XavierUniform { gain: 1.0 };

// ─── StaticShape ──────────────────────────────────────────────────────────────
/// Shape known while building the network. The leading dimension is the
/// batch axis and is normally `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticShape(Vec<Option<usize>>);

impl StaticShape {
    pub fn new(dims: Vec<Option<usize>>) -> Self {
        Self(dims)
    }

    /// Unknown batch axis followed by the given dimensions.
    pub fn batched(dims: &[usize]) -> Self {
        Self(std::iter::once(None).chain(dims.iter().copied().map(Some)).collect())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[Option<usize>] {
        &self.0
    }

    /// Whether concrete `dims` fit this shape (`None` matches anything).
    pub fn matches(&self, dims: &[usize]) -> bool {
        self.0.len() == dims.len()
            && self.0.iter().zip(dims).all(|(s, d)| s.map_or(true, |s| s == *d))
    }

    /// Non-batch dimensions; every one of them must be known.
    fn features(&self, layer: &str) -> Result<Vec<usize>, LocaliseError> {
        self.0
            .iter()
            .skip(1)
            .map(|d| d.ok_or_else(|| LocaliseError::shape(layer, format!("input {self} has an unknown feature dimension"))))
            .collect()
    }
}

impl fmt::Display for StaticShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|d| d.map_or_else(|| "?".to_string(), |d| d.to_string()))
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

// ─── Scopes and layout ────────────────────────────────────────────────────────
/// Which optimizer may update a layer's parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamScope {
    /// Updated by the classification optimizer only
    Shared,
    /// Member of the regression variable set
    Regression,
}

/// Name and dimensions of one parameter tensor; the ordered list of these
/// identifies a network architecture inside a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamShape {
    pub name: String,
    pub dims: Vec<usize>,
}

impl ParamShape {
    fn new(layer: &str, param: &str, dims: &[usize]) -> Self {
        Self {
            name: format!("{layer}/{param}"),
            dims: dims.to_vec(),
        }
    }
}

// ─── LayerRegistry ────────────────────────────────────────────────────────────
/// Names claimed by the layers of one network.
#[derive(Debug, Default)]
pub struct LayerRegistry {
    names: BTreeSet<String>,
}

impl LayerRegistry {
    pub fn claim(&mut self, name: &str) -> Result<(), LocaliseError> {
        if name.is_empty() {
            return Err(LocaliseError::Config("layer names must not be empty".to_string()));
        }
        if !self.names.insert(name.to_string()) {
            return Err(LocaliseError::NameCollision(name.to_string()));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

fn bias_param<B: Backend>(units: usize, device: &B::Device) -> Param<Tensor<B, 1>> {
    Initializer::Normal { mean: 0.0, std: BIAS_INIT_STD }.init([units], device)
}

fn linear_layout<B: Backend>(layer: &str, linear: &Linear<B>) -> Vec<ParamShape> {
    let mut layout = vec![ParamShape::new(layer, "weights", &linear.weight.val().dims())];
    if let Some(bias) = &linear.bias {
        layout.push(ParamShape::new(layer, "biases", &bias.val().dims()));
    }
    layout
}

fn linear_param_ids<B: Backend>(linear: &Linear<B>) -> Vec<ParamId> {
    let mut ids = vec![linear.weight.id];
    ids.extend(linear.bias.as_ref().map(|b| b.id));
    ids
}

// ─── Layers ───────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct ConvRelu<B: Backend> {
    pub conv: Conv2d<B>,
}

impl<B: Backend> ConvRelu<B> {
    /// x: [batch, in_channels, h, w] → [batch, out_channels, h, w]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.conv.forward(x))
    }

    pub fn layout(&self, layer: &str) -> Vec<ParamShape> {
        let mut layout = vec![ParamShape::new(layer, "weights", &self.conv.weight.val().dims())];
        if let Some(bias) = &self.conv.bias {
            layout.push(ParamShape::new(layer, "biases", &bias.val().dims()));
        }
        layout
    }
}

/// 2×2 max pooling with stride 2. Odd spatial sizes are padded at the
/// bottom/right with −∞ first, giving ⌈n/2⌉ outputs per axis.
#[derive(Module, Clone, Debug)]
pub struct MaxPool {
    pool: MaxPool2d,
}

impl MaxPool {
    pub fn forward<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [n, c, h, w] = x.dims();
        let (pad_h, pad_w) = (h % 2, w % 2);
        let x = if pad_h + pad_w > 0 {
            Tensor::full([n, c, h + pad_h, w + pad_w], f32::NEG_INFINITY, &x.device())
                .slice_assign([0..n, 0..c, 0..h, 0..w], x)
        } else {
            x
        };
        self.pool.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct FullyConnected<B: Backend> {
    pub linear: Linear<B>,
    flat_size:  usize,
    scope:      Ignored<ParamScope>,
}

impl<B: Backend> FullyConnected<B> {
    /// Flattens every non-batch axis, then affine + ReLU.
    pub fn forward<const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, 2> {
        let batch = x.dims()[0];
        relu(self.linear.forward(x.reshape([batch, self.flat_size])))
    }

    pub fn flat_size(&self) -> usize {
        self.flat_size
    }

    pub fn scope(&self) -> ParamScope {
        self.scope.0
    }

    pub fn param_ids(&self) -> Vec<ParamId> {
        linear_param_ids(&self.linear)
    }

    pub fn layout(&self, layer: &str) -> Vec<ParamShape> {
        linear_layout(layer, &self.linear)
    }
}

#[derive(Module, Debug)]
pub struct SoftmaxHead<B: Backend> {
    pub linear: Linear<B>,
}

impl<B: Backend> SoftmaxHead<B> {
    /// Pre-softmax scores; the loss works on these.
    pub fn forward_logits(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        self.linear.forward(x)
    }

    /// Class probabilities, every row sums to one.
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        softmax(self.forward_logits(x), 1)
    }

    pub fn param_ids(&self) -> Vec<ParamId> {
        linear_param_ids(&self.linear)
    }

    pub fn layout(&self, layer: &str) -> Vec<ParamShape> {
        linear_layout(layer, &self.linear)
    }
}

// ─── LayerBuilder ─────────────────────────────────────────────────────────────
/// Builds layers on one device while keeping their names unique.
pub struct LayerBuilder<'a, B: Backend> {
    registry: LayerRegistry,
    device:   &'a B::Device,
}

impl<'a, B: Backend> LayerBuilder<'a, B> {
    pub fn new(device: &'a B::Device) -> Self {
        Self { registry: LayerRegistry::default(), device }
    }

    pub fn registry(&self) -> &LayerRegistry {
        &self.registry
    }

    /// `kernel_shape` is [height, width, in_channels]; the input must be
    /// rank 4 (NHWC) with a matching channel count. Same padding needs
    /// odd kernel sides.
    pub fn conv_relu(
        &mut self,
        input:        &StaticShape,
        name:         &str,
        kernel_shape: [usize; 3],
        out_channels: usize,
    ) -> Result<(ConvRelu<B>, StaticShape), LocaliseError> {
        self.registry.claim(name)?;
        let [height, width, channels] = spatial(input, name)?;
        let [kh, kw, in_channels] = kernel_shape;
        if channels != in_channels {
            return Err(LocaliseError::shape(
                name,
                format!("kernel expects {in_channels} input channels but input {input} has {channels}"),
            ));
        }
        if kh % 2 == 0 || kw % 2 == 0 {
            return Err(LocaliseError::shape(
                name,
                format!("kernel {kh}×{kw} must have odd, non-zero sides for same padding"),
            ));
        }

        let mut conv = Conv2dConfig::new([in_channels, out_channels], [kh, kw])
            .with_padding(PaddingConfig2d::Same)
            .with_initializer(WEIGHT_INIT)
            .init(self.device);
        conv.bias = Some(bias_param(out_channels, self.device));

        let output = StaticShape::new(vec![input.dims()[0], Some(height), Some(width), Some(out_channels)]);
        Ok((ConvRelu { conv }, output))
    }

    pub fn max_pool(&mut self, input: &StaticShape, name: &str) -> Result<(MaxPool, StaticShape), LocaliseError> {
        self.registry.claim(name)?;
        let [height, width, channels] = spatial(input, name)?;

        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        let output = StaticShape::new(vec![
            input.dims()[0],
            Some(height.div_ceil(2)),
            Some(width.div_ceil(2)),
            Some(channels),
        ]);
        Ok((MaxPool { pool }, output))
    }

    /// Accepts rank-4 (spatial) or rank-2 (already flat) inputs. With
    /// `register` set the layer joins the regression variable set.
    pub fn fully_connected(
        &mut self,
        input:     &StaticShape,
        out_units: usize,
        name:      &str,
        register:  bool,
    ) -> Result<(FullyConnected<B>, StaticShape), LocaliseError> {
        self.registry.claim(name)?;
        let features = input.features(name)?;
        let flat_size = match features.as_slice() {
            [h, w, c] => h * w * c,
            [n] => *n,
            _ => {
                return Err(LocaliseError::shape(
                    name,
                    format!("expected a rank 2 or rank 4 input, got rank {} ({input})", input.rank()),
                ))
            }
        };
        if flat_size == 0 {
            return Err(LocaliseError::shape(name, format!("input {input} has no features")));
        }

        let mut linear = LinearConfig::new(flat_size, out_units)
            .with_initializer(WEIGHT_INIT)
            .init(self.device);
        linear.bias = Some(bias_param(out_units, self.device));

        let scope = if register { ParamScope::Regression } else { ParamScope::Shared };
        let output = StaticShape::new(vec![input.dims()[0], Some(out_units)]);
        Ok((FullyConnected { linear, flat_size, scope: Ignored(scope) }, output))
    }

    pub fn softmax_head(
        &mut self,
        input:     &StaticShape,
        out_units: usize,
        name:      &str,
    ) -> Result<(SoftmaxHead<B>, StaticShape), LocaliseError> {
        self.registry.claim(name)?;
        let fan_in = match input.features(name)?.as_slice() {
            [n] => *n,
            _ => {
                return Err(LocaliseError::shape(
                    name,
                    format!("softmax expects a rank 2 input, got {input}"),
                ))
            }
        };

        let mut linear = LinearConfig::new(fan_in, out_units)
            .with_initializer(WEIGHT_INIT)
            .init(self.device);
        linear.bias = Some(bias_param(out_units, self.device));

        let output = StaticShape::new(vec![input.dims()[0], Some(out_units)]);
        Ok((SoftmaxHead { linear }, output))
    }
}

fn spatial(input: &StaticShape, layer: &str) -> Result<[usize; 3], LocaliseError> {
    match input.features(layer)?.as_slice() {
        [h, w, c] => Ok([*h, *w, *c]),
        _ => Err(LocaliseError::shape(
            layer,
            format!("expected a rank 4 [batch, height, width, channels] input, got {input}"),
        )),
    }
}
