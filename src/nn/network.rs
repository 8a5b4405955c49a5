//! Layered feed-forward networks.

use rand::Rng;

use super::{ErrorCriterion, NetworkLayer, NnContext};
use crate::config::Config;
use crate::core::{CommandQueue, Device, Vector};

/// An ordered stack of layers sharing one device and one set of `nn` kernels.
///
/// # Example
///
/// ```
/// use nnfit::core::{CommandQueue, Device, Vector};
/// use nnfit::nn::{Layer, Network, TransferFunction};
///
/// let device = Device::host();
/// let queue = CommandQueue::new(&device);
/// let mut net = Network::new(&device);
/// net.input_layer(2)
///     .add(Layer::new(&device, 3, 2, TransferFunction::Sigmoid))
///     .add(Layer::new(&device, 1, 3, TransferFunction::Sigmoid));
/// net.init(&queue, 12);
/// let x = Vector::from_slice(&device, &[1.0f32, 0.0]);
/// let y = net.predict(&queue, &x).read::<f32>(&queue);
/// assert!(y[0] > 0.0 && y[0] < 1.0);
/// ```
#[derive(Debug)]
pub struct Network {
    device: Device,
    context: NnContext,
    input_size: usize,
    layers: Vec<Box<dyn NetworkLayer>>,
    backpropagate_until: usize,
}

impl Network {
    pub fn new(device: &Device) -> Self {
        Self {
            device: device.clone(),
            context: NnContext::new(device),
            input_size: 0,
            layers: Vec::new(),
            backpropagate_until: 0,
        }
    }

    /// Declares the number of inputs per example.
    pub fn input_layer(&mut self, size: usize) -> &mut Self {
        self.input_size = size;
        self
    }

    /// Appends a layer.
    ///
    /// # Panics
    ///
    /// If its input size does not match the previous layer's output size, or
    /// the declared input size for the first layer.
    pub fn add(&mut self, layer: impl NetworkLayer + 'static) -> &mut Self {
        let expected = self.layers.last().map_or(self.input_size, |l| l.output_size());
        assert_eq!(
            layer.input_size(),
            expected,
            "layer {} takes {} inputs but receives {expected}",
            self.layers.len(),
            layer.input_size()
        );
        self.layers.push(Box::new(layer));
        self.backpropagate_until = self
            .layers
            .iter()
            .position(|l| l.backpropagates())
            .unwrap_or(self.layers.len());
        self
    }

    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    #[must_use]
    pub fn context(&self) -> &NnContext {
        &self.context
    }

    #[must_use]
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    #[must_use]
    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(self.input_size, |l| l.output_size())
    }

    #[must_use]
    pub fn layers(&self) -> &[Box<dyn NetworkLayer>] {
        &self.layers
    }

    #[must_use]
    pub fn last_layer(&self) -> Option<&dyn NetworkLayer> {
        self.layers.last().map(|l| &**l)
    }

    /// Index of the lowest layer that receives an error term. Layers below it
    /// need none and are skipped by backpropagation.
    #[must_use]
    pub fn backpropagate_until(&self) -> usize {
        self.backpropagate_until
    }

    /// Initializes every layer from the same seed.
    pub fn init(&mut self, queue: &CommandQueue, seed: u64) {
        for layer in &mut self.layers {
            layer.init(queue, seed);
        }
    }

    /// Initializes from a fresh random seed, which is returned.
    pub fn init_random(&mut self, queue: &CommandQueue) -> u64 {
        let seed = rand::rng().random();
        self.init(queue, seed);
        seed
    }

    /// Tunes every layer with the configured repetition count.
    pub fn tune(&mut self) {
        self.tune_with(Config::from_env().tune_repetitions);
    }

    pub fn tune_with(&mut self, repetitions: usize) {
        for layer in &mut self.layers {
            layer.tune(repetitions);
        }
        tracing::debug!(layers = self.layers.len(), repetitions, "network tuned");
    }

    pub fn dump(&self, queue: &CommandQueue) {
        for layer in &self.layers {
            layer.dump(queue);
        }
    }

    /// Runs inference; the result lives in the last layer.
    pub fn predict<'a>(&'a mut self, queue: &CommandQueue, input: &'a Vector) -> &'a Vector {
        let Self { layers, context, .. } = self;
        let mut x = input;
        for layer in layers.iter_mut() {
            x = layer.predict(context, queue, x);
        }
        x
    }

    /// Runs inference keeping the state backpropagation needs.
    pub fn feedforward<'a>(&'a mut self, queue: &CommandQueue, input: &'a Vector) -> &'a Vector {
        let Self { layers, context, .. } = self;
        let mut x = input;
        for layer in layers.iter_mut() {
            x = layer.feedforward(context, queue, x);
        }
        x
    }

    /// Propagates the error of the last feedforward from the output layer
    /// down to [`Network::backpropagate_until`], accumulating gradients on
    /// the way.
    pub fn backpropagate(&mut self, queue: &CommandQueue, expected: &Vector, criterion: &dyn ErrorCriterion) {
        let until = self.backpropagate_until;
        let Some(last) = self.layers.len().checked_sub(1) else {
            return;
        };
        if until > last {
            return;
        }
        let ctx = &self.context;
        let layers = &mut self.layers;

        layers[last].backpropagate_output(ctx, queue, expected, criterion, last > until);
        layers[last].accumulate_gradients(ctx, queue);
        for i in (until..last).rev() {
            let (lower, upper) = layers.split_at_mut(i + 1);
            lower[i].backpropagate(ctx, queue, upper[0].error_output(), i > until);
            lower[i].accumulate_gradients(ctx, queue);
        }
    }

    /// `(parameters, gradients)` of every trainable layer, bottom up.
    #[must_use]
    pub fn weights_and_gradients(&self) -> Vec<(&Vector, &Vector)> {
        let mut pairs = Vec::new();
        for layer in &self.layers {
            layer.collect_weights_and_gradients(&mut pairs);
        }
        pairs
    }

    pub fn zero_gradients(&self, queue: &CommandQueue) {
        for layer in &self.layers {
            layer.zero_gradients(queue);
        }
    }
}
