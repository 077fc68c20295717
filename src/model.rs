use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::activation::{Activation, ActivationType};
use crate::error::{Error, Result};
use crate::hyperparameters::NetworkParams;
use crate::layer::{Layer, LayerType};
use crate::rgba::Rgba;

/// Shape and activation of one layer to build
#[derive(Debug, Clone, PartialEq)]
pub struct LayerConfig {
    pub layer_type: LayerType,
    pub width: usize,
    pub height: usize,
    pub activation: ActivationType,
    pub alpha: f32,
}

impl LayerConfig {
    pub fn new(layer_type: LayerType, width: usize, height: usize) -> Self {
        LayerConfig {
            layer_type,
            width,
            height,
            activation: ActivationType::LReLU,
            alpha: 0.1,
        }
    }

    pub fn with_activation(mut self, activation: ActivationType, alpha: f32) -> Self {
        self.activation = activation;
        self.alpha = alpha;
        self
    }
}

/// The grid network: an ordered arena of layers linked by index.
#[derive(Debug, Clone)]
pub struct Network {
    pub layers: Vec<Layer>,

    /// Largest feed-forward weight count of any neuron
    pub max_weights: usize,
}

impl Network {
    /// Create a network with random weights from layer configurations
    ///
    /// # Arguments
    ///
    /// * `layer_configs` - Layers in chain order, input first and output last
    /// * `seed` - Optional seed for reproducible weights
    pub fn new(layer_configs: Vec<LayerConfig>, seed: Option<u64>) -> Result<Self> {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let mut network = Network::with_topology(layer_configs)?;
        for i in 1..network.layers.len() {
            let previous = (network.layers[i - 1].width, network.layers[i - 1].height);
            network.layers[i].init_weights(previous, &mut rng);
        }
        network.max_weights = network.compute_max_weights();
        Ok(network)
    }

    /// Create a network with zeroed weights, to be filled from persisted storage.
    pub fn with_reserved_weights(layer_configs: Vec<LayerConfig>) -> Result<Self> {
        let mut network = Network::with_topology(layer_configs)?;
        for i in 1..network.layers.len() {
            let previous = (network.layers[i - 1].width, network.layers[i - 1].height);
            network.layers[i].reserve_weights(previous);
        }
        network.max_weights = network.compute_max_weights();
        Ok(network)
    }

    fn with_topology(layer_configs: Vec<LayerConfig>) -> Result<Self> {
        if layer_configs.len() < 2 {
            return Err(Error::NetworkTopology(
                "at least two layers (input and output) are required".to_string(),
            ));
        }
        let count = layer_configs.len();
        let mut layers = Vec::with_capacity(count);
        for (i, config) in layer_configs.into_iter().enumerate() {
            if config.width == 0 || config.height == 0 {
                return Err(Error::NetworkTopology(format!(
                    "layer {i} has an empty {}x{} grid",
                    config.width, config.height
                )));
            }
            let mut layer = Layer::new(
                config.layer_type,
                config.width,
                config.height,
                Activation {
                    kind: config.activation,
                    alpha: config.alpha,
                },
            );
            layer.previous = i.checked_sub(1);
            layer.next = (i + 1 < count).then_some(i + 1);
            layers.push(layer);
        }

        let network = Network {
            layers,
            max_weights: 0,
        };
        network.validate()?;
        Ok(network)
    }

    fn compute_max_weights(&self) -> usize {
        self.layers
            .iter()
            .flat_map(|layer| layer.neurons.iter())
            .map(|neuron| neuron.weight_count())
            .max()
            .unwrap_or(0)
    }

    /// Checks that the chain starts with an input layer, ends with an output
    /// layer, has only hidden layers in between and is fully bound.
    pub fn validate(&self) -> Result<()> {
        let last = self.layers.len().checked_sub(1).ok_or_else(|| {
            Error::NetworkTopology("network has no layers".to_string())
        })?;
        for (i, layer) in self.layers.iter().enumerate() {
            let expected = match i {
                0 => LayerType::Input,
                i if i == last => LayerType::Output,
                _ => LayerType::Hidden,
            };
            if layer.layer_type != expected {
                return Err(Error::NetworkTopology(format!(
                    "layer {i} is {}, expected {}",
                    layer.layer_type, expected
                )));
            }
            let bound_previous = layer.previous == i.checked_sub(1);
            let bound_next = layer.next == (i < last).then_some(i + 1);
            if !bound_previous || !bound_next {
                return Err(Error::NetworkTopology(format!("layer {i} is not bound to its neighbors")));
            }
        }
        Ok(())
    }

    pub fn input_layer(&self) -> &Layer {
        &self.layers[0]
    }

    pub fn output_layer(&self) -> &Layer {
        &self.layers[self.layers.len() - 1]
    }

    pub fn output_values(&self) -> &Array2<Rgba> {
        &self.output_layer().values
    }

    pub fn max_neighbors(&self) -> usize {
        self.layers.iter().map(Layer::max_neighbors).max().unwrap_or(0)
    }

    pub fn max_neurons(&self) -> usize {
        self.layers.iter().map(Layer::size).max().unwrap_or(0)
    }

    /// Injects an image part into the input layer.
    pub fn set_input(&mut self, input: &Array2<Rgba>) -> Result<()> {
        let layer = &mut self.layers[0];
        if input.dim() != layer.values.dim() {
            return Err(Error::NetworkTopology(format!(
                "input grid {:?} does not match input layer {}x{}",
                input.dim(),
                layer.width,
                layer.height
            )));
        }
        layer.values.assign(input);
        Ok(())
    }

    /// Mutable access to layer `current` alongside shared access to layer `other`.
    pub fn layer_pair_mut(&mut self, current: usize, other: usize) -> (&mut Layer, &Layer) {
        if other < current {
            let (left, right) = self.layers.split_at_mut(current);
            (&mut right[0], &left[other])
        } else {
            let (left, right) = self.layers.split_at_mut(other);
            (&mut left[current], &right[0])
        }
    }

    /// Forward pass, input to output
    pub fn forward(&mut self, parallel: bool) -> Result<()> {
        self.validate()?;
        for i in 0..self.layers.len() {
            let Some(previous) = self.layers[i].previous else {
                continue;
            };
            let (layer, previous) = self.layer_pair_mut(i, previous);
            layer.forward(previous, parallel)?;
        }
        Ok(())
    }

    /// Error back-propagation, output to input
    pub fn backward(
        &mut self,
        target: &Array2<Rgba>,
        error_min: f32,
        error_max: f32,
        parallel: bool,
    ) -> Result<()> {
        self.validate()?;
        for i in (0..self.layers.len()).rev() {
            match self.layers[i].layer_type {
                LayerType::Output => {
                    self.layers[i].compute_output_errors(target, error_min, error_max, parallel)?
                }
                LayerType::Hidden => {
                    let next = self.layers[i].next.ok_or_else(|| {
                        Error::NetworkTopology(format!("hidden layer {i} has no next layer"))
                    })?;
                    let (layer, next) = self.layer_pair_mut(i, next);
                    layer.compute_hidden_errors(next, error_min, error_max, parallel)?;
                }
                LayerType::Input => {}
            }
        }
        Ok(())
    }

    /// Weight update of every layer that has a predecessor
    pub fn update_weights(&mut self, learning_rate: f32, parallel: bool) -> Result<()> {
        self.validate()?;
        for i in 0..self.layers.len() {
            let Some(previous) = self.layers[i].previous else {
                continue;
            };
            let (layer, previous) = self.layer_pair_mut(i, previous);
            layer.update_weights(previous, learning_rate, parallel);
        }
        Ok(())
    }
}

/// Builds a network from hyperparameters, hidden layers sharing one shape.
pub struct NetworkBuilder<'a> {
    params: &'a NetworkParams,
    seed: Option<u64>,
}

impl<'a> NetworkBuilder<'a> {
    pub fn new(params: &'a NetworkParams) -> Self {
        NetworkBuilder { params, seed: None }
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn layer_configs(&self) -> Vec<LayerConfig> {
        let p = self.params;
        let mut configs = Vec::with_capacity(p.hiddens_count + 2);
        configs.push(
            LayerConfig::new(LayerType::Input, p.input_size_x, p.input_size_y)
                .with_activation(p.hidden_activation_function, p.hidden_activation_alpha),
        );
        for _ in 0..p.hiddens_count {
            configs.push(
                LayerConfig::new(LayerType::Hidden, p.hidden_size_x, p.hidden_size_y)
                    .with_activation(p.hidden_activation_function, p.hidden_activation_alpha),
            );
        }
        configs.push(
            LayerConfig::new(LayerType::Output, p.output_size_x, p.output_size_y)
                .with_activation(p.output_activation_function, p.output_activation_alpha),
        );
        configs
    }

    pub fn build(self) -> Result<Network> {
        let network = Network::new(self.layer_configs(), self.seed)?;
        log::info!(
            "created network: {} layers, {} max weights per neuron",
            network.layers.len(),
            network.max_weights
        );
        Ok(network)
    }
}
