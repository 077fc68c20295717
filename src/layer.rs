use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, Zip};
use rand::Rng;
use rayon::prelude::*;

use crate::activation::Activation;
use crate::error::{Error, Result};
use crate::neuron::Neuron;
use crate::rgba::Rgba;

/// Weight of the target distance in the output error, the rest goes to the
/// lateral neighbor term.
pub const OUTPUT_ERROR_BLEND: f32 = 0.5;

/// Position of a layer in the network chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerType {
    Input,
    Hidden,
    Output,
}

impl LayerType {
    pub fn name(&self) -> &'static str {
        match self {
            LayerType::Input => "LayerInput",
            LayerType::Hidden => "LayerHidden",
            LayerType::Output => "LayerOutput",
        }
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LayerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "LayerInput" => Ok(LayerType::Input),
            "LayerHidden" => Ok(LayerType::Hidden),
            "LayerOutput" => Ok(LayerType::Output),
            other => Err(Error::NetworkTopology(format!("unknown layer type '{other}'"))),
        }
    }
}

/// Represents a grid layer in the network
///
/// Values and errors are stored as `(height, width)` grids; neurons are kept
/// in the same row-major order, so neuron `i` owns `values[(i / width, i % width)]`.
#[derive(Debug, Clone)]
pub struct Layer {
    pub layer_type: LayerType,
    pub width: usize,
    pub height: usize,
    pub neurons: Vec<Neuron>,
    pub values: Array2<Rgba>,
    pub errors: Array2<Rgba>,

    /// Index of the previous layer in the network, `None` for the input layer
    pub previous: Option<usize>,

    /// Index of the next layer in the network, `None` for the output layer
    pub next: Option<usize>,

    pub activation: Activation,
}

impl Layer {
    /// Constructs a layer with unconnected neurons
    ///
    /// # Arguments
    ///
    /// * `layer_type` - Input, Hidden or Output
    /// * `width` - Number of grid columns
    /// * `height` - Number of grid rows
    /// * `activation` - Activation function bound to its alpha
    pub fn new(layer_type: LayerType, width: usize, height: usize, activation: Activation) -> Self {
        let neurons = (0..height)
            .flat_map(|y| (0..width).map(move |x| Neuron::new(x, y)))
            .collect();

        Layer {
            layer_type,
            width,
            height,
            neurons,
            values: Array2::from_elem((height, width), Rgba::ZERO),
            errors: Array2::from_elem((height, width), Rgba::ZERO),
            previous: None,
            next: None,
            activation,
        }
    }

    pub fn size(&self) -> usize {
        self.width * self.height
    }

    pub fn neuron(&self, x: usize, y: usize) -> Option<&Neuron> {
        if x < self.width && y < self.height {
            self.neurons.get(y * self.width + x)
        } else {
            None
        }
    }

    /// Grid position `(row, column)` of the neuron at a flat index
    pub fn position(&self, index: usize) -> (usize, usize) {
        (index / self.width, index % self.width)
    }

    /// Allocates random feed-forward weights sized to the previous layer and
    /// connects lateral neighbors. Input layers keep neither.
    pub fn init_weights<R: Rng + ?Sized>(&mut self, previous: (usize, usize), rng: &mut R) {
        if self.layer_type == LayerType::Input {
            return;
        }
        let (width, height) = (self.width, self.height);
        for neuron in &mut self.neurons {
            neuron.init_weights(previous.0, previous.1, rng);
            neuron.connect_neighbors(width, height, || Rgba::random_xavier(rng, 8.0));
        }
    }

    /// Allocates zeroed weights and neighbor connections to be filled by an importer.
    pub fn reserve_weights(&mut self, previous: (usize, usize)) {
        if self.layer_type == LayerType::Input {
            return;
        }
        let (width, height) = (self.width, self.height);
        for neuron in &mut self.neurons {
            neuron.reserve_weights(previous.0, previous.1);
            neuron.connect_neighbors(width, height, || Rgba::ZERO);
        }
    }

    pub fn max_neighbors(&self) -> usize {
        self.neurons.iter().map(|n| n.neighbors.len()).max().unwrap_or(0)
    }

    /// Forward propagation from the previous layer's values
    ///
    /// Each neuron sums `previous value * weight` over the whole previous grid,
    /// then applies the activation per channel. Input layers are a no-op.
    pub fn forward(&mut self, previous: &Layer, parallel: bool) -> Result<()> {
        if self.layer_type == LayerType::Input {
            return Ok(());
        }
        let activation = self.activation;
        let compute = |neuron: &Neuron| -> Rgba {
            let sum = Zip::from(&previous.values)
                .and(&neuron.weights)
                .fold(Rgba::ZERO, |acc, &value, &weight| acc + value * weight);
            activation.apply(sum)
        };

        let values: Vec<Rgba> = if parallel {
            self.neurons.par_iter().with_min_len(self.width.max(1)).map(compute).collect()
        } else {
            self.neurons.iter().map(compute).collect()
        };
        self.values = grid_from_vec(self.height, self.width, values)?;
        Ok(())
    }

    /// Output errors: half the distance to the target plus half the weighted
    /// sum of neighbor values, clamped to `[error_min, error_max]`.
    pub fn compute_output_errors(
        &mut self,
        target: &Array2<Rgba>,
        error_min: f32,
        error_max: f32,
        parallel: bool,
    ) -> Result<()> {
        if target.dim() != self.values.dim() {
            return Err(Error::NetworkTopology(format!(
                "target grid {:?} does not match output layer {}x{}",
                target.dim(),
                self.width,
                self.height
            )));
        }
        let values = &self.values;
        let compute = |neuron: &Neuron| -> Rgba {
            let position = (neuron.index_y, neuron.index_x);
            let lateral = neuron.neighbors.iter().fold(Rgba::ZERO, |acc, conn| {
                acc + conn.weight * values[(conn.index_y, conn.index_x)]
            });
            ((values[position] - target[position]) * OUTPUT_ERROR_BLEND
                + lateral * (1.0 - OUTPUT_ERROR_BLEND))
                .clamp(error_min, error_max)
        };

        let errors: Vec<Rgba> = if parallel {
            self.neurons.par_iter().with_min_len(self.width.max(1)).map(compute).collect()
        } else {
            self.neurons.iter().map(compute).collect()
        };
        self.errors = grid_from_vec(self.height, self.width, errors)?;
        Ok(())
    }

    /// Hidden errors from the next layer's weighted errors and the lateral
    /// errors of this layer, scaled by the activation derivative at the
    /// neuron's value. Lateral terms read the errors as they were before this call.
    pub fn compute_hidden_errors(
        &mut self,
        next: &Layer,
        error_min: f32,
        error_max: f32,
        parallel: bool,
    ) -> Result<()> {
        let (values, errors, activation) = (&self.values, &self.errors, self.activation);
        let compute = |neuron: &Neuron| -> Rgba {
            let position = (neuron.index_y, neuron.index_x);
            let mut error = next
                .neurons
                .iter()
                .zip(next.errors.iter())
                .fold(Rgba::ZERO, |acc, (n, &e)| acc + n.weights[position] * e);
            for conn in &neuron.neighbors {
                error += errors[(conn.index_y, conn.index_x)] * conn.weight;
            }
            (error * activation.derivative(values[position])).clamp(error_min, error_max)
        };

        let errors: Vec<Rgba> = if parallel {
            self.neurons.par_iter().with_min_len(self.width.max(1)).map(compute).collect()
        } else {
            self.neurons.iter().map(compute).collect()
        };
        self.errors = grid_from_vec(self.height, self.width, errors)?;
        Ok(())
    }

    /// Gradient step on feed-forward and lateral weights.
    ///
    /// Every delta is clamped to `[-1, 1]` per channel before being scaled by
    /// the learning rate.
    pub fn update_weights(&mut self, previous: &Layer, learning_rate: f32, parallel: bool) {
        if self.layer_type == LayerType::Input {
            return;
        }
        let min_len = self.width.max(1);
        let Layer { neurons, values, errors, .. } = self;
        let (values, errors) = (&*values, &*errors);
        let update = |neuron: &mut Neuron| {
            let error = errors[(neuron.index_y, neuron.index_x)];
            Zip::from(&mut neuron.weights)
                .and(&previous.values)
                .for_each(|weight, &value| {
                    *weight -= learning_rate * (value * error).clamp(-1.0, 1.0);
                });
            for conn in &mut neuron.neighbors {
                let value = values[(conn.index_y, conn.index_x)];
                conn.weight -= learning_rate * (value * error).clamp(-1.0, 1.0);
            }
        };

        if parallel {
            neurons.par_iter_mut().with_min_len(min_len).for_each(update);
        } else {
            neurons.iter_mut().for_each(update);
        }
    }
}

pub(crate) fn grid_from_vec(height: usize, width: usize, data: Vec<Rgba>) -> Result<Array2<Rgba>> {
    Array2::from_shape_vec((height, width), data)
        .map_err(|e| Error::NetworkTopology(format!("grid {width}x{height}: {e}")))
}
