use serde::{Deserialize, Serialize};

use crate::activation::ActivationType;

/// Hyperparameters of the grid network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkParams {
    /// Input layer width (columns)
    pub input_size_x: usize,

    /// Input layer height (rows)
    pub input_size_y: usize,

    pub hidden_size_x: usize,
    pub hidden_size_y: usize,
    pub output_size_x: usize,
    pub output_size_y: usize,

    /// Number of hidden layers between input and output
    pub hiddens_count: usize,

    /// Learning rate for training, adapted between epochs when enabled
    pub learning_rate: f32,

    pub adaptive_learning_rate: bool,

    /// Multiplier applied to the learning rate when the validation loss worsens
    pub adaptive_learning_rate_factor: f32,

    /// Allow the adaptive policy to raise the learning rate on improvement
    pub enable_adaptive_increase: bool,

    /// Lower clamp bound of back-propagated errors
    pub error_min: f32,

    /// Upper clamp bound of back-propagated errors
    pub error_max: f32,

    pub hidden_activation_function: ActivationType,

    /// Used by ELU and PReLU
    pub hidden_activation_alpha: f32,

    pub output_activation_function: ActivationType,
    pub output_activation_alpha: f32,
}

impl Default for NetworkParams {
    fn default() -> Self {
        NetworkParams {
            input_size_x: 32,
            input_size_y: 32,
            hidden_size_x: 32,
            hidden_size_y: 32,
            output_size_x: 32,
            output_size_y: 32,
            hiddens_count: 1,
            learning_rate: 0.01,
            adaptive_learning_rate: false,
            adaptive_learning_rate_factor: 0.5,
            enable_adaptive_increase: false,
            error_min: -10.0,
            error_max: 10.0,
            hidden_activation_function: ActivationType::LReLU,
            hidden_activation_alpha: 0.1,
            output_activation_function: ActivationType::LReLU,
            output_activation_alpha: 0.1,
        }
    }
}
