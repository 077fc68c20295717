use crate::config::AppParams;
use crate::hyperparameters::NetworkParams;

/// Adaptive learning-rate policy driven by the validation loss trend.
#[derive(Debug, Clone)]
pub struct Optimizer {
    pub learning_rate: f32,
    pub learning_rate_min: f32,
    pub learning_rate_max: f32,

    /// Multiplier applied when the loss worsens or stays flat
    pub factor: f32,
    pub adaptive: bool,
    pub allow_increase: bool,
}

impl Optimizer {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            learning_rate_min: 1e-5,
            learning_rate_max: 1.0,
            factor: 0.5,
            adaptive: false,
            allow_increase: false,
        }
    }

    pub fn from_params(network: &NetworkParams, app: &AppParams) -> Self {
        Self {
            learning_rate: network.learning_rate,
            learning_rate_min: app.learning_rate_min,
            learning_rate_max: app.learning_rate_max,
            factor: network.adaptive_learning_rate_factor,
            adaptive: network.adaptive_learning_rate,
            allow_increase: network.enable_adaptive_increase,
        }
    }

    /// Adjusts the learning rate from the last two validation losses and
    /// returns the new rate.
    ///
    /// A worse or flat loss divides the step by `1 / factor`. When increases
    /// are allowed, an improving loss grows it by `1 / (1.5 * factor)`, slower
    /// than the decrease. The result is always clamped to the configured bounds.
    pub fn adapt(&mut self, current_loss: f32, previous_loss: f32) -> f32 {
        if !self.adaptive {
            return self.learning_rate;
        }
        if current_loss >= previous_loss && self.learning_rate > self.learning_rate_min {
            self.learning_rate *= self.factor;
        } else if self.allow_increase
            && current_loss < previous_loss
            && self.learning_rate < self.learning_rate_max
        {
            self.learning_rate /= self.factor * 1.5;
        }
        self.learning_rate = self
            .learning_rate
            .clamp(self.learning_rate_min, self.learning_rate_max);
        self.learning_rate
    }
}
