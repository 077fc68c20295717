use ndarray::{Array2, Zip};

use crate::error::{Error, Result};
use crate::rgba::Rgba;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Loss {
    #[default]
    MeanSquaredError,
}

impl Loss {
    /// Compares a predicted grid with its target.
    ///
    /// Mean squared error: the per-channel mean of squared differences over
    /// every pixel, then averaged over the 4 channels.
    pub fn calculate(&self, prediction: &Array2<Rgba>, target: &Array2<Rgba>) -> Result<f32> {
        if prediction.dim() != target.dim() {
            return Err(Error::NetworkTopology(format!(
                "loss on mismatched grids {:?} and {:?}",
                prediction.dim(),
                target.dim()
            )));
        }
        if prediction.is_empty() {
            return Ok(0.0);
        }
        match self {
            Loss::MeanSquaredError => {
                let squared = Zip::from(prediction)
                    .and(target)
                    .fold(Rgba::ZERO, |acc, &p, &t| acc + (p - t).powf(2.0));
                Ok(squared.sum() / (4.0 * prediction.len() as f32))
            }
        }
    }
}
