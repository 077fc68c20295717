use ndarray::Array2;

use crate::config::Backend;
use crate::error::Result;
use crate::gpu::GpuEngine;
use crate::model::Network;
use crate::rgba::Rgba;

/// Execution strategy for the three propagation phases.
///
/// Implementations must be numerically equivalent up to floating-point
/// tolerance; the caller picks one before training starts.
pub trait PropagationEngine {
    fn name(&self) -> &'static str;

    /// Injects `input` into the input layer, runs the forward pass and
    /// returns the output layer values.
    fn forward(&mut self, network: &mut Network, input: &Array2<Rgba>) -> Result<Array2<Rgba>>;

    fn backward(
        &mut self,
        network: &mut Network,
        target: &Array2<Rgba>,
        error_min: f32,
        error_max: f32,
    ) -> Result<()>;

    fn update_weights(&mut self, network: &mut Network, learning_rate: f32) -> Result<()>;
}

/// Dense propagation on the host, optionally fanned out with rayon.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuEngine {
    pub parallel: bool,
}

impl CpuEngine {
    pub fn new(parallel: bool) -> Self {
        CpuEngine { parallel }
    }
}

impl PropagationEngine for CpuEngine {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn forward(&mut self, network: &mut Network, input: &Array2<Rgba>) -> Result<Array2<Rgba>> {
        network.set_input(input)?;
        network.forward(self.parallel)?;
        Ok(network.output_values().clone())
    }

    fn backward(
        &mut self,
        network: &mut Network,
        target: &Array2<Rgba>,
        error_min: f32,
        error_max: f32,
    ) -> Result<()> {
        network.backward(target, error_min, error_max, self.parallel)
    }

    fn update_weights(&mut self, network: &mut Network, learning_rate: f32) -> Result<()> {
        network.update_weights(learning_rate, self.parallel)
    }
}

/// Creates the engine selected by `backend`, sized for `network`.
pub fn create_engine(
    backend: Backend,
    network: &Network,
    parallel: bool,
) -> Result<Box<dyn PropagationEngine>> {
    let engine: Box<dyn PropagationEngine> = match backend {
        Backend::Cpu => Box::new(CpuEngine::new(parallel)),
        Backend::Gpu => Box::new(GpuEngine::new(network)?),
    };
    log::info!("using {} propagation engine", engine.name());
    Ok(engine)
}
