pub mod activation;
pub mod cancel;
pub mod config;
pub mod data;
pub mod engine;
pub mod enhancer;
pub mod error;
pub mod gpu;
pub mod hyperparameters;
pub mod image_io;
pub mod layer;
pub mod loss;
pub mod model;
pub mod neuron;
pub mod optimizer;
pub mod persistence;
pub mod rgba;
pub mod runner;
pub mod training;
pub mod utils;

pub use activation::{Activation, ActivationType};
pub use cancel::CancellationToken;
pub use config::{AppParams, Backend, Context, RunMode};
pub use data::{TrainingDataFactory, TrainingPhase};
pub use engine::{CpuEngine, PropagationEngine};
pub use error::{Error, Result};
pub use gpu::GpuEngine;
pub use hyperparameters::NetworkParams;
pub use image_io::{ImageHelper, ImageParts};
pub use layer::{Layer, LayerType};
pub use loss::Loss;
pub use model::{LayerConfig, Network, NetworkBuilder};
pub use neuron::{NeighborConnection, Neuron};
pub use optimizer::Optimizer;
pub use rgba::Rgba;
pub use runner::{run, RunOutcome};
pub use training::{StopReason, Trainer, TrainingProgress, TrainingReport};
