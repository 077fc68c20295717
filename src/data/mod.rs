mod factory;
pub mod reader;

pub use factory::{TrainingDataFactory, TrainingPhase, TrainingSample};
pub use reader::ImagePathPair;
