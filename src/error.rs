//! Error taxonomy shared by every operation of the crate.

/// All errors surfaced by network construction, propagation, persistence and training.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or missing run parameter, raised before any propagation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed or missing model files.
    #[error("import/export error: {0}")]
    ImportExport(String),

    /// Device or driver failure on the GPU path.
    #[error("GPU error: {0}")]
    Gpu(String),

    /// A device buffer could not be allocated.
    #[error("GPU allocation failure: {0}")]
    GpuAllocation(String),

    /// Empty or malformed dataset.
    #[error("training data error: {0}")]
    TrainingData(String),

    /// Front layer not Input, back layer not Output, unbound chain or shape mismatch.
    #[error("network topology error: {0}")]
    NetworkTopology(String),

    #[error("unsupported activation function: {0}")]
    UnsupportedActivation(String),

    /// Image decode, encode or geometry failure.
    #[error("image error: {0}")]
    Image(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
