//! Run configuration and the context object handed to every entry point.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hyperparameters::NetworkParams;

/// Epoch limit meaning "no limit"
pub const NO_MAX_EPOCHS: usize = 0;

/// Crate version written into exported metadata.
pub const FORMAT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Enhancer,
    Training,
}

/// Execution strategy for propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Cpu,
    Gpu,
}

/// Application-level run parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppParams {
    pub run_mode: RunMode,
    pub backend: Backend,

    /// Row-level data parallelism of the CPU engine
    pub enable_parallel: bool,

    pub input_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,

    /// Two-column CSV of `input,target` image paths
    pub training_data_file: Option<PathBuf>,

    /// Folder of target images; inputs are synthesized by downscaling
    pub training_data_folder: Option<PathBuf>,

    /// Metadata file of a network to load, its weights live next to it as `.csv`
    pub network_to_import: Option<PathBuf>,
    pub network_to_export: Option<PathBuf>,

    /// Scale of the saved output relative to the original input size
    pub output_scale: f32,

    pub training_split_ratio: f32,
    pub learning_rate_min: f32,
    pub learning_rate_max: f32,

    /// 0 means no limit
    pub max_epochs: usize,
    pub max_epochs_without_improvement: usize,
    pub epoch_autosave: usize,

    /// Number of parts per axis an image is split into, 0 or 1 for none
    pub image_split: usize,

    /// Downscale factor used to synthesize inputs from target images
    pub training_reduce_factor: u32,

    pub random_loading: bool,
    pub bulk_loading: bool,
    pub enable_padding: bool,
    pub no_save: bool,
    pub verbose: bool,

    /// Seed for weight initialization, random when unset
    pub seed: Option<u64>,
}

impl Default for AppParams {
    fn default() -> Self {
        AppParams {
            run_mode: RunMode::Enhancer,
            backend: Backend::Cpu,
            enable_parallel: true,
            input_file: None,
            output_file: None,
            training_data_file: None,
            training_data_folder: None,
            network_to_import: None,
            network_to_export: None,
            output_scale: 1.0,
            training_split_ratio: 0.7,
            learning_rate_min: 1e-5,
            learning_rate_max: 1.0,
            max_epochs: NO_MAX_EPOCHS,
            max_epochs_without_improvement: 2,
            epoch_autosave: 100,
            image_split: 0,
            training_reduce_factor: 4,
            random_loading: false,
            bulk_loading: false,
            enable_padding: false,
            no_save: false,
            verbose: false,
            seed: None,
        }
    }
}

/// Explicit replacement for global managers: both parameter sets, passed by
/// reference into the engine and orchestrator entry points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default, rename = "app")]
    pub app_params: AppParams,

    #[serde(default, rename = "network")]
    pub network_params: NetworkParams,
}

impl Context {
    pub fn new(app_params: AppParams, network_params: NetworkParams) -> Self {
        Context {
            app_params,
            network_params,
        }
    }

    /// Load a context from a TOML file with `[app]` and `[network]` tables.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Configuration(e.to_string()))
    }

    /// Rejects inconsistent parameters before any propagation happens.
    pub fn validate(&self) -> Result<()> {
        let app = &self.app_params;
        let net = &self.network_params;

        let sizes = [
            ("input_size_x", net.input_size_x),
            ("input_size_y", net.input_size_y),
            ("output_size_x", net.output_size_x),
            ("output_size_y", net.output_size_y),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(Error::Configuration(format!("{name} must be non-zero")));
            }
        }
        if net.hiddens_count > 0 && (net.hidden_size_x == 0 || net.hidden_size_y == 0) {
            return Err(Error::Configuration("hidden layer size must be non-zero".into()));
        }
        if !net.learning_rate.is_finite() || net.learning_rate < 0.0 {
            return Err(Error::Configuration("learning_rate must be a non-negative number".into()));
        }
        if net.error_min > net.error_max {
            return Err(Error::Configuration(format!(
                "error_min ({}) is greater than error_max ({})",
                net.error_min, net.error_max
            )));
        }
        if !(app.training_split_ratio > 0.0 && app.training_split_ratio <= 1.0) {
            return Err(Error::Configuration(format!(
                "training_split_ratio must be in (0, 1], got {}",
                app.training_split_ratio
            )));
        }
        if app.learning_rate_min > app.learning_rate_max {
            return Err(Error::Configuration(format!(
                "learning_rate_min ({}) is greater than learning_rate_max ({})",
                app.learning_rate_min, app.learning_rate_max
            )));
        }
        if app.output_scale <= 0.0 {
            return Err(Error::Configuration("output_scale must be positive".into()));
        }
        if app.training_reduce_factor == 0 {
            return Err(Error::Configuration("training_reduce_factor must be non-zero".into()));
        }

        match app.run_mode {
            RunMode::Enhancer => {
                if app.network_to_import.is_none() {
                    return Err(Error::Configuration("enhancer mode requires a network to import".into()));
                }
                if app.input_file.is_none() || app.output_file.is_none() {
                    return Err(Error::Configuration(
                        "enhancer mode requires an input and an output file".into(),
                    ));
                }
            }
            RunMode::Training => {
                if app.training_data_file.is_none() && app.training_data_folder.is_none() {
                    return Err(Error::Configuration(
                        "training mode requires a training data file or folder".into(),
                    ));
                }
                if app.network_to_export.is_none() && !app.no_save {
                    return Err(Error::Configuration(
                        "training mode requires a network to export unless saving is disabled".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationType;

    #[test]
    fn test_defaults() {
        let app = AppParams::default();
        assert_eq!(app.training_split_ratio, 0.7);
        assert_eq!(app.max_epochs, NO_MAX_EPOCHS);
        assert_eq!(app.max_epochs_without_improvement, 2);
        assert_eq!(app.epoch_autosave, 100);
        assert_eq!(app.training_reduce_factor, 4);
        assert!(app.enable_parallel);
    }

    #[test]
    fn test_from_toml_keeps_missing_keys() {
        let ctx = Context::from_toml(
            r#"
            [app]
            run_mode = "training"
            backend = "gpu"
            training_data_folder = "images"
            no_save = true

            [network]
            hiddens_count = 3
            hidden_activation_function = "Tanh"
            "#,
        )
        .unwrap();

        assert_eq!(ctx.app_params.run_mode, RunMode::Training);
        assert_eq!(ctx.app_params.backend, Backend::Gpu);
        assert_eq!(ctx.app_params.epoch_autosave, 100);
        assert_eq!(ctx.network_params.hiddens_count, 3);
        assert_eq!(ctx.network_params.hidden_activation_function, ActivationType::Tanh);
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        let mut ctx = Context::default();
        ctx.app_params.run_mode = RunMode::Training;
        ctx.app_params.no_save = true;
        // no dataset
        assert!(matches!(ctx.validate(), Err(Error::Configuration(_))));

        ctx.app_params.training_data_file = Some("data.csv".into());
        assert!(ctx.validate().is_ok());

        ctx.app_params.training_split_ratio = 0.0;
        assert!(matches!(ctx.validate(), Err(Error::Configuration(_))));
        ctx.app_params.training_split_ratio = 1.0;

        ctx.network_params.error_min = 2.0;
        ctx.network_params.error_max = 1.0;
        assert!(matches!(ctx.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_unknown_activation_is_a_configuration_error() {
        let result = Context::from_toml("[network]\nhidden_activation_function = \"Swish\"\n");
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
