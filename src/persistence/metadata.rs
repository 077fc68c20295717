use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::FORMAT_VERSION;
use crate::error::{Error, Result};
use crate::hyperparameters::NetworkParams;
use crate::layer::LayerType;
use crate::model::{LayerConfig, Network};

/// Shape record of one layer in the metadata file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerMetadata {
    #[serde(rename = "type")]
    pub layer_type: String,
    pub size_x: usize,
    pub size_y: usize,
    pub neurons: usize,
}

/// Contents of the metadata file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetadata {
    pub version: String,
    pub layers: Vec<LayerMetadata>,
    pub max_weights: usize,
    pub parameters: NetworkParams,
}

impl NetworkMetadata {
    pub fn describe(network: &Network, params: &NetworkParams) -> Self {
        NetworkMetadata {
            version: FORMAT_VERSION.to_string(),
            layers: network
                .layers
                .iter()
                .map(|layer| LayerMetadata {
                    layer_type: layer.layer_type.name().to_string(),
                    size_x: layer.width,
                    size_y: layer.height,
                    neurons: layer.size(),
                })
                .collect(),
            max_weights: network.max_weights,
            parameters: params.clone(),
        }
    }

    /// Layer configurations to rebuild the described topology, activations
    /// taken from the stored parameters.
    pub fn layer_configs(&self) -> Result<Vec<LayerConfig>> {
        let p = &self.parameters;
        self.layers
            .iter()
            .map(|layer| {
                let layer_type: LayerType = layer.layer_type.parse()?;
                if layer.neurons != layer.size_x * layer.size_y {
                    return Err(Error::ImportExport(format!(
                        "{} of {}x{} declares {} neurons",
                        layer.layer_type, layer.size_x, layer.size_y, layer.neurons
                    )));
                }
                let config = LayerConfig::new(layer_type, layer.size_x, layer.size_y);
                Ok(match layer_type {
                    LayerType::Output => {
                        config.with_activation(p.output_activation_function, p.output_activation_alpha)
                    }
                    _ => config.with_activation(p.hidden_activation_function, p.hidden_activation_alpha),
                })
            })
            .collect()
    }
}

pub fn write_metadata(path: &Path, metadata: &NetworkMetadata) -> Result<()> {
    let file = fs::File::create(path).map_err(|e| {
        Error::ImportExport(format!("failed to create {}: {e}", path.display()))
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, metadata)
        .map_err(|e| Error::ImportExport(format!("failed to write {}: {e}", path.display())))?;
    writer.flush()?;
    Ok(())
}

pub fn read_metadata(path: &Path) -> Result<NetworkMetadata> {
    let file = fs::File::open(path).map_err(|e| {
        Error::ImportExport(format!("failed to open {}: {e}", path.display()))
    })?;
    let metadata: NetworkMetadata = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| Error::ImportExport(format!("malformed metadata {}: {e}", path.display())))?;
    if metadata.version != FORMAT_VERSION {
        log::warn!(
            "model file version {} differs from the current version {}",
            metadata.version,
            FORMAT_VERSION
        );
    }
    Ok(metadata)
}
