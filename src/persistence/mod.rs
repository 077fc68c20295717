//! Two-file model persistence: JSON metadata plus a CSV weight dump stored
//! next to it with the same stem.

mod metadata;
mod weights;

use std::path::{Path, PathBuf};

pub use metadata::{LayerMetadata, NetworkMetadata};

use crate::config::Context;
use crate::error::{Error, Result};
use crate::hyperparameters::NetworkParams;
use crate::model::{Network, NetworkBuilder};

/// Path of the weight file belonging to a metadata file.
pub fn csv_path_for(metadata_path: &Path) -> PathBuf {
    metadata_path.with_extension("csv")
}

/// Writes `network` to `path` and its weights next to it.
pub fn save_network(path: &Path, network: &Network, params: &NetworkParams) -> Result<()> {
    metadata::write_metadata(path, &NetworkMetadata::describe(network, params))?;
    weights::write_weights(&csv_path_for(path), network)?;
    log::info!("network saved to {}", path.display());
    Ok(())
}

/// Reads a network and the parameters it was trained with.
pub fn load_network(path: &Path) -> Result<(Network, NetworkParams)> {
    let meta = metadata::read_metadata(path)?;
    let mut network = Network::with_reserved_weights(meta.layer_configs()?)
        .map_err(|e| Error::ImportExport(format!("{}: {e}", path.display())))?;
    if network.max_weights != meta.max_weights {
        log::warn!(
            "metadata declares {} max weights, topology has {}",
            meta.max_weights,
            network.max_weights
        );
    }
    weights::read_weights(&csv_path_for(path), &mut network)?;
    log::info!("network imported from {}", path.display());
    Ok((network, meta.parameters))
}

/// Saves to the configured export path.
pub fn export_network(network: &Network, ctx: &Context) -> Result<()> {
    let path = ctx.app_params.network_to_export.as_deref().ok_or_else(|| {
        Error::Configuration("no path to export the network to".to_string())
    })?;
    save_network(path, network, &ctx.network_params)
}

/// Loads from the configured import path and adopts its parameters.
pub fn import_network(ctx: &mut Context) -> Result<Network> {
    let path = ctx.app_params.network_to_import.clone().ok_or_else(|| {
        Error::Configuration("no network to import".to_string())
    })?;
    let (network, params) = load_network(&path)?;
    ctx.network_params = params;
    Ok(network)
}

/// Imports the configured network when its file exists, otherwise builds a
/// new one from the context parameters.
pub fn create_or_import(ctx: &mut Context) -> Result<Network> {
    match &ctx.app_params.network_to_import {
        Some(path) if path.exists() => import_network(ctx),
        Some(path) => {
            log::info!("{} not found, creating a new network", path.display());
            NetworkBuilder::new(&ctx.network_params).seed(ctx.app_params.seed).build()
        }
        None => NetworkBuilder::new(&ctx.network_params).seed(ctx.app_params.seed).build(),
    }
}
