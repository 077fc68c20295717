use std::path::Path;

use crate::config::Context;
use crate::engine::{create_engine, PropagationEngine};
use crate::error::{Error, Result};
use crate::image_io::{ImageHelper, ImageParts};
use crate::model::Network;
use crate::persistence;

/// Runs every part of `input` through `network` and returns the output parts
/// with the geometry of the input.
pub fn enhance_parts(
    engine: &mut dyn PropagationEngine,
    network: &mut Network,
    input: &ImageParts,
) -> Result<ImageParts> {
    let parts = input
        .parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            log::debug!("enhancing part {}/{}", i + 1, input.len());
            engine.forward(network, part)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(input.with_parts(parts))
}

/// Imports the configured network and enhances the configured input image.
pub fn run_enhancer(ctx: &mut Context) -> Result<()> {
    let network = persistence::import_network(ctx)?;
    let app = &ctx.app_params;
    let input = app
        .input_file
        .as_deref()
        .ok_or_else(|| Error::Configuration("no input file to enhance".to_string()))?;
    let output = app
        .output_file
        .as_deref()
        .ok_or_else(|| Error::Configuration("no output file to write".to_string()))?;
    enhance_file(ctx, network, input, output)
}

/// Enhances `input` with `network` and writes the result to `output` scaled
/// by the configured output scale.
pub fn enhance_file(ctx: &Context, mut network: Network, input: &Path, output: &Path) -> Result<()> {
    let app = &ctx.app_params;
    let net = &ctx.network_params;
    let helper = ImageHelper::default();

    let mut engine = create_engine(app.backend, &network, app.enable_parallel)?;
    let image = helper.load_image(input, app.image_split, app.enable_padding, net.input_size_x, net.input_size_y)?;
    log::info!("enhancing {} ({} parts)", input.display(), image.len());

    let enhanced = enhance_parts(engine.as_mut(), &mut network, &image)?;
    helper.save_image(output, &enhanced, app.output_scale)?;
    log::info!("enhanced image saved to {}", output.display());
    Ok(())
}
