//! Flattening of the host model into the buffer layouts the shader reads,
//! and the inverse write-back. Pure functions, no device access.

use ndarray::Array2;

use crate::error::{Error, Result};
use crate::layer::{grid_from_vec, Layer};
use crate::neuron::Neuron;
use crate::rgba::Rgba;

/// Lateral connections per neuron reserved in the neighbor buffers.
pub const MAX_NEIGHBORS: usize = 4;

/// Scalar parameters of one dispatch, mirrors `Params` in the shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuParams {
    pub learning_rate: f32,
    pub error_min: f32,
    pub error_max: f32,
    pub activation_alpha: f32,
    pub activation_function: u32,
    pub neuron_count: u32,
    pub adjacent_count: u32,
    pub max_weights: u32,
}

/// Per-neuron indices, mirrors `Neuron` in the shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuNeuron {
    pub index_x: u32,
    pub index_y: u32,
    pub neighbor_count: u32,
    pub flat_index: u32,

    /// Flat indices of the neighbors inside the layer, unused slots are 0
    pub neighbors: [u32; MAX_NEIGHBORS],
}

pub fn flatten_neurons(layer: &Layer) -> Result<Vec<GpuNeuron>> {
    layer
        .neurons
        .iter()
        .map(|neuron| {
            if neuron.neighbors.len() > MAX_NEIGHBORS {
                return Err(Error::NetworkTopology(format!(
                    "neuron ({}, {}) has {} neighbors",
                    neuron.index_x,
                    neuron.index_y,
                    neuron.neighbors.len()
                )));
            }
            let mut neighbors = [0u32; MAX_NEIGHBORS];
            for (slot, conn) in neighbors.iter_mut().zip(&neuron.neighbors) {
                *slot = conn.flat_index(layer.width) as u32;
            }
            Ok(GpuNeuron {
                index_x: neuron.index_x as u32,
                index_y: neuron.index_y as u32,
                neighbor_count: neuron.neighbors.len() as u32,
                flat_index: neuron.flat_index(layer.width) as u32,
                neighbors,
            })
        })
        .collect()
}

/// Row-major copy of a value or error grid.
pub fn flatten_grid(grid: &Array2<Rgba>) -> Vec<Rgba> {
    grid.iter().copied().collect()
}

pub fn unflatten_grid(height: usize, width: usize, data: &[Rgba]) -> Result<Array2<Rgba>> {
    let count = height * width;
    if data.len() < count {
        return Err(Error::Gpu(format!(
            "read back {} values for a {width}x{height} grid",
            data.len()
        )));
    }
    grid_from_vec(height, width, data[..count].to_vec())
}

/// Feed-forward tensors of `neurons`, each padded with zeros to `stride`.
pub fn flatten_weights(neurons: &[Neuron], stride: usize) -> Result<Vec<Rgba>> {
    let mut flat = Vec::with_capacity(neurons.len() * stride);
    for neuron in neurons {
        if neuron.weight_count() > stride {
            return Err(Error::Gpu(format!(
                "neuron ({}, {}) has {} weights, buffers were sized for {stride}",
                neuron.index_x,
                neuron.index_y,
                neuron.weight_count()
            )));
        }
        flat.extend(neuron.weights.iter().copied());
        flat.resize(flat.len() + stride - neuron.weight_count(), Rgba::ZERO);
    }
    Ok(flat)
}

pub fn unflatten_weights(neurons: &mut [Neuron], data: &[Rgba], stride: usize) -> Result<()> {
    if data.len() < neurons.len() * stride {
        return Err(Error::Gpu(format!(
            "read back {} weights for {} neurons of stride {stride}",
            data.len(),
            neurons.len()
        )));
    }
    for (neuron, chunk) in neurons.iter_mut().zip(data.chunks(stride.max(1))) {
        for (weight, value) in neuron.weights.iter_mut().zip(chunk) {
            *weight = *value;
        }
    }
    Ok(())
}

/// Lateral weights, `MAX_NEIGHBORS` slots per neuron.
pub fn flatten_neighbor_weights(neurons: &[Neuron]) -> Vec<Rgba> {
    let mut flat = vec![Rgba::ZERO; neurons.len() * MAX_NEIGHBORS];
    for (neuron, slots) in neurons.iter().zip(flat.chunks_mut(MAX_NEIGHBORS)) {
        for (slot, conn) in slots.iter_mut().zip(&neuron.neighbors) {
            *slot = conn.weight;
        }
    }
    flat
}

pub fn unflatten_neighbor_weights(neurons: &mut [Neuron], data: &[Rgba]) -> Result<()> {
    if data.len() < neurons.len() * MAX_NEIGHBORS {
        return Err(Error::Gpu(format!(
            "read back {} neighbor weights for {} neurons",
            data.len(),
            neurons.len()
        )));
    }
    for (neuron, slots) in neurons.iter_mut().zip(data.chunks(MAX_NEIGHBORS)) {
        for (conn, value) in neuron.neighbors.iter_mut().zip(slots) {
            conn.weight = *value;
        }
    }
    Ok(())
}
