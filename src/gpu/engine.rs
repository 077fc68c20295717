use std::borrow::Cow;

use ndarray::Array2;
use wgpu::{Buffer, ComputePipeline, PipelineCompilationOptions};

use crate::engine::PropagationEngine;
use crate::error::{Error, Result};
use crate::gpu::buffers::GpuBuffers;
use crate::gpu::context::GpuContext;
use crate::gpu::mirror::{self, GpuParams, MAX_NEIGHBORS};
use crate::layer::{Layer, LayerType};
use crate::model::Network;
use crate::rgba::Rgba;

const WORKGROUP_SIZE: u32 = 64;

struct Pipelines {
    forward: ComputePipeline,
    backward_output: ComputePipeline,
    backward_hidden: ComputePipeline,
    update: ComputePipeline,
}

/// Runs the propagation phases as compute dispatches.
///
/// Before every dispatch the relevant layers are flattened from the host
/// model into the device buffers, and results are written back into the
/// host model once the queue is idle. The host model stays the single
/// source of truth, so the device never runs against stale data.
pub struct GpuEngine {
    context: GpuContext,
    buffers: GpuBuffers,
    pipelines: Pipelines,
}

impl GpuEngine {
    /// Acquires a device and allocates buffers sized for `network`.
    pub fn new(network: &Network) -> Result<Self> {
        let context = GpuContext::blocking()?;
        let buffers = GpuBuffers::new(&context.device, network.max_neurons(), network.max_weights)?;
        let pipelines = create_pipelines(&context, &buffers)?;
        log::info!("GPU engine ready on {}", context.adapter_name);

        Ok(GpuEngine {
            context,
            buffers,
            pipelines,
        })
    }

    fn check_capacity(&self, network: &Network) -> Result<()> {
        if network.max_neurons() > self.buffers.max_neurons
            || network.max_weights > self.buffers.max_weights
        {
            return Err(Error::Gpu(format!(
                "network needs {} neurons x {} weights, buffers hold {} x {}",
                network.max_neurons(),
                network.max_weights,
                self.buffers.max_neurons,
                self.buffers.max_weights
            )));
        }
        Ok(())
    }

    fn params(&self, layer: &Layer, adjacent_count: usize) -> GpuParams {
        GpuParams {
            activation_alpha: layer.activation.alpha,
            activation_function: layer.activation.kind.index(),
            neuron_count: layer.size() as u32,
            adjacent_count: adjacent_count as u32,
            max_weights: self.buffers.max_weights as u32,
            ..GpuParams::default()
        }
    }

    fn upload<T: bytemuck::Pod>(&self, buffer: &Buffer, data: &[T]) -> Result<()> {
        self.buffers.upload(&self.context.queue, buffer, data)
    }

    /// Records one dispatch over `neuron_count` invocations and blocks until
    /// the queue has finished it.
    fn dispatch(&self, pipeline: &ComputePipeline, neuron_count: u32, label: &str) -> Result<()> {
        self.buffers.staging.ensure_unmapped()?;
        let workgroups = (neuron_count + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE;
        if workgroups > self.context.device.limits().max_compute_workgroups_per_dimension {
            return Err(Error::Gpu(format!("{neuron_count} neurons exceed one dispatch")));
        }

        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(label),
        });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(pipeline);
            compute_pass.set_bind_group(0, &self.buffers.bind_group, &[]);
            compute_pass.dispatch_workgroups(workgroups, 1, 1);
        }
        self.context.queue.submit(Some(encoder.finish()));
        device.poll(wgpu::Maintain::Wait);

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(Error::Gpu(format!("{label} failed: {err}")));
        }
        log::debug!("{label}: {neuron_count} neurons in {workgroups} workgroups");
        Ok(())
    }

    fn read_back(&self, source: &Buffer, count: usize) -> Result<Vec<Rgba>> {
        let len = (count * std::mem::size_of::<Rgba>()) as u64;
        let mapped = self
            .buffers
            .staging
            .read(&self.context.device, &self.context.queue, source, len)?;
        Ok(mapped.to_rgba())
    }

    fn forward_layer(&self, layer: &mut Layer, previous: &Layer) -> Result<()> {
        let params = self.params(layer, previous.size());
        self.buffers.upload_params(&self.context.queue, &params);
        self.upload(&self.buffers.adjacent, &mirror::flatten_grid(&previous.values))?;
        self.upload(
            &self.buffers.weights,
            &mirror::flatten_weights(&layer.neurons, self.buffers.max_weights)?,
        )?;

        self.dispatch(&self.pipelines.forward, params.neuron_count, "Forward Pass")?;

        let values = self.read_back(&self.buffers.results, layer.size())?;
        layer.values = mirror::unflatten_grid(layer.height, layer.width, &values)?;
        Ok(())
    }

    fn backward_output(
        &self,
        layer: &mut Layer,
        target: &Array2<Rgba>,
        error_min: f32,
        error_max: f32,
    ) -> Result<()> {
        if target.dim() != layer.values.dim() {
            return Err(Error::NetworkTopology(format!(
                "target grid {:?} does not match output layer {}x{}",
                target.dim(),
                layer.width,
                layer.height
            )));
        }
        let params = GpuParams {
            error_min,
            error_max,
            ..self.params(layer, layer.size())
        };
        self.buffers.upload_params(&self.context.queue, &params);
        self.upload(&self.buffers.neurons, &mirror::flatten_neurons(layer)?)?;
        self.upload(&self.buffers.values, &mirror::flatten_grid(&layer.values))?;
        self.upload(
            &self.buffers.neighbor_weights,
            &mirror::flatten_neighbor_weights(&layer.neurons),
        )?;
        self.upload(&self.buffers.adjacent, &mirror::flatten_grid(target))?;

        self.dispatch(&self.pipelines.backward_output, params.neuron_count, "Output Backward Pass")?;

        let errors = self.read_back(&self.buffers.results, layer.size())?;
        layer.errors = mirror::unflatten_grid(layer.height, layer.width, &errors)?;
        Ok(())
    }

    fn backward_hidden(
        &self,
        layer: &mut Layer,
        next: &Layer,
        error_min: f32,
        error_max: f32,
    ) -> Result<()> {
        let params = GpuParams {
            error_min,
            error_max,
            ..self.params(layer, next.size())
        };
        self.buffers.upload_params(&self.context.queue, &params);
        self.upload(&self.buffers.neurons, &mirror::flatten_neurons(layer)?)?;
        self.upload(&self.buffers.values, &mirror::flatten_grid(&layer.values))?;
        self.upload(&self.buffers.errors, &mirror::flatten_grid(&layer.errors))?;
        self.upload(
            &self.buffers.neighbor_weights,
            &mirror::flatten_neighbor_weights(&layer.neurons),
        )?;
        self.upload(&self.buffers.adjacent, &mirror::flatten_grid(&next.errors))?;
        self.upload(
            &self.buffers.weights,
            &mirror::flatten_weights(&next.neurons, self.buffers.max_weights)?,
        )?;

        self.dispatch(&self.pipelines.backward_hidden, params.neuron_count, "Hidden Backward Pass")?;

        let errors = self.read_back(&self.buffers.results, layer.size())?;
        layer.errors = mirror::unflatten_grid(layer.height, layer.width, &errors)?;
        Ok(())
    }

    fn update_layer(&self, layer: &mut Layer, previous: &Layer, learning_rate: f32) -> Result<()> {
        let params = GpuParams {
            learning_rate,
            ..self.params(layer, previous.size())
        };
        self.buffers.upload_params(&self.context.queue, &params);
        self.upload(&self.buffers.neurons, &mirror::flatten_neurons(layer)?)?;
        self.upload(&self.buffers.values, &mirror::flatten_grid(&layer.values))?;
        self.upload(&self.buffers.errors, &mirror::flatten_grid(&layer.errors))?;
        self.upload(
            &self.buffers.neighbor_weights,
            &mirror::flatten_neighbor_weights(&layer.neurons),
        )?;
        self.upload(&self.buffers.adjacent, &mirror::flatten_grid(&previous.values))?;
        self.upload(
            &self.buffers.weights,
            &mirror::flatten_weights(&layer.neurons, self.buffers.max_weights)?,
        )?;

        self.dispatch(&self.pipelines.update, params.neuron_count, "Weight Update Pass")?;

        let weights = self.read_back(&self.buffers.weights, layer.size() * self.buffers.max_weights)?;
        mirror::unflatten_weights(&mut layer.neurons, &weights, self.buffers.max_weights)?;
        let neighbor_weights =
            self.read_back(&self.buffers.neighbor_weights, layer.size() * MAX_NEIGHBORS)?;
        mirror::unflatten_neighbor_weights(&mut layer.neurons, &neighbor_weights)?;
        Ok(())
    }
}

impl PropagationEngine for GpuEngine {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn forward(&mut self, network: &mut Network, input: &Array2<Rgba>) -> Result<Array2<Rgba>> {
        network.validate()?;
        self.check_capacity(network)?;
        network.set_input(input)?;
        for i in 0..network.layers.len() {
            let Some(previous) = network.layers[i].previous else {
                continue;
            };
            let (layer, previous) = network.layer_pair_mut(i, previous);
            self.forward_layer(layer, previous)?;
        }
        Ok(network.output_values().clone())
    }

    fn backward(
        &mut self,
        network: &mut Network,
        target: &Array2<Rgba>,
        error_min: f32,
        error_max: f32,
    ) -> Result<()> {
        network.validate()?;
        self.check_capacity(network)?;
        for i in (0..network.layers.len()).rev() {
            match network.layers[i].layer_type {
                LayerType::Output => {
                    self.backward_output(&mut network.layers[i], target, error_min, error_max)?
                }
                LayerType::Hidden => {
                    let next = network.layers[i].next.ok_or_else(|| {
                        Error::NetworkTopology(format!("hidden layer {i} has no next layer"))
                    })?;
                    let (layer, next) = network.layer_pair_mut(i, next);
                    self.backward_hidden(layer, next, error_min, error_max)?;
                }
                LayerType::Input => {}
            }
        }
        Ok(())
    }

    fn update_weights(&mut self, network: &mut Network, learning_rate: f32) -> Result<()> {
        network.validate()?;
        self.check_capacity(network)?;
        for i in 0..network.layers.len() {
            let Some(previous) = network.layers[i].previous else {
                continue;
            };
            let (layer, previous) = network.layer_pair_mut(i, previous);
            self.update_layer(layer, previous, learning_rate)?;
        }
        Ok(())
    }
}

fn create_pipelines(context: &GpuContext, buffers: &GpuBuffers) -> Result<Pipelines> {
    let device = &context.device;
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Propagation Shader"),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("propagation.wgsl"))),
    });

    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Propagation Pipeline Layout"),
        bind_group_layouts: &[&buffers.bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = |entry_point: &str, label: &str| {
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&layout),
            module: &shader,
            entry_point: Some(entry_point),
            compilation_options: PipelineCompilationOptions::default(),
            cache: None,
        })
    };

    let pipelines = Pipelines {
        forward: pipeline("forward_main", "Forward Pipeline"),
        backward_output: pipeline("backward_output_main", "Output Backward Pipeline"),
        backward_hidden: pipeline("backward_hidden_main", "Hidden Backward Pipeline"),
        update: pipeline("update_main", "Weight Update Pipeline"),
    };

    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(Error::Gpu(format!("shader or pipeline creation failed: {err}")));
    }
    Ok(pipelines)
}
