use std::sync::atomic::{AtomicBool, Ordering};

use wgpu::{BindGroup, BindGroupLayout, Buffer, Device, Queue};

use crate::error::{Error, Result};
use crate::gpu::mirror::{GpuNeuron, GpuParams, MAX_NEIGHBORS};
use crate::rgba::Rgba;

pub const BINDING_PARAMS: u32 = 0;
pub const BINDING_NEURONS: u32 = 1;
pub const BINDING_VALUES: u32 = 2;
pub const BINDING_ERRORS: u32 = 3;
pub const BINDING_NEIGHBOR_WEIGHTS: u32 = 4;
pub const BINDING_ADJACENT: u32 = 5;
pub const BINDING_WEIGHTS: u32 = 6;
pub const BINDING_RESULTS: u32 = 7;

const RGBA_SIZE: u64 = std::mem::size_of::<Rgba>() as u64;

/// Device buffers for one network, sized for its largest layer and its
/// largest feed-forward tensor. Every role has exactly one buffer, reused
/// by all layers and phases.
pub struct GpuBuffers {
    pub params: Buffer,
    pub neurons: Buffer,
    pub values: Buffer,
    pub errors: Buffer,
    pub neighbor_weights: Buffer,
    pub adjacent: Buffer,
    pub weights: Buffer,
    pub results: Buffer,
    pub staging: StagingBuffer,
    pub bind_group_layout: BindGroupLayout,
    pub bind_group: BindGroup,

    /// Capacity in neurons of the per-neuron buffers
    pub max_neurons: usize,

    /// Stride of the weights buffer
    pub max_weights: usize,
}

impl GpuBuffers {
    /// Allocates every buffer and binds them.
    ///
    /// Fails with `GpuAllocation` when a buffer exceeds the device limits or
    /// the device reports an out-of-memory or validation error; buffers
    /// created before the failure are released on return.
    pub fn new(device: &Device, max_neurons: usize, max_weights: usize) -> Result<Self> {
        let max_neurons = max_neurons.max(1);
        let max_weights = max_weights.max(1);
        let neurons = max_neurons as u64;

        let grid_size = neurons * RGBA_SIZE;
        let neighbor_size = neurons * MAX_NEIGHBORS as u64 * RGBA_SIZE;
        let weights_size = neurons
            .checked_mul(max_weights as u64)
            .and_then(|n| n.checked_mul(RGBA_SIZE))
            .ok_or_else(|| Error::GpuAllocation("weight buffer size overflows".to_string()))?;
        let neurons_size = neurons * std::mem::size_of::<GpuNeuron>() as u64;
        let staging_size = weights_size.max(neighbor_size);

        let limits = device.limits();
        let max_size = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
        for (name, size) in [
            ("neurons", neurons_size),
            ("neighbor weights", neighbor_size),
            ("weights", weights_size),
        ] {
            if size > max_size {
                return Err(Error::GpuAllocation(format!(
                    "{name} buffer needs {size} bytes, device allows {max_size}"
                )));
            }
        }

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let storage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST;
        let readable = storage | wgpu::BufferUsages::COPY_SRC;

        let params = create_buffer(
            device,
            "Params Buffer",
            std::mem::size_of::<GpuParams>() as u64,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );
        let neurons_buffer = create_buffer(device, "Neurons Buffer", neurons_size, storage);
        let values = create_buffer(device, "Values Buffer", grid_size, storage);
        let errors = create_buffer(device, "Errors Buffer", grid_size, storage);
        let neighbor_weights =
            create_buffer(device, "Neighbor Weights Buffer", neighbor_size, readable);
        let adjacent = create_buffer(device, "Adjacent Buffer", grid_size, storage);
        let weights = create_buffer(device, "Weights Buffer", weights_size, readable);
        let results = create_buffer(device, "Results Buffer", grid_size, readable);
        let staging = StagingBuffer::new(device, staging_size);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Propagation Bind Group Layout"),
            entries: &[
                layout_entry(BINDING_PARAMS, wgpu::BufferBindingType::Uniform),
                storage_entry(BINDING_NEURONS, true),
                storage_entry(BINDING_VALUES, true),
                storage_entry(BINDING_ERRORS, true),
                storage_entry(BINDING_NEIGHBOR_WEIGHTS, false),
                storage_entry(BINDING_ADJACENT, true),
                storage_entry(BINDING_WEIGHTS, false),
                storage_entry(BINDING_RESULTS, false),
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Propagation Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                bind(BINDING_PARAMS, &params),
                bind(BINDING_NEURONS, &neurons_buffer),
                bind(BINDING_VALUES, &values),
                bind(BINDING_ERRORS, &errors),
                bind(BINDING_NEIGHBOR_WEIGHTS, &neighbor_weights),
                bind(BINDING_ADJACENT, &adjacent),
                bind(BINDING_WEIGHTS, &weights),
                bind(BINDING_RESULTS, &results),
            ],
        });

        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        if let Some(err) = out_of_memory.or(validation) {
            return Err(Error::GpuAllocation(err.to_string()));
        }

        log::debug!(
            "allocated GPU buffers for {max_neurons} neurons, {max_weights} weights per neuron ({weights_size} bytes of weights)"
        );

        Ok(GpuBuffers {
            params,
            neurons: neurons_buffer,
            values,
            errors,
            neighbor_weights,
            adjacent,
            weights,
            results,
            staging,
            bind_group_layout,
            bind_group,
            max_neurons,
            max_weights,
        })
    }

    /// Writes `data` at the start of `buffer`. Empty slices are skipped.
    pub fn upload<T: bytemuck::Pod>(&self, queue: &Queue, buffer: &Buffer, data: &[T]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as u64 > buffer.size() {
            return Err(Error::Gpu(format!(
                "upload of {} bytes into a {} byte buffer",
                bytes.len(),
                buffer.size()
            )));
        }
        queue.write_buffer(buffer, 0, bytes);
        Ok(())
    }

    pub fn upload_params(&self, queue: &Queue, params: &GpuParams) {
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(params));
    }
}

impl Drop for GpuBuffers {
    fn drop(&mut self) {
        for buffer in [
            &self.params,
            &self.neurons,
            &self.values,
            &self.errors,
            &self.neighbor_weights,
            &self.adjacent,
            &self.weights,
            &self.results,
        ] {
            buffer.destroy();
        }
        log::debug!("released GPU buffers");
    }
}

fn create_buffer(device: &Device, label: &str, size: u64, usage: wgpu::BufferUsages) -> Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage,
        mapped_at_creation: false,
    })
}

fn layout_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    layout_entry(binding, wgpu::BufferBindingType::Storage { read_only })
}

fn bind(binding: u32, buffer: &Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}

/// Host-readable copy target. Tracks whether it is mapped so that no
/// dispatch is issued while the host holds a view into it.
pub struct StagingBuffer {
    buffer: Buffer,
    mapped: AtomicBool,
}

impl StagingBuffer {
    fn new(device: &Device, size: u64) -> Self {
        StagingBuffer {
            buffer: create_buffer(
                device,
                "Staging Buffer",
                size,
                wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            ),
            mapped: AtomicBool::new(false),
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.load(Ordering::Acquire)
    }

    /// Errors when the host still holds a mapped view.
    pub fn ensure_unmapped(&self) -> Result<()> {
        if self.is_mapped() {
            return Err(Error::Gpu("dispatch issued while the staging buffer is mapped".to_string()));
        }
        Ok(())
    }

    /// Copies the first `len` bytes of `source` here, blocks until the queue
    /// is idle and maps the copy for reading. The returned guard unmaps on drop.
    pub fn read<'a>(
        &'a self,
        device: &Device,
        queue: &Queue,
        source: &Buffer,
        len: u64,
    ) -> Result<MappedRead<'a>> {
        if len == 0 || len > self.buffer.size() || len > source.size() {
            return Err(Error::Gpu(format!("invalid read-back of {len} bytes")));
        }
        if self
            .mapped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Gpu("staging buffer is already mapped".to_string()));
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Read Back Encoder"),
        });
        encoder.copy_buffer_to_buffer(source, 0, &self.buffer, 0, len);
        queue.submit(Some(encoder.finish()));

        let slice = self.buffer.slice(..len);
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);

        match pollster::block_on(rx.receive()) {
            Some(Ok(())) => Ok(MappedRead {
                staging: self,
                view: Some(slice.get_mapped_range()),
            }),
            Some(Err(err)) => {
                self.mapped.store(false, Ordering::Release);
                Err(Error::Gpu(format!("staging buffer map failed: {err}")))
            }
            None => {
                self.mapped.store(false, Ordering::Release);
                Err(Error::Gpu("staging buffer map was cancelled".to_string()))
            }
        }
    }
}

impl Drop for StagingBuffer {
    fn drop(&mut self) {
        self.buffer.destroy();
    }
}

/// Scoped host view of the staging buffer.
pub struct MappedRead<'a> {
    staging: &'a StagingBuffer,
    view: Option<wgpu::BufferView<'a>>,
}

impl MappedRead<'_> {
    pub fn to_rgba(&self) -> Vec<Rgba> {
        match &self.view {
            Some(view) => bytemuck::cast_slice::<u8, Rgba>(view).to_vec(),
            None => Vec::new(),
        }
    }
}

impl Drop for MappedRead<'_> {
    fn drop(&mut self) {
        // the view must be gone before unmapping
        self.view.take();
        self.staging.buffer.unmap();
        self.staging.mapped.store(false, Ordering::Release);
    }
}
