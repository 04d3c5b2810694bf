use thiserror::Error;
use wgpu::MapMode;

use crate::{
    pipeline::capture_device_errors, BindingIdentifier, Framework, Kernel, PipelineBase,
    PipelineError, Shader,
};

pub type BufferResult<T> = Result<T, BufferError>;

#[derive(Error, Debug)]
pub enum BufferError {
    #[error(transparent)]
    AsyncMapError(#[from] wgpu::BufferAsyncError),
    #[error("buffer mapping was cancelled before completing")]
    MapCancelled,
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("{len} bytes do not fit in a {capacity} byte binding")]
    Oversized { len: u64, capacity: u64 },
    #[error("transfer of {0} bytes is not a multiple of the copy alignment")]
    Unaligned(u64),
    #[error("{element} byte elements cannot be read from a {capacity} byte binding")]
    ElementSize { element: u64, capacity: u64 },
    #[error(transparent)]
    Device(#[from] wgpu::Error),
    #[error("binding {0:?} lacks the {1:?} usage")]
    MissingUsage(BindingIdentifier, wgpu::BufferUsages),
}

impl<'fw> Kernel<'fw> {
    /// Builds a compute pipeline whose layout is the committed bind group layouts of
    /// `bindings`, in group order.
    pub fn new(
        fw: &'fw Framework,
        shader: &Shader,
        entry_point: impl Into<String>,
        bindings: PipelineBase,
    ) -> Result<Self, PipelineError> {
        let entry_point = entry_point.into();
        let bindgroup_layouts = bindings.bind_group_layouts()?;

        // create the pipeline
        let pipeline = capture_device_errors(&fw.device, || {
            let compute_pipeline_layout =
                fw.device
                    .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some(&entry_point),
                        bind_group_layouts: &bindgroup_layouts,
                        push_constant_ranges: &[],
                    });
            fw.device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(&entry_point),
                    layout: Some(&compute_pipeline_layout),
                    module: shader.module(),
                    entry_point: &entry_point,
                })
        })
        .map_err(|err| {
            log::warn!("Compute pipeline {:?} rejected by device: {}", entry_point, err);
            PipelineError::Device(err)
        })?;
        drop(bindgroup_layouts);

        Ok(Self {
            fw,
            pipeline,
            bindings,
            entry_point,
        })
    }

    /// The binding registry this kernel dispatches with.
    pub fn pipeline(&self) -> &PipelineBase {
        &self.bindings
    }

    /// Records a compute pass with every bind group set at its index and submits it.
    pub fn enqueue(&self, x: u32, y: u32, z: u32) -> BufferResult<()> {
        let bindgroups = self.bindings.bind_groups()?;
        let mut encoder = self
            .fw
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("compute encoder"),
            });
        capture_device_errors(&self.fw.device, || {
            {
                let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("begin compute pass encoding"),
                });

                compute_pass.set_pipeline(&self.pipeline);

                for (id, bindgroup) in bindgroups.into_iter().enumerate() {
                    compute_pass.set_bind_group(id as u32, bindgroup, &[]);
                }

                compute_pass.insert_debug_marker(&self.entry_point);
                compute_pass.dispatch_workgroups(x, y, z);
            }

            self.fw.queue.submit(Some(encoder.finish()));
        })?;
        Ok(())
    }

    /// Queues a write of `data` to the start of a binding's buffer.
    pub fn write<T>(&self, id: BindingIdentifier, data: &[T]) -> BufferResult<()>
    where
        T: bytemuck::Pod,
    {
        let binding = self.bindings.get(id)?;
        require_usage(id, binding.meta().usage, wgpu::BufferUsages::COPY_DST)?;

        let bytes: &[u8] = bytemuck::cast_slice(data);
        let len = bytes.len() as u64;
        if len > binding.size() {
            return Err(BufferError::Oversized {
                len,
                capacity: binding.size(),
            });
        }
        if len % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(BufferError::Unaligned(len));
        }

        let buffer = binding.buffer().ok_or(PipelineError::NotCommitted)?;
        capture_device_errors(&self.fw.device, || {
            self.fw.queue.write_buffer(buffer, 0, bytes)
        })?;
        Ok(())
    }

    /// Pulls all the elements of a binding into a [`Vec`] through a staging buffer.
    pub async fn read_vec<T>(&self, id: BindingIdentifier) -> BufferResult<Vec<T>>
    where
        T: bytemuck::Pod,
    {
        let binding = self.bindings.get(id)?;
        require_usage(id, binding.meta().usage, wgpu::BufferUsages::COPY_SRC)?;
        let buffer = binding.buffer().ok_or(PipelineError::NotCommitted)?;

        let element_size = std::mem::size_of::<T>() as u64;
        let download_size = readback_size(binding.size(), element_size)?;

        let staging = capture_device_errors(&self.fw.device, || {
            let staging = self.fw.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Kernel: readback staging"),
                size: download_size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let mut encoder = self
                .fw
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("readback encoder"),
                });
            encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, download_size);
            self.fw.queue.submit(Some(encoder.finish()));
            staging
        })?;

        let download = staging.slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();
        download.map_async(MapMode::Read, |result| {
            // receiver only goes away if this future was dropped
            let _ = tx.send(result);
        });
        self.fw.wait_for_submitted_work();
        rx.await.map_err(|_| BufferError::MapCancelled)??;

        let mut out = vec![<T as bytemuck::Zeroable>::zeroed(); (download_size / element_size) as usize];
        {
            let mapped = download.get_mapped_range();
            bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(&mapped);
        }
        staging.unmap();

        Ok(out)
    }
}

/// Bytes to copy when reading a `capacity` byte binding as whole `element` sized values.
fn readback_size(capacity: u64, element: u64) -> BufferResult<u64> {
    if element == 0 || element > capacity {
        return Err(BufferError::ElementSize { element, capacity });
    }
    let size = capacity / element * element;
    if size % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
        return Err(BufferError::Unaligned(size));
    }
    Ok(size)
}

fn require_usage(
    id: BindingIdentifier,
    usage: wgpu::BufferUsages,
    required: wgpu::BufferUsages,
) -> BufferResult<()> {
    if usage.contains(required) {
        Ok(())
    } else {
        Err(BufferError::MissingUsage(id, required))
    }
}
