use std::sync::Arc;

pub mod framework;
pub mod kernel;
pub mod math;
pub mod pipeline;
pub mod shader;

pub use framework::{FrameworkConfig, FrameworkError, FrameworkResult};
pub use kernel::{BufferError, BufferResult};
pub use pipeline::{
    BindingData, BindingIdentifier, BindingKind, BindingMeta, PipelineBase, PipelineError,
    PipelinePriority, PipelineResult, NUM_BIND_GROUPS,
};
pub use shader::{ShaderError, ShaderLibrary, ShaderResult};

/// Represents a shader.
///
/// It's just a wrapper around [`wgpu::ShaderModule`].
#[derive(Debug)]
pub struct Shader(wgpu::ShaderModule);

/// Entry point of `rndr`. A [`Framework`] must be created
/// first as all GPU primitives needs it to be created.
pub struct Framework {
    device: Arc<wgpu::Device>,
    queue: wgpu::Queue,
    adapter: wgpu::Adapter,
    features: wgpu::Features,
    limits: wgpu::Limits,
}

/// A compute pipeline that owns the [`PipelineBase`] describing its bindings
/// and dispatches with every bind group set.
pub struct Kernel<'fw> {
    fw: &'fw Framework,
    pipeline: wgpu::ComputePipeline,
    bindings: PipelineBase,
    entry_point: String,
}
