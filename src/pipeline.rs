use std::num::NonZeroU64;

use thiserror::Error;

/// Number of bind groups a [`PipelineBase`] manages, one per [`PipelinePriority`].
pub const NUM_BIND_GROUPS: usize = 3;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("group index out of range: {group}")]
    GroupOutOfRange { group: u32 },
    #[error("no binding at group {group}, binding {binding}")]
    BindingOutOfRange { group: u32, binding: u32 },
    #[error("buffer usage {0:?} must contain exactly one of UNIFORM or STORAGE")]
    UnsupportedUsage(wgpu::BufferUsages),
    #[error("buffer size must be greater than zero")]
    ZeroSize,
    #[error("pipeline has not been committed")]
    NotCommitted,
    #[error("pipeline has already been committed")]
    AlreadyCommitted,
    #[error(transparent)]
    Device(#[from] wgpu::Error),
}

/// Runs `f` inside validation and out-of-memory error scopes and returns the first
/// error the device reported, if any.
pub(crate) fn capture_device_errors<R>(
    device: &wgpu::Device,
    f: impl FnOnce() -> R,
) -> Result<R, wgpu::Error> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let value = f();

    let validation = futures::executor::block_on(device.pop_error_scope());
    let out_of_memory = futures::executor::block_on(device.pop_error_scope());
    match validation.or(out_of_memory) {
        Some(err) => Err(err),
        None => Ok(value),
    }
}

/// Update-frequency tier of a binding. The ordinal is the bind group index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelinePriority {
    /// Written once, e.g. lookup tables.
    Static = 0,
    PerFrame = 1,
    PerObject = 2,
}

impl PipelinePriority {
    pub const ALL: [PipelinePriority; NUM_BIND_GROUPS] = [
        PipelinePriority::Static,
        PipelinePriority::PerFrame,
        PipelinePriority::PerObject,
    ];

    /// Index of the bind group this tier binds to.
    pub fn group(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for PipelinePriority {
    type Error = PipelineError;

    fn try_from(group: u32) -> PipelineResult<Self> {
        PipelinePriority::ALL
            .get(group as usize)
            .copied()
            .ok_or(PipelineError::GroupOutOfRange { group })
    }
}

/// Layout type a buffer binding resolves to, derived from its usage flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// ### Example WGSL syntax:
    /// ```ignore
    /// @group(0) @binding(0) var<uniform> params: Params;
    /// ```
    Uniform,
    /// Read-write storage.
    /// ### Example WGSL syntax:
    /// ```ignore
    /// @group(2) @binding(0) var<storage, read_write> data: array<f32>;
    /// ```
    Storage,
}

impl BindingKind {
    /// Classifies `usage`; exactly one of `UNIFORM` and `STORAGE` must be set.
    pub fn classify(usage: wgpu::BufferUsages) -> PipelineResult<Self> {
        match (
            usage.contains(wgpu::BufferUsages::UNIFORM),
            usage.contains(wgpu::BufferUsages::STORAGE),
        ) {
            (true, false) => Ok(BindingKind::Uniform),
            (false, true) => Ok(BindingKind::Storage),
            _ => Err(PipelineError::UnsupportedUsage(usage)),
        }
    }

    fn buffer_binding_type(self) -> wgpu::BufferBindingType {
        match self {
            BindingKind::Uniform => wgpu::BufferBindingType::Uniform,
            BindingKind::Storage => wgpu::BufferBindingType::Storage { read_only: false },
        }
    }

    fn default_visibility(self) -> wgpu::ShaderStages {
        match self {
            BindingKind::Uniform => wgpu::ShaderStages::all(),
            BindingKind::Storage => wgpu::ShaderStages::COMPUTE,
        }
    }
}

/// Addresses one binding slot: `@group(group) @binding(binding)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingIdentifier {
    pub group: u32,
    pub binding: u32,
}

/// A requested buffer binding.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingMeta {
    pub priority: PipelinePriority,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
    pub visibility: Option<wgpu::ShaderStages>,
}

impl BindingMeta {
    pub fn new(priority: PipelinePriority, size: u64, usage: wgpu::BufferUsages) -> Self {
        Self {
            priority,
            size,
            usage,
            visibility: None,
        }
    }

    /// Overrides the stages the binding is visible to. Without this, uniforms are
    /// visible everywhere and storage buffers to compute only.
    pub fn with_visibility(mut self, visibility: wgpu::ShaderStages) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn kind(&self) -> PipelineResult<BindingKind> {
        BindingKind::classify(self.usage)
    }

    fn visibility(&self, kind: BindingKind) -> wgpu::ShaderStages {
        self.visibility.unwrap_or_else(|| kind.default_visibility())
    }
}

/// One registered binding and, once committed, its GPU buffer.
#[derive(Debug)]
pub struct BindingData {
    identifier: BindingIdentifier,
    meta: BindingMeta,
    buffer: Option<wgpu::Buffer>,
}

impl BindingData {
    pub fn identifier(&self) -> BindingIdentifier {
        self.identifier
    }

    pub fn meta(&self) -> &BindingMeta {
        &self.meta
    }

    pub fn size(&self) -> u64 {
        self.meta.size
    }

    /// The GPU buffer; always `Some` once the owning pipeline is committed.
    pub fn buffer(&self) -> Option<&wgpu::Buffer> {
        self.buffer.as_ref()
    }

    /// Layout entry describing this binding as a `kind` buffer.
    pub fn layout_entry(&self, kind: BindingKind) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding: self.identifier.binding,
            visibility: self.meta.visibility(kind),
            ty: wgpu::BindingType::Buffer {
                ty: kind.buffer_binding_type(),
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }
    }
}

#[derive(Debug, Default)]
struct BindGroupData {
    bindings: Vec<BindingData>,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
    bind_group: Option<wgpu::BindGroup>,
}

/// GPU objects built for one group during commit, not yet stored in the registry.
struct StagedGroup {
    buffers: Vec<wgpu::Buffer>,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum PipelineState {
    #[default]
    Open,
    Committed,
}

/// Registry of the buffers a pipeline binds, grouped by [`PipelinePriority`].
///
/// Bindings are declared with [`PipelineBase::create_buffer`] while the registry is open.
/// [`PipelineBase::commit`] then creates every buffer, bind group layout and bind group
/// in one pass. A registry is committed at most once.
#[derive(Debug, Default)]
pub struct PipelineBase {
    bind_groups: [BindGroupData; NUM_BIND_GROUPS],
    state: PipelineState,
}

impl PipelineBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_committed(&self) -> bool {
        self.state == PipelineState::Committed
    }

    /// Reserves the next binding slot in the group for `priority`.
    /// No GPU object is created until [`PipelineBase::commit`].
    pub fn create_buffer(
        &mut self,
        priority: PipelinePriority,
        size: u64,
        usage: wgpu::BufferUsages,
    ) -> PipelineResult<BindingIdentifier> {
        self.register(BindingMeta::new(priority, size, usage))
    }

    pub fn register(&mut self, meta: BindingMeta) -> PipelineResult<BindingIdentifier> {
        if self.is_committed() {
            return Err(PipelineError::AlreadyCommitted);
        }
        let group = meta.priority.group();
        if group as usize >= NUM_BIND_GROUPS {
            return Err(PipelineError::GroupOutOfRange { group });
        }
        if meta.size == 0 {
            return Err(PipelineError::ZeroSize);
        }
        meta.kind()?;

        let group_data = &mut self.bind_groups[group as usize];
        let identifier = BindingIdentifier {
            group,
            binding: group_data.bindings.len() as u32,
        };
        log::debug!(
            "Registered {:?} binding {:?} ({} bytes, {:?})",
            meta.priority,
            identifier,
            meta.size,
            meta.usage
        );
        group_data.bindings.push(BindingData {
            identifier,
            meta,
            buffer: None,
        });

        Ok(identifier)
    }

    /// Number of bindings registered for `priority`.
    pub fn binding_count(&self, priority: PipelinePriority) -> usize {
        self.bind_groups[priority.group() as usize].bindings.len()
    }

    /// Creates the GPU objects for every registered binding.
    ///
    /// Either every group is materialized or none is: on error the partially built
    /// objects are dropped and the registry stays open. A second commit is rejected.
    pub fn commit(&mut self, device: &wgpu::Device) -> PipelineResult<()> {
        if self.is_committed() {
            return Err(PipelineError::AlreadyCommitted);
        }

        let mut staged = Vec::with_capacity(NUM_BIND_GROUPS);
        for (group, group_data) in self.bind_groups.iter().enumerate() {
            staged.push(Self::build_group(device, group as u32, &group_data.bindings)?);
        }

        for (group_data, staged) in self.bind_groups.iter_mut().zip(staged) {
            for (binding, buffer) in group_data.bindings.iter_mut().zip(staged.buffers) {
                binding.buffer = Some(buffer);
            }
            group_data.bind_group_layout = Some(staged.bind_group_layout);
            group_data.bind_group = Some(staged.bind_group);
        }
        self.state = PipelineState::Committed;
        log::info!("Committed pipeline with {} bind groups", NUM_BIND_GROUPS);

        Ok(())
    }

    fn build_group(
        device: &wgpu::Device,
        group: u32,
        bindings: &[BindingData],
    ) -> PipelineResult<StagedGroup> {
        let built = capture_device_errors(device, || {
            Self::create_group_objects(device, group, bindings)
        });
        match built {
            Ok(staged) => staged,
            Err(err) => {
                log::warn!("Bind group {} rejected by device: {}", group, err);
                Err(err.into())
            }
        }
    }

    fn create_group_objects(
        device: &wgpu::Device,
        group: u32,
        bindings: &[BindingData],
    ) -> PipelineResult<StagedGroup> {
        let mut buffers = Vec::with_capacity(bindings.len());
        let mut layout_entries = Vec::with_capacity(bindings.len());

        for data in bindings {
            let kind = data.meta.kind()?;
            let label = format!(
                "PipelineBase: group {} binding {}",
                group, data.identifier.binding
            );
            buffers.push(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&label),
                size: data.meta.size,
                usage: data.meta.usage,
                mapped_at_creation: false,
            }));
            layout_entries.push(data.layout_entry(kind));
        }

        // entries borrow the buffers, so they are built once every buffer exists
        let entries = bindings
            .iter()
            .zip(&buffers)
            .map(|(data, buffer)| wgpu::BindGroupEntry {
                binding: data.identifier.binding,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset: 0,
                    size: NonZeroU64::new(data.meta.size),
                }),
            })
            .collect::<Vec<_>>();

        let label = format!("PipelineBase: group {}", group);
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&label),
            entries: &layout_entries,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&label),
            layout: &bind_group_layout,
            entries: &entries,
        });

        log::debug!("Binding group = {} with {:#?}", group, &entries);
        drop(entries);

        Ok(StagedGroup {
            buffers,
            bind_group_layout,
            bind_group,
        })
    }

    /// Looks up a committed binding by its coordinates.
    pub fn get_buffer(&self, group: u32, binding: u32) -> PipelineResult<&BindingData> {
        if !self.is_committed() {
            return Err(PipelineError::NotCommitted);
        }
        self.bind_groups
            .get(group as usize)
            .and_then(|g| g.bindings.get(binding as usize))
            .ok_or(PipelineError::BindingOutOfRange { group, binding })
    }

    pub fn get(&self, id: BindingIdentifier) -> PipelineResult<&BindingData> {
        self.get_buffer(id.group, id.binding)
    }

    pub fn bind_group(&self, priority: PipelinePriority) -> PipelineResult<&wgpu::BindGroup> {
        self.bind_groups[priority.group() as usize]
            .bind_group
            .as_ref()
            .ok_or(PipelineError::NotCommitted)
    }

    pub fn bind_group_layout(
        &self,
        priority: PipelinePriority,
    ) -> PipelineResult<&wgpu::BindGroupLayout> {
        self.bind_groups[priority.group() as usize]
            .bind_group_layout
            .as_ref()
            .ok_or(PipelineError::NotCommitted)
    }

    /// Bind groups in group index order.
    pub fn bind_groups(&self) -> PipelineResult<Vec<&wgpu::BindGroup>> {
        PipelinePriority::ALL
            .iter()
            .map(|&priority| self.bind_group(priority))
            .collect()
    }

    /// Bind group layouts in group index order, ready for a pipeline layout.
    pub fn bind_group_layouts(&self) -> PipelineResult<Vec<&wgpu::BindGroupLayout>> {
        PipelinePriority::ALL
            .iter()
            .map(|&priority| self.bind_group_layout(priority))
            .collect()
    }
}
