use rndr::{
    math::Matrix, BindingIdentifier, BindingKind, Framework, FrameworkConfig, Kernel,
    PipelineBase, PipelineError, PipelinePriority, Shader,
};
use wgpu::BufferUsages;

const SCALE_WGSL: &str = include_str!("../demos/scale.wgsl");

fn create_test_framework(test: &str) -> Option<Framework> {
    let _ = pretty_env_logger::try_init();

    for fallback in [true, false] {
        let config = FrameworkConfig::from_env()
            .with_required_limits(wgpu::Limits::downlevel_defaults())
            .with_fallback_adapter(fallback);
        match Framework::new_blocking(config) {
            Ok(fw) => return Some(fw),
            Err(err) => log::warn!("No test device (fallback = {}): {}", fallback, err),
        }
    }

    // Environments without any adapter cannot run GPU tests; registration is
    // covered by the unit tests.
    eprintln!("skipping {}: no wgpu adapter available", test);
    None
}

#[test]
fn commit_materializes_every_binding() {
    let Some(fw) = create_test_framework("commit_materializes_every_binding") else {
        return;
    };

    let mut pipeline = PipelineBase::new();
    let uniform = pipeline
        .create_buffer(
            PipelinePriority::Static,
            64,
            BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        )
        .unwrap();
    let storage = pipeline
        .create_buffer(PipelinePriority::PerObject, 256, BufferUsages::STORAGE)
        .unwrap();

    pipeline.commit(fw.device()).unwrap();
    assert!(pipeline.is_committed());

    let static_binding = pipeline
        .get_buffer(PipelinePriority::Static.group(), 0)
        .unwrap();
    assert_eq!(static_binding.identifier(), uniform);
    assert_eq!(static_binding.size(), 64);
    assert_eq!(static_binding.meta().kind().unwrap(), BindingKind::Uniform);
    let static_buffer = static_binding.buffer().unwrap();
    assert_eq!(static_buffer.size(), 64);
    assert_eq!(
        static_buffer.usage(),
        BufferUsages::UNIFORM | BufferUsages::COPY_DST
    );

    let object_binding = pipeline.get(storage).unwrap();
    assert_eq!(object_binding.size(), 256);
    assert_eq!(object_binding.meta().kind().unwrap(), BindingKind::Storage);
    let object_buffer = object_binding.buffer().unwrap();
    assert_eq!(object_buffer.size(), 256);
    assert_eq!(object_buffer.usage(), BufferUsages::STORAGE);

    for (group, binding) in [(0, 1), (1, 0), (2, 1), (3, 0)] {
        assert!(matches!(
            pipeline.get_buffer(group, binding),
            Err(PipelineError::BindingOutOfRange { .. })
        ));
    }

    // one layout and one bind group per tier, including the empty PerFrame tier
    assert_eq!(pipeline.bind_group_layouts().unwrap().len(), 3);
    assert_eq!(pipeline.bind_groups().unwrap().len(), 3);
}

#[test]
fn second_commit_is_rejected() {
    let Some(fw) = create_test_framework("second_commit_is_rejected") else {
        return;
    };

    let mut pipeline = PipelineBase::new();
    pipeline
        .create_buffer(PipelinePriority::PerFrame, 16, BufferUsages::UNIFORM)
        .unwrap();
    pipeline.commit(fw.device()).unwrap();

    assert!(matches!(
        pipeline.commit(fw.device()),
        Err(PipelineError::AlreadyCommitted)
    ));
    assert!(matches!(
        pipeline.create_buffer(PipelinePriority::PerFrame, 16, BufferUsages::UNIFORM),
        Err(PipelineError::AlreadyCommitted)
    ));
    assert!(pipeline.get_buffer(1, 0).unwrap().buffer().is_some());
}

#[test]
fn rejected_commit_leaves_pipeline_open() {
    let Some(fw) = create_test_framework("rejected_commit_leaves_pipeline_open") else {
        return;
    };

    let mut pipeline = PipelineBase::new();
    pipeline
        .create_buffer(PipelinePriority::Static, 16, BufferUsages::UNIFORM)
        .unwrap();
    // binding a uniform larger than the device allows fails bind group validation
    let oversized = fw.limits().max_uniform_buffer_binding_size as u64 + 256;
    pipeline
        .create_buffer(PipelinePriority::PerObject, oversized, BufferUsages::UNIFORM)
        .unwrap();

    assert!(matches!(
        pipeline.commit(fw.device()),
        Err(PipelineError::Device(_))
    ));
    assert!(!pipeline.is_committed());
    assert!(matches!(
        pipeline.get_buffer(0, 0),
        Err(PipelineError::NotCommitted)
    ));
}

#[test]
fn kernel_dispatch_reads_committed_bindings() {
    let Some(fw) = create_test_framework("kernel_dispatch_reads_committed_bindings") else {
        return;
    };

    let mut pipeline = PipelineBase::new();
    let params = pipeline
        .create_buffer(
            PipelinePriority::Static,
            std::mem::size_of::<Matrix<1, 4>>() as u64,
            BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        )
        .unwrap();
    let data = pipeline
        .create_buffer(
            PipelinePriority::PerObject,
            64 * 4,
            BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
        )
        .unwrap();
    assert_eq!(data, BindingIdentifier { group: 2, binding: 0 });
    pipeline.commit(fw.device()).unwrap();

    let shader = Shader::from_wgsl_source(&fw, "scale", SCALE_WGSL).unwrap();
    let kernel = Kernel::new(&fw, &shader, "main", pipeline).unwrap();

    let input = (0..64).map(|i| i as f32).collect::<Vec<_>>();
    kernel
        .write(params, &[Matrix::from_rows([[3.0, 0.0, 0.0, 0.0]])])
        .unwrap();
    kernel.write(data, &input).unwrap();
    kernel.enqueue(1, 1, 1).unwrap();

    let output: Vec<f32> = futures::executor::block_on(kernel.read_vec(data)).unwrap();
    let expected = input.iter().map(|v| v * 3.0).collect::<Vec<_>>();
    assert_eq!(output, expected);

    assert!(matches!(
        kernel.write(data, &vec![0.0f32; 65]),
        Err(rndr::BufferError::Oversized { len: 260, capacity: 256 })
    ));
}

fn scale_bindings(fw: &Framework) -> PipelineBase {
    let mut pipeline = PipelineBase::new();
    pipeline
        .create_buffer(PipelinePriority::Static, 16, BufferUsages::UNIFORM)
        .unwrap();
    pipeline
        .create_buffer(PipelinePriority::PerObject, 64 * 4, BufferUsages::STORAGE)
        .unwrap();
    pipeline.commit(fw.device()).unwrap();
    pipeline
}

#[test]
fn kernel_rejects_unknown_entry_point() {
    let Some(fw) = create_test_framework("kernel_rejects_unknown_entry_point") else {
        return;
    };

    let shader = Shader::from_wgsl_source(&fw, "scale", SCALE_WGSL).unwrap();
    assert!(matches!(
        Kernel::new(&fw, &shader, "missing", scale_bindings(&fw)),
        Err(PipelineError::Device(_))
    ));
}

#[test]
fn kernel_rejects_shader_that_disagrees_with_layout() {
    let Some(fw) = create_test_framework("kernel_rejects_shader_that_disagrees_with_layout") else {
        return;
    };

    // storage declared where the registry committed a uniform
    const MISMATCHED_WGSL: &str = r#"
        @group(0) @binding(0) var<storage, read_write> data: array<f32>;

        @compute @workgroup_size(1)
        fn main() {
            data[0] = 1.0;
        }
    "#;
    let shader = Shader::from_wgsl_source(&fw, "mismatched", MISMATCHED_WGSL).unwrap();
    assert!(matches!(
        Kernel::new(&fw, &shader, "main", scale_bindings(&fw)),
        Err(PipelineError::Device(_))
    ));
}

#[test]
fn kernel_readback_rejects_oversized_elements() {
    let Some(fw) = create_test_framework("kernel_readback_rejects_oversized_elements") else {
        return;
    };

    let mut pipeline = PipelineBase::new();
    let params = pipeline
        .create_buffer(PipelinePriority::Static, 16, BufferUsages::UNIFORM)
        .unwrap();
    let data = pipeline
        .create_buffer(
            PipelinePriority::PerObject,
            8,
            BufferUsages::STORAGE | BufferUsages::COPY_SRC,
        )
        .unwrap();
    pipeline.commit(fw.device()).unwrap();
    let shader = Shader::from_wgsl_source(&fw, "scale", SCALE_WGSL).unwrap();
    let kernel = Kernel::new(&fw, &shader, "main", pipeline).unwrap();
    assert!(kernel.pipeline().get(params).is_ok());

    assert!(matches!(
        futures::executor::block_on(kernel.read_vec::<[f32; 4]>(data)),
        Err(rndr::BufferError::ElementSize { element: 16, capacity: 8 })
    ));
    assert_eq!(
        futures::executor::block_on(kernel.read_vec::<u32>(data)).unwrap(),
        vec![0, 0]
    );
}
