use std::time::Instant;

use rndr::{
    math::Matrix, Framework, FrameworkConfig, Kernel, PipelineBase, PipelinePriority,
    ShaderLibrary,
};
use wgpu::BufferUsages;

const SIZE: usize = 32_000;
const WORKGROUP_SIZE: usize = 64;

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let fw = Framework::new(FrameworkConfig::from_env()).await?;
    println!("Running on {}", fw.adapter_info().name);

    let mut shaders = ShaderLibrary::new(concat!(env!("CARGO_MANIFEST_DIR"), "/demos"));
    shaders.scan(&fw)?;

    let mut pipeline = PipelineBase::new();
    let params = pipeline.create_buffer(
        PipelinePriority::Static,
        std::mem::size_of::<Matrix<1, 4>>() as u64,
        BufferUsages::UNIFORM | BufferUsages::COPY_DST,
    )?;
    let data = pipeline.create_buffer(
        PipelinePriority::PerObject,
        (SIZE * std::mem::size_of::<f32>()) as u64,
        BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
    )?;
    pipeline.commit(fw.device())?;

    let kernel = Kernel::new(&fw, shaders.get("scale")?, "main", pipeline)?;

    let input = (0..SIZE as u32).map(|v| v as f32).collect::<Vec<_>>();
    kernel.write(params, &[Matrix::from_rows([[0.5, 0.0, 0.0, 0.0]])])?;
    kernel.write(data, &input)?;

    println!("Compute using GPU");
    let now = Instant::now();
    kernel.enqueue(((SIZE + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE) as u32, 1, 1)?;
    let output: Vec<f32> = kernel.read_vec(data).await?;
    println!("Done in {:.2?}\n", now.elapsed());

    println!("input:  {:?}", &input[SIZE - 5..SIZE]);
    println!("output: {:?}", &output[SIZE - 5..SIZE]);

    Ok(())
}

fn main() {
    let _ = pretty_env_logger::init();
    if let Err(err) = futures::executor::block_on(run()) {
        eprintln!("scale failed: {}", err);
        std::process::exit(1);
    }
}
