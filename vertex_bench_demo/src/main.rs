/// Vertex Bench - windowed vertex throughput benchmark
///
/// Draws a grid of triangles many times per frame and reports the smoothed GPU time of the
/// draws. Flags select the grid size, the vertex buffer placement, the upload mode and whether
/// each draw rebinds a dynamic uniform block.

mod bench;

const GRID_VERTEX_SHADER: &str = "vertex_bench_demo/shaders/grid.vert.spv";
const GRID_UNIFORM_VERTEX_SHADER: &str = "vertex_bench_demo/shaders/grid_uniform.vert.spv";

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use vertex_bench::vbench::config::{BenchConfig, DebugSeverity, DeviceConfig, UploadMode};
use vertex_bench::vbench::device::MemoryClass;
use vertex_bench::{engine_error, engine_info};
use winit::event_loop::{ControlFlow, EventLoop};

use crate::bench::BenchApp;

#[derive(Parser, Debug)]
#[command(name = "vertex_bench", version, about = "GPU vertex throughput benchmark")]
struct Args {
    /// Grid rows
    #[arg(long, default_value_t = 500)]
    rows: u32,
    /// Grid columns
    #[arg(long, default_value_t = 500)]
    columns: u32,
    /// Times the grid is drawn per frame
    #[arg(long, default_value_t = 50)]
    draw_count: u32,
    /// Vertex buffer placement (auto, device-local, host-local)
    #[arg(long, default_value = "device-local")]
    memory: MemoryClass,
    /// Vertex upload mode (static, per-frame)
    #[arg(long, default_value = "static")]
    upload_mode: UploadMode,
    /// Frames the CPU may run ahead of the GPU
    #[arg(long, default_value_t = 1)]
    frames_in_flight: usize,
    /// Weight of a new sample in the GPU time average
    #[arg(long, default_value_t = 0.01)]
    gpu_time_weight: f64,
    /// Frames between two timing reports
    #[arg(long, default_value_t = 1)]
    report_interval: u32,
    /// Bind a dynamic uniform block with a per-draw offset before every draw
    #[arg(long)]
    uniforms_per_draw: bool,
    /// Compiled vertex shader (defaults to the grid shader matching --uniforms-per-draw)
    #[arg(long)]
    vertex_shader: Option<PathBuf>,
    /// Compiled fragment shader
    #[arg(long, default_value = "vertex_bench_demo/shaders/grid.frag.spv")]
    fragment_shader: PathBuf,
    /// Enable Vulkan validation layers
    #[arg(long)]
    validation: bool,
    /// Forward every validation message, not only errors and warnings
    #[arg(long)]
    verbose_validation: bool,
}

impl Args {
    fn to_config(&self) -> BenchConfig {
        let defaults = BenchConfig::default();
        BenchConfig {
            rows: self.rows,
            columns: self.columns,
            draw_count: self.draw_count,
            frames_in_flight: self.frames_in_flight,
            vertex_memory: self.memory,
            upload_mode: self.upload_mode,
            uniforms_per_draw: self.uniforms_per_draw,
            gpu_time_weight: self.gpu_time_weight,
            report_interval: self.report_interval,
            device: DeviceConfig {
                app_name: "Vertex Bench".to_string(),
                enable_validation: self.validation || defaults.device.enable_validation,
                debug_severity: if self.verbose_validation {
                    DebugSeverity::All
                } else {
                    DebugSeverity::ErrorsAndWarnings
                },
                enable_validation_stats: self.validation || defaults.device.enable_validation_stats,
            },
            ..defaults
        }
    }

    fn vertex_shader_path(&self) -> PathBuf {
        match &self.vertex_shader {
            Some(path) => path.clone(),
            None if self.uniforms_per_draw => PathBuf::from(GRID_UNIFORM_VERTEX_SHADER),
            None => PathBuf::from(GRID_VERTEX_SHADER),
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = args.to_config();

    if let Err(e) = config.validate() {
        engine_error!("vbench::demo", "{}", e);
        return ExitCode::FAILURE;
    }

    engine_info!("vbench::demo",
        "{}x{} grid ({} vertices, {:.1} MB), {} draws/frame, {} memory, {} upload, uniforms {}, {} frame(s) in flight",
        config.rows, config.columns, config.vertex_count(),
        config.vertex_data_size() as f64 / (1024.0 * 1024.0),
        config.draw_count, config.vertex_memory, config.upload_mode,
        if config.uniforms_per_draw { "per draw" } else { "off" }, config.frames_in_flight);

    let validation = config.device.enable_validation;

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            engine_error!("vbench::demo", "Failed to create event loop: {}", e);
            return ExitCode::FAILURE;
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = BenchApp::new(config, args.vertex_shader_path(), args.fragment_shader);
    if let Err(e) = event_loop.run_app(&mut app) {
        engine_error!("vbench::demo", "Event loop error: {}", e);
        return ExitCode::FAILURE;
    }

    let result = app.finish();
    if validation {
        vertex_bench_renderer_vulkan::print_validation_stats_report();
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            engine_error!("vbench::demo", "Benchmark failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
