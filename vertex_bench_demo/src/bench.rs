/// Benchmark application - window lifecycle and the frame loop

use std::path::{Path, PathBuf};
use vertex_bench::vbench::{Error, Result};
use vertex_bench::vbench::config::{BenchConfig, UploadMode};
use vertex_bench::vbench::device::{
    dynamic_uniform_stride, BufferDesc, BufferUsage, FrameTimer, MemoryClass, ShaderStage,
};
use vertex_bench::vbench::grid::{draw_uniform_data, generate_grid, DrawUniforms, Vertex};
use vertex_bench::{engine_debug, engine_error, engine_info, engine_warn};
use vertex_bench_renderer_vulkan::{
    Buffer, CommandList, DynamicUniformSet, FrameSynchronizer, Pipeline, Shader, Swapchain,
    VulkanDevice,
};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowId};

/// Per-draw uniform blocks and the dynamic descriptor set pointing into them
struct DrawUniformState {
    set: DynamicUniformSet,
    buffer: Buffer,
    /// Bytes between two draws' blocks
    stride: u64,
}

impl DrawUniformState {
    fn create(device: &VulkanDevice, pipeline: &Pipeline, draw_count: u32) -> Result<Self> {
        let stride = dynamic_uniform_stride(DrawUniforms::SIZE, device.min_uniform_offset_alignment());
        let data = draw_uniform_data(draw_count, stride);

        let mut buffer = device.create_buffer(BufferDesc {
            name: "draw_uniforms".to_string(),
            size: data.len() as u64,
            usage: BufferUsage::UNIFORM,
            memory: MemoryClass::DeviceLocal,
        })?;
        let strategy = buffer.upload_region(&data, 0)?;
        let set = device.create_dynamic_uniform_set(pipeline, &buffer, DrawUniforms::SIZE)?;

        engine_info!("vbench::demo", "{} uniform blocks uploaded ({:?}), stride {} bytes",
            draw_count, strategy, stride);
        Ok(Self { set, buffer, stride })
    }

    /// Dynamic offset of a draw's block
    fn offset(&self, draw: u32) -> u32 {
        (draw as u64 * self.stride) as u32
    }
}

/// GPU objects of a running benchmark
struct BenchState {
    sync: FrameSynchronizer,
    /// One per frame slot
    command_lists: Vec<CommandList>,
    /// Dropped before the pipeline whose set layout it was allocated with
    uniforms: Option<DrawUniformState>,
    pipeline: Pipeline,
    vertex_shader: Shader,
    fragment_shader: Shader,
    vertex_buffer: Buffer,
    vertex_data: Vec<Vertex>,
    swapchain: Swapchain,
    device: VulkanDevice,
    timer: FrameTimer,
    frame_number: u64,
    needs_recreate: bool,
}

pub struct BenchApp {
    config: BenchConfig,
    vertex_shader: PathBuf,
    fragment_shader: PathBuf,
    state: Option<BenchState>,
    window: Option<Window>,
    minimized: bool,
    error: Option<Error>,
}

impl BenchApp {
    pub fn new(config: BenchConfig, vertex_shader: PathBuf, fragment_shader: PathBuf) -> Self {
        Self {
            config,
            vertex_shader,
            fragment_shader,
            state: None,
            window: None,
            minimized: false,
            error: None,
        }
    }

    /// Drain the GPU, release every resource and return the first error the loop hit
    pub fn finish(mut self) -> Result<()> {
        if let Some(mut state) = self.state.take() {
            state.sync.wait_idle()?;
            engine_info!("vbench::demo", "{} frames, final GPU time {:.3} ms",
                state.sync.pacer().frames_submitted(), state.sync.gpu_time_ms());
        }
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: Error) {
        engine_error!("vbench::demo", "{}", error);
        self.error.get_or_insert(error);
        event_loop.exit();
    }
}

impl BenchState {
    fn create(config: &BenchConfig, window: &Window, vertex_shader: &Path, fragment_shader: &Path) -> Result<Self> {
        let device = VulkanDevice::new(window, &config.device)?;

        let size = window.inner_size();
        let swapchain = device.create_swapchain(window, size.width, size.height)?;

        let vertex_shader = device.create_shader_from_file(vertex_shader, ShaderStage::Vertex)?;
        let fragment_shader = device.create_shader_from_file(fragment_shader, ShaderStage::Fragment)?;
        let pipeline = device.create_pipeline(&vertex_shader, &fragment_shader, swapchain.format())?;
        let uniforms = if config.uniforms_per_draw {
            Some(DrawUniformState::create(&device, &pipeline, config.draw_count)?)
        } else {
            None
        };

        let vertex_data = generate_grid(config.rows, config.columns);
        let mut vertex_buffer = device.create_buffer(BufferDesc {
            name: "grid_vertices".to_string(),
            size: config.vertex_data_size(),
            usage: BufferUsage::VERTEX,
            memory: config.vertex_memory,
        })?;

        if config.upload_mode == UploadMode::Static {
            let strategy = vertex_buffer.upload_region(bytemuck::cast_slice(&vertex_data), 0)?;
            engine_info!("vbench::demo", "Vertex data uploaded once ({:?})", strategy);
        }

        let command_lists = (0..config.frames_in_flight)
            .map(|_| device.create_command_list())
            .collect::<Result<Vec<_>>>()?;
        let sync = device.create_frame_synchronizer(config.frames_in_flight, config.gpu_time_weight)?;

        Ok(Self {
            sync,
            command_lists,
            uniforms,
            pipeline,
            vertex_shader,
            fragment_shader,
            vertex_buffer,
            vertex_data,
            swapchain,
            device,
            timer: FrameTimer::new(),
            frame_number: 0,
            needs_recreate: false,
        })
    }

    fn recreate_swapchain(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        self.sync.wait_idle()?;
        let old_format = self.swapchain.format();
        self.swapchain.recreate(size.width, size.height)?;
        self.needs_recreate = false;

        if self.swapchain.format() != old_format {
            engine_warn!("vbench::demo", "Swapchain format changed to {:?}, rebuilding pipeline",
                self.swapchain.format());
            let pipeline = self.device.create_pipeline(
                &self.vertex_shader,
                &self.fragment_shader,
                self.swapchain.format(),
            )?;
            if let Some(uniforms) = self.uniforms.as_mut() {
                uniforms.set = self.device.create_dynamic_uniform_set(&pipeline, &uniforms.buffer, DrawUniforms::SIZE)?;
            }
            self.pipeline = pipeline;
        }

        engine_debug!("vbench::demo", "Swapchain recreated at {}x{}", size.width, size.height);
        Ok(())
    }

    fn render_frame(&mut self, config: &BenchConfig) -> Result<()> {
        let Some(mut ctx) = self.sync.begin_frame(&mut self.swapchain)? else {
            self.needs_recreate = true;
            return Ok(());
        };

        let cmd = &mut self.command_lists[ctx.slot];
        let extent = self.swapchain.extent();
        let (image, view) = self.swapchain.image(ctx.image_index);
        let vertex_count = self.vertex_data.len() as u32;

        cmd.begin()?;
        if config.upload_mode == UploadMode::PerFrame {
            self.vertex_buffer.upload_full(bytemuck::cast_slice(&self.vertex_data), cmd)?;
        }

        self.sync.write_begin_timestamp(cmd, &ctx)?;
        cmd.begin_rendering(image, view, extent, config.clear_color)?;
        cmd.set_viewport(extent)?;
        cmd.set_scissor(extent)?;
        cmd.bind_pipeline(&self.pipeline)?;
        cmd.bind_vertex_buffer(&self.vertex_buffer, 0)?;
        for draw in 0..config.draw_count {
            if let Some(uniforms) = self.uniforms.as_ref() {
                cmd.bind_dynamic_uniform(&self.pipeline, &uniforms.set, uniforms.offset(draw))?;
            }
            cmd.draw(vertex_count, 0)?;
        }
        cmd.end_rendering()?;
        self.sync.write_end_timestamp(cmd, &mut ctx)?;
        cmd.end()?;

        if self.sync.end_frame(cmd, &mut self.swapchain, ctx)? {
            self.needs_recreate = true;
        }

        let cpu_ms = self.timer.tick();
        self.frame_number += 1;
        if self.frame_number % config.report_interval as u64 == 0 {
            let gpu_ms = self.sync.gpu_time_ms();
            let vertices = vertex_count as f64 * config.draw_count as f64;
            let throughput = if gpu_ms > 0.0 { vertices / (gpu_ms * 1000.0) } else { 0.0 };
            engine_info!("vbench::demo",
                "Frame {}: GPU {:.3} ms, CPU {:.3} ms, {:.1} Mvertices/s",
                self.frame_number, gpu_ms, cpu_ms, throughput);
        }
        Ok(())
    }
}

impl ApplicationHandler for BenchApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(format!("Vertex Bench - {}x{} grid", self.config.rows, self.config.columns))
            .with_inner_size(PhysicalSize::new(self.config.window_width, self.config.window_height));

        let window = match event_loop.create_window(attributes) {
            Ok(window) => window,
            Err(e) => {
                self.fail(event_loop, Error::InitializationFailed(format!("Failed to create window: {}", e)));
                return;
            }
        };

        match BenchState::create(&self.config, &window, &self.vertex_shader, &self.fragment_shader) {
            Ok(state) => {
                engine_info!("vbench::demo", "Running on {}", state.device.device_name());
                self.state = Some(state);
                self.window = Some(window);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                self.minimized = size.width == 0 || size.height == 0;
                if let Some(state) = self.state.as_mut() {
                    state.needs_recreate = true;
                }
            }
            WindowEvent::RedrawRequested => {
                if self.minimized {
                    return;
                }
                let (Some(state), Some(window)) = (self.state.as_mut(), self.window.as_ref()) else {
                    return;
                };

                let result = if state.needs_recreate {
                    state.recreate_swapchain(window.inner_size())
                } else {
                    state.render_frame(&self.config)
                };

                if let Err(e) = result {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}
