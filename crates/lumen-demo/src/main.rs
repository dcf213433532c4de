//! Minimal windowed smoke test for `lumen-gpu`/`lumen-renderer`: opens a
//! window, brings up an instance/surface/device, and builds a
//! `RenderConfig`. Shader compilation and scene loading are the embedding
//! application's responsibility (see `lumen_renderer::traits`), so this
//! does not assemble a `FrameOrchestrator` — it exists to exercise device
//! selection and resize plumbing against a real surface.

use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

use lumen_gpu::{Device, Instance};
use lumen_renderer::RenderConfigBuilder;

fn main() -> eyre::Result<()> {
    env_logger::init();

    let event_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title("lumen demo")
        .with_inner_size(winit::dpi::LogicalSize::new(1920, 1080))
        .build(&event_loop)?;

    let instance = Instance::new(&window, cfg!(debug_assertions))?;
    let surface = unsafe {
        ash_window::create_surface(
            &instance.entry,
            &instance.instance,
            window.raw_display_handle(),
            window.raw_window_handle(),
            None,
        )?
    };
    let device = Device::new(&instance, Some(surface))?;
    log::info!("selected device with capabilities: {:?}", device.capabilities);

    let mut config = RenderConfigBuilder::new().resolution(1920, 1080).build();
    log::info!("render config: nanite={} taa={} gi={}", config.enable_nanite, config.enable_taa, config.enable_gi);

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Wait;
        match event {
            Event::WindowEvent { event: WindowEvent::CloseRequested, .. } => {
                *control_flow = ControlFlow::Exit;
            }
            Event::WindowEvent { event: WindowEvent::Resized(size), .. } => {
                config.width = size.width.max(1);
                config.height = size.height.max(1);
                config.internal_width = config.width;
                config.internal_height = config.height;
            }
            _ => {}
        }
    });
}
