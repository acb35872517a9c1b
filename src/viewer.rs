//! The viewer application: window and event loop, asynchronous model
//! loading, customization input and the render loop.
//!
//! # Lifecycle
//!
//! 1. `resumed` creates the window and bootstraps the [`Context`]
//! 2. The initial model load is requested; decoding runs off the event loop
//!    and resolves into a [`StudioEvent::ModelReady`]
//! 3. Arriving models are recentered, framed and installed in the [`Scene`];
//!    stale results (superseded by a newer request) are discarded
//! 4. `RedrawRequested` renders and schedules the next frame until the clock
//!    halts
//! 5. `exiting` tears the scene and context down, releasing GPU resources

use std::{fmt::Debug, iter, sync::Arc};

use instant::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::{DeviceEvent, DeviceId, ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

use crate::{
    camera,
    context::{Context, SAMPLE_COUNT},
    customize,
    data_structures::{scene::Scene, texture::Texture},
    resources::{self, ModelData},
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Edge length of the square stage, in logical pixels.
pub const STAGE_SIZE: u32 = 600;

/// Tint swatches on the number keys, as linear-space RGBA factors.
const SWATCHES: [[f32; 4]; 5] = [
    [0.45, 0.03, 0.04, 1.0],
    [0.02, 0.14, 0.45, 1.0],
    [0.04, 0.30, 0.08, 1.0],
    [0.75, 0.52, 0.06, 1.0],
    [0.05, 0.05, 0.05, 1.0],
];

/// The bundled products.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Asset {
    Mug,
    Duck,
}

impl Asset {
    pub fn file_name(&self) -> &'static str {
        match self {
            Asset::Mug => "mug.glb",
            Asset::Duck => "duck.glb",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct StudioOptions {
    pub initial_asset: Asset,
}

impl StudioOptions {
    /// Read options from the environment: `CUSTOMIZER_MODEL=duck` starts
    /// with the duck instead of the mug.
    pub fn from_env() -> Self {
        let initial_asset = match std::env::var("CUSTOMIZER_MODEL").as_deref() {
            Ok("duck") => Asset::Duck,
            _ => Asset::Mug,
        };
        Self { initial_asset }
    }
}

impl Default for StudioOptions {
    fn default() -> Self {
        Self {
            initial_asset: Asset::Mug,
        }
    }
}

pub(crate) enum StudioEvent {
    /// Sent by the browser initialization task once the context is up.
    #[cfg(target_arch = "wasm32")]
    Initialized(StudioState),
    ModelReady {
        token: u64,
        result: anyhow::Result<ModelData>,
    },
    DecalReady(anyhow::Result<image::DynamicImage>),
}

impl Debug for StudioEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(target_arch = "wasm32")]
            Self::Initialized(_) => f.write_str("Initialized"),
            Self::ModelReady { token, result } => f
                .debug_struct("ModelReady")
                .field("token", token)
                .field("ok", &result.is_ok())
                .finish(),
            Self::DecalReady(result) => {
                f.debug_tuple("DecalReady").field(&result.is_ok()).finish()
            }
        }
    }
}

/// Monotonic tokens for in-flight model loads.
///
/// Every request gets a fresh token and becomes the expected one; a result
/// arriving with any older token is stale and must be discarded, never
/// installed over a newer model.
#[derive(Debug)]
pub struct LoadSequencer {
    next: u64,
    current: u64,
}

impl LoadSequencer {
    pub fn new() -> Self {
        Self {
            next: 1,
            current: 0,
        }
    }

    /// Hand out the token for a new load and make it the expected one.
    pub fn issue(&mut self) -> u64 {
        let token = self.next;
        self.next += 1;
        self.current = token;
        token
    }

    pub fn is_current(&self, token: u64) -> bool {
        token == self.current
    }
}

impl Default for LoadSequencer {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame timing plus the halt switch that parks the redraw loop.
///
/// Rendering schedules the next frame only while the clock runs; once
/// halted no further redraws are requested, which is what stops the loop
/// at teardown.
#[derive(Debug)]
pub struct FrameClock {
    last: Instant,
    halted: bool,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
            halted: false,
        }
    }

    /// Time elapsed since the previous tick. Call once per frame.
    pub fn tick(&mut self) -> Duration {
        let dt = self.last.elapsed();
        self.last = Instant::now();
        dt
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn resume(&mut self) {
        self.halted = false;
        self.last = Instant::now();
    }

    pub fn should_schedule(&self) -> bool {
        !self.halted
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything alive between bootstrap and teardown: the GPU context, the
/// scene and the interaction state around them.
pub struct StudioState {
    pub(crate) ctx: Context,
    scene: Scene,
    /// Index of the customizable mesh in the current model, if any.
    active: Option<usize>,
    loads: LoadSequencer,
    clock: FrameClock,
    is_surface_configured: bool,
}

impl StudioState {
    async fn new(window: Arc<Window>) -> Self {
        let ctx = match Context::new(window).await {
            Ok(ctx) => ctx,
            Err(e) => panic!(
                "App initialization failed. Cannot create the main context: {}",
                e
            ),
        };
        Self {
            ctx,
            scene: Scene::new(),
            active: None,
            loads: LoadSequencer::new(),
            clock: FrameClock::new(),
            is_surface_configured: false,
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.ctx.config.width = width;
            self.ctx.config.height = height;
            self.is_surface_configured = true;
            self.ctx.projection.resize(width, height);
            self.ctx
                .surface
                .configure(&self.ctx.device, &self.ctx.config);
            self.ctx.depth_texture = Texture::create_depth_texture(
                &self.ctx.device,
                [self.ctx.config.width, self.ctx.config.height],
                SAMPLE_COUNT,
                "depth_texture",
            );
            self.ctx.msaa_target = Texture::create_msaa_target(
                &self.ctx.device,
                [self.ctx.config.width, self.ctx.config.height],
                self.ctx.config.format,
                SAMPLE_COUNT,
                "msaa_target",
            );
        }
    }

    /// Put a freshly decoded model on stage: recenter it, frame the camera,
    /// tighten the depth range, upload the geometry and pick the active mesh.
    fn install_model(&mut self, mut data: ModelData) {
        data.recenter();
        let framing = camera::frame(&data.bounds);
        self.ctx
            .projection
            .set_depth_range(framing.znear, framing.zfar);
        self.ctx
            .camera
            .controller
            .apply_framing(&framing, &mut self.ctx.camera.camera);

        self.active = customize::first_named(&data.meshes);
        if self.active.is_none() {
            log::info!("{}: no named meshes, customization disabled", data.label);
        }

        let model = resources::upload_model(
            &self.ctx.device,
            &self.ctx.queue,
            &data,
            &self.ctx.material_layout,
            &self.ctx.fallback_base,
        );
        self.scene.install(model);
        self.ctx.window.request_redraw();
    }

    fn tint_active(&mut self, tint: [f32; 4]) {
        if let Some(model) = self.scene.model_mut() {
            customize::apply_tint(model, self.active, &self.ctx.queue, tint);
        }
    }

    fn clear_active_tint(&mut self) {
        if let Some(model) = self.scene.model_mut() {
            customize::clear_tint(model, self.active, &self.ctx.queue);
        }
    }

    fn clear_active_decal(&mut self) {
        if let Some(model) = self.scene.model_mut() {
            customize::clear_decal(
                model,
                self.active,
                &self.ctx.device,
                &self.ctx.queue,
                &self.ctx.material_layout,
                &self.ctx.fallback_base,
            );
        }
    }

    /// Upload a decoded decal image and stamp it on the active mesh.
    fn apply_decal_image(&mut self, img: &image::DynamicImage) {
        if self.active.is_none() || self.scene.model().is_none() {
            log::debug!("decal ignored, nothing to customize");
            return;
        }
        match Texture::from_image(&self.ctx.device, &self.ctx.queue, img, Some("decal")) {
            Ok(decal) => {
                if let Some(model) = self.scene.model_mut() {
                    customize::apply_decal(
                        model,
                        self.active,
                        &self.ctx.device,
                        &self.ctx.queue,
                        &self.ctx.material_layout,
                        decal,
                    );
                }
            }
            Err(e) => log::error!("decal upload failed: {e:#}"),
        }
    }

    fn render(&mut self) -> Result<(), wgpu::CurrentSurfaceTexture> {
        // Keep the loop running unless the clock was halted.
        if self.clock.should_schedule() {
            self.ctx.window.request_redraw();
        }

        // Rendering requires the surface to be configured
        if !self.is_surface_configured {
            return Ok(());
        }

        let output = match self.ctx.surface.get_current_texture() {
            wgpu::CurrentSurfaceTexture::Success(texture)
            | wgpu::CurrentSurfaceTexture::Suboptimal(texture) => texture,
            status => return Err(status),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder =
            self.ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Render Encoder"),
                });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.ctx.msaa_target.view,
                    resolve_target: Some(&view),
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.ctx.clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.ctx.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
                multiview_mask: None,
            });

            if let Some(model) = self.scene.model() {
                use crate::data_structures::model::DrawModel;
                render_pass.set_pipeline(&self.ctx.pipeline);
                render_pass.draw_model(
                    model,
                    &self.ctx.camera.bind_group,
                    &self.ctx.light.bind_group,
                );
            }
        }

        self.ctx.queue.submit(iter::once(encoder.finish()));
        output.present();

        Ok(())
    }

    /// Halt the loop and release GPU resources: first the scene, then the
    /// context-lifetime resources in the registry.
    fn teardown(&mut self) {
        self.clock.halt();
        self.active = None;
        self.scene.clear();
        let drained = self.ctx.dispose();
        log::info!("teardown complete, released {drained} registered resources");
    }
}

pub struct Studio {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    proxy: EventLoopProxy<StudioEvent>,
    options: StudioOptions,
    state: Option<StudioState>,
}

impl Studio {
    fn new(event_loop: &EventLoop<StudioEvent>, options: StudioOptions) -> Self {
        let proxy = event_loop.create_proxy();
        #[cfg(not(target_arch = "wasm32"))]
        let async_runtime = tokio::runtime::Runtime::new().unwrap();
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime,
            proxy,
            options,
            state: None,
        }
    }

    /// Kick off an asynchronous load of a bundled asset. The result comes
    /// back as a [`StudioEvent::ModelReady`] carrying the issued token.
    fn request_load(&mut self, asset: Asset) {
        let state = match &mut self.state {
            Some(state) => state,
            None => return,
        };
        let token = state.loads.issue();
        let file_name = asset.file_name().to_string();
        log::info!("loading {file_name} (load #{token})");

        let proxy = self.proxy.clone();
        let fut = async move {
            let result = resources::load_model(&file_name).await;
            if proxy
                .send_event(StudioEvent::ModelReady { token, result })
                .is_err()
            {
                log::warn!("load #{token} finished after the event loop closed");
            }
        };
        #[cfg(not(target_arch = "wasm32"))]
        self.async_runtime.spawn(fut);
        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(fut);
    }

    /// Read and decode a dropped image off the event loop; the result comes
    /// back as a [`StudioEvent::DecalReady`].
    fn request_decal(&mut self, path: std::path::PathBuf) {
        if self.state.is_none() {
            return;
        }
        log::info!("decoding decal {}", path.display());

        let proxy = self.proxy.clone();
        let fut = async move {
            let result = std::fs::read(&path)
                .map_err(anyhow::Error::from)
                .and_then(|bytes| resources::texture::decode_image(&bytes));
            if proxy.send_event(StudioEvent::DecalReady(result)).is_err() {
                log::warn!("decal decoded after the event loop closed");
            }
        };
        #[cfg(not(target_arch = "wasm32"))]
        self.async_runtime.spawn(fut);
        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(fut);
    }

    fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::KeyM => self.request_load(Asset::Mug),
            KeyCode::KeyD => self.request_load(Asset::Duck),
            _ => {
                let state = match &mut self.state {
                    Some(state) => state,
                    None => return,
                };
                match code {
                    KeyCode::Digit1 => state.tint_active(SWATCHES[0]),
                    KeyCode::Digit2 => state.tint_active(SWATCHES[1]),
                    KeyCode::Digit3 => state.tint_active(SWATCHES[2]),
                    KeyCode::Digit4 => state.tint_active(SWATCHES[3]),
                    KeyCode::Digit5 => state.tint_active(SWATCHES[4]),
                    KeyCode::KeyC => state.clear_active_tint(),
                    KeyCode::KeyX => state.clear_active_decal(),
                    KeyCode::KeyR => {
                        let controller = &mut state.ctx.camera.controller;
                        controller.auto_rotate = !controller.auto_rotate;
                        log::info!(
                            "auto-rotate {}",
                            if controller.auto_rotate { "on" } else { "off" }
                        );
                    }
                    KeyCode::Digit0 => {
                        let camera = &mut state.ctx.camera;
                        camera.controller.reset(&mut camera.camera);
                    }
                    _ => {}
                }
            }
        }
    }

    fn handle_drop(&mut self, path: std::path::PathBuf) {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("png") | Some("jpg") | Some("jpeg") | Some("webp") => self.request_decal(path),
            Some("glb") | Some("gltf") | Some("obj") => {
                log::warn!("model upload is not wired up, ignoring {}", path.display());
            }
            _ => log::warn!("unsupported drop: {}", path.display()),
        }
    }
}

impl ApplicationHandler<StudioEvent> for Studio {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        // Resume fires again when a suspended app comes back; the window
        // and context exist already in that case.
        if let Some(state) = &mut self.state {
            state.clock.resume();
            state.ctx.window.request_redraw();
            return;
        }

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes()
            .with_title("Decal Studio")
            .with_inner_size(winit::dpi::LogicalSize::new(STAGE_SIZE, STAGE_SIZE))
            .with_resizable(false);

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let window = wgpu::web_sys::window().unwrap_throw();
            let document = window.document().unwrap_throw();
            let canvas = document.get_element_by_id(CANVAS_ID).unwrap_throw();
            let html_canvas_element = canvas.unchecked_into();
            window_attributes = window_attributes.with_canvas(Some(html_canvas_element));
        }

        let window = Arc::new(event_loop.create_window(window_attributes).unwrap());

        #[cfg(not(target_arch = "wasm32"))]
        {
            let state = self.async_runtime.block_on(StudioState::new(window));
            self.state = Some(state);
            self.request_load(self.options.initial_asset);
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let state = StudioState::new(window).await;
                assert!(proxy.send_event(StudioEvent::Initialized(state)).is_ok());
            });
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: StudioEvent) {
        match event {
            #[cfg(target_arch = "wasm32")]
            StudioEvent::Initialized(state) => {
                // This is the message from our wasm `spawn_local`
                self.state = Some(state);

                let state = self.state.as_mut().unwrap();
                let size = state.ctx.window.inner_size();
                state.resize(size.width, size.height);
                state.ctx.window.request_redraw();

                self.request_load(self.options.initial_asset);
            }
            StudioEvent::ModelReady { token, result } => {
                let state = match &mut self.state {
                    Some(state) => state,
                    None => return,
                };
                if !state.loads.is_current(token) {
                    log::info!("discarding stale load #{token}");
                    return;
                }
                match result {
                    Ok(data) => state.install_model(data),
                    Err(e) => log::error!("model load failed: {e:#}"),
                }
            }
            StudioEvent::DecalReady(result) => {
                let state = match &mut self.state {
                    Some(state) => state,
                    None => return,
                };
                match result {
                    Ok(img) => state.apply_decal_image(&img),
                    Err(e) => log::error!("decal decode failed: {e:#}"),
                }
            }
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        let state = match &mut self.state {
            Some(state) => state,
            None => return,
        };
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            state.ctx.camera.controller.handle_mouse(dx, dy);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let state = match &mut self.state {
            Some(state) => state,
            None => return,
        };

        state.ctx.camera.controller.handle_window_events(&event);

        match event {
            WindowEvent::CloseRequested => {
                state.clock.halt();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => state.resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                let dt = state.clock.tick();

                match state.render() {
                    Ok(_) => {
                        // Update the camera
                        state
                            .ctx
                            .camera
                            .controller
                            .update(&mut state.ctx.camera.camera, dt);
                        state
                            .ctx
                            .camera
                            .uniform
                            .update_view_proj(&state.ctx.camera.camera, &state.ctx.projection);
                        state.ctx.queue.write_buffer(
                            &state.ctx.camera.buffer,
                            0,
                            bytemuck::cast_slice(&[state.ctx.camera.uniform]),
                        );
                    }
                    // Reconfigure the surface if it's lost or outdated
                    Err(
                        wgpu::CurrentSurfaceTexture::Lost | wgpu::CurrentSurfaceTexture::Outdated,
                    ) => {
                        let size = state.ctx.window.inner_size();
                        state.resize(size.width, size.height);
                    }
                    Err(e) => {
                        log::error!("Unable to render {:?}", e);
                    }
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(code),
            WindowEvent::DroppedFile(path) => self.handle_drop(path),
            _ => {}
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &mut self.state {
            state.clock.halt();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &mut self.state {
            state.teardown();
        }
    }
}

pub fn run(options: StudioOptions) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info).unwrap_throw();
    }

    #[cfg(all(feature = "integration-tests", target_os = "linux"))]
    let event_loop: EventLoop<StudioEvent> = {
        use winit::platform::wayland::EventLoopBuilderExtWayland;

        EventLoop::with_user_event()
            .with_any_thread(true)
            .build()
            .expect("Failed to create an event loop")
    };

    #[cfg(all(feature = "integration-tests", target_os = "windows"))]
    let event_loop: EventLoop<StudioEvent> = {
        use winit::platform::windows::EventLoopBuilderExtWindows;

        EventLoop::with_user_event()
            .with_any_thread(true)
            .build()
            .expect("Failed to create an event loop")
    };

    #[cfg(not(feature = "integration-tests"))]
    let event_loop: EventLoop<StudioEvent> = EventLoop::with_user_event().build()?;

    let mut app = Studio::new(&event_loop, options);

    event_loop.run_app(&mut app)?;

    Ok(())
}
