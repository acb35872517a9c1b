//! Central GPU and window context.
//!
//! [`Context::new`] performs the whole bootstrap: instance, surface, adapter,
//! device, surface configuration, camera and light resources, render targets
//! and the one render pipeline the viewer needs. Resources that live as long
//! as the context are tracked in a [`ResourceRegistry`] so
//! [`Context::dispose`] can release them deterministically at teardown.

use std::sync::Arc;

use anyhow::Context as _;
use cgmath::{EuclideanSpace, Point3};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    camera::{self, CameraResources, CameraUniform, OrbitCamera, OrbitController},
    data_structures::texture::Texture,
    pipelines::{
        light::{HemisphereLightUniform, LightResources},
        model,
    },
};

/// Multisample count for the color target.
pub const SAMPLE_COUNT: u32 = 4;

/// Stage background: near-black at zero alpha, in linear space, so the
/// surface composites over whatever hosts it.
pub const CLEAR_COLOUR: wgpu::Color = wgpu::Color {
    r: 0.0065,
    g: 0.0065,
    b: 0.008,
    a: 0.0,
};

/// A handle whose GPU memory can be released ahead of the handle dropping.
pub trait GPUResource {
    fn release(&mut self);
}

impl GPUResource for wgpu::Buffer {
    fn release(&mut self) {
        self.destroy();
    }
}

impl GPUResource for wgpu::Texture {
    fn release(&mut self) {
        self.destroy();
    }
}

impl GPUResource for Texture {
    fn release(&mut self) {
        self.destroy();
    }
}

/// Tracks context-lifetime GPU resources for release at teardown.
///
/// Model geometry and decals are not tracked here; the scene releases those
/// through [`Model::dispose`](crate::data_structures::model::Model::dispose)
/// whenever a model is replaced or cleared.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: Vec<Box<dyn GPUResource>>,
    drained: bool,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource for release when the registry drains.
    pub fn track(&mut self, mut resource: impl GPUResource + 'static) {
        if self.drained {
            log::warn!("resource tracked after teardown, releasing immediately");
            resource.release();
            return;
        }
        self.resources.push(Box::new(resource));
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Release everything tracked and return how many resources that was.
    /// A second drain is a no-op returning 0.
    pub fn drain(&mut self) -> usize {
        if self.drained {
            return 0;
        }
        self.drained = true;
        let count = self.resources.len();
        for mut resource in self.resources.drain(..) {
            resource.release();
        }
        count
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("resources", &self.resources.len())
            .field("drained", &self.drained)
            .finish()
    }
}

pub struct Context {
    pub(crate) window: Arc<Window>,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub(crate) depth_texture: Texture,
    pub(crate) msaa_target: Texture,
    pub camera: CameraResources,
    pub projection: camera::Projection,
    pub light: LightResources,
    pub pipeline: wgpu::RenderPipeline,
    pub material_layout: wgpu::BindGroupLayout,
    pub(crate) fallback_base: Texture,
    pub clear_colour: wgpu::Color,
    pub registry: ResourceRegistry,
}

impl Context {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let size = window.inner_size();

        // The instance is a handle to our GPU
        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no compatible adapter")?;

        log::info!("device and queue");
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features, so if
                // we're building for the web we'll have to disable some.
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        log::info!("surface");
        let surface_caps = surface.get_capabilities(&adapter);
        // The shader works in linear space and relies on an srgb surface for
        // the conversion on output.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(surface_caps.formats[0]);
        // Premultiplied alpha lets the zero-alpha clear colour show the page
        // behind the canvas on the web.
        let alpha_mode = if surface_caps
            .alpha_modes
            .contains(&wgpu::CompositeAlphaMode::PreMultiplied)
        {
            wgpu::CompositeAlphaMode::PreMultiplied
        } else {
            surface_caps.alpha_modes[0]
        };
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: surface_caps.present_modes[0],
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        // Neutral placement until the first model frames itself.
        let camera = OrbitCamera::from_eye(
            Point3::origin(),
            Point3::from_vec(camera::FRAME_OFFSET),
        );
        let projection = camera::initial_projection(config.width, config.height);
        let camera_controller = OrbitController::new();

        let mut camera_uniform = CameraUniform::new();
        camera_uniform.update_view_proj(&camera, &projection);

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[camera_uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let camera_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
                label: Some("camera_bind_group_layout"),
            });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
            label: Some("camera_bind_group"),
        });

        let depth_texture = Texture::create_depth_texture(
            &device,
            [config.width, config.height],
            SAMPLE_COUNT,
            "depth_texture",
        );
        let msaa_target = Texture::create_msaa_target(
            &device,
            [config.width, config.height],
            config.format,
            SAMPLE_COUNT,
            "msaa_target",
        );

        let light = LightResources::new(&device, HemisphereLightUniform::default());

        let material_layout = model::material_layout(&device);
        let fallback_base = Texture::create_default_base_map(&device, &queue);

        let pipeline = model::mk_model_pipeline(
            &device,
            &config,
            &material_layout,
            &camera_bind_group_layout,
            &light.bind_group_layout,
            SAMPLE_COUNT,
        );

        // Handles are internally refcounted, so the clones tracked here
        // release the same GPU memory as the originals.
        let mut registry = ResourceRegistry::new();
        registry.track(camera_buffer.clone());
        registry.track(light.buffer.clone());
        registry.track(fallback_base.texture.clone());

        let camera = CameraResources {
            camera,
            controller: camera_controller,
            uniform: camera_uniform,
            buffer: camera_buffer,
            bind_group: camera_bind_group,
            bind_group_layout: camera_bind_group_layout,
        };

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            depth_texture,
            msaa_target,
            camera,
            projection,
            light,
            pipeline,
            material_layout,
            fallback_base,
            clear_colour: CLEAR_COLOUR,
            registry,
        })
    }

    /// Release every context-lifetime GPU resource. Returns how many
    /// registered resources were drained; calling it again releases nothing.
    pub fn dispose(&mut self) -> usize {
        self.depth_texture.destroy();
        self.msaa_target.destroy();
        self.registry.drain()
    }
}
