//! Camera types, orbit controller and uniforms for view/projection.
//!
//! The camera orbits a look target on a sphere described by yaw, pitch and
//! distance. Input lands in the controller as pending deltas; `update`
//! applies a damped fraction of them each frame so the motion eases out
//! instead of stopping dead. [`frame`] derives the whole placement for a
//! freshly loaded model from its bounding box.

use std::f32::consts::{FRAC_PI_2, TAU};

use cgmath::{Deg, EuclideanSpace, InnerSpace, Matrix4, Point3, Rad, Vector2, Vector3};
use instant::Duration;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

use crate::data_structures::bounds::Aabb;

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Where the camera sits relative to a freshly framed model, in units of
/// the model's bounding diagonal.
pub const FRAME_OFFSET: Vector3<f32> = Vector3::new(-0.2, 0.4, 1.4);

/// Models smaller than this are framed as if they had this diagonal, so a
/// degenerate asset never collapses the view volume.
const MIN_FRAME_SIZE: f32 = 1e-4;

const SAFE_PITCH: f32 = FRAC_PI_2 - 0.01;

/// Perspective camera orbiting a look target.
#[derive(Clone, Copy, Debug)]
pub struct OrbitCamera {
    pub target: Point3<f32>,
    pub yaw: Rad<f32>,
    pub pitch: Rad<f32>,
    pub distance: f32,
}

impl OrbitCamera {
    pub fn new<Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(
        target: Point3<f32>,
        yaw: Y,
        pitch: P,
        distance: f32,
    ) -> Self {
        Self {
            target,
            yaw: yaw.into(),
            pitch: pitch.into(),
            distance,
        }
    }

    /// Derive the spherical placement whose [`eye`](Self::eye) is `eye`.
    pub fn from_eye(target: Point3<f32>, eye: Point3<f32>) -> Self {
        let offset = eye - target;
        let distance = offset.magnitude().max(MIN_FRAME_SIZE);
        let pitch = Rad((offset.y / distance).clamp(-1.0, 1.0).asin());
        let yaw = Rad(offset.z.atan2(offset.x));
        Self {
            target,
            yaw,
            pitch,
            distance,
        }
    }

    pub fn eye(&self) -> Point3<f32> {
        let (sin_pitch, cos_pitch) = self.pitch.0.sin_cos();
        let (sin_yaw, cos_yaw) = self.yaw.0.sin_cos();
        self.target
            + Vector3::new(
                self.distance * cos_pitch * cos_yaw,
                self.distance * sin_pitch,
                self.distance * cos_pitch * sin_yaw,
            )
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.eye(), self.target, Vector3::unit_y())
    }

    /// Camera right and up in world space, for screen-space panning.
    fn pan_axes(&self) -> (Vector3<f32>, Vector3<f32>) {
        let forward = (self.target - self.eye()).normalize();
        let right = forward.cross(Vector3::unit_y()).normalize();
        let up = right.cross(forward);
        (right, up)
    }
}

/// Perspective projection with a mutable depth range.
///
/// The range starts out permissive and is tightened to the loaded model's
/// scale on every install, so depth precision follows the content.
#[derive(Clone, Copy, Debug)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height as f32;
    }

    pub fn set_depth_range(&mut self, znear: f32, zfar: f32) {
        self.znear = znear;
        self.zfar = zfar;
    }

    pub fn znear(&self) -> f32 {
        self.znear
    }

    pub fn zfar(&self) -> f32 {
        self.zfar
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * cgmath::perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_position: [f32; 4],
    view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        Self {
            view_position: [0.0; 4],
            view_proj: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    pub fn update_view_proj(&mut self, camera: &OrbitCamera, projection: &Projection) {
        self.view_position = camera.eye().to_homogeneous().into();
        self.view_proj = (projection.calc_matrix() * camera.calc_matrix()).into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

/// Which gesture a mouse drag currently drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DragMode {
    None,
    Orbit,
    Pan,
}

/// Input-to-camera mapping with damped rotation and panning.
///
/// Pointer input accumulates into pending deltas; every [`update`](Self::update)
/// applies `damping_factor` of what is pending and decays the rest, which is
/// what gives drags their inertia. A full-window-height drag covers one
/// revolution. `reset` restores the placement captured by the last
/// [`apply_framing`](Self::apply_framing).
#[derive(Clone, Debug)]
pub struct OrbitController {
    pub rotate_speed: f32,
    pub pan_speed: f32,
    pub damping_factor: f32,
    pub auto_rotate: bool,
    pub auto_rotate_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    drag: DragMode,
    shift_held: bool,
    rotate_delta: Vector2<f32>,
    pan_delta: Vector2<f32>,
    zoom_steps: f32,
    home: Option<OrbitCamera>,
}

impl OrbitController {
    pub fn new() -> Self {
        Self {
            rotate_speed: 1.25,
            pan_speed: 1.25,
            damping_factor: 0.07,
            auto_rotate: false,
            auto_rotate_speed: 0.75,
            min_distance: MIN_FRAME_SIZE,
            max_distance: f32::INFINITY,
            drag: DragMode::None,
            shift_held: false,
            rotate_delta: Vector2::new(0.0, 0.0),
            pan_delta: Vector2::new(0.0, 0.0),
            zoom_steps: 0.0,
            home: None,
        }
    }

    /// Adopt a freshly computed framing: move the camera there, remember it
    /// as home, bound zooming to the model scale and drop pending input.
    pub fn apply_framing(&mut self, framing: &Framing, camera: &mut OrbitCamera) {
        *camera = OrbitCamera::from_eye(framing.target, framing.eye);
        self.max_distance = framing.max_distance;
        self.home = Some(*camera);
        self.clear_pending();
    }

    /// Snap back to the last framed placement. No-op before the first load.
    pub fn reset(&mut self, camera: &mut OrbitCamera) {
        if let Some(home) = self.home {
            *camera = home;
            self.clear_pending();
        }
    }

    fn clear_pending(&mut self) {
        self.rotate_delta = Vector2::new(0.0, 0.0);
        self.pan_delta = Vector2::new(0.0, 0.0);
        self.zoom_steps = 0.0;
        self.drag = DragMode::None;
    }

    /// Route pointer motion into the pending gesture, if one is active.
    pub fn handle_mouse(&mut self, dx: f64, dy: f64) {
        let delta = Vector2::new(dx as f32, dy as f32);
        match self.drag {
            DragMode::Orbit => self.rotate_delta += delta,
            DragMode::Pan => self.pan_delta += delta,
            DragMode::None => {}
        }
    }

    /// Track buttons, modifiers and wheel state from window events.
    pub fn handle_window_events(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::MouseInput { state, button, .. } => {
                self.drag = match (button, state) {
                    (MouseButton::Left, ElementState::Pressed) if self.shift_held => DragMode::Pan,
                    (MouseButton::Left, ElementState::Pressed) => DragMode::Orbit,
                    (MouseButton::Right, ElementState::Pressed) => DragMode::Pan,
                    _ => DragMode::None,
                };
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.shift_held = modifiers.state().shift_key();
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.zoom_steps += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 100.0,
                };
            }
            _ => {}
        }
    }

    /// Advance damping by one frame and move the camera accordingly.
    pub fn update(&mut self, camera: &mut OrbitCamera, dt: Duration) {
        if self.auto_rotate {
            // One revolution per minute at speed 1.0.
            camera.yaw += Rad(TAU / 60.0 * self.auto_rotate_speed * dt.as_secs_f32());
        }

        // A drag across the full window height maps to one revolution.
        let pixels_to_radians = TAU / 600.0 * self.rotate_speed;
        let applied = self.rotate_delta * self.damping_factor;
        camera.yaw += Rad(applied.x * pixels_to_radians);
        camera.pitch = Rad(
            (camera.pitch.0 - applied.y * pixels_to_radians).clamp(-SAFE_PITCH, SAFE_PITCH),
        );
        self.rotate_delta *= 1.0 - self.damping_factor;

        let (right, up) = camera.pan_axes();
        let pan_scale = camera.distance * 0.002 * self.pan_speed;
        let pan = self.pan_delta * self.damping_factor * pan_scale;
        camera.target += right * -pan.x + up * pan.y;
        self.pan_delta *= 1.0 - self.damping_factor;

        if self.zoom_steps != 0.0 {
            let factor = (1.0 - self.zoom_steps * 0.1).max(0.01);
            camera.distance =
                (camera.distance * factor).clamp(self.min_distance, self.max_distance);
            self.zoom_steps = 0.0;
        }
    }
}

impl Default for OrbitController {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the GPU side needs for the camera: cpu state plus the uniform
/// buffer and its bind group.
#[derive(Debug)]
pub struct CameraResources {
    pub camera: OrbitCamera,
    pub controller: OrbitController,
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

/// Camera placement and clip planes derived from a model's bounding box.
#[derive(Clone, Copy, Debug)]
pub struct Framing {
    pub eye: Point3<f32>,
    pub target: Point3<f32>,
    pub znear: f32,
    pub zfar: f32,
    pub max_distance: f32,
    pub size: f32,
}

/// Compute the camera placement for a model with the given bounds.
///
/// The eye sits at `center + size * FRAME_OFFSET` looking at the center,
/// with the depth range and the zoom-out limit scaled to the same size. The
/// caller is expected to have recentered the model so the center is the
/// origin; the placement stays consistent either way.
pub fn frame(bounds: &Aabb) -> Framing {
    let size = bounds.diagonal().max(MIN_FRAME_SIZE);
    let target = if bounds.is_empty() {
        Point3::origin()
    } else {
        bounds.center()
    };
    Framing {
        eye: target + FRAME_OFFSET * size,
        target,
        znear: size / 100.0,
        zfar: size * 100.0,
        max_distance: size * 50.0,
        size,
    }
}

/// Initial projection before any model is framed. The depth range starts
/// as wide as it gets; the first load tightens it to the content.
pub fn initial_projection(width: u32, height: u32) -> Projection {
    Projection::new(width, height, Deg(20.0), 1e-5, 1e10)
}
