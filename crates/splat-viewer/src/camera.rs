use glam::{Mat3, Mat4, Vec2, Vec3, Vec4Swizzles};
use lcc::BoundingBox;

/// Everything the sorter and compositor need to know about the camera for
/// one frame. Overwritten every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    /// World to view, right-handed (camera looks down -Z).
    pub view: Mat4,
    /// View to clip (`perspective_rh`).
    pub proj: Mat4,
    pub width: u32,
    pub height: u32,
    /// Vertical field of view (radians).
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    pub tan_fovx: f32,
    pub tan_fovy: f32,
    pub focal_x: f32,
    pub focal_y: f32,
}

impl ViewState {
    pub fn new(view: Mat4, fov_y: f32, width: u32, height: u32, near: f32, far: f32) -> Self {
        let mut s = Self {
            view,
            proj: Mat4::IDENTITY,
            width,
            height,
            fov_y,
            near,
            far,
            tan_fovx: 0.0,
            tan_fovy: 0.0,
            focal_x: 0.0,
            focal_y: 0.0,
        };
        s.resize(width, height);
        s
    }

    /// Recomputes the projection and the derived focal terms.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        let (w, h) = (self.width as f32, self.height as f32);

        self.proj = Mat4::perspective_rh(self.fov_y, w / h, self.near, self.far);
        self.tan_fovy = (0.5 * self.fov_y).tan();
        self.tan_fovx = self.tan_fovy * w / h;
        self.focal_y = h / (2.0 * self.tan_fovy);
        self.focal_x = w / (2.0 * self.tan_fovx);
    }

    #[inline]
    pub fn set_view(&mut self, view: Mat4) {
        self.view = view;
    }

    #[inline]
    pub fn viewport(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }

    /// Rotation block of the view matrix.
    #[inline]
    pub fn view_rotation(&self) -> Mat3 {
        Mat3::from_mat4(self.view)
    }

    /// Camera position in world space.
    pub fn camera_position(&self) -> Vec3 {
        self.view.inverse().w_axis.xyz()
    }

    /// Maps a view-space point to pixel coordinates (origin top-left, pixel
    /// centers at +0.5). `None` when the point is behind the camera.
    pub fn view_to_pixel(&self, t: Vec3) -> Option<Vec2> {
        let clip = self.proj * t.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.xy() / clip.w;
        Some(Vec2::new(
            (ndc.x * 0.5 + 0.5) * self.width as f32,
            (0.5 - ndc.y * 0.5) * self.height as f32,
        ))
    }
}

/// Y-up turntable camera orbiting a target point.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub radius: f32,
    /// Rotation about +Y (radians).
    pub azimuth: f32,
    /// Angle above the XZ plane (radians).
    pub elevation: f32,
}

impl OrbitCamera {
    pub fn new(target: Vec3, radius: f32) -> Self {
        Self {
            target,
            radius,
            azimuth: 0.0,
            elevation: 20f32.to_radians(),
        }
    }

    /// Frames a bounding box: orbit its center at twice its radius.
    pub fn framing(bounds: &BoundingBox) -> Self {
        if !bounds.is_valid() {
            return Self::new(Vec3::ZERO, 5.0);
        }
        let radius = (bounds.radius() * 2.0).max(0.5);
        Self::new(bounds.center(), radius)
    }

    pub fn position(&self) -> Vec3 {
        let (sin_az, cos_az) = self.azimuth.sin_cos();
        let (sin_el, cos_el) = self.elevation.sin_cos();
        self.target + self.radius * Vec3::new(cos_el * sin_az, sin_el, cos_el * cos_az)
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), self.target, Vec3::Y)
    }

    pub fn orbit(&mut self, d_azimuth: f32, d_elevation: f32) {
        self.azimuth = (self.azimuth + d_azimuth).rem_euclid(std::f32::consts::TAU);
        // Stay clear of the poles so `look_at` keeps a valid up vector.
        self.elevation = (self.elevation + d_elevation)
            .clamp(-89f32.to_radians(), 89f32.to_radians());
    }

    /// Positive steps zoom in.
    pub fn zoom(&mut self, steps: f32) {
        self.radius = (self.radius * 1.1f32.powf(-steps)).max(1e-3);
    }
}
