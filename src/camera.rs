//! Camera and clock collaborators.
//!
//! The pipeline only reads these: the camera supplies world position and the
//! matrices used to reconstruct per-pixel rays, the clock supplies elapsed
//! seconds for animation.
//!
//! Projection uses the standard wgpu depth range, `0.0` at the near plane and
//! `1.0` at the far plane. Every pass that reads or writes depth relies on it.

use std::time::Instant;

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// First-person perspective camera, oriented by yaw and pitch.
///
/// Yaw and pitch of zero look along -Z with +Y up.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Camera {
    pub position: Vec3,
    /// Rotation about +Y in radians.
    pub yaw: f32,
    /// Elevation in radians, clamped to just under +-90 degrees.
    pub pitch: f32,
    /// Vertical field of view in degrees.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    #[serde(skip)]
    pub aspect: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(-92.8, 137.4, -169.2),
            yaw: 2.6,
            pitch: 0.12,
            fov_y: 75.0,
            near: 0.5,
            far: 50_000.0,
            aspect: 1.0,
        }
    }
}

impl Camera {
    const MAX_PITCH: f32 = std::f32::consts::FRAC_PI_2 - 0.001;

    pub fn new(position: Vec3, yaw: f32, pitch: f32) -> Self {
        Self {
            position,
            yaw,
            pitch: pitch.clamp(-Self::MAX_PITCH, Self::MAX_PITCH),
            ..Self::default()
        }
    }

    pub fn forward(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        Vec3::new(-sy * cp, sp, -cy * cp)
    }

    /// Point the camera at `target`. No-op when `target` equals the position.
    pub fn look_at(&mut self, target: Vec3) {
        let dir = target - self.position;
        if dir.length_squared() <= f32::EPSILON {
            return;
        }
        let dir = dir.normalize();
        self.pitch = dir.y.asin().clamp(-Self::MAX_PITCH, Self::MAX_PITCH);
        self.yaw = (-dir.x).atan2(-dir.z);
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y.to_radians(), self.aspect.max(1e-4), self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Camera-to-world transform.
    pub fn world_matrix(&self) -> Mat4 {
        self.view_matrix().inverse()
    }

    /// Maps clip-space points back to world space: world matrix times inverse
    /// projection. Singular projections yield non-finite values; they are not
    /// checked here.
    pub fn unprojection_matrix(&self) -> Mat4 {
        self.world_matrix() * self.projection_matrix().inverse()
    }
}

#[derive(Clone, Copy, Debug)]
enum ClockMode {
    RealTime { start: Instant, last: Instant },
    FixedStep { step: f32 },
}

/// Monotonic animation clock shared by every pass.
#[derive(Clone, Debug)]
pub struct Clock {
    mode: ClockMode,
    elapsed: f32,
}

impl Clock {
    /// Wall-clock time since construction.
    pub fn real_time() -> Self {
        let now = Instant::now();
        Self {
            mode: ClockMode::RealTime { start: now, last: now },
            elapsed: 0.0,
        }
    }

    /// Advances by exactly `step` seconds per tick. Used for offline rendering.
    pub fn fixed_step(step: f32) -> Self {
        Self {
            mode: ClockMode::FixedStep { step },
            elapsed: 0.0,
        }
    }

    /// Advance the clock and return the delta in seconds.
    pub fn tick(&mut self) -> f32 {
        match &mut self.mode {
            ClockMode::RealTime { start, last } => {
                let now = Instant::now();
                let dt = now.duration_since(*last).as_secs_f32();
                *last = now;
                self.elapsed = now.duration_since(*start).as_secs_f32();
                dt
            }
            ClockMode::FixedStep { step } => {
                self.elapsed += *step;
                *step
            }
        }
    }

    pub fn elapsed_seconds(&self) -> f32 {
        self.elapsed
    }

    /// Jump to an absolute time. Real-time clocks keep ticking from here.
    pub fn set_elapsed(&mut self, seconds: f32) {
        self.elapsed = seconds;
        if let ClockMode::RealTime { start, last } = &mut self.mode {
            let now = Instant::now();
            *start = now - std::time::Duration::from_secs_f32(seconds.max(0.0));
            *last = now;
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::real_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn test_default_orientation_looks_down_negative_z() {
        let cam = Camera::new(Vec3::ZERO, 0.0, 0.0);
        assert!(approx(cam.forward(), Vec3::NEG_Z));
    }

    #[test]
    fn test_look_at() {
        let mut cam = Camera::new(Vec3::ZERO, 0.0, 0.0);
        cam.look_at(Vec3::new(10.0, 0.0, 0.0));
        assert!(approx(cam.forward(), Vec3::X));
        cam.look_at(Vec3::new(0.0, 5.0, -5.0));
        assert!(approx(cam.forward(), Vec3::new(0.0, 1.0, -1.0).normalize()));
    }

    #[test]
    fn test_unprojection_inverts_view_projection() {
        let mut cam = Camera::new(Vec3::new(3.0, 40.0, -7.0), 0.7, 0.2);
        cam.set_viewport(1920, 1080);
        let world = Vec3::new(15.0, 60.0, -80.0);
        let clip = cam.view_projection() * world.extend(1.0);
        let ndc = clip / clip.w;
        assert!(ndc.z > 0.0 && ndc.z < 1.0, "point should sit inside the [0, 1] depth range");
        let back = cam.unprojection_matrix() * ndc;
        let back = back.truncate() / back.w;
        assert!((back - world).length() < 1e-2);
    }

    #[test]
    fn test_world_matrix_translation_is_position() {
        let cam = Camera::new(Vec3::new(1.0, 2.0, 3.0), 1.0, -0.3);
        let t = cam.world_matrix().w_axis.truncate();
        assert!(approx(t, Vec3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn test_fixed_step_clock() {
        let mut clock = Clock::fixed_step(0.5);
        assert_eq!(clock.elapsed_seconds(), 0.0);
        assert_eq!(clock.tick(), 0.5);
        clock.tick();
        assert_eq!(clock.elapsed_seconds(), 1.0);
        clock.set_elapsed(0.0);
        assert_eq!(clock.elapsed_seconds(), 0.0);
    }
}
