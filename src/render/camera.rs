use std::mem;

use bytemuck::{Pod, Zeroable};
use glam::{EulerRot, Mat4, Quat, Vec3, Vec4};
use winit::event::MouseButton;

use crate::{app::UpdateContext, input::Key};

#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vec3,
    /// Pitch, yaw and roll in radians.
    pub rotation: Vec3,
    pub fov: f32,
    /// Units per second.
    pub speed: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            fov: 70.0,
            speed: 20.0,
            near: 0.1,
            far: 4000.0,
        }
    }
}

impl Camera {
    pub const MAX_PITCH: f32 = 1.55;

    pub fn new(position: Vec3, fov: f32) -> Self {
        Self {
            position,
            fov,
            ..Default::default()
        }
    }

    pub fn rotation_quat(&self) -> Quat {
        Quat::from_euler(
            EulerRot::YXZ,
            self.rotation.y,
            self.rotation.x,
            self.rotation.z,
        )
    }

    pub fn look_at(&mut self, target: Vec3) {
        let direction = (target - self.position).normalize_or_zero();
        if direction == Vec3::ZERO {
            return;
        }

        self.rotation.y = f32::atan2(-direction.x, -direction.z);
        self.rotation.x = direction.y.asin().clamp(-Self::MAX_PITCH, Self::MAX_PITCH);
    }

    pub fn update(&mut self, cx: UpdateContext) {
        if cx.mouse.is_held(MouseButton::Right) {
            self.rotation.y -= cx.mouse.delta.x * 0.003;
            self.rotation.x -= cx.mouse.delta.y * 0.003;
            self.rotation.x = self.rotation.x.clamp(-Self::MAX_PITCH, Self::MAX_PITCH);
        }

        let forward = self.rotation_quat() * Vec3::NEG_Z;
        let right = self.rotation_quat() * Vec3::X;

        let mut movement = Vec3::ZERO;

        if cx.keyboard.is_held(Key::KeyW) {
            movement += forward;
        }

        if cx.keyboard.is_held(Key::KeyS) {
            movement -= forward;
        }

        if cx.keyboard.is_held(Key::KeyA) {
            movement -= right;
        }

        if cx.keyboard.is_held(Key::KeyD) {
            movement += right;
        }

        if cx.keyboard.is_held(Key::Space) {
            movement += Vec3::Y;
        }

        if cx.keyboard.is_held(Key::ShiftLeft) {
            movement -= Vec3::Y;
        }

        self.position += movement.normalize_or_zero() * self.speed * cx.delta;
        self.speed = (self.speed * (1.0 + cx.mouse.scroll.y * 0.1)).max(0.5);
    }

    pub fn eye(&self) -> Vec3 {
        self.position
    }

    pub fn view(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation_quat(), self.position)
    }

    pub fn proj(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), aspect, self.near, self.far)
    }

    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        self.proj(aspect) * self.view().inverse()
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CameraData {
    pub view_proj: Mat4,
    pub eye: Vec4,
}

pub struct DrawCamera {
    pub buffer: wgpu::Buffer,
}

impl DrawCamera {
    pub fn new(device: &wgpu::Device) -> anyhow::Result<Self> {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Camera Buffer"),
            size: mem::size_of::<CameraData>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self { buffer })
    }

    pub fn write(&self, queue: &wgpu::Queue, camera: &Camera, aspect: f32) {
        let data = CameraData {
            view_proj: camera.view_proj(aspect),
            eye: camera.eye().extend(1.0),
        };

        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn look_at_faces_target() {
        let mut camera = Camera::new(Vec3::new(10.0, 5.0, 10.0), 70.0);
        let target = Vec3::new(-20.0, 0.0, 3.0);
        camera.look_at(target);

        let forward = camera.rotation_quat() * Vec3::NEG_Z;
        let expected = (target - camera.position).normalize();
        assert!(forward.dot(expected) > 0.999);
    }

    #[test]
    fn eye_projects_to_origin() {
        let camera = Camera::new(Vec3::new(1.0, 2.0, 3.0), 70.0);
        let clip = camera.view_proj(1.0) * (camera.eye() + Vec3::NEG_Z).extend(1.0);

        assert!(clip.x.abs() < 1e-4);
        assert!(clip.y.abs() < 1e-4);
        assert!(clip.w > 0.0);
    }
}
