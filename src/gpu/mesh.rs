//! World-space geometry for the opaque demo scene the clouds composite over.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

    const fn new(position: [f32; 3], color: [f32; 3]) -> Self {
        Self { position, color }
    }

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Indexed triangle list, already in world space.
#[derive(Clone, Debug, Default)]
pub struct SceneMesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

const GROUND_COLOR: [f32; 3] = [0.32, 0.42, 0.24];
const TOWER_COLORS: [[f32; 3]; 3] = [[0.55, 0.52, 0.48], [0.42, 0.40, 0.38], [0.66, 0.60, 0.52]];

impl SceneMesh {
    fn push_quad(&mut self, corners: [Vec3; 4], color: [f32; 3]) {
        let base = self.vertices.len() as u32;
        self.vertices
            .extend(corners.iter().map(|c| Vertex::new(c.to_array(), color)));
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }

    /// Flat square at height `y`, centred on the origin.
    pub fn push_ground(&mut self, half_extent: f32, y: f32, color: [f32; 3]) {
        let e = half_extent;
        self.push_quad(
            [
                Vec3::new(-e, y, -e),
                Vec3::new(-e, y, e),
                Vec3::new(e, y, e),
                Vec3::new(e, y, -e),
            ],
            color,
        );
    }

    /// Axis-aligned box. The bottom face is omitted.
    pub fn push_box(&mut self, min: Vec3, max: Vec3, color: [f32; 3]) {
        let (a, b) = (min, max);
        // Top
        self.push_quad(
            [
                Vec3::new(a.x, b.y, a.z),
                Vec3::new(a.x, b.y, b.z),
                Vec3::new(b.x, b.y, b.z),
                Vec3::new(b.x, b.y, a.z),
            ],
            color,
        );
        // Z+
        self.push_quad(
            [
                Vec3::new(a.x, a.y, b.z),
                Vec3::new(b.x, a.y, b.z),
                Vec3::new(b.x, b.y, b.z),
                Vec3::new(a.x, b.y, b.z),
            ],
            color,
        );
        // Z-
        self.push_quad(
            [
                Vec3::new(b.x, a.y, a.z),
                Vec3::new(a.x, a.y, a.z),
                Vec3::new(a.x, b.y, a.z),
                Vec3::new(b.x, b.y, a.z),
            ],
            color,
        );
        // X+
        self.push_quad(
            [
                Vec3::new(b.x, a.y, b.z),
                Vec3::new(b.x, a.y, a.z),
                Vec3::new(b.x, b.y, a.z),
                Vec3::new(b.x, b.y, b.z),
            ],
            color,
        );
        // X-
        self.push_quad(
            [
                Vec3::new(a.x, a.y, a.z),
                Vec3::new(a.x, a.y, b.z),
                Vec3::new(a.x, b.y, b.z),
                Vec3::new(a.x, b.y, a.z),
            ],
            color,
        );
    }

    /// Ground plane with a grid of towers. The tallest reach into the cloud
    /// layer so depth-aware compositing has something to occlude.
    pub fn demo_scene() -> Self {
        let mut mesh = Self::default();
        mesh.push_ground(4000.0, 0.0, GROUND_COLOR);

        let spacing = 160.0;
        for gz in -4i32..=4 {
            for gx in -4i32..=4 {
                if (gx + gz) % 2 != 0 {
                    continue;
                }
                // Cheap deterministic height variation.
                let h = ((gx * 7 + gz * 13).rem_euclid(9) + 1) as f32;
                let height = 15.0 * h;
                let half = 18.0 + 2.0 * h;
                let centre = Vec3::new(gx as f32 * spacing, 0.0, gz as f32 * spacing);
                let color = TOWER_COLORS[(gx - gz).rem_euclid(3) as usize];
                mesh.push_box(
                    centre - Vec3::new(half, 0.0, half),
                    centre + Vec3::new(half, height, half),
                    color,
                );
            }
        }
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_counts() {
        let mut mesh = SceneMesh::default();
        mesh.push_box(Vec3::ZERO, Vec3::ONE, [1.0; 3]);
        assert_eq!(mesh.vertices.len(), 20);
        assert_eq!(mesh.indices.len(), 30);
    }

    #[test]
    fn test_demo_scene_indices_in_range() {
        let mesh = SceneMesh::demo_scene();
        let count = mesh.vertices.len() as u32;
        assert!(mesh.indices.iter().all(|&i| i < count));
        assert_eq!(mesh.indices.len() % 3, 0);
    }

    #[test]
    fn test_demo_scene_reaches_cloud_floor() {
        let mesh = SceneMesh::demo_scene();
        let top = mesh
            .vertices
            .iter()
            .map(|v| v.position[1])
            .fold(f32::MIN, f32::max);
        assert!(top > 40.0);
        assert!(mesh.vertices.iter().all(|v| v.position[1] >= 0.0));
    }
}
