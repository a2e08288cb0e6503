//! Vertex layout for the triangle and its input descriptions.

use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Vertex with a 2D clip-space position and an RGB color.
///
/// # Memory Layout
///
/// - Offset 0: pos (8 bytes)
/// - Offset 8: color (12 bytes)
/// - Total size: 20 bytes
///
/// # Shader Locations
///
/// - location 0: pos (vec2)
/// - location 1: color (vec3)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in clip space.
    pub pos: Vec2,
    /// RGB color, interpolated across the face.
    pub color: Vec3,
}

/// The three corners of the triangle: red top, green bottom-right, blue
/// bottom-left.
pub const TRIANGLE_VERTICES: [Vertex; 3] = [
    Vertex::new(Vec2::new(0.0, -0.5), Vec3::new(1.0, 0.0, 0.0)),
    Vertex::new(Vec2::new(0.5, 0.5), Vec3::new(0.0, 1.0, 0.0)),
    Vertex::new(Vec2::new(-0.5, 0.5), Vec3::new(0.0, 0.0, 1.0)),
];

impl Vertex {
    /// Creates a new vertex.
    #[inline]
    pub const fn new(pos: Vec2, color: Vec3) -> Self {
        Self { pos, color }
    }

    /// Binding 0, one element per vertex.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Attribute descriptions for `pos` (location 0) and `color` (location 1).
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, color) as u32,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        assert_eq!(size_of::<Vertex>(), 20);
    }

    #[test]
    fn test_vertex_field_offsets() {
        assert_eq!(offset_of!(Vertex, pos), 0);
        assert_eq!(offset_of!(Vertex, color), 8);
    }

    #[test]
    fn test_binding_description() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 20);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_attribute_descriptions() {
        let attributes = Vertex::attribute_descriptions();

        assert_eq!(attributes[0].location, 0);
        assert_eq!(attributes[0].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attributes[0].offset, 0);

        assert_eq!(attributes[1].location, 1);
        assert_eq!(attributes[1].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attributes[1].offset, 8);

        assert!(attributes.iter().all(|a| a.binding == 0));
    }

    #[test]
    fn test_triangle_vertices() {
        assert_eq!(TRIANGLE_VERTICES.len(), 3);
        assert_eq!(TRIANGLE_VERTICES[0].pos, Vec2::new(0.0, -0.5));
        assert_eq!(TRIANGLE_VERTICES[0].color, Vec3::X);
        assert_eq!(TRIANGLE_VERTICES[1].pos, Vec2::new(0.5, 0.5));
        assert_eq!(TRIANGLE_VERTICES[1].color, Vec3::Y);
        assert_eq!(TRIANGLE_VERTICES[2].pos, Vec2::new(-0.5, 0.5));
        assert_eq!(TRIANGLE_VERTICES[2].color, Vec3::Z);
    }

    #[test]
    fn test_vertex_bytes_match_layout() {
        let bytes: &[u8] = bytemuck::cast_slice(&TRIANGLE_VERTICES);
        assert_eq!(bytes.len(), 60);

        let first: &[f32] = bytemuck::cast_slice(&bytes[..20]);
        assert_eq!(first, &[0.0, -0.5, 1.0, 0.0, 0.0]);
    }
}
