//! Vertex data and its GPU buffer.

use std::sync::Arc;

use glam::{Vec2, Vec3};
use tracing::debug;
use trirender_rhi::buffer::Buffer;
use trirender_rhi::command::CommandBuffer;
use trirender_rhi::device::Device;
use trirender_rhi::vertex::Vertex;
use trirender_rhi::{RhiError, RhiResult};

/// Fewest vertices that still form a triangle.
pub const MIN_VERTICES: usize = 3;

/// Parameters of a non-indexed draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

impl DrawCall {
    /// One instance of `vertex_count` vertices starting at 0.
    pub fn vertices(vertex_count: u32) -> Self {
        Self {
            vertex_count,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        }
    }
}

/// A validated vertex list of at least one triangle.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    vertices: Vec<Vertex>,
    vertex_count: u32,
}

impl Geometry {
    /// # Errors
    ///
    /// - [`RhiError::InvalidGeometry`] with fewer than three vertices
    /// - [`RhiError::BufferCreation`] when the count does not fit a draw call
    pub fn new(vertices: Vec<Vertex>) -> RhiResult<Self> {
        if vertices.len() < MIN_VERTICES {
            return Err(RhiError::InvalidGeometry {
                count: vertices.len(),
            });
        }
        let vertex_count = draw_vertex_count(vertices.len())?;
        Ok(Self {
            vertices,
            vertex_count,
        })
    }

    /// Red, green and blue corners centered in clip space.
    pub fn triangle() -> Self {
        let [top, right, left] = base_corners();
        Self {
            vertices: vec![top, right, left],
            vertex_count: 3,
        }
    }

    /// The base triangle subdivided `depth` times.
    pub fn sierpinski(depth: u32) -> RhiResult<Self> {
        let [top, right, left] = base_corners();
        Self::new(sierpinski(depth, left, right, top))
    }

    #[inline]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn draw_call(&self) -> DrawCall {
        DrawCall::vertices(self.vertex_count())
    }
}

fn draw_vertex_count(len: usize) -> RhiResult<u32> {
    u32::try_from(len).map_err(|_| {
        RhiError::BufferCreation(format!("{} vertices exceed a single draw", len))
    })
}

fn base_corners() -> [Vertex; 3] {
    [
        Vertex::new(Vec2::new(0.0, -0.5), Vec3::new(1.0, 0.0, 0.0)),
        Vertex::new(Vec2::new(0.5, 0.5), Vec3::new(0.0, 1.0, 0.0)),
        Vertex::new(Vec2::new(-0.5, 0.5), Vec3::new(0.0, 0.0, 1.0)),
    ]
}

/// Splits the triangle into three corner triangles, `depth` levels deep.
///
/// Produces `3^depth` triangles; midpoints blend the corner colors.
pub fn sierpinski(depth: u32, left: Vertex, right: Vertex, top: Vertex) -> Vec<Vertex> {
    let mut vertices = Vec::with_capacity(3 * 3usize.pow(depth));
    subdivide(&mut vertices, depth, left, right, top);
    vertices
}

fn subdivide(out: &mut Vec<Vertex>, depth: u32, left: Vertex, right: Vertex, top: Vertex) {
    if depth == 0 {
        out.extend([top, right, left]);
        return;
    }

    let left_right = midpoint(left, right);
    let left_top = midpoint(left, top);
    let right_top = midpoint(right, top);

    subdivide(out, depth - 1, left, left_right, left_top);
    subdivide(out, depth - 1, left_right, right, right_top);
    subdivide(out, depth - 1, left_top, right_top, top);
}

fn midpoint(a: Vertex, b: Vertex) -> Vertex {
    Vertex::new(
        a.position.lerp(b.position, 0.5),
        a.color.lerp(b.color, 0.5),
    )
}

/// Geometry uploaded to a host-visible vertex buffer.
pub struct GeometryBuffer {
    buffer: Buffer,
    draw_call: DrawCall,
}

impl GeometryBuffer {
    /// Copies `geometry` into a new vertex buffer.
    pub fn new(device: Arc<Device>, geometry: &Geometry) -> RhiResult<Self> {
        let buffer = Buffer::new_vertex(device, bytemuck::cast_slice(geometry.vertices()))?;

        debug!(
            "Uploaded {} vertices ({} bytes)",
            geometry.vertex_count(),
            buffer.size()
        );

        Ok(Self {
            buffer,
            draw_call: geometry.draw_call(),
        })
    }

    pub fn bind(&self, command_buffer: &CommandBuffer) {
        command_buffer.bind_vertex_buffer(0, self.buffer.handle());
    }

    /// Draws every vertex once.
    pub fn draw(&self, command_buffer: &CommandBuffer) {
        let call = self.draw_call;
        command_buffer.draw(
            call.first_vertex..call.first_vertex + call.vertex_count,
            call.first_instance..call.first_instance + call.instance_count,
        );
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.draw_call.vertex_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32, y: f32) -> Vertex {
        Vertex::new(Vec2::new(x, y), Vec3::ONE)
    }

    #[test]
    fn test_rejects_fewer_than_three_vertices() {
        for count in 0..MIN_VERTICES {
            let vertices = vec![vertex(0.0, 0.0); count];
            let err = Geometry::new(vertices).unwrap_err();
            assert!(matches!(err, RhiError::InvalidGeometry { count: c } if c == count));
        }
    }

    #[test]
    fn test_accepts_three_or_more() {
        for count in [3, 4, 6] {
            let geometry = Geometry::new(vec![vertex(0.0, 0.0); count]).unwrap();
            assert_eq!(geometry.vertex_count(), count as u32);
        }
    }

    #[test]
    fn test_draw_vertex_count_rejects_overflow() {
        assert_eq!(draw_vertex_count(3).unwrap(), 3);
        assert_eq!(draw_vertex_count(u32::MAX as usize).unwrap(), u32::MAX);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_draw_vertex_count_past_u32_is_an_error() {
        let err = draw_vertex_count(u32::MAX as usize + 1).unwrap_err();
        assert!(matches!(err, RhiError::BufferCreation(_)));
    }

    #[test]
    fn test_draw_call_covers_all_vertices() {
        let geometry = Geometry::new(vec![vertex(0.0, 0.0); 6]).unwrap();
        assert_eq!(
            geometry.draw_call(),
            DrawCall {
                vertex_count: 6,
                instance_count: 1,
                first_vertex: 0,
                first_instance: 0,
            }
        );
    }

    #[test]
    fn test_triangle() {
        let triangle = Geometry::triangle();
        let vertices = triangle.vertices();
        assert_eq!(vertices.len(), 3);
        assert_eq!(vertices[0].position, Vec2::new(0.0, -0.5));
        assert_eq!(vertices[0].color, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(vertices[1].position, Vec2::new(0.5, 0.5));
        assert_eq!(vertices[1].color, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(vertices[2].position, Vec2::new(-0.5, 0.5));
        assert_eq!(vertices[2].color, Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_sierpinski_depth_zero_is_triangle() {
        assert_eq!(Geometry::sierpinski(0).unwrap(), Geometry::triangle());
    }

    #[test]
    fn test_sierpinski_triangle_count() {
        for depth in 0..5 {
            let geometry = Geometry::sierpinski(depth).unwrap();
            assert_eq!(geometry.vertices().len(), 3 * 3usize.pow(depth));
        }
    }

    #[test]
    fn test_sierpinski_stays_inside_base() {
        let geometry = Geometry::sierpinski(3).unwrap();
        for v in geometry.vertices() {
            assert!(v.position.x >= -0.5 && v.position.x <= 0.5);
            assert!(v.position.y >= -0.5 && v.position.y <= 0.5);
        }
    }

    #[test]
    fn test_sierpinski_midpoint_colors() {
        let left = Vertex::new(Vec2::new(-1.0, 1.0), Vec3::new(0.0, 0.0, 1.0));
        let right = Vertex::new(Vec2::new(1.0, 1.0), Vec3::new(0.0, 1.0, 0.0));
        let top = Vertex::new(Vec2::new(0.0, -1.0), Vec3::new(1.0, 0.0, 0.0));

        let vertices = sierpinski(1, left, right, top);
        assert_eq!(vertices.len(), 9);

        // First sub-triangle: top is the left/top midpoint.
        assert_eq!(vertices[0].position, Vec2::new(-0.5, 0.0));
        assert_eq!(vertices[0].color, Vec3::new(0.5, 0.0, 0.5));
        // ...and its right corner the left/right midpoint.
        assert_eq!(vertices[1].position, Vec2::new(0.0, 1.0));
        assert_eq!(vertices[1].color, Vec3::new(0.0, 0.5, 0.5));
    }
}
