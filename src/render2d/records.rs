// GPU record layouts
//
// These structs are uploaded verbatim; field order and offsets must match
// the `renderer2d_*` shaders (std430 for the structured buffers).

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

/// Sentinel in `texture_index` for untextured draws.
pub const NO_TEXTURE: i32 = -1;
/// Sentinel in `clip_index` for unclipped draws.
pub const NO_CLIP: i32 = -1;

/// Triangle/quad vertex.
///
/// | offset | field          | type    |
/// |--------|----------------|---------|
/// | 0      | position       | vec2    |
/// | 8      | tex_coords     | vec2    |
/// | 16     | instance_index | uint    |
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TriangleVertex {
    pub position: [f32; 2],
    pub tex_coords: [f32; 2],
    pub instance_index: u32,
}

/// Per-primitive data indexed by `TriangleVertex::instance_index`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct TriangleInstance {
    pub tint: u32,
    pub texture_index: i32,
    pub clip_index: i32,
}

/// Axis-aligned clip rectangle in world units.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ClipRegion {
    pub min: [f32; 2],
    pub max: [f32; 2],
}

impl ClipRegion {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: min.min(max).to_array(),
            max: min.max(max).to_array(),
        }
    }

    pub fn from_rect(origin: Vec2, size: Vec2) -> Self {
        Self::new(origin, origin + size)
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min[0]
            && point.y >= self.min[1]
            && point.x <= self.max[0]
            && point.y <= self.max[1]
    }

    /// Bit pattern used to recognise identical regions.
    pub(crate) fn key(&self) -> [u32; 4] {
        bytemuck::cast(*self)
    }
}

/// Line list vertex.
///
/// | offset | field    | type |
/// |--------|----------|------|
/// | 0      | position | vec2 |
/// | 8      | color    | uint |
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 2],
    pub color: u32,
}

/// One procedural ellipse; the vertex shader expands it to 6 vertices.
///
/// | offset | field         | type  |
/// |--------|---------------|-------|
/// | 0      | center        | vec2  |
/// | 8      | radii         | vec2  |
/// | 16     | rotation      | float |
/// | 20     | inner_scale   | float |
/// | 24     | start_angle   | float |
/// | 28     | end_angle     | float |
/// | 32     | tint          | uint  |
/// | 36     | texture_index | int   |
/// | 40     | edge_softness | float |
/// | 44     | clip_index    | int   |
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct EllipseShape {
    pub center: [f32; 2],
    pub radii: [f32; 2],
    pub rotation: f32,
    pub inner_scale: f32,
    pub start_angle: f32,
    pub end_angle: f32,
    pub tint: u32,
    pub texture_index: i32,
    pub edge_softness: f32,
    pub clip_index: i32,
}

pub const ELLIPSE_VERTICES_PER_SHAPE: u32 = 6;

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn triangle_layouts_match_shaders() {
        assert_eq!(size_of::<TriangleVertex>(), 20);
        assert_eq!(offset_of!(TriangleVertex, tex_coords), 8);
        assert_eq!(offset_of!(TriangleVertex, instance_index), 16);
        assert_eq!(size_of::<TriangleInstance>(), 12);
        assert_eq!(size_of::<ClipRegion>(), 16);
    }

    #[test]
    fn line_and_ellipse_layouts_match_shaders() {
        assert_eq!(size_of::<LineVertex>(), 12);
        assert_eq!(offset_of!(LineVertex, color), 8);

        assert_eq!(size_of::<EllipseShape>(), 48);
        assert_eq!(offset_of!(EllipseShape, rotation), 16);
        assert_eq!(offset_of!(EllipseShape, tint), 32);
        assert_eq!(offset_of!(EllipseShape, texture_index), 36);
        assert_eq!(offset_of!(EllipseShape, clip_index), 44);
    }

    #[test]
    fn clip_region_normalizes_corners() {
        let clip = ClipRegion::new(Vec2::new(10.0, 20.0), Vec2::new(0.0, 5.0));
        assert_eq!(clip.min, [0.0, 5.0]);
        assert_eq!(clip.max, [10.0, 20.0]);
        assert!(clip.contains(Vec2::new(5.0, 10.0)));
        assert!(!clip.contains(Vec2::new(11.0, 10.0)));
    }
}
