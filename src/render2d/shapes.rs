// Draw descriptions accepted by `Renderer2D`
//
// Positions are world units (virtual pixels, origin at the centre, +Y
// down). Angles are radians. A `depth` of `None` takes the renderer's
// current depth.

use super::color::Rgba8;
use super::records::ClipRegion;
use super::virtual_texture::VirtualTextureId;
use glam::Vec2;
use std::f32::consts::TAU;

/// UVs for TL, TR, BR, BL.
pub const QUAD_TEX_COORDS: [Vec2; 4] = [
    Vec2::new(0.0, 0.0),
    Vec2::new(1.0, 0.0),
    Vec2::new(1.0, 1.0),
    Vec2::new(0.0, 1.0),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub positions: [Vec2; 3],
    pub tex_coords: [Vec2; 3],
    /// Fill color, or tint when textured.
    pub color: Rgba8,
    pub texture: Option<VirtualTextureId>,
    pub depth: Option<i32>,
    pub clip: Option<ClipRegion>,
}

impl Triangle {
    pub fn new(positions: [Vec2; 3], color: Rgba8) -> Self {
        Self {
            positions,
            tex_coords: [Vec2::ZERO; 3],
            color,
            texture: None,
            depth: None,
            clip: None,
        }
    }

    pub fn textured(mut self, texture: VirtualTextureId, tex_coords: [Vec2; 3]) -> Self {
        self.texture = Some(texture);
        self.tex_coords = tex_coords;
        self
    }

    pub fn with_depth(mut self, depth: i32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_clip(mut self, clip: ClipRegion) -> Self {
        self.clip = Some(clip);
        self
    }
}

/// Four corners in TL, TR, BR, BL order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub positions: [Vec2; 4],
    pub tex_coords: [Vec2; 4],
    pub color: Rgba8,
    pub texture: Option<VirtualTextureId>,
    pub depth: Option<i32>,
    pub clip: Option<ClipRegion>,
}

impl Quad {
    pub fn new(positions: [Vec2; 4], color: Rgba8) -> Self {
        Self {
            positions,
            tex_coords: QUAD_TEX_COORDS,
            color,
            texture: None,
            depth: None,
            clip: None,
        }
    }

    /// Axis-aligned rectangle from its top-left corner.
    pub fn rect(top_left: Vec2, size: Vec2, color: Rgba8) -> Self {
        let br = top_left + size;
        Self::new(
            [
                top_left,
                Vec2::new(br.x, top_left.y),
                br,
                Vec2::new(top_left.x, br.y),
            ],
            color,
        )
    }

    pub fn textured(mut self, texture: VirtualTextureId) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_tex_coords(mut self, tex_coords: [Vec2; 4]) -> Self {
        self.tex_coords = tex_coords;
        self
    }

    pub fn with_depth(mut self, depth: i32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_clip(mut self, clip: ClipRegion) -> Self {
        self.clip = Some(clip);
        self
    }
}

/// Procedural ellipse covering circles, rings, sectors and arcs.
///
/// `inner_scale` is the hole radius as a fraction of the outer radii; the
/// angular range runs from `start_angle` to `end_angle`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    pub center: Vec2,
    pub radii: Vec2,
    pub rotation: f32,
    pub inner_scale: f32,
    pub start_angle: f32,
    pub end_angle: f32,
    pub color: Rgba8,
    pub texture: Option<VirtualTextureId>,
    /// Antialiasing width in pixels.
    pub edge_softness: f32,
    pub depth: Option<i32>,
    pub clip: Option<ClipRegion>,
}

impl Ellipse {
    pub fn ellipse(center: Vec2, radii: Vec2, rotation: f32, color: Rgba8) -> Self {
        Self {
            center,
            radii,
            rotation,
            inner_scale: 0.0,
            start_angle: 0.0,
            end_angle: TAU,
            color,
            texture: None,
            edge_softness: 1.0,
            depth: None,
            clip: None,
        }
    }

    pub fn circle(center: Vec2, radius: f32, color: Rgba8) -> Self {
        Self::ellipse(center, Vec2::splat(radius), 0.0, color)
    }

    pub fn ring(center: Vec2, outer_radius: f32, inner_radius: f32, color: Rgba8) -> Self {
        let mut ring = Self::circle(center, outer_radius, color);
        ring.inner_scale = hole_scale(outer_radius, outer_radius - inner_radius);
        ring
    }

    pub fn sector(center: Vec2, radius: f32, start_angle: f32, end_angle: f32, color: Rgba8) -> Self {
        Self::circle(center, radius, color).with_angles(start_angle, end_angle)
    }

    /// Ring segment `thickness` wide, measured inwards from `radius`.
    pub fn arc(
        center: Vec2,
        radius: f32,
        thickness: f32,
        start_angle: f32,
        end_angle: f32,
        color: Rgba8,
    ) -> Self {
        let mut arc = Self::sector(center, radius, start_angle, end_angle, color);
        arc.inner_scale = hole_scale(radius, thickness);
        arc
    }

    pub fn ellipse_sector(
        center: Vec2,
        radii: Vec2,
        rotation: f32,
        start_angle: f32,
        end_angle: f32,
        color: Rgba8,
    ) -> Self {
        Self::ellipse(center, radii, rotation, color).with_angles(start_angle, end_angle)
    }

    /// Thickness is measured against the shorter radius.
    pub fn ellipse_arc(
        center: Vec2,
        radii: Vec2,
        rotation: f32,
        thickness: f32,
        start_angle: f32,
        end_angle: f32,
        color: Rgba8,
    ) -> Self {
        let mut arc = Self::ellipse_sector(center, radii, rotation, start_angle, end_angle, color);
        arc.inner_scale = hole_scale(radii.min_element(), thickness);
        arc
    }

    pub fn with_angles(mut self, start_angle: f32, end_angle: f32) -> Self {
        self.start_angle = start_angle;
        self.end_angle = end_angle;
        self
    }

    /// Sample `texture` across the bounding box, tinted by `color`.
    pub fn textured(mut self, texture: VirtualTextureId) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_edge_softness(mut self, pixels: f32) -> Self {
        self.edge_softness = pixels;
        self
    }

    pub fn with_depth(mut self, depth: i32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_clip(mut self, clip: ClipRegion) -> Self {
        self.clip = Some(clip);
        self
    }
}

fn hole_scale(outer: f32, thickness: f32) -> f32 {
    if outer <= 0.0 {
        return 0.0;
    }
    ((outer - thickness) / outer).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_corners_run_clockwise_from_top_left() {
        let q = Quad::rect(Vec2::new(10.0, 20.0), Vec2::new(4.0, 2.0), Rgba8::WHITE);
        assert_eq!(
            q.positions,
            [
                Vec2::new(10.0, 20.0),
                Vec2::new(14.0, 20.0),
                Vec2::new(14.0, 22.0),
                Vec2::new(10.0, 22.0),
            ]
        );
        assert_eq!(q.tex_coords, QUAD_TEX_COORDS);
    }

    #[test]
    fn ellipse_defaults_cover_a_full_turn() {
        let c = Ellipse::circle(Vec2::ZERO, 5.0, Rgba8::BLACK);
        assert_eq!(c.start_angle, 0.0);
        assert_eq!(c.end_angle, TAU);
        assert_eq!(c.inner_scale, 0.0);
        assert_eq!(c.edge_softness, 1.0);
        assert_eq!(c.radii, Vec2::splat(5.0));
    }

    #[test]
    fn rings_and_arcs_derive_the_hole() {
        assert_eq!(Ellipse::ring(Vec2::ZERO, 10.0, 4.0, Rgba8::WHITE).inner_scale, 0.4);
        assert_eq!(
            Ellipse::arc(Vec2::ZERO, 10.0, 2.5, 0.0, 1.0, Rgba8::WHITE).inner_scale,
            0.75
        );
        let thick = Ellipse::ellipse_arc(Vec2::ZERO, Vec2::new(20.0, 8.0), 0.0, 16.0, 0.0, 1.0, Rgba8::WHITE);
        assert_eq!(thick.inner_scale, 0.0);
        assert_eq!(Ellipse::ring(Vec2::ZERO, 0.0, 0.0, Rgba8::WHITE).inner_scale, 0.0);
    }
}
