// Virtual-resolution projection
//
// World units are virtual pixels centred on the origin with +Y down. The
// virtual rectangle is scaled uniformly to fit the output; the shorter axis
// sees extra world space instead of stretching.

use glam::{Mat4, Vec2};

/// World -> clip matrix for an output of `output` pixels.
pub fn view_projection(output: Vec2, virtual_size: Vec2) -> Mat4 {
    if output.cmple(Vec2::ZERO).any() || virtual_size.cmple(Vec2::ZERO).any() {
        return Mat4::IDENTITY;
    }
    let scale = (output.x / virtual_size.x).min(output.y / virtual_size.y);
    let half = output / (2.0 * scale);
    // Vulkan clip space has +Y down, so bottom = -half
    Mat4::orthographic_rh(-half.x, half.x, -half.y, half.y, -1.0, 1.0)
}

/// Visible world-space half extents for an output size.
pub fn visible_half_extent(output: Vec2, virtual_size: Vec2) -> Vec2 {
    let scale = (output.x / virtual_size.x).min(output.y / virtual_size.y);
    if !scale.is_finite() || scale <= 0.0 {
        return Vec2::ZERO;
    }
    output / (2.0 * scale)
}
