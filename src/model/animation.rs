//! Object animation keyframes (PIE ANIMOBJECT / WZM ANIMATION blocks)

use glam::Vec3;

/// One keyframe of a mesh-level animation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnimFrame {
    pub frame: u32,
    pub position: Vec3,
    /// Euler rotation, stored in the format's native units.
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for AnimFrame {
    fn default() -> Self {
        Self {
            frame: 0,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

/// A mesh-level keyframe animation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshAnimation {
    /// Total animation time in milliseconds.
    pub time: u32,
    /// Number of playback cycles, 0 for looping.
    pub cycles: u32,
    pub frames: Vec<AnimFrame>,
}

impl MeshAnimation {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}
