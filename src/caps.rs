//! Capability flags for model formats
//!
//! The two PIE generations and WZM support different optional features.
//! A `Caps` value records which of them a document may use; readers set
//! it from what a file actually contained, writers consult it before
//! emitting optional sections.

use crate::format::FormatType;

/// Feature flags attached to a model document.
///
/// Compares by value; tests pin reader defaults with equality.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Caps {
    /// Per-mesh texture animation frames (PIE flag 0x4000 payload).
    pub texture_animation: bool,
    /// Normal/specular map directives, i.e. per-pixel lighting inputs.
    pub tangents: bool,
    /// ANIMOBJECT/ANIMATION keyframe blocks.
    pub animation: bool,
    /// Connector point lists.
    pub connectors: bool,
}

/// Everything PIE generation 1 can carry.
pub const PIE2_CAPS: Caps = Caps {
    texture_animation: true,
    tangents: false,
    animation: false,
    connectors: true,
};

/// Everything PIE generation 2 can carry.
pub const PIE3_CAPS: Caps = Caps {
    texture_animation: true,
    tangents: true,
    animation: true,
    connectors: true,
};

impl Caps {
    /// All flags off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to format-neutral defaults (all flags off).
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Documented default capability set for a format generation.
    /// WZM can represent everything the document model has.
    pub fn for_format(format: FormatType) -> Self {
        match format {
            FormatType::Pie2 => PIE2_CAPS,
            FormatType::Pie3 => PIE3_CAPS,
            FormatType::Wzm => PIE3_CAPS,
        }
    }

    /// Flag-wise union.
    pub fn union(self, other: Caps) -> Caps {
        Caps {
            texture_animation: self.texture_animation || other.texture_animation,
            tangents: self.tangents || other.tangents,
            animation: self.animation || other.animation,
            connectors: self.connectors || other.connectors,
        }
    }

    /// Names of flags set in `required` but not in `self`.
    ///
    /// Empty means `self` is a superset of `required`. Writers use this
    /// to name what a conversion will drop.
    pub fn missing_from(&self, required: Caps) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if required.texture_animation && !self.texture_animation {
            missing.push("texture animation");
        }
        if required.tangents && !self.tangents {
            missing.push("tangents");
        }
        if required.animation && !self.animation {
            missing.push("animation");
        }
        if required.connectors && !self.connectors {
            missing.push("connectors");
        }
        missing
    }
}
