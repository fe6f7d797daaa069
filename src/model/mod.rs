//! In-memory model document
//!
//! Canonical geometry is indexed triangles with per-vertex position,
//! normal and UV (the WZM layout). PIE polygon lists are normalized to
//! this on read and regenerated on write.

mod animation;
mod material;

pub use animation::{AnimFrame, MeshAnimation};
pub use material::WzMaterial;

use glam::{Vec2, Vec3};

use crate::caps::Caps;
use crate::{ModelError, Result};

/// One vertex of the canonical layout.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            normal: Vec3::Y,
            uv: Vec2::ZERO,
        }
    }
}

/// Attachment point (weapon mounts, thrusters, ...).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Connector {
    pub position: Vec3,
}

/// Texture animation parameters for one mesh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TexAnim {
    pub frames: u32,
    pub playback_rate: u32,
    pub width: u32,
    pub height: u32,
}

/// One mesh (a PIE level) of the document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub name: String,
    /// Index into `WzModel::materials`.
    pub material: usize,
    pub team_colours: bool,
    pub vertices: Vec<Vertex>,
    pub triangles: Vec<[u32; 3]>,
    pub connectors: Vec<Connector>,
    pub texture_animation: Option<TexAnim>,
    pub animation: Option<MeshAnimation>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }
}

/// A loaded model: geometry, materials and the capability set that
/// describes what the contents use.
#[derive(Clone, Debug, Default)]
pub struct WzModel {
    pub materials: Vec<WzMaterial>,
    pub meshes: Vec<Mesh>,
    pub caps: Caps,
    /// PIE TYPE header flags, preserved across round-trips.
    pub pie_type: u32,
    /// Fields a reader had to fill with defaults because the source
    /// format does not carry them (e.g. gen-1 normals).
    pub load_notes: Vec<String>,
}

impl WzModel {
    /// Create an empty document.
    pub fn new() -> Self {
        Self {
            pie_type: 0x200,
            ..Self::default()
        }
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Capability set derived from what the contents actually use.
    ///
    /// The attached `caps` must always be a superset of this.
    pub fn used_caps(&self) -> Caps {
        let mut used = Caps::new();
        for mesh in &self.meshes {
            used.texture_animation |= mesh.texture_animation.is_some();
            used.animation |= mesh.animation.is_some();
            used.connectors |= !mesh.connectors.is_empty();
        }
        used.tangents = self
            .materials
            .iter()
            .any(|m| m.normalmap.is_some() || m.specularmap.is_some());
        used
    }

    /// Check index invariants and the caps-superset invariant.
    ///
    /// Readers run this before returning a document, writers before
    /// serializing one.
    pub fn validate(&self) -> Result<()> {
        for (mi, mesh) in self.meshes.iter().enumerate() {
            if mesh.material >= self.materials.len() {
                return Err(ModelError::Invalid(format!(
                    "mesh {} ('{}') references material {} but only {} exist",
                    mi,
                    mesh.name,
                    mesh.material,
                    self.materials.len()
                )));
            }
            let nverts = mesh.vertices.len() as u32;
            for (ti, tri) in mesh.triangles.iter().enumerate() {
                if tri.iter().any(|&i| i >= nverts) {
                    return Err(ModelError::Invalid(format!(
                        "mesh {} triangle {} indexes past {} vertices",
                        mi, ti, nverts
                    )));
                }
            }
        }
        let missing = self.caps.missing_from(self.used_caps());
        if !missing.is_empty() {
            return Err(ModelError::Invalid(format!(
                "document uses features its capability set does not cover: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}
