//! Model material

/// A named material: texture page plus optional per-pixel lighting maps.
///
/// PIE carries exactly one of these per file; WZM carries a list and
/// meshes reference them by index.
#[derive(Clone, Debug, PartialEq)]
pub struct WzMaterial {
    pub name: String,
    /// Texture page filename.
    pub texture: String,
    /// Page size in pixels. Gen-1 PIE stores UVs as pixel offsets, so
    /// the page size is needed to normalize them.
    pub texpage_size: [u32; 2],
    pub normalmap: Option<String>,
    pub specularmap: Option<String>,
    pub shininess: f32,
}

impl WzMaterial {
    /// True if the material carries per-pixel lighting inputs.
    pub fn has_tangent_maps(&self) -> bool {
        self.normalmap.is_some() || self.specularmap.is_some()
    }
}

impl Default for WzMaterial {
    fn default() -> Self {
        Self {
            name: String::new(),
            texture: String::new(),
            texpage_size: [256, 256],
            normalmap: None,
            specularmap: None,
            shininess: 10.0,
        }
    }
}
