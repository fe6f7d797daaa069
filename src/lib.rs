//! wzmodel - load/save core for Warzone 2100 model formats
//!
//! Provides the format pipeline behind a model viewer/converter:
//! - PIE generation 1 and 2 (legacy text formats) reading and writing
//! - WZM reading and writing
//! - filename-based format detection with header-based PIE version sniffing
//! - capability flag tracking and reconciliation between generations
//! - a single-document session that owns open/save/save-as/close policy

pub mod caps;
pub mod format;
pub mod model;
pub mod session;

pub use caps::{Caps, PIE2_CAPS, PIE3_CAPS};
pub use format::{detect_format, FormatType};
pub use model::{Mesh, MeshAnimation, WzMaterial, WzModel};
pub use session::{ModelInfo, ModelSession};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown model format for '{0}'")]
    UnknownFormat(String),

    #[error("malformed {format} header: {reason}")]
    MalformedHeader { format: FormatType, reason: String },

    #[error("truncated {section} section: {detail}")]
    Truncated {
        section: &'static str,
        detail: String,
    },

    #[error("unsupported feature '{0}'")]
    UnsupportedFeature(String),

    #[error("invalid model data: {0}")]
    Invalid(String),

    #[error("write aborted, destination untouched: {0}")]
    WriteAborted(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

/// Non-fatal condition reported alongside a successful save.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveWarning {
    /// The target format cannot represent this feature; it was omitted
    /// from the output.
    LossyConversion { feature: String },
}

impl SaveWarning {
    pub fn feature(&self) -> &str {
        match self {
            SaveWarning::LossyConversion { feature } => feature,
        }
    }
}
