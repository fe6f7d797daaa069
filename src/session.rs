//! Single-document load/save session
//!
//! Owns the open → edit → save lifecycle for one model at a time and
//! the policy the GUI layer must not: format resolution, capability
//! defaulting, save-to-self semantics and atomic file replacement.
//! Loading and saving are synchronous; a failed open leaves whatever
//! was loaded before completely untouched.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::caps::Caps;
use crate::format::{
    detect_format, read_pie2, read_pie3, read_wzm, sniff_pie_version, write_pie2, write_pie3,
    write_wzm, FormatType,
};
use crate::model::WzModel;
use crate::{ModelError, Result, SaveWarning};

/// Provenance metadata for the loaded document.
///
/// `read_type` is the format the document was loaded from and never
/// changes after open. `save_type` starts equal to it and only diverges
/// when the user explicitly picks another export format.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelInfo {
    pub caps: Caps,
    pub save_type: FormatType,
    pub read_type: FormatType,
    pub current_file: PathBuf,
    pub save_as_file: PathBuf,
}

impl Default for ModelInfo {
    fn default() -> Self {
        Self {
            caps: Caps::new(),
            save_type: FormatType::Wzm,
            read_type: FormatType::Wzm,
            current_file: PathBuf::new(),
            save_as_file: PathBuf::new(),
        }
    }
}

impl ModelInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset every field to its default.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Replace the inferred capability set with the documented default
    /// for the chosen save format when the read format does not carry
    /// explicit capability flags (only WZM does).
    ///
    /// Prevents round-trips between generations from silently saving
    /// under a downgraded capability set.
    pub fn default_caps_if_needed(&mut self) {
        if self.read_type != FormatType::Wzm {
            self.caps = Caps::for_format(self.save_type);
        }
    }

    /// Use the original format and filename if we never went through a
    /// save-as before: a plain save must not reformat a file the user
    /// never asked to convert.
    pub fn prepare_for_save_to_self(&mut self) {
        if !self.save_as_file.as_os_str().is_empty() {
            return;
        }
        self.save_type = self.read_type;
        self.save_as_file = self.current_file.clone();
    }
}

/// One-document orchestrator: Empty until a successful `open`, Loaded
/// until `close`.
#[derive(Debug, Default)]
pub struct ModelSession {
    model: Option<WzModel>,
    info: ModelInfo,
}

impl ModelSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Option<&WzModel> {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut WzModel> {
        self.model.as_mut()
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn caps(&self) -> Caps {
        self.info.caps
    }

    /// Adjust the capability set used for subsequent saves. The UI
    /// exposes this so the user can opt features in or out of an export.
    pub fn set_caps(&mut self, caps: Caps) {
        self.info.caps = caps;
    }

    /// Load a model, replacing the current document on success only.
    ///
    /// `explicit` wins over filename detection. A detected `.pie` is
    /// only a candidate: the actual generation is taken from the file's
    /// own `PIE <n>` header line.
    pub fn open<P: AsRef<Path>>(&mut self, path: P, explicit: Option<FormatType>) -> Result<()> {
        let path = path.as_ref();
        let detected = match explicit.or_else(|| detect_format(path)) {
            Some(format) => format,
            None => return Err(ModelError::UnknownFormat(path.display().to_string())),
        };

        let text = fs::read_to_string(path)?;
        let format = if explicit.is_none()
            && matches!(detected, FormatType::Pie2 | FormatType::Pie3)
        {
            match sniff_pie_version(&text) {
                Some(2) => FormatType::Pie2,
                // version 3, or not a PIE header at all: the gen-2
                // reader produces the precise MalformedHeader
                _ => FormatType::Pie3,
            }
        } else {
            detected
        };

        let model = match format {
            FormatType::Pie2 => read_pie2(&text),
            FormatType::Pie3 => read_pie3(&text),
            FormatType::Wzm => read_wzm(&text),
        }?;

        self.info.clear();
        self.info.read_type = format;
        self.info.save_type = format;
        self.info.current_file = path.to_path_buf();
        self.info.caps = model.caps;
        self.info.default_caps_if_needed();
        self.model = Some(model);
        log::info!("opened '{}' as {}", path.display(), format);
        Ok(())
    }

    /// Save to self: original format and filename unless a save-as
    /// already diverged them.
    ///
    /// Metadata is staged and committed only once the write succeeded,
    /// so a failed save leaves the session exactly as it was.
    pub fn save(&mut self) -> Result<Vec<SaveWarning>> {
        if self.model.is_none() {
            return Err(ModelError::Invalid("no model loaded".to_string()));
        }
        let mut staged = self.info.clone();
        staged.prepare_for_save_to_self();
        let path = staged.save_as_file.clone();
        let warnings = self.write_to(&path, staged.save_type)?;
        self.info = staged;
        Ok(warnings)
    }

    /// Export under a chosen path and format. Leaves `read_type` alone;
    /// `save_type`/`save_as_file` only diverge if the write succeeds.
    pub fn save_as<P: AsRef<Path>>(
        &mut self,
        path: P,
        format: FormatType,
    ) -> Result<Vec<SaveWarning>> {
        if self.model.is_none() {
            return Err(ModelError::Invalid("no model loaded".to_string()));
        }
        let mut staged = self.info.clone();
        staged.save_type = format;
        staged.save_as_file = path.as_ref().to_path_buf();
        let warnings = self.write_to(path.as_ref(), format)?;
        self.info = staged;
        Ok(warnings)
    }

    /// Discard the document and reset metadata. Always succeeds.
    pub fn close(&mut self) {
        self.model = None;
        self.info.clear();
    }

    fn write_to(&self, path: &Path, format: FormatType) -> Result<Vec<SaveWarning>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| ModelError::Invalid("no model loaded".to_string()))?;

        // serialize fully in memory before the destination is touched
        let mut text = String::new();
        let warnings = match format {
            FormatType::Pie2 => write_pie2(model, &self.info.caps, &mut text),
            FormatType::Pie3 => write_pie3(model, &self.info.caps, &mut text),
            FormatType::Wzm => write_wzm(model, &self.info.caps, &mut text),
        }?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(text.as_bytes())
            .map_err(|e| ModelError::WriteAborted(format!("writing temporary file: {}", e)))?;
        tmp.flush()
            .map_err(|e| ModelError::WriteAborted(format!("flushing temporary file: {}", e)))?;
        tmp.persist(path).map_err(|e| {
            ModelError::WriteAborted(format!("replacing '{}': {}", path.display(), e.error))
        })?;

        for warning in &warnings {
            log::warn!(
                "lossy conversion to {}: dropped {}",
                format,
                warning.feature()
            );
        }
        log::info!("saved '{}' as {}", path.display(), format);
        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::{PIE2_CAPS, PIE3_CAPS};
    use tempfile::TempDir;

    const PIE2_FILE: &str = "PIE 2\nTYPE 200\nTEXTURE 0 page-7.png 256 256\nLEVELS 1\nLEVEL 1\n\
POINTS 3\n\t0 0 0\n\t32 0 0\n\t0 0 32\n\
POLYGONS 1\n\t200 3 0 1 2 0 0 128 0 0 128\n";

    const WZM_ANIM_FILE: &str = "WZM 3\nCAPS animation\nMATERIALS 1\nMATERIAL a\n\
TEXTURE page.png 256 256\nSHININESS 10\nMESHES 1\nMESH a\nMATERIAL 0\nTEAMCOLOURS 0\n\
VERTICES 3\nFACES 1\nVERTEXARRAY\n\t0 0 0 0 1 0 0 0\n\t1 0 0 0 1 0 1 0\n\t0 0 1 0 1 0 0 1\n\
TRIANGLEARRAY\n\t0 1 2\nANIMATION 500 0 1\n\t0 0 0 0 0 0 0 1 1 1\n";

    fn fixture(dir: &TempDir, name: &str, text: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_open_resolves_pie_generation_from_header() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "body.pie", PIE2_FILE);
        let mut session = ModelSession::new();
        session.open(&path, None).unwrap();
        assert_eq!(session.info().read_type, FormatType::Pie2);
        assert_eq!(session.info().save_type, FormatType::Pie2);
        assert_eq!(session.info().current_file, path);
        assert!(session.info().save_as_file.as_os_str().is_empty());
    }

    #[test]
    fn test_open_gen1_defaults_caps_to_generation_set() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "body.pie", PIE2_FILE);
        let mut session = ModelSession::new();
        session.open(&path, None).unwrap();
        // the file itself uses almost nothing, but the session carries
        // the documented generation default rather than the inferred set
        assert_eq!(session.caps(), PIE2_CAPS);
    }

    #[test]
    fn test_open_wzm_keeps_explicit_caps() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "body.wzm", WZM_ANIM_FILE);
        let mut session = ModelSession::new();
        session.open(&path, None).unwrap();
        let caps = session.caps();
        assert!(caps.animation);
        assert!(!caps.tangents);
    }

    #[test]
    fn test_open_unknown_extension_stays_empty() {
        let mut session = ModelSession::new();
        let err = session.open("model.obj", None).unwrap_err();
        assert!(matches!(err, ModelError::UnknownFormat(_)));
        assert!(!session.is_loaded());
    }

    #[test]
    fn test_failed_open_keeps_previous_document() {
        let dir = TempDir::new().unwrap();
        let good = fixture(&dir, "good.pie", PIE2_FILE);
        let bad = fixture(&dir, "bad.pie", "PIE 2\nTYPE 200\n");
        let mut session = ModelSession::new();
        session.open(&good, None).unwrap();
        assert!(session.open(&bad, None).is_err());
        assert!(session.is_loaded());
        assert_eq!(session.info().current_file, good);
    }

    #[test]
    fn test_save_to_self_uses_read_type_and_path() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "body.pie", PIE2_FILE);
        let mut session = ModelSession::new();
        session.open(&path, None).unwrap();
        let warnings = session.save().unwrap();
        assert!(warnings.is_empty());
        assert_eq!(session.info().save_type, FormatType::Pie2);
        assert_eq!(session.info().save_as_file, path);
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("PIE 2"));
    }

    #[test]
    fn test_save_as_diverges_without_touching_read_type() {
        let dir = TempDir::new().unwrap();
        let src = fixture(&dir, "body.pie", PIE2_FILE);
        let dst = dir.path().join("body.wzm");
        let mut session = ModelSession::new();
        session.open(&src, None).unwrap();
        session.save_as(&dst, FormatType::Wzm).unwrap();
        assert_eq!(session.info().read_type, FormatType::Pie2);
        assert_eq!(session.info().save_type, FormatType::Wzm);
        // a later plain save now goes to the diverged target
        session.save().unwrap();
        assert_eq!(session.info().save_as_file, dst);
        assert!(fs::read_to_string(&src).unwrap().starts_with("PIE 2"));
    }

    #[test]
    fn test_conversion_to_gen1_reports_loss_and_output_has_none() {
        let dir = TempDir::new().unwrap();
        let src = fixture(&dir, "anim.wzm", WZM_ANIM_FILE);
        let dst = dir.path().join("anim.pie");
        let mut session = ModelSession::new();
        session.open(&src, None).unwrap();
        let warnings = session.save_as(&dst, FormatType::Pie2).unwrap();
        assert!(warnings.iter().any(|w| w.feature() == "animation"));
        let mut reopened = ModelSession::new();
        reopened.open(&dst, None).unwrap();
        assert_eq!(reopened.info().read_type, FormatType::Pie2);
        assert!(reopened.model().unwrap().meshes[0].animation.is_none());
    }

    #[test]
    fn test_failed_save_leaves_destination_untouched() {
        let dir = TempDir::new().unwrap();
        let src = fixture(&dir, "body.pie", PIE2_FILE);
        let dst = fixture(&dir, "out.pie", "ORIGINAL CONTENT");
        let mut session = ModelSession::new();
        session.open(&src, None).unwrap();
        // corrupt the document so serialization fails before any I/O
        session.model_mut().unwrap().meshes[0].triangles.push([0, 1, 99]);
        assert!(session.save_as(&dst, FormatType::Pie2).is_err());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "ORIGINAL CONTENT");
    }

    #[test]
    fn test_save_into_missing_directory_fails_without_output() {
        let dir = TempDir::new().unwrap();
        let src = fixture(&dir, "body.pie", PIE2_FILE);
        let dst = dir.path().join("nosuchdir").join("out.pie");
        let mut session = ModelSession::new();
        session.open(&src, None).unwrap();
        assert!(session.save_as(&dst, FormatType::Pie2).is_err());
        assert!(!dst.exists());
    }

    #[test]
    fn test_failed_save_as_leaves_metadata_undiverged() {
        let dir = TempDir::new().unwrap();
        let src = fixture(&dir, "body.pie", PIE2_FILE);
        let dst = dir.path().join("nosuchdir").join("out.wzm");
        let mut session = ModelSession::new();
        session.open(&src, None).unwrap();
        assert!(session.save_as(&dst, FormatType::Wzm).is_err());
        // the failed export must not retarget later saves
        assert_eq!(session.info().save_type, FormatType::Pie2);
        assert!(session.info().save_as_file.as_os_str().is_empty());
        session.save().unwrap();
        assert_eq!(session.info().save_as_file, src);
        assert!(fs::read_to_string(&src).unwrap().starts_with("PIE 2"));
    }

    #[test]
    fn test_close_resets_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "body.pie", PIE2_FILE);
        let mut session = ModelSession::new();
        session.open(&path, None).unwrap();
        session.close();
        assert!(!session.is_loaded());
        assert_eq!(*session.info(), ModelInfo::default());
    }

    #[test]
    fn test_metadata_transitions_directly() {
        let mut info = ModelInfo::new();
        info.read_type = FormatType::Pie3;
        info.save_type = FormatType::Pie3;
        info.default_caps_if_needed();
        assert_eq!(info.caps, PIE3_CAPS);

        // WZM reads keep their explicit caps
        let mut info = ModelInfo::new();
        info.read_type = FormatType::Wzm;
        info.caps = PIE2_CAPS;
        info.default_caps_if_needed();
        assert_eq!(info.caps, PIE2_CAPS);

        // prepare-for-save-to-self is a no-op once diverged
        let mut info = ModelInfo::new();
        info.read_type = FormatType::Pie2;
        info.save_type = FormatType::Wzm;
        info.current_file = PathBuf::from("a.pie");
        info.save_as_file = PathBuf::from("b.wzm");
        info.prepare_for_save_to_self();
        assert_eq!(info.save_type, FormatType::Wzm);
        assert_eq!(info.save_as_file, PathBuf::from("b.wzm"));

        // and adopts the original path/format when not
        info.save_as_file = PathBuf::new();
        info.prepare_for_save_to_self();
        assert_eq!(info.save_type, FormatType::Pie2);
        assert_eq!(info.save_as_file, PathBuf::from("a.pie"));
    }
}
