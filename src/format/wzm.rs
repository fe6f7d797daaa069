//! WZM reader and writer
//!
//! WZM is this tool's native container: float geometry in the canonical
//! indexed-triangle layout, a material list meshes reference by index,
//! and an explicit CAPS line naming the capability flags in force. It
//! can represent everything the document model holds, so a WZM write
//! only warns when the caller's capability set suppresses something.

use glam::{Vec2, Vec3};

use crate::caps::Caps;
use crate::model::{AnimFrame, Connector, Mesh, MeshAnimation, TexAnim, Vertex, WzMaterial, WzModel};
use crate::{ModelError, Result, SaveWarning};

use super::{parse_num, split_fields, FormatType, TextCursor};

const CAP_TOKENS: [(&str, fn(&mut Caps)); 4] = [
    ("texanim", |c| c.texture_animation = true),
    ("tangents", |c| c.tangents = true),
    ("animation", |c| c.animation = true),
    ("connectors", |c| c.connectors = true),
];

fn malformed(reason: impl Into<String>) -> ModelError {
    ModelError::MalformedHeader {
        format: FormatType::Wzm,
        reason: reason.into(),
    }
}

/// Parse a `WZM 3` document.
pub fn read_wzm(text: &str) -> Result<WzModel> {
    let mut cur = TextCursor::new(text);

    let header = cur
        .next_line("header")
        .map_err(|_| malformed("empty input"))?;
    let mut toks = header.split_whitespace();
    if toks.next() != Some("WZM") {
        return Err(malformed(format!("expected 'WZM 3', got '{}'", header)));
    }
    match toks.next().and_then(|v| v.parse::<u32>().ok()) {
        Some(3) => {}
        Some(v) => return Err(malformed(format!("unsupported WZM version {}", v))),
        None => return Err(malformed("WZM header carries no version")),
    }

    let mut model = WzModel::new();

    let caps_line = cur.next_line("CAPS")?;
    let mut toks = caps_line.split_whitespace();
    if toks.next() != Some("CAPS") {
        return Err(malformed(format!("expected CAPS directive, got '{}'", caps_line)));
    }
    for tok in toks {
        let set = CAP_TOKENS
            .iter()
            .find(|(name, _)| *name == tok)
            .map(|(_, set)| set)
            .ok_or_else(|| {
                ModelError::UnsupportedFeature(format!("WZM capability '{}'", tok))
            })?;
        set(&mut model.caps);
    }

    let material_count = cur.expect_counted("MATERIALS")?;
    for _ in 0..material_count {
        model.materials.push(read_material(&mut cur)?);
    }

    let mesh_count = cur.expect_counted("MESHES")?;
    for _ in 0..mesh_count {
        model.meshes.push(read_mesh(&mut cur)?);
    }

    model.validate()?;
    log::debug!(
        "read WZM model: {} meshes, {} materials",
        model.meshes.len(),
        model.materials.len()
    );
    Ok(model)
}

fn read_material(cur: &mut TextCursor<'_>) -> Result<WzMaterial> {
    let line = cur.next_line("MATERIAL")?;
    let fields = split_fields(line, 2, "MATERIAL")?;
    if fields[0] != "MATERIAL" {
        return Err(ModelError::Invalid(format!(
            "expected MATERIAL directive, got '{}'",
            line
        )));
    }
    let mut material = WzMaterial {
        name: fields[1].to_string(),
        ..WzMaterial::default()
    };

    let line = cur.next_line("TEXTURE")?;
    let fields = split_fields(line, 4, "TEXTURE")?;
    if fields[0] != "TEXTURE" {
        return Err(ModelError::Invalid(format!(
            "expected TEXTURE directive, got '{}'",
            line
        )));
    }
    material.texture = fields[1].to_string();
    material.texpage_size = [
        parse_num(fields[2], "TEXTURE")?,
        parse_num(fields[3], "TEXTURE")?,
    ];

    loop {
        let line = cur.next_line("SHININESS")?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields[0] {
            "NORMALMAP" if fields.len() >= 2 => material.normalmap = Some(fields[1].to_string()),
            "SPECULARMAP" if fields.len() >= 2 => {
                material.specularmap = Some(fields[1].to_string())
            }
            "SHININESS" if fields.len() >= 2 => {
                material.shininess = parse_num(fields[1], "SHININESS")?;
                return Ok(material);
            }
            _ => {
                return Err(ModelError::Invalid(format!(
                    "unexpected '{}' inside MATERIAL block",
                    line
                )))
            }
        }
    }
}

fn read_mesh(cur: &mut TextCursor<'_>) -> Result<Mesh> {
    let line = cur.next_line("MESH")?;
    let fields = split_fields(line, 2, "MESH")?;
    if fields[0] != "MESH" {
        return Err(ModelError::Invalid(format!(
            "expected MESH directive, got '{}'",
            line
        )));
    }
    let mut mesh = Mesh {
        name: fields[1].to_string(),
        ..Mesh::default()
    };

    let line = cur.next_line("MATERIAL")?;
    let fields = split_fields(line, 2, "MATERIAL")?;
    if fields[0] != "MATERIAL" {
        return Err(ModelError::Invalid(format!(
            "expected mesh MATERIAL index, got '{}'",
            line
        )));
    }
    mesh.material = parse_num(fields[1], "MATERIAL")?;

    let line = cur.next_line("TEAMCOLOURS")?;
    let fields = split_fields(line, 2, "TEAMCOLOURS")?;
    if fields[0] != "TEAMCOLOURS" {
        return Err(ModelError::Invalid(format!(
            "expected TEAMCOLOURS directive, got '{}'",
            line
        )));
    }
    mesh.team_colours = parse_num::<u32>(fields[1], "TEAMCOLOURS")? != 0;

    let vertex_count = cur.expect_counted("VERTICES")?;
    let face_count = cur.expect_counted("FACES")?;

    let line = cur.next_line("VERTEXARRAY")?;
    if line != "VERTEXARRAY" {
        return Err(ModelError::Invalid(format!(
            "expected VERTEXARRAY, got '{}'",
            line
        )));
    }
    for _ in 0..vertex_count {
        let fields = split_fields(cur.next_line("VERTEXARRAY")?, 8, "VERTEXARRAY")?;
        mesh.vertices.push(Vertex {
            position: Vec3::new(
                parse_num(fields[0], "VERTEXARRAY")?,
                parse_num(fields[1], "VERTEXARRAY")?,
                parse_num(fields[2], "VERTEXARRAY")?,
            ),
            normal: Vec3::new(
                parse_num(fields[3], "VERTEXARRAY")?,
                parse_num(fields[4], "VERTEXARRAY")?,
                parse_num(fields[5], "VERTEXARRAY")?,
            ),
            uv: Vec2::new(
                parse_num(fields[6], "VERTEXARRAY")?,
                parse_num(fields[7], "VERTEXARRAY")?,
            ),
        });
    }

    let line = cur.next_line("TRIANGLEARRAY")?;
    if line != "TRIANGLEARRAY" {
        return Err(ModelError::Invalid(format!(
            "expected TRIANGLEARRAY, got '{}'",
            line
        )));
    }
    for _ in 0..face_count {
        let fields = split_fields(cur.next_line("TRIANGLEARRAY")?, 3, "TRIANGLEARRAY")?;
        mesh.triangles.push([
            parse_num(fields[0], "TRIANGLEARRAY")?,
            parse_num(fields[1], "TRIANGLEARRAY")?,
            parse_num(fields[2], "TRIANGLEARRAY")?,
        ]);
    }

    // optional trailing blocks, any order
    while let Some(line) = cur.peek_line() {
        match line.split_whitespace().next().unwrap_or("") {
            "CONNECTORS" => {
                let count = cur.expect_counted("CONNECTORS")?;
                for _ in 0..count {
                    let fields =
                        split_fields(cur.next_line("CONNECTORS")?, 3, "CONNECTORS")?;
                    mesh.connectors.push(Connector {
                        position: Vec3::new(
                            parse_num(fields[0], "CONNECTORS")?,
                            parse_num(fields[1], "CONNECTORS")?,
                            parse_num(fields[2], "CONNECTORS")?,
                        ),
                    });
                }
            }
            "ANIMATION" => {
                let line = cur.next_line("ANIMATION")?;
                let fields = split_fields(line, 4, "ANIMATION")?;
                let mut anim = MeshAnimation {
                    time: parse_num(fields[1], "ANIMATION")?,
                    cycles: parse_num(fields[2], "ANIMATION")?,
                    frames: Vec::new(),
                };
                let frame_count: usize = parse_num(fields[3], "ANIMATION")?;
                for _ in 0..frame_count {
                    let fields = split_fields(cur.next_line("ANIMATION")?, 10, "ANIMATION")?;
                    anim.frames.push(AnimFrame {
                        frame: parse_num(fields[0], "ANIMATION")?,
                        position: Vec3::new(
                            parse_num(fields[1], "ANIMATION")?,
                            parse_num(fields[2], "ANIMATION")?,
                            parse_num(fields[3], "ANIMATION")?,
                        ),
                        rotation: Vec3::new(
                            parse_num(fields[4], "ANIMATION")?,
                            parse_num(fields[5], "ANIMATION")?,
                            parse_num(fields[6], "ANIMATION")?,
                        ),
                        scale: Vec3::new(
                            parse_num(fields[7], "ANIMATION")?,
                            parse_num(fields[8], "ANIMATION")?,
                            parse_num(fields[9], "ANIMATION")?,
                        ),
                    });
                }
                mesh.animation = Some(anim);
            }
            "TEXANIM" => {
                let line = cur.next_line("TEXANIM")?;
                let fields = split_fields(line, 5, "TEXANIM")?;
                mesh.texture_animation = Some(TexAnim {
                    frames: parse_num(fields[1], "TEXANIM")?,
                    playback_rate: parse_num(fields[2], "TEXANIM")?,
                    width: parse_num(fields[3], "TEXANIM")?,
                    height: parse_num(fields[4], "TEXANIM")?,
                });
            }
            _ => break,
        }
    }

    Ok(mesh)
}

/// Serialize a document as `WZM 3` text.
pub fn write_wzm(model: &WzModel, caps: &Caps, out: &mut String) -> Result<Vec<SaveWarning>> {
    model.validate()?;
    let mut warnings = Vec::new();
    let mut lossy = |feature: &str| {
        warnings.push(SaveWarning::LossyConversion {
            feature: feature.to_string(),
        });
    };

    let suppress_tangents =
        model.materials.iter().any(|m| m.has_tangent_maps()) && !caps.tangents;
    if suppress_tangents {
        lossy("tangents");
    }
    let suppress_animation =
        model.meshes.iter().any(|m| m.animation.is_some()) && !caps.animation;
    if suppress_animation {
        lossy("animation");
    }
    let suppress_texanim = model.meshes.iter().any(|m| m.texture_animation.is_some())
        && !caps.texture_animation;
    if suppress_texanim {
        lossy("texture animation");
    }
    let suppress_connectors =
        model.meshes.iter().any(|m| !m.connectors.is_empty()) && !caps.connectors;
    if suppress_connectors {
        lossy("connectors");
    }

    out.push_str("WZM 3\n");
    out.push_str("CAPS");
    if caps.texture_animation {
        out.push_str(" texanim");
    }
    if caps.tangents {
        out.push_str(" tangents");
    }
    if caps.animation {
        out.push_str(" animation");
    }
    if caps.connectors {
        out.push_str(" connectors");
    }
    out.push('\n');

    out.push_str(&format!("MATERIALS {}\n", model.materials.len()));
    for material in &model.materials {
        let name = if material.name.is_empty() {
            "default"
        } else {
            material.name.as_str()
        };
        out.push_str(&format!("MATERIAL {}\n", name));
        out.push_str(&format!(
            "TEXTURE {} {} {}\n",
            material.texture, material.texpage_size[0], material.texpage_size[1]
        ));
        if !suppress_tangents {
            if let Some(ref map) = material.normalmap {
                out.push_str(&format!("NORMALMAP {}\n", map));
            }
            if let Some(ref map) = material.specularmap {
                out.push_str(&format!("SPECULARMAP {}\n", map));
            }
        }
        out.push_str(&format!("SHININESS {}\n", material.shininess));
    }

    out.push_str(&format!("MESHES {}\n", model.meshes.len()));
    for mesh in &model.meshes {
        let name = if mesh.name.is_empty() {
            "mesh"
        } else {
            mesh.name.as_str()
        };
        out.push_str(&format!("MESH {}\n", name));
        out.push_str(&format!("MATERIAL {}\n", mesh.material));
        out.push_str(&format!("TEAMCOLOURS {}\n", mesh.team_colours as u32));
        out.push_str(&format!("VERTICES {}\n", mesh.vertices.len()));
        out.push_str(&format!("FACES {}\n", mesh.triangles.len()));
        out.push_str("VERTEXARRAY\n");
        for v in &mesh.vertices {
            out.push_str(&format!(
                "\t{} {} {} {} {} {} {} {}\n",
                v.position.x,
                v.position.y,
                v.position.z,
                v.normal.x,
                v.normal.y,
                v.normal.z,
                v.uv.x,
                v.uv.y
            ));
        }
        out.push_str("TRIANGLEARRAY\n");
        for t in &mesh.triangles {
            out.push_str(&format!("\t{} {} {}\n", t[0], t[1], t[2]));
        }

        if !mesh.connectors.is_empty() && !suppress_connectors {
            out.push_str(&format!("CONNECTORS {}\n", mesh.connectors.len()));
            for c in &mesh.connectors {
                out.push_str(&format!(
                    "\t{} {} {}\n",
                    c.position.x, c.position.y, c.position.z
                ));
            }
        }
        if !suppress_animation {
            if let Some(ref anim) = mesh.animation {
                out.push_str(&format!(
                    "ANIMATION {} {} {}\n",
                    anim.time,
                    anim.cycles,
                    anim.frames.len()
                ));
                for f in &anim.frames {
                    out.push_str(&format!(
                        "\t{} {} {} {} {} {} {} {} {} {}\n",
                        f.frame,
                        f.position.x,
                        f.position.y,
                        f.position.z,
                        f.rotation.x,
                        f.rotation.y,
                        f.rotation.z,
                        f.scale.x,
                        f.scale.y,
                        f.scale.z
                    ));
                }
            }
        }
        if !suppress_texanim {
            if let Some(ta) = mesh.texture_animation {
                out.push_str(&format!(
                    "TEXANIM {} {} {} {}\n",
                    ta.frames, ta.playback_rate, ta.width, ta.height
                ));
            }
        }
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::PIE3_CAPS;

    const FIXTURE: &str = "WZM 3\n\
CAPS tangents animation connectors\n\
MATERIALS 2\n\
MATERIAL hull\n\
TEXTURE page-12.png 256 256\n\
NORMALMAP page-12_normal.png\n\
SHININESS 24\n\
MATERIAL turret\n\
TEXTURE page-13.png 512 512\n\
SHININESS 10\n\
MESHES 2\n\
MESH hull\n\
MATERIAL 0\n\
TEAMCOLOURS 1\n\
VERTICES 3\n\
FACES 1\n\
VERTEXARRAY\n\
\t0 0 0 0 1 0 0 0\n\
\t1 0 0 0 1 0 1 0\n\
\t0 0 1 0 1 0 0 1\n\
TRIANGLEARRAY\n\
\t0 1 2\n\
CONNECTORS 1\n\
\t0 0.5 0\n\
MESH turret\n\
MATERIAL 1\n\
TEAMCOLOURS 0\n\
VERTICES 3\n\
FACES 1\n\
VERTEXARRAY\n\
\t0 1 0 0 1 0 0 0\n\
\t1 1 0 0 1 0 1 0\n\
\t0 1 1 0 1 0 0 1\n\
TRIANGLEARRAY\n\
\t0 1 2\n\
ANIMATION 800 0 1\n\
\t0 0 0 0 0 45 0 1 1 1\n";

    #[test]
    fn test_read_takes_caps_from_file() {
        let model = read_wzm(FIXTURE).unwrap();
        assert!(model.caps.tangents);
        assert!(model.caps.animation);
        assert!(model.caps.connectors);
        assert!(!model.caps.texture_animation);
    }

    #[test]
    fn test_read_materials_and_meshes() {
        let model = read_wzm(FIXTURE).unwrap();
        assert_eq!(model.materials.len(), 2);
        assert_eq!(model.materials[1].texpage_size, [512, 512]);
        assert_eq!(model.meshes.len(), 2);
        assert!(model.meshes[0].team_colours);
        assert_eq!(model.meshes[1].material, 1);
        assert!(model.meshes[1].animation.is_some());
    }

    #[test]
    fn test_unknown_cap_token_is_unsupported() {
        let text = "WZM 3\nCAPS pbr\nMATERIALS 0\nMESHES 0\n";
        match read_wzm(text) {
            Err(ModelError::UnsupportedFeature(feature)) => assert!(feature.contains("pbr")),
            other => panic!("expected unsupported feature, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_caps_understating_content_is_invalid() {
        // file claims no animation capability but carries an ANIMATION block
        let text = FIXTURE.replace("CAPS tangents animation connectors", "CAPS tangents connectors");
        assert!(matches!(read_wzm(&text), Err(ModelError::Invalid(_))));
    }

    #[test]
    fn test_truncated_vertexarray_fails_cleanly() {
        let text = "WZM 3\nCAPS\nMATERIALS 1\nMATERIAL a\nTEXTURE p.png 256 256\nSHININESS 10\n\
MESHES 1\nMESH a\nMATERIAL 0\nTEAMCOLOURS 0\nVERTICES 3\nFACES 1\nVERTEXARRAY\n\t0 0 0 0 1 0 0 0\n";
        match read_wzm(text) {
            Err(ModelError::Truncated { section, .. }) => assert_eq!(section, "VERTEXARRAY"),
            other => panic!("expected truncation, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_round_trip() {
        let model = read_wzm(FIXTURE).unwrap();
        let mut out = String::new();
        let warnings = write_wzm(&model, &model.caps, &mut out).unwrap();
        assert!(warnings.is_empty());
        let again = read_wzm(&out).unwrap();
        assert_eq!(model.meshes, again.meshes);
        assert_eq!(model.materials, again.materials);
        assert_eq!(model.caps, again.caps);
    }

    #[test]
    fn test_write_suppressing_caps_warns_and_drops() {
        let model = read_wzm(FIXTURE).unwrap();
        let caps = Caps {
            animation: false,
            ..PIE3_CAPS
        };
        let mut out = String::new();
        let warnings = write_wzm(&model, &caps, &mut out).unwrap();
        assert_eq!(
            warnings,
            vec![SaveWarning::LossyConversion {
                feature: "animation".to_string()
            }]
        );
        let again = read_wzm(&out).unwrap();
        assert!(again.meshes.iter().all(|m| m.animation.is_none()));
    }
}
