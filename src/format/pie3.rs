//! PIE generation 2 reader and writer
//!
//! `PIE 3` is float-valued with normalized UVs and grew optional
//! directives over gen-1: NORMALMAP/SPECULARMAP texture pages, a
//! NORMALS section with per-triangle corner normals, and per-level
//! ANIMOBJECT keyframe blocks. EVENT directives are recognized but not
//! implemented here and fail loudly rather than being dropped.

use std::collections::HashMap;

use glam::{Vec2, Vec3};

use crate::caps::Caps;
use crate::model::{AnimFrame, Connector, Mesh, MeshAnimation, TexAnim, Vertex, WzMaterial, WzModel};
use crate::{ModelError, Result, SaveWarning};

use super::pie2::{PIE_TEXANIM, PIE_TEXTURED};
use super::{parse_hex, parse_num, split_fields, FormatType, TextCursor};

fn malformed(reason: impl Into<String>) -> ModelError {
    ModelError::MalformedHeader {
        format: FormatType::Pie3,
        reason: reason.into(),
    }
}

/// Parse a `PIE 3` document.
pub fn read_pie3(text: &str) -> Result<WzModel> {
    let mut cur = TextCursor::new(text);

    let header = cur
        .next_line("header")
        .map_err(|_| malformed("empty input"))?;
    let mut toks = header.split_whitespace();
    if toks.next() != Some("PIE") {
        return Err(malformed(format!("expected 'PIE 3', got '{}'", header)));
    }
    match toks.next().and_then(|v| v.parse::<u32>().ok()) {
        Some(3) => {}
        Some(v) => return Err(malformed(format!("unsupported PIE version {}", v))),
        None => return Err(malformed("PIE header carries no version")),
    }

    let mut model = WzModel::new();

    let type_line = cur.next_line("TYPE")?;
    let mut toks = type_line.split_whitespace();
    if toks.next() != Some("TYPE") {
        return Err(malformed(format!("expected TYPE directive, got '{}'", type_line)));
    }
    model.pie_type = parse_hex(toks.next().unwrap_or(""), "TYPE")?;

    let tex_line = cur.next_line("TEXTURE")?;
    let fields = split_fields(tex_line, 3, "TEXTURE")?;
    if fields[0] != "TEXTURE" {
        return Err(malformed(format!("expected TEXTURE directive, got '{}'", tex_line)));
    }
    let mut material = WzMaterial {
        name: "default".to_string(),
        texture: fields[2].to_string(),
        ..WzMaterial::default()
    };

    // optional directives between TEXTURE and LEVELS
    loop {
        let line = match cur.peek_line() {
            Some(line) => line,
            None => {
                return Err(ModelError::Truncated {
                    section: "LEVELS",
                    detail: "unexpected end of input".to_string(),
                })
            }
        };
        let keyword = line.split_whitespace().next().unwrap_or("");
        match keyword {
            "NORMALMAP" => {
                let fields = split_fields(line, 3, "NORMALMAP")?;
                material.normalmap = Some(fields[2].to_string());
                cur.advance();
            }
            "SPECULARMAP" => {
                let fields = split_fields(line, 3, "SPECULARMAP")?;
                material.specularmap = Some(fields[2].to_string());
                cur.advance();
            }
            "EVENT" => {
                return Err(ModelError::UnsupportedFeature(
                    "PIE EVENT directive".to_string(),
                ))
            }
            _ => break,
        }
    }
    model.materials.push(material);

    let level_count = cur.expect_counted("LEVELS")?;
    for level in 0..level_count {
        let level_line = cur.next_line("LEVEL")?;
        if level_line.split_whitespace().next() != Some("LEVEL") {
            return Err(ModelError::Invalid(format!(
                "expected LEVEL directive, got '{}'",
                level_line
            )));
        }
        let mesh = read_level(&mut cur, level, &mut model.load_notes)?;
        model.meshes.push(mesh);
    }

    if model
        .meshes
        .iter()
        .flat_map(|m| &m.vertices)
        .all(|v| v.normal == Vec3::Y)
    {
        model
            .load_notes
            .push("vertex normals defaulted to +Y (no NORMALS section)".to_string());
    }

    model.caps = model.used_caps();
    model.validate()?;
    log::debug!("read PIE 3 model: {} levels", model.meshes.len());
    Ok(model)
}

fn read_level(cur: &mut TextCursor<'_>, index: usize, notes: &mut Vec<String>) -> Result<Mesh> {
    let point_count = cur.expect_counted("POINTS")?;
    // declared counts are untrusted; truncation catches liars cheaply
    let mut points = Vec::with_capacity(point_count.min(4096));
    for _ in 0..point_count {
        let fields = split_fields(cur.next_line("POINTS")?, 3, "POINTS")?;
        points.push(Vec3::new(
            parse_num(fields[0], "POINTS")?,
            parse_num(fields[1], "POINTS")?,
            parse_num(fields[2], "POINTS")?,
        ));
    }

    // optional NORMALS: one line of three corner normals per polygon
    let mut normals: Vec<[Vec3; 3]> = Vec::new();
    let mut has_normals = false;
    if cur.peek_line().map(|l| l.starts_with("NORMALS")) == Some(true) {
        has_normals = true;
        let count = cur.expect_counted("NORMALS")?;
        for _ in 0..count {
            let fields = split_fields(cur.next_line("NORMALS")?, 9, "NORMALS")?;
            let mut row = [Vec3::Y; 3];
            for (corner, n) in row.iter_mut().enumerate() {
                *n = Vec3::new(
                    parse_num(fields[corner * 3], "NORMALS")?,
                    parse_num(fields[corner * 3 + 1], "NORMALS")?,
                    parse_num(fields[corner * 3 + 2], "NORMALS")?,
                );
            }
            normals.push(row);
        }
    }

    let mut mesh = Mesh {
        name: format!("level{}", index + 1),
        ..Mesh::default()
    };

    // (point index, uv bits, normal bits) -> canonical vertex index
    type Key = (u32, [u32; 2], [u32; 3]);
    let mut seen: HashMap<Key, u32> = HashMap::new();
    let mut texanim_conflict = false;

    let polygon_count = cur.expect_counted("POLYGONS")?;
    if has_normals && normals.len() != polygon_count {
        return Err(ModelError::Invalid(format!(
            "NORMALS section has {} rows for {} polygons",
            normals.len(),
            polygon_count
        )));
    }
    for poly in 0..polygon_count {
        let line = cur.next_line("POLYGONS")?;
        let fields = split_fields(line, 2, "POLYGONS")?;
        let flags = parse_hex(fields[0], "POLYGONS")?;
        let npoints: usize = parse_num(fields[1], "POLYGONS")?;
        if npoints != 3 {
            return Err(ModelError::UnsupportedFeature(format!(
                "PIE polygon with {} points (only triangles are supported)",
                npoints
            )));
        }
        if flags & PIE_TEXTURED == 0 {
            return Err(ModelError::UnsupportedFeature(
                "untextured PIE polygon".to_string(),
            ));
        }

        let texanim = flags & PIE_TEXANIM != 0;
        let want = 2 + 3 + if texanim { 4 } else { 0 } + 6;
        let fields = split_fields(line, want, "POLYGONS")?;

        let mut at = 2;
        let mut indices = [0u32; 3];
        for slot in &mut indices {
            let idx: u32 = parse_num(fields[at], "POLYGONS")?;
            if idx as usize >= points.len() {
                return Err(ModelError::Invalid(format!(
                    "polygon references point {} but level has {}",
                    idx,
                    points.len()
                )));
            }
            *slot = idx;
            at += 1;
        }

        if texanim {
            let anim = TexAnim {
                frames: parse_num(fields[at], "POLYGONS")?,
                playback_rate: parse_num(fields[at + 1], "POLYGONS")?,
                width: parse_num(fields[at + 2], "POLYGONS")?,
                height: parse_num(fields[at + 3], "POLYGONS")?,
            };
            at += 4;
            match mesh.texture_animation {
                None => mesh.texture_animation = Some(anim),
                Some(existing) if existing != anim && !texanim_conflict => {
                    texanim_conflict = true;
                    notes.push(format!(
                        "level {}: polygons disagree on texture animation parameters, keeping the first",
                        index + 1
                    ));
                }
                Some(_) => {}
            }
        }

        let mut triangle = [0u32; 3];
        for (corner, slot) in triangle.iter_mut().enumerate() {
            let u: f32 = parse_num(fields[at + corner * 2], "POLYGONS")?;
            let v: f32 = parse_num(fields[at + corner * 2 + 1], "POLYGONS")?;
            let normal = normals
                .get(poly)
                .map(|row| row[corner])
                .unwrap_or(Vec3::Y);
            let key: Key = (
                indices[corner],
                [u.to_bits(), v.to_bits()],
                [normal.x.to_bits(), normal.y.to_bits(), normal.z.to_bits()],
            );
            let next = mesh.vertices.len() as u32;
            *slot = *seen.entry(key).or_insert_with(|| {
                mesh.vertices.push(Vertex {
                    position: points[indices[corner] as usize],
                    normal,
                    uv: Vec2::new(u, v),
                });
                next
            });
        }
        mesh.triangles.push(triangle);
    }

    if cur.peek_line().map(|l| l.starts_with("CONNECTORS")) == Some(true) {
        let count = cur.expect_counted("CONNECTORS")?;
        for _ in 0..count {
            let fields = split_fields(cur.next_line("CONNECTORS")?, 3, "CONNECTORS")?;
            mesh.connectors.push(Connector {
                position: Vec3::new(
                    parse_num(fields[0], "CONNECTORS")?,
                    parse_num(fields[1], "CONNECTORS")?,
                    parse_num(fields[2], "CONNECTORS")?,
                ),
            });
        }
    }

    if cur.peek_line().map(|l| l.starts_with("ANIMOBJECT")) == Some(true) {
        let line = cur.next_line("ANIMOBJECT")?;
        let fields = split_fields(line, 4, "ANIMOBJECT")?;
        let mut anim = MeshAnimation {
            time: parse_num(fields[1], "ANIMOBJECT")?,
            cycles: parse_num(fields[2], "ANIMOBJECT")?,
            frames: Vec::new(),
        };
        let frame_count: usize = parse_num(fields[3], "ANIMOBJECT")?;
        for _ in 0..frame_count {
            let fields = split_fields(cur.next_line("ANIMOBJECT")?, 10, "ANIMOBJECT")?;
            anim.frames.push(AnimFrame {
                frame: parse_num(fields[0], "ANIMOBJECT")?,
                position: Vec3::new(
                    parse_num(fields[1], "ANIMOBJECT")?,
                    parse_num(fields[2], "ANIMOBJECT")?,
                    parse_num(fields[3], "ANIMOBJECT")?,
                ),
                rotation: Vec3::new(
                    parse_num(fields[4], "ANIMOBJECT")?,
                    parse_num(fields[5], "ANIMOBJECT")?,
                    parse_num(fields[6], "ANIMOBJECT")?,
                ),
                scale: Vec3::new(
                    parse_num(fields[7], "ANIMOBJECT")?,
                    parse_num(fields[8], "ANIMOBJECT")?,
                    parse_num(fields[9], "ANIMOBJECT")?,
                ),
            });
        }
        mesh.animation = Some(anim);
    }

    Ok(mesh)
}

/// Serialize a document as `PIE 3` text.
pub fn write_pie3(model: &WzModel, caps: &Caps, out: &mut String) -> Result<Vec<SaveWarning>> {
    model.validate()?;
    let mut warnings = Vec::new();
    let mut lossy = |feature: &str| {
        warnings.push(SaveWarning::LossyConversion {
            feature: feature.to_string(),
        });
    };

    let material = model.materials.first().cloned().unwrap_or_default();
    if model.materials.len() > 1 {
        lossy("additional materials");
    }
    if material.shininess != WzMaterial::default().shininess {
        lossy("material shininess");
    }
    if material.texpage_size != WzMaterial::default().texpage_size {
        lossy("texture page size");
    }
    if model.meshes.iter().any(|m| m.team_colours) {
        lossy("team colours");
    }
    let suppress_tangents = material.has_tangent_maps() && !caps.tangents;
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

    out.push_str("PIE 3\n");
    out.push_str(&format!("TYPE {:x}\n", model.pie_type));
    out.push_str(&format!("TEXTURE 0 {} 0 0\n", material.texture));
    if !suppress_tangents {
        if let Some(ref map) = material.normalmap {
            out.push_str(&format!("NORMALMAP 0 {}\n", map));
        }
        if let Some(ref map) = material.specularmap {
            out.push_str(&format!("SPECULARMAP 0 {}\n", map));
        }
    }
    out.push_str(&format!("LEVELS {}\n", model.meshes.len()));

    for (mi, mesh) in model.meshes.iter().enumerate() {
        out.push_str(&format!("LEVEL {}\n", mi + 1));

        let mut points: Vec<Vec3> = Vec::new();
        let mut point_of: HashMap<[u32; 3], u32> = HashMap::new();
        let mut vertex_point = Vec::with_capacity(mesh.vertices.len());
        for vertex in &mesh.vertices {
            let key = [
                vertex.position.x.to_bits(),
                vertex.position.y.to_bits(),
                vertex.position.z.to_bits(),
            ];
            let next = points.len() as u32;
            let idx = *point_of.entry(key).or_insert_with(|| {
                points.push(vertex.position);
                next
            });
            vertex_point.push(idx);
        }

        out.push_str(&format!("POINTS {}\n", points.len()));
        for p in &points {
            out.push_str(&format!("\t{} {} {}\n", p.x, p.y, p.z));
        }

        let emit_normals = mesh.vertices.iter().any(|v| v.normal != Vec3::Y);
        if emit_normals {
            out.push_str(&format!("NORMALS {}\n", mesh.triangles.len()));
            for tri in &mesh.triangles {
                out.push('\t');
                for (corner, &v) in tri.iter().enumerate() {
                    let n = mesh.vertices[v as usize].normal;
                    if corner > 0 {
                        out.push(' ');
                    }
                    out.push_str(&format!("{} {} {}", n.x, n.y, n.z));
                }
                out.push('\n');
            }
        }

        let texanim = mesh.texture_animation.filter(|_| !suppress_texanim);
        out.push_str(&format!("POLYGONS {}\n", mesh.triangles.len()));
        for tri in &mesh.triangles {
            let flags = PIE_TEXTURED | if texanim.is_some() { PIE_TEXANIM } else { 0 };
            out.push_str(&format!("\t{:x} 3", flags));
            for &v in tri {
                out.push_str(&format!(" {}", vertex_point[v as usize]));
            }
            if let Some(ta) = texanim {
                out.push_str(&format!(
                    " {} {} {} {}",
                    ta.frames, ta.playback_rate, ta.width, ta.height
                ));
            }
            for &v in tri {
                let uv = mesh.vertices[v as usize].uv;
                out.push_str(&format!(" {} {}", uv.x, uv.y));
            }
            out.push('\n');
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
                    "ANIMOBJECT {} {} {}\n",
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
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::{PIE2_CAPS, PIE3_CAPS};

    const FIXTURE: &str = "PIE 3\n\
TYPE 200\n\
TEXTURE 0 page-17-droid-hubs.png 0 0\n\
NORMALMAP 0 page-17-droid-hubs_normal.png\n\
LEVELS 1\n\
LEVEL 1\n\
POINTS 3\n\
\t-4.5 0 -4.5\n\
\t4.5 0 -4.5\n\
\t0 7.25 0\n\
POLYGONS 1\n\
\t200 3 0 1 2 0 0 0.5 0 0.25 0.875\n\
CONNECTORS 1\n\
\t0 2.5 0\n\
ANIMOBJECT 1000 0 2\n\
\t0 0 0 0 0 0 0 1 1 1\n\
\t1 0 1.5 0 0 90 0 1 1 1\n";

    #[test]
    fn test_read_directives_and_geometry() {
        let model = read_pie3(FIXTURE).unwrap();
        assert_eq!(model.materials[0].texture, "page-17-droid-hubs.png");
        assert_eq!(
            model.materials[0].normalmap.as_deref(),
            Some("page-17-droid-hubs_normal.png")
        );
        let mesh = &model.meshes[0];
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.vertices[2].position, Vec3::new(0.0, 7.25, 0.0));
        assert_eq!(mesh.vertices[2].uv, Vec2::new(0.25, 0.875));
        let anim = mesh.animation.as_ref().unwrap();
        assert_eq!(anim.time, 1000);
        assert_eq!(anim.frames.len(), 2);
        assert_eq!(anim.frames[1].rotation, Vec3::new(0.0, 90.0, 0.0));
    }

    #[test]
    fn test_read_infers_caps() {
        let model = read_pie3(FIXTURE).unwrap();
        assert!(model.caps.tangents);
        assert!(model.caps.animation);
        assert!(model.caps.connectors);
        assert!(!model.caps.texture_animation);
    }

    #[test]
    fn test_event_directive_is_unsupported() {
        let text = "PIE 3\nTYPE 200\nTEXTURE 0 page.png 0 0\nEVENT 1 other.pie\nLEVELS 1\n";
        match read_pie3(text) {
            Err(ModelError::UnsupportedFeature(feature)) => assert!(feature.contains("EVENT")),
            other => panic!("expected unsupported feature, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_truncated_animobject_fails_cleanly() {
        let cut = FIXTURE.rsplit_once('\t').unwrap().0;
        match read_pie3(cut) {
            Err(ModelError::Truncated { section, .. }) => assert_eq!(section, "ANIMOBJECT"),
            other => panic!("expected truncation, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_normals_section_round_trips() {
        let text = "PIE 3\nTYPE 200\nTEXTURE 0 page.png 0 0\nLEVELS 1\nLEVEL 1\n\
POINTS 3\n\t0 0 0\n\t1 0 0\n\t0 0 1\n\
NORMALS 1\n\t0 0 1 0 0 1 1 0 0\n\
POLYGONS 1\n\t200 3 0 1 2 0 0 1 0 0 1\n";
        let model = read_pie3(text).unwrap();
        assert_eq!(model.meshes[0].vertices[0].normal, Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(model.meshes[0].vertices[2].normal, Vec3::new(1.0, 0.0, 0.0));
        let mut out = String::new();
        write_pie3(&model, &PIE3_CAPS, &mut out).unwrap();
        assert!(out.contains("NORMALS 1"));
        let again = read_pie3(&out).unwrap();
        assert_eq!(model.meshes, again.meshes);
    }

    #[test]
    fn test_normals_count_mismatch_is_invalid() {
        let text = "PIE 3\nTYPE 200\nTEXTURE 0 page.png 0 0\nLEVELS 1\nLEVEL 1\n\
POINTS 3\n\t0 0 0\n\t1 0 0\n\t0 0 1\n\
NORMALS 2\n\t0 0 1 0 0 1 1 0 0\n\t0 0 1 0 0 1 1 0 0\n\
POLYGONS 1\n\t200 3 0 1 2 0 0 1 0 0 1\n";
        assert!(matches!(read_pie3(text), Err(ModelError::Invalid(_))));
    }

    #[test]
    fn test_round_trip() {
        let model = read_pie3(FIXTURE).unwrap();
        let mut out = String::new();
        let warnings = write_pie3(&model, &PIE3_CAPS, &mut out).unwrap();
        assert!(warnings.is_empty());
        let again = read_pie3(&out).unwrap();
        assert_eq!(model.meshes, again.meshes);
        assert_eq!(model.materials, again.materials);
    }

    #[test]
    fn test_write_warns_on_wzm_only_fields() {
        let mut model = read_pie3(FIXTURE).unwrap();
        model.meshes[0].team_colours = true;
        model.materials[0].shininess = 24.0;
        model.materials[0].texpage_size = [512, 512];
        let mut out = String::new();
        let warnings = write_pie3(&model, &PIE3_CAPS, &mut out).unwrap();
        let features: Vec<&str> = warnings.iter().map(|w| w.feature()).collect();
        assert!(features.contains(&"team colours"));
        assert!(features.contains(&"material shininess"));
        assert!(features.contains(&"texture page size"));
        let again = read_pie3(&out).unwrap();
        assert!(!again.meshes[0].team_colours);
        assert_eq!(again.materials[0].texpage_size, WzMaterial::default().texpage_size);
    }

    #[test]
    fn test_conflicting_texanim_keeps_first_and_notes_it() {
        let text = "PIE 3\nTYPE 200\nTEXTURE 0 page.png 0 0\nLEVELS 1\nLEVEL 1\n\
POINTS 3\n\t0 0 0\n\t1 0 0\n\t0 0 1\n\
POLYGONS 2\n\
\t4200 3 0 1 2 8 1 32 32 0 0 1 0 1 1\n\
\t4200 3 0 2 1 4 1 16 16 0 0 1 1 1 0\n";
        let model = read_pie3(text).unwrap();
        assert_eq!(model.meshes[0].texture_animation.unwrap().frames, 8);
        assert!(model
            .load_notes
            .iter()
            .any(|n| n.contains("texture animation")));
    }

    #[test]
    fn test_write_with_gen1_caps_drops_and_warns() {
        let model = read_pie3(FIXTURE).unwrap();
        let mut out = String::new();
        let warnings = write_pie3(&model, &PIE2_CAPS, &mut out).unwrap();
        let features: Vec<&str> = warnings.iter().map(|w| w.feature()).collect();
        assert!(features.contains(&"tangents"));
        assert!(features.contains(&"animation"));
        let again = read_pie3(&out).unwrap();
        assert!(again.meshes[0].animation.is_none());
        assert!(again.materials[0].normalmap.is_none());
    }
}
