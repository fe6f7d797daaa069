//! PIE generation 1 reader and writer
//!
//! `PIE 2` files are integer-valued: point coordinates are plain ints
//! and texture coordinates are pixel offsets into the texture page, so
//! the page size from the TEXTURE directive is needed to normalize
//! them. Polygons carry per-corner UVs; reading splits shared points
//! into canonical per-vertex records keyed by (point, uv).

use std::collections::HashMap;

use glam::{Vec2, Vec3};

use crate::caps::Caps;
use crate::model::{Connector, Mesh, TexAnim, Vertex, WzMaterial, WzModel};
use crate::{ModelError, Result, SaveWarning};

use super::{parse_hex, parse_num, split_fields, FormatType, TextCursor};

/// Polygon is textured. The only polygon kind this tool emits.
pub(crate) const PIE_TEXTURED: u32 = 0x200;
/// Polygon carries texture animation fields before its UV list.
pub(crate) const PIE_TEXANIM: u32 = 0x4000;

fn malformed(reason: impl Into<String>) -> ModelError {
    ModelError::MalformedHeader {
        format: FormatType::Pie2,
        reason: reason.into(),
    }
}

/// Parse a `PIE 2` document.
pub fn read_pie2(text: &str) -> Result<WzModel> {
    let mut cur = TextCursor::new(text);

    let header = cur
        .next_line("header")
        .map_err(|_| malformed("empty input"))?;
    let mut toks = header.split_whitespace();
    if toks.next() != Some("PIE") {
        return Err(malformed(format!("expected 'PIE 2', got '{}'", header)));
    }
    match toks.next().and_then(|v| v.parse::<u32>().ok()) {
        Some(2) => {}
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
    let fields = split_fields(tex_line, 5, "TEXTURE")?;
    if fields[0] != "TEXTURE" {
        return Err(malformed(format!("expected TEXTURE directive, got '{}'", tex_line)));
    }
    let material = WzMaterial {
        name: "default".to_string(),
        texture: fields[2].to_string(),
        texpage_size: [
            parse_num(fields[3], "TEXTURE")?,
            parse_num(fields[4], "TEXTURE")?,
        ],
        ..WzMaterial::default()
    };
    if material.texpage_size[0] == 0 || material.texpage_size[1] == 0 {
        return Err(malformed("TEXTURE directive has zero page size"));
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
        let page = model.materials[0].texpage_size;
        let mesh = read_level(&mut cur, level, page, &mut model.load_notes)?;
        model.meshes.push(mesh);
    }

    model.caps = model.used_caps();
    model
        .load_notes
        .push("vertex normals defaulted to +Y (PIE 2 carries none)".to_string());
    model
        .load_notes
        .push("material shininess defaulted (PIE 2 carries none)".to_string());

    model.validate()?;
    log::debug!(
        "read PIE 2 model: {} levels, texture page '{}'",
        model.meshes.len(),
        model.materials[0].texture
    );
    Ok(model)
}

fn read_level(
    cur: &mut TextCursor<'_>,
    index: usize,
    page: [u32; 2],
    notes: &mut Vec<String>,
) -> Result<Mesh> {
    let point_count = cur.expect_counted("POINTS")?;
    // declared counts are untrusted; truncation catches liars cheaply
    let mut points = Vec::with_capacity(point_count.min(4096));
    for _ in 0..point_count {
        let fields = split_fields(cur.next_line("POINTS")?, 3, "POINTS")?;
        points.push(Vec3::new(
            parse_num::<i32>(fields[0], "POINTS")? as f32,
            parse_num::<i32>(fields[1], "POINTS")? as f32,
            parse_num::<i32>(fields[2], "POINTS")? as f32,
        ));
    }

    let mut mesh = Mesh {
        name: format!("level{}", index + 1),
        ..Mesh::default()
    };

    // (point index, pixel uv) -> canonical vertex index
    let mut seen: HashMap<(u32, [i64; 2]), u32> = HashMap::new();
    let mut texanim_conflict = false;

    let polygon_count = cur.expect_counted("POLYGONS")?;
    for _ in 0..polygon_count {
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
            let u_px: i64 = parse_num(fields[at + corner * 2], "POLYGONS")?;
            let v_px: i64 = parse_num(fields[at + corner * 2 + 1], "POLYGONS")?;
            let key = (indices[corner], [u_px, v_px]);
            let next = mesh.vertices.len() as u32;
            *slot = *seen.entry(key).or_insert_with(|| {
                mesh.vertices.push(Vertex {
                    position: points[indices[corner] as usize],
                    normal: Vec3::Y,
                    uv: Vec2::new(
                        u_px as f32 / page[0] as f32,
                        v_px as f32 / page[1] as f32,
                    ),
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
                    parse_num::<i32>(fields[0], "CONNECTORS")? as f32,
                    parse_num::<i32>(fields[1], "CONNECTORS")? as f32,
                    parse_num::<i32>(fields[2], "CONNECTORS")? as f32,
                ),
            });
        }
    }

    Ok(mesh)
}

/// Serialize a document as `PIE 2` text.
///
/// Gen-1 cannot carry tangent maps, keyframe animation, extra
/// materials or non-default normals; each dropped feature is reported
/// as a `LossyConversion` warning and the write still succeeds.
pub fn write_pie2(model: &WzModel, caps: &Caps, out: &mut String) -> Result<Vec<SaveWarning>> {
    model.validate()?;
    let mut warnings = Vec::new();
    let mut lossy = |feature: &str| {
        warnings.push(SaveWarning::LossyConversion {
            feature: feature.to_string(),
        });
    };

    let material = model.materials.first().cloned().unwrap_or_default();
    let page = material.texpage_size;
    if model.materials.len() > 1 {
        lossy("additional materials");
    }
    if material.has_tangent_maps() {
        lossy("tangents");
    }
    if material.shininess != WzMaterial::default().shininess {
        lossy("material shininess");
    }
    if model.meshes.iter().any(|m| m.team_colours) {
        lossy("team colours");
    }
    if model.meshes.iter().any(|m| m.animation.is_some()) {
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
    if model
        .meshes
        .iter()
        .flat_map(|m| &m.vertices)
        .any(|v| v.normal != Vec3::Y)
    {
        lossy("vertex normals");
    }
    // gen-1 stores ints and pixel UVs; anything finer gets rounded
    let non_integral = model.meshes.iter().any(|m| {
        m.vertices.iter().any(|v| {
            v.position.x.fract() != 0.0
                || v.position.y.fract() != 0.0
                || v.position.z.fract() != 0.0
                || (v.uv.x * page[0] as f32).fract() != 0.0
                || (v.uv.y * page[1] as f32).fract() != 0.0
        }) || m.connectors.iter().any(|c| {
            c.position.x.fract() != 0.0
                || c.position.y.fract() != 0.0
                || c.position.z.fract() != 0.0
        })
    });
    if non_integral {
        lossy("non-integer geometry");
    }

    out.push_str("PIE 2\n");
    out.push_str(&format!("TYPE {:x}\n", model.pie_type));
    out.push_str(&format!(
        "TEXTURE 0 {} {} {}\n",
        material.texture, page[0], page[1]
    ));
    out.push_str(&format!("LEVELS {}\n", model.meshes.len()));

    for (mi, mesh) in model.meshes.iter().enumerate() {
        out.push_str(&format!("LEVEL {}\n", mi + 1));

        // re-share positions that canonical per-(point, uv) vertices split
        let mut points: Vec<[i32; 3]> = Vec::new();
        let mut point_of: HashMap<[i32; 3], u32> = HashMap::new();
        let mut vertex_point = Vec::with_capacity(mesh.vertices.len());
        for vertex in &mesh.vertices {
            let key = [
                vertex.position.x.round() as i32,
                vertex.position.y.round() as i32,
                vertex.position.z.round() as i32,
            ];
            let next = points.len() as u32;
            let idx = *point_of.entry(key).or_insert_with(|| {
                points.push(key);
                next
            });
            vertex_point.push(idx);
        }

        out.push_str(&format!("POINTS {}\n", points.len()));
        for p in &points {
            out.push_str(&format!("\t{} {} {}\n", p[0], p[1], p[2]));
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
                out.push_str(&format!(
                    " {} {}",
                    (uv.x * page[0] as f32).round() as i64,
                    (uv.y * page[1] as f32).round() as i64
                ));
            }
            out.push('\n');
        }

        if !mesh.connectors.is_empty() && !suppress_connectors {
            out.push_str(&format!("CONNECTORS {}\n", mesh.connectors.len()));
            for c in &mesh.connectors {
                out.push_str(&format!(
                    "\t{} {} {}\n",
                    c.position.x.round() as i32,
                    c.position.y.round() as i32,
                    c.position.z.round() as i32
                ));
            }
        }
    }

    Ok(warnings)
}
