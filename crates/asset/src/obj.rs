//! Legacy text mesh parser (OBJ-like `.obj`).
//!
//! Parsing runs in three passes over the same reader:
//! 1. count positions, normals, texcoords and faces (no allocation),
//! 2. allocate scratch and output arrays sized exactly to those counts,
//! 3. rewind and fill them.
//!
//! Every face contributes three fresh vertex records; vertices are never
//! shared between faces, so `vertex_count == index_count == 3 * faces`.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, Seek, SeekFrom},
    path::Path,
};

use crate::{
    error::{AssetError, AssetResult},
    mesh::{Aabb, DEFAULT_NORMAL, DEFAULT_UV, Geometry, MeshData, MeshVertex},
};

/// `usemtl` names longer than this are truncated.
pub const MAX_MATERIAL_NAME: usize = 63;

/// Load a text mesh from a file path.
pub fn load_obj_from_path(path: impl AsRef<Path>) -> AssetResult<Geometry> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| AssetError::io(path, e))?;
    parse_obj(BufReader::new(file), path)
}

/// Convenience helper to parse a mesh string literal.
pub fn load_obj_from_str(contents: &str) -> AssetResult<Geometry> {
    parse_obj(io::Cursor::new(contents), Path::new("<string>"))
}

/// Result of the counting pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct ElementCounts {
    positions: usize,
    normals: usize,
    texcoords: usize,
    faces: usize,
    /// Name from the last `usemtl` line, bounded to `MAX_MATERIAL_NAME`.
    material_name: Option<String>,
}

/// Corner reference styles accepted on `f` lines, most specific first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CornerStyle {
    /// `v/vt/vn`
    Full,
    /// `v/vt`
    PosTex,
    /// `v`
    Pos,
}

#[derive(Clone, Copy, Debug)]
struct Corner {
    position: i64,
    texcoord: Option<i64>,
    normal: Option<i64>,
    style: CornerStyle,
}

fn parse_obj<R: BufRead + Seek>(mut reader: R, origin: &Path) -> AssetResult<Geometry> {
    log::debug!("Parsing text mesh {}", origin.display());

    // Pass 1: count.
    let counts = count_elements(&mut reader, origin)?;
    log::debug!(
        "Pass 1: {} positions, {} normals, {} texcoords, {} faces",
        counts.positions,
        counts.normals,
        counts.texcoords,
        counts.faces
    );

    if counts.positions == 0 || counts.faces == 0 {
        return Err(AssetError::ZeroGeometry {
            positions: counts.positions,
            faces: counts.faces,
        });
    }

    // Pass 2: allocate exactly.
    let record_count = counts
        .faces
        .checked_mul(3)
        .filter(|&n| u32::try_from(n).is_ok())
        .ok_or(AssetError::Allocation {
            what: "vertex records",
            count: counts.faces,
        })?;
    let mut positions: Vec<[f32; 3]> = alloc_exact(counts.positions, "positions")?;
    let mut normals: Vec<[f32; 3]> = alloc_exact(counts.normals, "normals")?;
    let mut texcoords: Vec<[f32; 2]> = alloc_exact(counts.texcoords, "texcoords")?;
    let mut vertices: Vec<MeshVertex> = alloc_exact(record_count, "vertices")?;
    let mut indices: Vec<u32> = alloc_exact(record_count, "indices")?;
    log::debug!("Pass 2: allocated {} vertex records", record_count);

    // Pass 3: rewind and populate.
    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| AssetError::io(origin, e))?;

    let mut defaulted_normals = false;
    let mut defaulted_uvs = false;
    let mut warned_extra_corners = false;

    for_each_line(&mut reader, origin, |line_no, tag, mut parts| {
        match tag {
            "v" => {
                let x = parse_f32(parts.next(), line_no, "x coordinate")?;
                let y = parse_f32(parts.next(), line_no, "y coordinate")?;
                let z = parse_f32(parts.next(), line_no, "z coordinate")?;
                positions.push([x, y, z]);
            }
            "vn" => {
                let nx = parse_f32(parts.next(), line_no, "nx coordinate")?;
                let ny = parse_f32(parts.next(), line_no, "ny coordinate")?;
                let nz = parse_f32(parts.next(), line_no, "nz coordinate")?;
                normals.push([nx, ny, nz]);
            }
            "vt" => {
                let u = parse_f32(parts.next(), line_no, "u coordinate")?;
                let v = parse_f32(parts.next(), line_no, "v coordinate")?;
                texcoords.push([u, v]);
            }
            "f" => {
                let corners = parse_face(&mut parts, line_no)?;
                if parts.next().is_some() && !warned_extra_corners {
                    log::warn!(
                        "{}: face on line {} has more than 3 corners; keeping the first triangle",
                        origin.display(),
                        line_no
                    );
                    warned_extra_corners = true;
                }

                for corner in corners {
                    let position = positions[resolve_index(corner.position, positions.len())?];
                    let normal = match corner.normal {
                        Some(_) if normals.is_empty() => {
                            defaulted_normals = true;
                            DEFAULT_NORMAL
                        }
                        Some(raw) => normals[resolve_index(raw, normals.len())?],
                        None => {
                            defaulted_normals = true;
                            DEFAULT_NORMAL
                        }
                    };
                    let uv = match corner.texcoord {
                        Some(_) if texcoords.is_empty() => {
                            defaulted_uvs = true;
                            DEFAULT_UV
                        }
                        Some(raw) => texcoords[resolve_index(raw, texcoords.len())?],
                        None => {
                            defaulted_uvs = true;
                            DEFAULT_UV
                        }
                    };

                    indices.push(vertices.len() as u32);
                    vertices.push(MeshVertex::new(position, normal, uv));
                }
            }
            _ => {}
        }
        Ok(())
    })?;

    if defaulted_normals {
        log::debug!("{}: missing normals defaulted to {:?}", origin.display(), DEFAULT_NORMAL);
    }
    if defaulted_uvs {
        log::debug!("{}: missing texcoords defaulted to {:?}", origin.display(), DEFAULT_UV);
    }
    debug_assert_eq!(vertices.len(), record_count);
    log::debug!(
        "Pass 3: {} vertices, {} indices",
        vertices.len(),
        indices.len()
    );

    let aabb = Aabb::from_vertices(&vertices);
    Ok(Geometry {
        data: MeshData::new(vertices, indices),
        aabb,
        material_name: counts.material_name,
    })
}

/// Count elements and capture the material name. Does not allocate per element.
fn count_elements<R: BufRead>(reader: &mut R, origin: &Path) -> AssetResult<ElementCounts> {
    let mut counts = ElementCounts::default();
    for_each_line(reader, origin, |_, tag, mut parts| {
        match tag {
            "v" => counts.positions += 1,
            "vn" => counts.normals += 1,
            "vt" => counts.texcoords += 1,
            "f" => counts.faces += 1,
            "usemtl" => {
                if let Some(name) = parts.next() {
                    counts.material_name = Some(name.chars().take(MAX_MATERIAL_NAME).collect());
                }
            }
            _ => {}
        }
        Ok(())
    })?;
    Ok(counts)
}

/// Feed every non-blank, non-comment line to `f` as `(line_no, tag, rest)`.
fn for_each_line<R, F>(reader: &mut R, origin: &Path, mut f: F) -> AssetResult<()>
where
    R: BufRead,
    F: FnMut(usize, &str, std::str::SplitWhitespace<'_>) -> AssetResult<()>,
{
    let mut line = String::new();
    let mut line_no = 0;
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| AssetError::io(origin, e))?;
        if read == 0 {
            return Ok(());
        }
        line_no += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        if let Some(tag) = parts.next() {
            f(line_no, tag, parts)?;
        }
    }
}

fn alloc_exact<T>(count: usize, what: &'static str) -> AssetResult<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(count)
        .map_err(|_| AssetError::Allocation { what, count })?;
    Ok(v)
}

fn parse_f32(value: Option<&str>, line_no: usize, what: &str) -> AssetResult<f32> {
    let token = value.ok_or_else(|| AssetError::malformed(line_no, format!("missing {what}")))?;
    token
        .parse::<f32>()
        .map_err(|_| AssetError::malformed(line_no, format!("invalid {what} '{token}'")))
}

fn parse_face<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    line_no: usize,
) -> AssetResult<[Corner; 3]> {
    let mut corners = [None; 3];
    for slot in corners.iter_mut() {
        let token = parts
            .next()
            .ok_or_else(|| AssetError::malformed(line_no, "face has fewer than 3 corners"))?;
        *slot = Some(parse_corner(token, line_no)?);
    }
    let [Some(a), Some(b), Some(c)] = corners else {
        return Err(AssetError::malformed(line_no, "face has fewer than 3 corners"));
    };

    if a.style != b.style || a.style != c.style {
        return Err(AssetError::malformed(line_no, "face mixes corner styles"));
    }
    Ok([a, b, c])
}

fn parse_corner(token: &str, line_no: usize) -> AssetResult<Corner> {
    let parse = |s: &str| {
        s.parse::<i64>()
            .map_err(|_| AssetError::malformed(line_no, format!("invalid face element '{token}'")))
    };

    let fields: Vec<&str> = token.split('/').collect();
    match fields.as_slice() {
        [v] => Ok(Corner {
            position: parse(v)?,
            texcoord: None,
            normal: None,
            style: CornerStyle::Pos,
        }),
        [v, vt] if !vt.is_empty() => Ok(Corner {
            position: parse(v)?,
            texcoord: Some(parse(vt)?),
            normal: None,
            style: CornerStyle::PosTex,
        }),
        [v, vt, vn] if !vt.is_empty() && !vn.is_empty() => Ok(Corner {
            position: parse(v)?,
            texcoord: Some(parse(vt)?),
            normal: Some(parse(vn)?),
            style: CornerStyle::Full,
        }),
        [_, vt, vn] if vt.is_empty() && !vn.is_empty() => {
            log::warn!(
                "Line {}: v//vn face corners are not supported; export with texcoords",
                line_no
            );
            Err(AssetError::malformed(
                line_no,
                format!("unsupported v//vn face element '{token}'"),
            ))
        }
        _ => Err(AssetError::malformed(
            line_no,
            format!("unsupported face element '{token}' (expected v, v/vt or v/vt/vn)"),
        )),
    }
}

/// Convert a 1-based (or negative, relative) index into a 0-based one.
fn resolve_index(raw: i64, len: usize) -> AssetResult<usize> {
    let idx = if raw > 0 {
        raw - 1
    } else if raw < 0 {
        len as i64 + raw
    } else {
        -1
    };

    if idx < 0 || idx as usize >= len {
        return Err(AssetError::IndexOutOfRange {
            index: raw,
            count: len,
        });
    }
    Ok(idx as usize)
}
