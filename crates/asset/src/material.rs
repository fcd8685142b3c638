//! MTL-style material definitions.

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use glam::Vec3;

use crate::error::{AssetError, AssetResult};

/// Material and texture names longer than this are truncated.
pub const MAX_NAME_LEN: usize = 63;

/// Diffuse color of a material that never sets `Kd`.
pub const DEFAULT_DIFFUSE: Vec3 = Vec3::splat(0.8);

/// Shading parameters shared by any mesh that names this material.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub diffuse_color: Vec3,
    pub ambient_color: Vec3,
    pub specular_color: Vec3,
    pub emission_color: Vec3,
    pub shininess: f32,
    /// `map_Kd`: the primary texture.
    pub diffuse_texture: Option<String>,
    /// `map_Bump` / `bump`
    pub normal_texture: Option<String>,
    pub specular_texture: Option<String>,
    pub emission_texture: Option<String>,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            diffuse_color: DEFAULT_DIFFUSE,
            ambient_color: Vec3::ZERO,
            specular_color: Vec3::ZERO,
            emission_color: Vec3::ZERO,
            shininess: 0.0,
            diffuse_texture: None,
            normal_texture: None,
            specular_texture: None,
            emission_texture: None,
        }
    }
}

/// Parse every material in an `.mtl` file.
pub fn load_mtl_from_path(path: impl AsRef<Path>) -> AssetResult<Vec<Material>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| AssetError::io(path, e))?;
    parse_mtl(BufReader::new(file), path)
}

pub fn load_mtl_from_str(contents: &str) -> AssetResult<Vec<Material>> {
    parse_mtl(io::Cursor::new(contents), Path::new("<string>"))
}

fn parse_mtl<R: BufRead>(reader: R, origin: &Path) -> AssetResult<Vec<Material>> {
    let mut materials: Vec<Material> = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| AssetError::io(origin, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else { continue };

        if tag == "newmtl" {
            match parts.next() {
                Some(name) => materials.push(Material::new(bounded(name))),
                None => log::warn!("{}:{}: newmtl without a name", origin.display(), line_no + 1),
            }
            continue;
        }

        // Properties before the first `newmtl` have nothing to attach to.
        let Some(current) = materials.last_mut() else {
            continue;
        };
        match tag {
            "Kd" => current.diffuse_color = parse_color(parts, line_no)?,
            "Ka" => current.ambient_color = parse_color(parts, line_no)?,
            "Ks" => current.specular_color = parse_color(parts, line_no)?,
            "Ke" => current.emission_color = parse_color(parts, line_no)?,
            "Ns" => current.shininess = parse_f32(parts.next(), line_no)?,
            "map_Kd" => current.diffuse_texture = parts.next().map(bounded),
            "map_Bump" | "bump" => current.normal_texture = parts.next().map(bounded),
            "map_Ks" => current.specular_texture = parts.next().map(bounded),
            "map_Ke" => current.emission_texture = parts.next().map(bounded),
            _ => {}
        }
    }

    log::debug!("Parsed {} materials from {}", materials.len(), origin.display());
    Ok(materials)
}

fn bounded(name: &str) -> String {
    name.chars().take(MAX_NAME_LEN).collect()
}

fn parse_color<'a>(mut parts: impl Iterator<Item = &'a str>, line_no: usize) -> AssetResult<Vec3> {
    let r = parse_f32(parts.next(), line_no)?;
    let g = parse_f32(parts.next(), line_no)?;
    let b = parse_f32(parts.next(), line_no)?;
    Ok(Vec3::new(r, g, b))
}

fn parse_f32(value: Option<&str>, line_no: usize) -> AssetResult<f32> {
    let token = value.ok_or_else(|| AssetError::malformed(line_no + 1, "missing value"))?;
    token
        .parse::<f32>()
        .map_err(|_| AssetError::malformed(line_no + 1, format!("invalid number '{token}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HULL_MTL: &str = "\
# exported
newmtl hull
Ka 0.1 0.1 0.1
Kd 0.2 0.4 0.6
Ks 1.0 1.0 1.0
Ns 32
map_Kd hull_diffuse.png
bump hull_normal.png

newmtl glow
Ke 0.0 1.0 0.5
map_Ke glow.png
map_Ks glow_spec.png
";

    #[test]
    fn parses_colors_and_maps() {
        let mats = load_mtl_from_str(HULL_MTL).unwrap();
        assert_eq!(mats.len(), 2);

        let hull = &mats[0];
        assert_eq!(hull.name, "hull");
        assert_eq!(hull.ambient_color, Vec3::splat(0.1));
        assert_eq!(hull.diffuse_color, Vec3::new(0.2, 0.4, 0.6));
        assert_eq!(hull.specular_color, Vec3::ONE);
        assert_eq!(hull.shininess, 32.0);
        assert_eq!(hull.diffuse_texture.as_deref(), Some("hull_diffuse.png"));
        assert_eq!(hull.normal_texture.as_deref(), Some("hull_normal.png"));

        let glow = &mats[1];
        assert_eq!(glow.diffuse_color, DEFAULT_DIFFUSE);
        assert_eq!(glow.emission_color, Vec3::new(0.0, 1.0, 0.5));
        assert_eq!(glow.emission_texture.as_deref(), Some("glow.png"));
        assert_eq!(glow.specular_texture.as_deref(), Some("glow_spec.png"));
        assert_eq!(glow.diffuse_texture, None);
    }

    #[test]
    fn properties_before_newmtl_are_ignored() {
        let mats = load_mtl_from_str("Kd 1 0 0\nnewmtl a\n").unwrap();
        assert_eq!(mats.len(), 1);
        assert_eq!(mats[0].diffuse_color, DEFAULT_DIFFUSE);
    }

    #[test]
    fn bad_color_is_reported_with_line() {
        let err = load_mtl_from_str("newmtl a\nKd 1 x 0\n").unwrap_err();
        assert!(matches!(err, AssetError::MalformedLine { line: 2, .. }));
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = load_mtl_from_path("/no/such/file.mtl").unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }
}
