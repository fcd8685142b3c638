//! Asset index (manifest) and per-asset metadata files.
//!
//! Both are JSON-shaped but read line by line: structural punctuation is
//! skipped and only quoted strings are picked out. One value per line.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::{AssetError, AssetResult};

/// Manifest location relative to the asset root.
pub const DEFAULT_INDEX_PATH: &str = "meshes/index.json";

/// Extract the metadata path from one manifest line, if it holds one.
pub fn manifest_entry(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(['/', '#', '[', ']', '{', '}']) {
        return None;
    }

    let start = trimmed.find('"')? + 1;
    let rest = &trimmed[start..];
    let end = rest.find('"')?;
    // `"key": ...` is structure, not an entry.
    if rest[end + 1..].trim_start().starts_with(':') {
        return None;
    }
    Some(&rest[..end]).filter(|value| !value.is_empty())
}

/// All metadata paths listed in manifest text, in order.
pub fn parse_manifest(contents: &str) -> Vec<String> {
    contents
        .lines()
        .filter_map(manifest_entry)
        .map(str::to_owned)
        .collect()
}

/// Read a manifest file. A missing file maps to [`AssetError::IndexMissing`].
pub fn read_manifest(path: &Path) -> AssetResult<Vec<String>> {
    let contents = fs::read_to_string(path).map_err(|e| match AssetError::io(path, e) {
        AssetError::NotFound(path) => AssetError::IndexMissing(path),
        other => other,
    })?;
    Ok(parse_manifest(&contents))
}

/// Quoted string value of `"key": "value"` on this line.
pub fn quoted_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("\"{key}\"");
    let after_key = &line[line.find(&pattern)? + pattern.len()..];
    let after_colon = after_key.trim_start().strip_prefix(':')?.trim_start();
    let value = after_colon.strip_prefix('"')?;
    let end = value.find('"')?;
    Some(&value[..end]).filter(|v| !v.is_empty())
}

/// Raw fields of a metadata file, before validation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataFields {
    pub name: Option<String>,
    pub geometry: Option<String>,
    pub texture: Option<String>,
    pub material: Option<String>,
}

impl MetadataFields {
    pub fn parse(contents: &str) -> Self {
        let mut fields = Self::default();
        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with(['/', '#']) {
                continue;
            }
            let slots = [
                ("name", &mut fields.name),
                ("geometry", &mut fields.geometry),
                ("texture", &mut fields.texture),
                ("material", &mut fields.material),
            ];
            for (key, slot) in slots {
                if let Some(value) = quoted_value(trimmed, key) {
                    *slot = Some(value.to_owned());
                }
            }
        }
        fields
    }
}

/// A validated metadata entry with paths resolved against its directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetEntry {
    pub name: String,
    pub metadata_path: PathBuf,
    pub geometry: PathBuf,
    pub texture: Option<PathBuf>,
    pub material: Option<PathBuf>,
}

impl AssetEntry {
    /// Read and validate the metadata file at `path`.
    pub fn read(path: &Path) -> AssetResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| AssetError::io(path, e))?;
        Self::from_fields(MetadataFields::parse(&contents), path)
    }

    /// `name` and `geometry` are required; file names resolve relative to
    /// the metadata file's directory.
    pub fn from_fields(fields: MetadataFields, metadata_path: &Path) -> AssetResult<Self> {
        let missing = |field| AssetError::MissingField {
            path: metadata_path.to_path_buf(),
            field,
        };
        let name = fields.name.ok_or_else(|| missing("name"))?;
        let geometry = fields.geometry.ok_or_else(|| missing("geometry"))?;

        let dir = metadata_path.parent().unwrap_or(Path::new(""));
        Ok(Self {
            name,
            metadata_path: metadata_path.to_path_buf(),
            geometry: dir.join(geometry),
            texture: fields.texture.map(|t| dir.join(t)),
            material: fields.material.map(|m| dir.join(m)),
        })
    }
}

/// Find the geometry path of `asset_name` by walking the manifest at
/// `index_path` and each metadata file it lists. Linear and best-effort:
/// unreadable metadata files are skipped.
pub fn resolve_mesh_path(index_path: &Path, asset_name: &str) -> AssetResult<Option<PathBuf>> {
    let base = index_path.parent().unwrap_or(Path::new(""));
    for entry in read_manifest(index_path)? {
        let metadata_path = base.join(&entry);
        let contents = match fs::read_to_string(&metadata_path) {
            Ok(contents) => contents,
            Err(e) => {
                log::debug!("Skipping {}: {}", metadata_path.display(), e);
                continue;
            }
        };
        let fields = MetadataFields::parse(&contents);
        if fields.name.as_deref() != Some(asset_name) {
            continue;
        }
        if let Some(geometry) = fields.geometry {
            let dir = metadata_path.parent().unwrap_or(Path::new(""));
            return Ok(Some(dir.join(geometry)));
        }
    }
    Ok(None)
}
