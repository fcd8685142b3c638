//! Manifest-driven batch loading.

use std::path::{Path, PathBuf};

use crate::{
    error::{AssetError, AssetResult},
    gpu::GpuBackend,
    manifest::{AssetEntry, read_manifest},
    registry::{AssetRegistry, MeshId},
};

/// One metadata file that could not be loaded.
#[derive(Debug)]
pub struct LoadFailure {
    pub metadata_path: PathBuf,
    pub error: AssetError,
}

/// Outcome of a batch load. Assets that loaded stay loaded even when
/// other entries failed.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Mesh names in manifest order.
    pub loaded: Vec<String>,
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    /// `false` if any entry in the batch failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl<B: GpuBackend> AssetRegistry<B> {
    /// Load every asset listed in the configured manifest.
    ///
    /// A missing or unreadable manifest fails the whole call. Per-entry
    /// failures are collected in the report and do not stop the batch.
    pub fn load_from_index(&mut self) -> AssetResult<LoadReport> {
        let index_path = self.config().index_file();
        let entries = read_manifest(&index_path).inspect_err(|e| {
            log::error!("{}", e);
        })?;
        log::info!("Loading {} assets from {}", entries.len(), index_path.display());

        let base = index_path.parent().unwrap_or(Path::new("")).to_path_buf();
        let mut report = LoadReport::default();
        for entry in entries {
            let metadata_path = base.join(&entry);
            match self.load_metadata(&metadata_path) {
                Ok(id) => {
                    if let Some(mesh) = self.mesh_by_id(id) {
                        report.loaded.push(mesh.name().to_owned());
                    }
                }
                Err(error) => {
                    log::warn!("Skipping {}: {}", metadata_path.display(), error);
                    report.failures.push(LoadFailure {
                        metadata_path,
                        error,
                    });
                }
            }
        }

        if report.is_success() {
            log::info!("Loaded {} assets", report.loaded.len());
        } else {
            log::warn!(
                "Loaded {} assets, {} failed",
                report.loaded.len(),
                report.failures.len()
            );
        }
        Ok(report)
    }

    /// Read one metadata file and load the asset it describes.
    pub fn load_metadata(&mut self, metadata_path: &Path) -> AssetResult<MeshId> {
        let entry = AssetEntry::read(metadata_path)?;
        self.load_entry(&entry)
    }

    /// Load a validated entry: geometry first (required), then its
    /// material file and texture, neither of which can fail the entry.
    pub fn load_entry(&mut self, entry: &AssetEntry) -> AssetResult<MeshId> {
        let id = self.load_mesh(&entry.geometry, &entry.name)?;

        if let Some(material) = &entry.material {
            match self.load_materials(material) {
                Ok(added) => log::debug!("{}: {} new materials", entry.name, added),
                Err(AssetError::NotFound(path)) => {
                    log::debug!("{}: no material file at {}", entry.name, path.display());
                }
                Err(e) => log::warn!("{}: material not loaded: {}", entry.name, e),
            }
        }

        if let Some(texture) = &entry.texture {
            let texture_name = format!("{}_texture", entry.name);
            if let Err(e) = self.load_texture(texture, &texture_name) {
                log::warn!("{}: texture not loaded: {}", entry.name, e);
            }
        }

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{gpu::MemoryBackend, registry::RegistryConfig};

    const TRIANGLE: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";

    fn write_asset(meshes: &Path, dir: &str, metadata: &str) {
        let asset_dir = meshes.join(dir);
        fs::create_dir_all(&asset_dir).unwrap();
        fs::write(asset_dir.join("geometry.obj"), TRIANGLE).unwrap();
        fs::write(asset_dir.join("metadata.json"), metadata).unwrap();
    }

    fn asset_tree() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        let meshes = root.path().join("meshes");
        write_asset(
            &meshes,
            "props/crate",
            r#"{
  "name": "crate",
  "geometry": "geometry.obj",
  "material": "material.mtl"
}
"#,
        );
        write_asset(&meshes, "props/broken", "{\n  \"name\": \"broken\"\n}\n");
        write_asset(
            &meshes,
            "ships/wedge",
            r#"{
  "name": "wedge",
  "geometry": "geometry.obj",
  "texture": "missing.png"
}
"#,
        );
        fs::write(
            meshes.join("props/crate/material.mtl"),
            "newmtl wood\nKd 0.5 0.3 0.1\n",
        )
        .unwrap();
        fs::write(
            meshes.join("index.json"),
            r#"[
  "props/crate/metadata.json",
  "props/broken/metadata.json",
  "ships/wedge/metadata.json"
]
"#,
        )
        .unwrap();
        root
    }

    #[test]
    fn batch_is_fail_soft() {
        let root = asset_tree();
        let mut reg = AssetRegistry::headless(root.path());
        let report = reg.load_from_index().unwrap();

        assert!(!report.is_success());
        assert_eq!(report.loaded, ["crate", "wedge"]);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].metadata_path.ends_with("props/broken/metadata.json"));
        assert!(matches!(
            report.failures[0].error,
            AssetError::MissingField { field: "geometry", .. }
        ));

        assert_eq!(reg.mesh_count(), 2);
        assert!(reg.mesh("crate").is_some());
        assert!(reg.mesh("wedge").is_some());
        assert!(reg.mesh("broken").is_none());
        assert!(reg.material("wood").is_some());
        assert!(reg.texture("wedge_texture").is_none());
    }

    #[test]
    fn clean_batch_uploads_everything() {
        let root = asset_tree();
        let meshes = root.path().join("meshes");
        fs::write(
            meshes.join("index.json"),
            "[\n  \"props/crate/metadata.json\",\n  \"ships/wedge/metadata.json\"\n]\n",
        )
        .unwrap();

        let mut reg = AssetRegistry::new(RegistryConfig::new(root.path()), MemoryBackend::new());
        let report = reg.load_from_index().unwrap();
        assert!(report.is_success());
        assert_eq!(reg.backend().live_buffers(), 4);
        assert!(reg.validate_gpu_resources());
    }

    #[test]
    fn reloading_reports_duplicates() {
        let root = asset_tree();
        let mut reg = AssetRegistry::headless(root.path());
        reg.load_from_index().unwrap();
        let report = reg.load_from_index().unwrap();
        assert!(report.loaded.is_empty());
        assert_eq!(report.failures.len(), 3);
        assert_eq!(reg.mesh_count(), 2);
    }

    #[test]
    fn missing_index_is_a_hard_failure() {
        let root = tempfile::tempdir().unwrap();
        let mut reg = AssetRegistry::headless(root.path());
        let err = reg.load_from_index().unwrap_err();
        assert!(matches!(err, AssetError::IndexMissing(_)));
        assert_eq!(reg.mesh_count(), 0);
    }

    #[test]
    fn missing_material_file_is_tolerated() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("solo");
        write_asset(
            root.path(),
            "solo",
            r#"{
  "name": "solo",
  "geometry": "geometry.obj",
  "material": "nope.mtl"
}
"#,
        );
        let mut reg = AssetRegistry::headless(root.path());
        let id = reg.load_metadata(&dir.join("metadata.json")).unwrap();
        assert_eq!(reg.mesh_by_id(id).unwrap().name(), "solo");
        assert_eq!(reg.material_count(), 0);
    }

    #[test]
    fn entry_texture_uses_naming_convention() {
        let root = asset_tree();
        let wedge = root.path().join("meshes/ships/wedge");
        image::RgbaImage::from_pixel(4, 4, image::Rgba([9, 9, 9, 255]))
            .save(wedge.join("missing.png"))
            .unwrap();

        let mut reg = AssetRegistry::new(RegistryConfig::new(root.path()), MemoryBackend::new());
        reg.load_metadata(&wedge.join("metadata.json")).unwrap();
        let texture = reg.texture("wedge_texture").unwrap();
        assert_eq!(texture.size(), (4, 4));
        assert_eq!(reg.backend().live_images(), 1);

        let r = reg.renderable("wedge").unwrap();
        assert_eq!(r.texture, texture.image());
    }
}
