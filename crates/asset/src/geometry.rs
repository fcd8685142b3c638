//! Mesh format detection and dispatch.

use std::{fs::File, io::Read, path::Path};

use crate::{
    cobj::{self, COBJ_MAGIC},
    error::{AssetError, AssetResult},
    mesh::Geometry,
    obj,
};

/// On-disk mesh encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshFormat {
    /// Binary `CGMF` container.
    Binary,
    /// Line-oriented OBJ-like text.
    Text,
}

impl MeshFormat {
    /// Classify by leading bytes; anything that is not the binary magic is text.
    pub fn sniff(prefix: &[u8]) -> Self {
        if prefix.starts_with(&COBJ_MAGIC) {
            MeshFormat::Binary
        } else {
            MeshFormat::Text
        }
    }

    /// Read the first four bytes of `path` and classify them.
    pub fn detect(path: &Path) -> AssetResult<Self> {
        let file = File::open(path).map_err(|e| AssetError::io(path, e))?;
        let mut prefix = Vec::with_capacity(COBJ_MAGIC.len());
        file.take(COBJ_MAGIC.len() as u64)
            .read_to_end(&mut prefix)
            .map_err(|e| AssetError::io(path, e))?;
        Ok(Self::sniff(&prefix))
    }
}

/// Parse a mesh file of either format into CPU-side geometry.
pub fn load_geometry(path: impl AsRef<Path>) -> AssetResult<Geometry> {
    let path = path.as_ref();
    let format = MeshFormat::detect(path)?;
    log::debug!("Detected {:?} mesh format for {}", format, path.display());
    match format {
        MeshFormat::Binary => cobj::load_cobj_from_path(path),
        MeshFormat::Text => obj::load_obj_from_path(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cobj::save_cobj;

    #[test]
    fn sniffing_is_content_based() {
        assert_eq!(MeshFormat::sniff(b"CGMF\x01\0\0\0"), MeshFormat::Binary);
        assert_eq!(MeshFormat::sniff(b"# CGMF"), MeshFormat::Text);
        assert_eq!(MeshFormat::sniff(b"CG"), MeshFormat::Text);
        assert_eq!(MeshFormat::sniff(b""), MeshFormat::Text);
    }

    #[test]
    fn dispatches_regardless_of_extension() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("tri.cobj");
        std::fs::write(&text, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        let parsed = load_geometry(&text).unwrap();
        assert_eq!(parsed.data.vertices.len(), 3);

        let binary = dir.path().join("tri.obj");
        save_cobj(&binary, &parsed).unwrap();
        assert_eq!(MeshFormat::detect(&binary).unwrap(), MeshFormat::Binary);
        assert_eq!(load_geometry(&binary).unwrap().data, parsed.data);
    }

    #[test]
    fn missing_file_fails() {
        let err = load_geometry("/no/such/mesh.cobj").unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }
}
