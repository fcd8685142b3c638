//! Fixed-capacity asset registry: mesh slots, materials and textures.

use std::path::{Path, PathBuf};

use crate::{
    error::{AssetError, AssetResult},
    geometry::load_geometry,
    gpu::{BufferHandle, GpuBackend, HeadlessBackend, ImageHandle, upload_mesh, upload_texture},
    manifest::{self, DEFAULT_INDEX_PATH},
    material::{Material, load_mtl_from_path},
    mesh::{Geometry, MAX_MESH_NAME, Mesh},
    texture::{Texture, TextureData},
};

pub const MAX_MESHES: usize = 32;
pub const MAX_TEXTURES: usize = 32;
pub const MAX_MATERIALS: usize = 32;

/// Registry configuration.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Root that every manifest, metadata and texture path resolves against.
    pub asset_root: PathBuf,
    /// Manifest path, relative to `asset_root`.
    pub index_path: PathBuf,
    /// Keep CPU geometry after a successful GPU upload.
    pub retain_cpu_geometry: bool,
}

impl RegistryConfig {
    pub fn new(asset_root: impl Into<PathBuf>) -> Self {
        Self {
            asset_root: asset_root.into(),
            index_path: PathBuf::from(DEFAULT_INDEX_PATH),
            retain_cpu_geometry: false,
        }
    }

    pub fn index_file(&self) -> PathBuf {
        self.asset_root.join(&self.index_path)
    }
}

/// Slot index of a loaded mesh. Stale after the slot is unloaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshId(usize);

impl MeshId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Draw data handed to the ECS for one mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Renderable {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
    pub texture: Option<ImageHandle>,
    pub visible: bool,
}

/// Owner of every mesh, material and texture, and of their GPU resources.
///
/// Mesh storage is an arena of `MAX_MESHES` slots; a slot is loaded when it
/// holds a mesh. Dropping the registry releases all GPU resources through
/// its backend.
pub struct AssetRegistry<B: GpuBackend = HeadlessBackend> {
    config: RegistryConfig,
    backend: B,
    meshes: Vec<Option<Mesh>>,
    materials: Vec<Material>,
    textures: Vec<Texture>,
}

impl AssetRegistry<HeadlessBackend> {
    /// Registry without a graphics context; meshes stay CPU-side.
    pub fn headless(asset_root: impl Into<PathBuf>) -> Self {
        Self::new(RegistryConfig::new(asset_root), HeadlessBackend)
    }
}

impl<B: GpuBackend> AssetRegistry<B> {
    pub fn new(config: RegistryConfig, backend: B) -> Self {
        log::info!("Asset root: {}", config.asset_root.display());
        Self {
            config,
            backend,
            meshes: std::iter::repeat_with(|| None).take(MAX_MESHES).collect(),
            materials: Vec::new(),
            textures: Vec::new(),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn asset_root(&self) -> &Path {
        &self.config.asset_root
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Number of loaded mesh slots.
    pub fn mesh_count(&self) -> usize {
        self.meshes.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Parse a mesh file (either format), upload it, and store it in the
    /// first free slot under `name`.
    pub fn load_mesh(&mut self, path: &Path, name: &str) -> AssetResult<MeshId> {
        let slot = self.reserve_slot(name)?;
        let geometry = load_geometry(path).inspect_err(|e| {
            log::error!("Failed to parse mesh file {}: {}", path.display(), e);
        })?;
        self.commit(slot, name, geometry)
    }

    /// Store already-parsed geometry under `name`.
    pub fn insert_geometry(&mut self, name: &str, geometry: Geometry) -> AssetResult<MeshId> {
        let slot = self.reserve_slot(name)?;
        self.commit(slot, name, geometry)
    }

    fn reserve_slot(&self, name: &str) -> AssetResult<usize> {
        if name.is_empty() || name.chars().count() > MAX_MESH_NAME {
            return Err(AssetError::InvalidName {
                name: name.to_owned(),
                max: MAX_MESH_NAME,
            });
        }
        if self.mesh_id(name).is_some() {
            return Err(AssetError::DuplicateName(name.to_owned()));
        }
        self.meshes
            .iter()
            .position(Option::is_none)
            .ok_or(AssetError::RegistryFull {
                kind: "mesh",
                capacity: MAX_MESHES,
            })
    }

    fn commit(&mut self, slot: usize, name: &str, geometry: Geometry) -> AssetResult<MeshId> {
        geometry.data.validate().inspect_err(|e| {
            log::error!("Rejected geometry for mesh '{}': {}", name, e);
        })?;
        let mut mesh = Mesh::from_geometry(name, geometry);
        upload_mesh(&mut self.backend, &mut mesh, self.config.retain_cpu_geometry)?;
        log::info!(
            "Loaded mesh: {} ({} vertices, {} indices)",
            name,
            mesh.vertex_count(),
            mesh.index_count()
        );
        self.meshes[slot] = Some(mesh);
        Ok(MeshId(slot))
    }

    pub fn mesh_id(&self, name: &str) -> Option<MeshId> {
        self.meshes
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|m| m.name() == name))
            .map(MeshId)
    }

    pub fn mesh(&self, name: &str) -> Option<&Mesh> {
        self.mesh_id(name).and_then(|id| self.mesh_by_id(id))
    }

    pub fn mesh_by_id(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id.0).and_then(Option::as_ref)
    }

    /// Loaded meshes in slot order.
    pub fn meshes(&self) -> impl Iterator<Item = (MeshId, &Mesh)> {
        self.meshes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|m| (MeshId(i), m)))
    }

    /// Free a mesh slot and release its GPU buffers. Returns `false` if no
    /// mesh has that name.
    pub fn unload_mesh(&mut self, name: &str) -> bool {
        let Some(id) = self.mesh_id(name) else {
            return false;
        };
        if let Some(mut mesh) = self.meshes[id.0].take() {
            if let Some(gpu) = mesh.gpu.take() {
                gpu.release(&mut self.backend);
            }
            log::debug!("Unloaded mesh '{}'", name);
        }
        true
    }

    /// Parse an `.mtl` file and register its materials. Names already
    /// registered are skipped. Returns how many were added.
    pub fn load_materials(&mut self, path: &Path) -> AssetResult<usize> {
        let parsed = load_mtl_from_path(path)?;
        let mut added = 0;
        for material in parsed {
            if self.add_material(material)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Register one material. `Ok(false)` if the name is already taken.
    pub fn add_material(&mut self, material: Material) -> AssetResult<bool> {
        if self.material(&material.name).is_some() {
            log::debug!("Material '{}' already registered", material.name);
            return Ok(false);
        }
        if self.materials.len() >= MAX_MATERIALS {
            return Err(AssetError::RegistryFull {
                kind: "material",
                capacity: MAX_MATERIALS,
            });
        }
        self.materials.push(material);
        Ok(true)
    }

    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.name == name)
    }

    pub fn materials(&self) -> impl Iterator<Item = &Material> {
        self.materials.iter()
    }

    /// Decode an image and register it as `name`, creating a GPU image
    /// unless the backend is headless.
    pub fn load_texture(&mut self, path: &Path, name: &str) -> AssetResult<()> {
        if self.texture(name).is_some() {
            return Err(AssetError::DuplicateName(name.to_owned()));
        }
        if self.textures.len() >= MAX_TEXTURES {
            return Err(AssetError::RegistryFull {
                kind: "texture",
                capacity: MAX_TEXTURES,
            });
        }

        let full_path = self.resolve_texture_path(path);
        let data = TextureData::load(&full_path)?;
        let image = upload_texture(&mut self.backend, &data, name)?;
        log::info!("Loaded texture: {} ({}x{})", name, data.width, data.height);
        self.textures.push(Texture::new(name.to_owned(), full_path, &data, image));
        Ok(())
    }

    /// Absolute or existing paths are used as is; otherwise try
    /// `<root>/<path>`, then `<root>/textures/<path>`.
    fn resolve_texture_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.exists() {
            return path.to_path_buf();
        }
        let under_root = self.config.asset_root.join(path);
        if under_root.exists() {
            return under_root;
        }
        self.config.asset_root.join("textures").join(path)
    }

    pub fn texture(&self, name: &str) -> Option<&Texture> {
        self.textures.iter().find(|t| t.name() == name)
    }

    pub fn textures(&self) -> impl Iterator<Item = &Texture> {
        self.textures.iter()
    }

    /// Geometry path of `name` according to the configured manifest.
    pub fn mesh_path(&self, name: &str) -> AssetResult<Option<PathBuf>> {
        manifest::resolve_mesh_path(&self.config.index_file(), name)
    }

    /// Build draw data for a loaded mesh. The texture comes from the mesh
    /// material's `map_Kd`, falling back to the `<name>_texture` convention.
    pub fn renderable(&self, name: &str) -> AssetResult<Renderable> {
        let mesh = self
            .mesh(name)
            .ok_or_else(|| AssetError::UnknownAsset(name.to_owned()))?;
        let gpu = mesh
            .gpu_resources()
            .filter(|gpu| gpu.is_valid_in(&self.backend))
            .ok_or_else(|| AssetError::NoGpuResources(name.to_owned()))?;

        let material_texture = mesh
            .material_name()
            .and_then(|m| self.material(m))
            .and_then(|m| m.diffuse_texture.as_deref())
            .and_then(|t| self.texture(t));
        let texture = material_texture
            .or_else(|| self.texture(&format!("{name}_texture")))
            .and_then(Texture::image);
        if texture.is_none() {
            log::debug!("No texture found for mesh '{}'", name);
        }

        Ok(Renderable {
            vertex_buffer: gpu.vertex_buffer(),
            index_buffer: gpu.index_buffer(),
            index_count: mesh.index_count() as u32,
            texture,
            visible: true,
        })
    }

    /// `true` if every loaded mesh has valid GPU buffers. Headless
    /// registries have none to check.
    pub fn validate_gpu_resources(&self) -> bool {
        if self.backend.is_headless() {
            return true;
        }
        let mut ok = true;
        for (_, mesh) in self.meshes() {
            let valid = mesh
                .gpu_resources()
                .is_some_and(|gpu| gpu.is_valid_in(&self.backend));
            if !valid {
                log::error!("Mesh '{}' has invalid GPU resources", mesh.name());
                ok = false;
            }
        }
        ok
    }

    /// Dump the catalog at `info` level.
    pub fn log_loaded(&self) {
        log::info!("Meshes ({}):", self.mesh_count());
        for (id, mesh) in self.meshes() {
            log::info!(
                "  [{}] {}: {} vertices, {} indices{}",
                id.index(),
                mesh.name(),
                mesh.vertex_count(),
                mesh.index_count(),
                if mesh.gpu_resources().is_some() { " (gpu)" } else { "" }
            );
        }
        log::info!("Textures ({}):", self.textures.len());
        for texture in &self.textures {
            let (w, h) = texture.size();
            log::info!("  {}: {}x{}", texture.name(), w, h);
        }
        log::info!("Materials ({}):", self.materials.len());
        for material in &self.materials {
            log::info!("  {}", material.name);
        }
    }

    /// Release every GPU resource and empty the registry.
    pub fn clear(&mut self) {
        for slot in &mut self.meshes {
            if let Some(gpu) = slot.take().and_then(|mut mesh| mesh.gpu.take()) {
                gpu.release(&mut self.backend);
            }
        }
        for texture in self.textures.drain(..) {
            if let Some(image) = texture.image {
                self.backend.destroy_image(image);
            }
        }
        self.materials.clear();
    }
}

impl<B: GpuBackend> Drop for AssetRegistry<B> {
    fn drop(&mut self) {
        self.clear();
    }
}
