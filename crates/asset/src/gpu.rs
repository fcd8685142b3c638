//! GPU resource seam: backend trait, opaque mesh resources and the uploader.
//!
//! Asset code never sees backend types. A backend hands out integer handles
//! (0 is the invalid sentinel) and answers state queries for them; the
//! `renderer` crate provides the wgpu implementation.

use std::collections::HashMap;

use crate::{
    error::{AssetError, AssetResult},
    mesh::Mesh,
    texture::TextureData,
};

/// Backend buffer id. `BufferHandle::INVALID` means "no buffer".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BufferHandle(u32);

impl BufferHandle {
    pub const INVALID: Self = Self(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u32 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Backend image id. `ImageHandle::INVALID` means "no image".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ImageHandle(u32);

impl ImageHandle {
    pub const INVALID: Self = Self(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u32 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
}

/// State of a backend resource as reported by [`GpuBackend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceState {
    /// Created and usable.
    Valid,
    /// The id exists but creation failed; it still has to be destroyed.
    Failed,
    /// Unknown or already destroyed id.
    Invalid,
}

/// Graphics backend used by the uploader and the registry.
///
/// Creation never panics: a failed creation returns either
/// `INVALID` or an id whose state is [`ResourceState::Failed`].
pub trait GpuBackend {
    /// Headless backends skip every upload; CPU geometry stays resident.
    fn is_headless(&self) -> bool {
        false
    }

    fn create_buffer(&mut self, usage: BufferUsage, data: &[u8], label: &str) -> BufferHandle;
    fn buffer_state(&self, buffer: BufferHandle) -> ResourceState;
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    fn create_image(&mut self, texture: &TextureData, label: &str) -> ImageHandle;
    fn image_state(&self, image: ImageHandle) -> ResourceState;
    fn destroy_image(&mut self, image: ImageHandle);
}

/// Backend for tests and tools that run without a graphics context.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeadlessBackend;

impl GpuBackend for HeadlessBackend {
    fn is_headless(&self) -> bool {
        true
    }

    fn create_buffer(&mut self, _usage: BufferUsage, _data: &[u8], _label: &str) -> BufferHandle {
        BufferHandle::INVALID
    }

    fn buffer_state(&self, _buffer: BufferHandle) -> ResourceState {
        ResourceState::Invalid
    }

    fn destroy_buffer(&mut self, _buffer: BufferHandle) {}

    fn create_image(&mut self, _texture: &TextureData, _label: &str) -> ImageHandle {
        ImageHandle::INVALID
    }

    fn image_state(&self, _image: ImageHandle) -> ResourceState {
        ResourceState::Invalid
    }

    fn destroy_image(&mut self, _image: ImageHandle) {}
}

#[derive(Clone, Debug)]
struct MemoryBuffer {
    usage: BufferUsage,
    len: usize,
    label: String,
    failed: bool,
}

/// In-memory backend that tracks every live resource.
///
/// Failures can be injected per resource kind; a failed creation still
/// allocates an id in the `Failed` state, so callers must destroy it.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    next_id: u32,
    buffers: HashMap<u32, MemoryBuffer>,
    images: HashMap<u32, bool>,
    fail_vertex: bool,
    fail_index: bool,
    fail_image: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next buffer creation with `usage` fail.
    pub fn fail_next_buffer(&mut self, usage: BufferUsage) {
        match usage {
            BufferUsage::Vertex => self.fail_vertex = true,
            BufferUsage::Index => self.fail_index = true,
        }
    }

    /// Make the next image creation fail.
    pub fn fail_next_image(&mut self) {
        self.fail_image = true;
    }

    /// Buffers not yet destroyed, including failed ones.
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_images(&self) -> usize {
        self.images.len()
    }

    /// Byte size and label of a live buffer.
    pub fn buffer_info(&self, buffer: BufferHandle) -> Option<(BufferUsage, usize, &str)> {
        self.buffers
            .get(&buffer.id())
            .map(|b| (b.usage, b.len, b.label.as_str()))
    }

    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl GpuBackend for MemoryBackend {
    fn create_buffer(&mut self, usage: BufferUsage, data: &[u8], label: &str) -> BufferHandle {
        let failed = match usage {
            BufferUsage::Vertex => std::mem::take(&mut self.fail_vertex),
            BufferUsage::Index => std::mem::take(&mut self.fail_index),
        };
        let id = self.allocate_id();
        self.buffers.insert(
            id,
            MemoryBuffer {
                usage,
                len: data.len(),
                label: label.to_owned(),
                failed,
            },
        );
        BufferHandle::new(id)
    }

    fn buffer_state(&self, buffer: BufferHandle) -> ResourceState {
        match self.buffers.get(&buffer.id()) {
            Some(b) if b.failed => ResourceState::Failed,
            Some(_) => ResourceState::Valid,
            None => ResourceState::Invalid,
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer.id()).is_none() {
            log::warn!("destroy_buffer: unknown buffer {}", buffer.id());
        }
    }

    fn create_image(&mut self, _texture: &TextureData, _label: &str) -> ImageHandle {
        let failed = std::mem::take(&mut self.fail_image);
        let id = self.allocate_id();
        self.images.insert(id, failed);
        ImageHandle::new(id)
    }

    fn image_state(&self, image: ImageHandle) -> ResourceState {
        match self.images.get(&image.id()) {
            Some(true) => ResourceState::Failed,
            Some(false) => ResourceState::Valid,
            None => ResourceState::Invalid,
        }
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        if self.images.remove(&image.id()).is_none() {
            log::warn!("destroy_image: unknown image {}", image.id());
        }
    }
}

/// Vertex/index buffers of one mesh. Owned by exactly one [`Mesh`].
///
/// Not `Clone`: releasing consumes the value, so a pair can only be
/// destroyed once.
#[derive(Debug, PartialEq, Eq)]
pub struct GpuMeshResources {
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
}

impl GpuMeshResources {
    pub fn vertex_buffer(&self) -> BufferHandle {
        self.vertex_buffer
    }

    pub fn index_buffer(&self) -> BufferHandle {
        self.index_buffer
    }

    /// Both buffers report `Valid` in `backend`.
    pub fn is_valid_in<B: GpuBackend + ?Sized>(&self, backend: &B) -> bool {
        backend.buffer_state(self.vertex_buffer) == ResourceState::Valid
            && backend.buffer_state(self.index_buffer) == ResourceState::Valid
    }

    pub(crate) fn release<B: GpuBackend + ?Sized>(self, backend: &mut B) {
        backend.destroy_buffer(self.vertex_buffer);
        backend.destroy_buffer(self.index_buffer);
    }
}

/// Promote a parsed mesh to GPU buffers.
///
/// On success the CPU arrays are dropped unless `retain_cpu` is set. With a
/// headless backend nothing happens and the CPU arrays stay. On failure no
/// buffer created by this call survives.
pub fn upload_mesh<B: GpuBackend + ?Sized>(
    backend: &mut B,
    mesh: &mut Mesh,
    retain_cpu: bool,
) -> AssetResult<()> {
    if backend.is_headless() {
        log::debug!("Headless backend: keeping '{}' CPU-side", mesh.name());
        return Ok(());
    }
    if mesh.gpu.is_some() {
        log::debug!("Mesh '{}' already has GPU resources", mesh.name());
        return Ok(());
    }

    let name = mesh.name().to_owned();
    let data = mesh
        .cpu
        .as_ref()
        .ok_or_else(|| AssetError::ZeroSizedBuffer(name.clone()))?;
    let vertex_bytes = data.vertex_bytes();
    let index_bytes = data.index_bytes();
    if vertex_bytes.is_empty() || index_bytes.is_empty() {
        return Err(AssetError::ZeroSizedBuffer(name));
    }
    log::debug!(
        "Creating GPU buffers for '{}': VB={} bytes, IB={} bytes",
        name,
        vertex_bytes.len(),
        index_bytes.len()
    );

    let vertex_buffer = backend.create_buffer(BufferUsage::Vertex, vertex_bytes, &name);
    let index_buffer = backend.create_buffer(BufferUsage::Index, index_bytes, &name);

    let vertex_ok = backend.buffer_state(vertex_buffer) == ResourceState::Valid;
    let index_ok = backend.buffer_state(index_buffer) == ResourceState::Valid;
    if !(vertex_ok && index_ok) {
        for buffer in [vertex_buffer, index_buffer] {
            if buffer.is_valid() {
                backend.destroy_buffer(buffer);
            }
        }
        log::error!("Failed to create GPU buffers for mesh '{}'", name);
        return Err(AssetError::BackendFailure {
            what: if vertex_ok { "index buffer" } else { "vertex buffer" },
            label: name,
        });
    }

    mesh.gpu = Some(GpuMeshResources {
        vertex_buffer,
        index_buffer,
    });
    if !retain_cpu {
        mesh.cpu = None;
    }
    log::debug!("GPU resources created for mesh '{}'", name);
    Ok(())
}

/// Create a GPU image for `texture`, destroying it again if the backend
/// reports it unusable. Headless backends yield `Ok(None)`.
pub fn upload_texture<B: GpuBackend + ?Sized>(
    backend: &mut B,
    texture: &TextureData,
    label: &str,
) -> AssetResult<Option<ImageHandle>> {
    if backend.is_headless() {
        return Ok(None);
    }
    if texture.data.is_empty() {
        return Err(AssetError::ZeroSizedBuffer(label.to_owned()));
    }

    let image = backend.create_image(texture, label);
    if backend.image_state(image) != ResourceState::Valid {
        if image.is_valid() {
            backend.destroy_image(image);
        }
        return Err(AssetError::BackendFailure {
            what: "image",
            label: label.to_owned(),
        });
    }
    Ok(Some(image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mesh::{Aabb, Geometry, MeshData, MeshVertex},
        obj::load_obj_from_str,
    };

    fn triangle_mesh() -> Mesh {
        let geometry = load_obj_from_str("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        Mesh::from_geometry("tri", geometry)
    }

    #[test]
    fn upload_moves_data_to_gpu() {
        let mut backend = MemoryBackend::new();
        let mut mesh = triangle_mesh();
        upload_mesh(&mut backend, &mut mesh, false).unwrap();

        let gpu = mesh.gpu_resources().expect("gpu resources");
        assert!(gpu.is_valid_in(&backend));
        assert!(mesh.data().is_none());
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(backend.live_buffers(), 2);

        let (usage, len, label) = backend.buffer_info(gpu.vertex_buffer()).unwrap();
        assert_eq!(usage, BufferUsage::Vertex);
        assert_eq!(len, 3 * MeshVertex::SIZE);
        assert_eq!(label, "tri");
        let (usage, len, _) = backend.buffer_info(gpu.index_buffer()).unwrap();
        assert_eq!((usage, len), (BufferUsage::Index, 12));
    }

    #[test]
    fn retained_upload_keeps_cpu_data() {
        let mut backend = MemoryBackend::new();
        let mut mesh = triangle_mesh();
        upload_mesh(&mut backend, &mut mesh, true).unwrap();
        assert!(mesh.gpu_resources().is_some());
        assert_eq!(mesh.data().map(|d| d.vertices.len()), Some(3));
    }

    #[test]
    fn headless_upload_is_skipped() {
        let mut mesh = triangle_mesh();
        upload_mesh(&mut HeadlessBackend, &mut mesh, false).unwrap();
        assert!(mesh.gpu_resources().is_none());
        assert!(mesh.data().is_some());
    }

    #[test]
    fn index_buffer_failure_rolls_back_vertex_buffer() {
        let mut backend = MemoryBackend::new();
        let before = backend.live_buffers();
        backend.fail_next_buffer(BufferUsage::Index);

        let mut mesh = triangle_mesh();
        let err = upload_mesh(&mut backend, &mut mesh, false).unwrap_err();
        assert!(matches!(err, AssetError::BackendFailure { what: "index buffer", .. }));
        assert_eq!(backend.live_buffers(), before);
        assert!(mesh.gpu_resources().is_none());
        assert!(mesh.data().is_some());
    }

    #[test]
    fn vertex_buffer_failure_rolls_back_both() {
        let mut backend = MemoryBackend::new();
        backend.fail_next_buffer(BufferUsage::Vertex);
        let mut mesh = triangle_mesh();
        let err = upload_mesh(&mut backend, &mut mesh, false).unwrap_err();
        assert!(matches!(err, AssetError::BackendFailure { what: "vertex buffer", .. }));
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn empty_mesh_is_rejected_before_backend_calls() {
        let mut backend = MemoryBackend::new();
        let mut mesh = Mesh::from_geometry(
            "empty",
            Geometry {
                data: MeshData::default(),
                aabb: Aabb::default(),
                material_name: None,
            },
        );
        let err = upload_mesh(&mut backend, &mut mesh, false).unwrap_err();
        assert!(matches!(err, AssetError::ZeroSizedBuffer(name) if name == "empty"));
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn release_destroys_both_buffers() {
        let mut backend = MemoryBackend::new();
        let mut mesh = triangle_mesh();
        upload_mesh(&mut backend, &mut mesh, false).unwrap();
        let gpu = mesh.gpu.take().unwrap();
        gpu.release(&mut backend);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn failed_image_is_destroyed() {
        let mut backend = MemoryBackend::new();
        backend.fail_next_image();
        let texture = TextureData::new_rgba8(16, 16, vec![128; 16 * 16 * 4]).unwrap();
        let err = upload_texture(&mut backend, &texture, "checker").unwrap_err();
        assert!(matches!(err, AssetError::BackendFailure { what: "image", .. }));
        assert_eq!(backend.live_images(), 0);

        let image = upload_texture(&mut backend, &texture, "checker").unwrap().unwrap();
        assert_eq!(backend.image_state(image), ResourceState::Valid);
        assert_eq!(upload_texture(&mut HeadlessBackend, &texture, "checker").unwrap(), None);
    }
}
