//! CPU-side mesh representation used by loaders and the registry.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::{
    error::{AssetError, AssetResult},
    gpu::GpuMeshResources,
};

/// Mesh names are identifiers of at most this many characters.
pub const MAX_MESH_NAME: usize = 63;

/// Normal used when a face corner does not reference one.
pub const DEFAULT_NORMAL: [f32; 3] = [0.0, 1.0, 0.0];
/// Texture coordinate used when a face corner does not reference one.
pub const DEFAULT_UV: [f32; 2] = [0.0, 0.0];

/// Vertex with position/normal/uv. Values are in object space.
///
/// The layout is the on-disk record of the binary `.cobj` format
/// (32 bytes, little-endian `f32`s), so field order must not change.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl MeshVertex {
    pub const SIZE: usize = std::mem::size_of::<MeshVertex>();

    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box enclosing every vertex position. Empty input yields a zero box.
    pub fn from_vertices(vertices: &[MeshVertex]) -> Self {
        let mut iter = vertices.iter().map(|v| Vec3::from_array(v.position));
        let Some(first) = iter.next() else {
            return Self::default();
        };
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Self { min, max }
    }
}

/// Indexed triangle mesh with tightly-packed vertices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<MeshVertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Returns `true` if both vertex and index buffers are non-empty.
    pub fn is_valid(&self) -> bool {
        !self.vertices.is_empty() && !self.indices.is_empty()
    }

    /// Returns `true` if every index addresses an existing vertex.
    pub fn indices_in_bounds(&self) -> bool {
        let count = self.vertices.len();
        self.indices.iter().all(|&i| (i as usize) < count)
    }

    /// Reject empty data and indices that address missing vertices.
    pub fn validate(&self) -> AssetResult<()> {
        if !self.is_valid() {
            return Err(AssetError::ZeroGeometry {
                positions: self.vertices.len(),
                faces: self.indices.len() / 3,
            });
        }
        if !self.indices_in_bounds() {
            let count = self.vertices.len();
            let bad = self.indices.iter().copied().find(|&i| i as usize >= count);
            return Err(AssetError::IndexOutOfRange {
                index: bad.map_or(-1, i64::from),
                count,
            });
        }
        Ok(())
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// Output of a geometry parser: mesh data plus what the file said about it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Geometry {
    pub data: MeshData,
    pub aabb: Aabb,
    /// Material named by the last `usemtl` line (text format only).
    pub material_name: Option<String>,
}

/// A named mesh owned by the registry.
///
/// CPU arrays live in `cpu` until the uploader moves the data to the GPU;
/// counts and bounds stay valid either way.
#[derive(Debug)]
pub struct Mesh {
    name: String,
    material_name: Option<String>,
    vertex_count: usize,
    index_count: usize,
    aabb: Aabb,
    pub(crate) cpu: Option<MeshData>,
    pub(crate) gpu: Option<GpuMeshResources>,
}

impl Mesh {
    pub fn from_geometry(name: impl Into<String>, geometry: Geometry) -> Self {
        let Geometry {
            data,
            aabb,
            material_name,
        } = geometry;
        Self {
            name: name.into(),
            material_name,
            vertex_count: data.vertices.len(),
            index_count: data.indices.len(),
            aabb,
            cpu: Some(data),
            gpu: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn material_name(&self) -> Option<&str> {
        self.material_name.as_deref()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn index_count(&self) -> usize {
        self.index_count
    }

    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    /// CPU geometry, if still resident (headless mode or retained on purpose).
    pub fn data(&self) -> Option<&MeshData> {
        self.cpu.as_ref()
    }

    pub fn gpu_resources(&self) -> Option<&GpuMeshResources> {
        self.gpu.as_ref()
    }
}
