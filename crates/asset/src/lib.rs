//! Asset loading and GPU resource lifecycle.
//! Meshes come from text `.obj` or binary `.cobj` files, are uploaded through
//! a [`GpuBackend`], and are owned by a fixed-capacity [`AssetRegistry`]
//! populated from a manifest of per-asset metadata files.

pub mod cobj;
pub mod error;
pub mod geometry;
pub mod gpu;
pub mod loader;
pub mod manifest;
pub mod material;
pub mod mesh;
pub mod obj;
pub mod registry;
pub mod texture;

pub use error::{AssetError, AssetResult};
pub use geometry::{MeshFormat, load_geometry};
pub use gpu::{
    BufferHandle, BufferUsage, GpuBackend, GpuMeshResources, HeadlessBackend, ImageHandle,
    MemoryBackend, ResourceState,
};
pub use loader::{LoadFailure, LoadReport};
pub use material::Material;
pub use mesh::{Aabb, Geometry, Mesh, MeshData, MeshVertex};
pub use registry::{AssetRegistry, MeshId, RegistryConfig, Renderable};
pub use texture::{Texture, TextureData};
