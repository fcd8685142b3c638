//! Renderer: wgpu implementation of the asset `GpuBackend`.
//! wgpu = 0.26.x

use std::collections::HashMap;

use asset::{
    BufferHandle, BufferUsage, GpuBackend, ImageHandle, MeshVertex, ResourceState, TextureData,
};
use thiserror::Error;
use wgpu::{
    Backends, Buffer, BufferUsages, Device, DeviceDescriptor, ErrorFilter, Extent3d, Features,
    Instance, InstanceDescriptor, Limits, PowerPreference, Queue, RequestAdapterOptions, Texture,
    TextureDescriptor, TextureDimension, TextureFormat, TextureUsages, VertexBufferLayout,
    VertexStepMode,
    util::{BufferInitDescriptor, DeviceExt, TextureDataOrder},
};

/// Vertex layout matching `asset::MeshVertex`: position, normal, uv.
pub const MESH_VERTEX_LAYOUT: VertexBufferLayout<'static> = VertexBufferLayout {
    array_stride: MeshVertex::SIZE as u64,
    step_mode: VertexStepMode::Vertex,
    attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2],
};

/// Mesh indices are always 32-bit.
pub const MESH_INDEX_FORMAT: wgpu::IndexFormat = wgpu::IndexFormat::Uint32;

const TEXTURE_FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("No suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("request_device failed: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

/// A created resource and whether validation rejected it.
struct Tracked<T> {
    resource: T,
    failed: bool,
}

/// `GpuBackend` on a wgpu device. Ids are never reused.
pub struct WgpuBackend {
    device: Device,
    queue: Queue,
    buffers: HashMap<u32, Tracked<Buffer>>,
    textures: HashMap<u32, Tracked<Texture>>,
    next_id: u32,
}

impl WgpuBackend {
    /// Create an offscreen device on one of `backends`.
    pub async fn new(backends: Backends) -> Result<Self, RendererError> {
        let instance = Instance::new(&InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;
        log::info!("GPU adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&DeviceDescriptor {
                label: Some("CGame Asset Device"),
                required_features: Features::empty(),
                required_limits: Limits::downlevel_webgl2_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await?;

        Ok(Self::from_device(device, queue))
    }

    /// Wrap a device owned by an existing renderer.
    pub fn from_device(device: Device, queue: Queue) -> Self {
        Self {
            device,
            queue,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// The wgpu buffer behind a valid handle, for draw calls.
    pub fn buffer(&self, handle: BufferHandle) -> Option<&Buffer> {
        self.buffers
            .get(&handle.id())
            .filter(|t| !t.failed)
            .map(|t| &t.resource)
    }

    pub fn texture(&self, handle: ImageHandle) -> Option<&Texture> {
        self.textures
            .get(&handle.id())
            .filter(|t| !t.failed)
            .map(|t| &t.resource)
    }

    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Run `create` inside a validation scope; `true` if wgpu rejected it.
    fn validated<T>(
        &self,
        what: &str,
        label: &str,
        create: impl FnOnce(&Device) -> T,
    ) -> (T, bool) {
        self.device.push_error_scope(ErrorFilter::Validation);
        let resource = create(&self.device);
        let failed = match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => {
                log::error!("Failed to create {} '{}': {}", what, label, err);
                true
            }
            None => false,
        };
        (resource, failed)
    }
}

impl GpuBackend for WgpuBackend {
    fn create_buffer(&mut self, usage: BufferUsage, data: &[u8], label: &str) -> BufferHandle {
        let usage = match usage {
            BufferUsage::Vertex => BufferUsages::VERTEX,
            BufferUsage::Index => BufferUsages::INDEX,
        };
        let (buffer, failed) = self.validated("buffer", label, |device| {
            device.create_buffer_init(&BufferInitDescriptor {
                label: Some(label),
                contents: data,
                usage,
            })
        });
        let id = self.allocate_id();
        self.buffers.insert(
            id,
            Tracked {
                resource: buffer,
                failed,
            },
        );
        BufferHandle::new(id)
    }

    fn buffer_state(&self, buffer: BufferHandle) -> ResourceState {
        match self.buffers.get(&buffer.id()) {
            Some(t) if t.failed => ResourceState::Failed,
            Some(_) => ResourceState::Valid,
            None => ResourceState::Invalid,
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        match self.buffers.remove(&buffer.id()) {
            Some(t) => t.resource.destroy(),
            None => log::warn!("destroy_buffer: unknown buffer {}", buffer.id()),
        }
    }

    fn create_image(&mut self, texture: &TextureData, label: &str) -> ImageHandle {
        let queue = &self.queue;
        let (image, failed) = self.validated("texture", label, |device| {
            device.create_texture_with_data(
                queue,
                &TextureDescriptor {
                    label: Some(label),
                    size: Extent3d {
                        width: texture.width,
                        height: texture.height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: TextureDimension::D2,
                    format: TEXTURE_FORMAT,
                    usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
                    view_formats: &[],
                },
                TextureDataOrder::LayerMajor,
                &texture.data,
            )
        });
        let id = self.allocate_id();
        self.textures.insert(
            id,
            Tracked {
                resource: image,
                failed,
            },
        );
        ImageHandle::new(id)
    }

    fn image_state(&self, image: ImageHandle) -> ResourceState {
        match self.textures.get(&image.id()) {
            Some(t) if t.failed => ResourceState::Failed,
            Some(_) => ResourceState::Valid,
            None => ResourceState::Invalid,
        }
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        match self.textures.remove(&image.id()) {
            Some(t) => t.resource.destroy(),
            None => log::warn!("destroy_image: unknown image {}", image.id()),
        }
    }
}
