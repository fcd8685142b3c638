//! Binary mesh format (`.cobj`, magic `CGMF`).
//!
//! # Layout
//! ```text
//! 0x00: magic "CGMF"
//! 0x04: version u32 (= 1)
//! 0x08: vertex_count u32
//! 0x0C: index_count u32
//! 0x10: aabb_min 3 x f32
//! 0x1C: aabb_max 3 x f32
//! 0x28: vertex_count * 32-byte vertex records (position, normal, uv)
//! var:  index_count * u32 indices
//! ```
//! All values are little-endian. Vertex records are read straight into
//! [`MeshVertex`] memory, so the record layout is tied to that struct.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

use bytemuck::Pod;
use glam::Vec3;

use crate::{
    error::{AssetError, AssetResult},
    mesh::{Aabb, Geometry, MeshData, MeshVertex},
};

pub const COBJ_MAGIC: [u8; 4] = *b"CGMF";
pub const COBJ_VERSION: u32 = 1;

/// Fixed-size `.cobj` header (40 bytes).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CobjHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub vertex_count: u32,
    pub index_count: u32,
    pub aabb_min: [f32; 3],
    pub aabb_max: [f32; 3],
}

impl CobjHeader {
    pub const SIZE: usize = 40;

    pub fn new(vertex_count: u32, index_count: u32, aabb: Aabb) -> Self {
        Self {
            magic: COBJ_MAGIC,
            version: COBJ_VERSION,
            vertex_count,
            index_count,
            aabb_min: aabb.min.to_array(),
            aabb_max: aabb.max.to_array(),
        }
    }

    /// Write header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.vertex_count.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.index_count.to_le_bytes());
        for (i, f) in self.aabb_min.iter().chain(&self.aabb_max).enumerate() {
            let at = 16 + i * 4;
            bytes[at..at + 4].copy_from_slice(&f.to_le_bytes());
        }
        bytes
    }

    /// Read header from bytes. Does not validate magic or version.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let f32_at = |at: usize| f32::from_bits(u32_at(at));
        Some(Self {
            magic: [bytes[0], bytes[1], bytes[2], bytes[3]],
            version: u32_at(4),
            vertex_count: u32_at(8),
            index_count: u32_at(12),
            aabb_min: [f32_at(16), f32_at(20), f32_at(24)],
            aabb_max: [f32_at(28), f32_at(32), f32_at(36)],
        })
    }

    /// Magic and version gate, then the zero-geometry check shared with the text path.
    pub fn validate(&self) -> AssetResult<()> {
        if self.magic != COBJ_MAGIC {
            return Err(AssetError::InvalidMagic { found: self.magic });
        }
        if self.version != COBJ_VERSION {
            return Err(AssetError::UnsupportedVersion(self.version));
        }
        if self.vertex_count == 0 || self.index_count == 0 {
            return Err(AssetError::ZeroGeometry {
                positions: self.vertex_count as usize,
                faces: self.index_count as usize / 3,
            });
        }
        Ok(())
    }

    /// Total file size implied by the header.
    pub fn expected_file_len(&self) -> u64 {
        Self::SIZE as u64
            + self.vertex_count as u64 * MeshVertex::SIZE as u64
            + self.index_count as u64 * 4
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::new(Vec3::from_array(self.aabb_min), Vec3::from_array(self.aabb_max))
    }
}

/// Load a binary mesh from a file path.
pub fn load_cobj_from_path(path: impl AsRef<Path>) -> AssetResult<Geometry> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| AssetError::io(path, e))?;
    let file_len = file.metadata().map_err(|e| AssetError::io(path, e))?.len();

    let mut reader = BufReader::new(file);
    let header = read_header(&mut reader)?;
    // Refuse to allocate for a body the file cannot contain.
    if header.expected_file_len() > file_len {
        return Err(AssetError::Truncated("mesh body"));
    }
    let geometry = read_body(&mut reader, &header, BodyLen::Verified)?;
    log::debug!(
        "Read binary mesh {}: {} vertices, {} indices",
        path.display(),
        header.vertex_count,
        header.index_count
    );
    Ok(geometry)
}

/// Read a binary mesh from any reader.
///
/// The body size is not known up front, so records are read in bounded
/// chunks and a lying header fails with `Truncated` before large
/// allocations happen.
pub fn read_cobj<R: Read>(mut reader: R) -> AssetResult<Geometry> {
    let header = read_header(&mut reader)?;
    read_body(&mut reader, &header, BodyLen::Unknown)
}

/// Whether the input is known to hold the whole body the header promises.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BodyLen {
    Verified,
    Unknown,
}

/// Records read per step when the body length is unknown.
const READ_CHUNK: usize = 4096;

fn read_header<R: Read>(reader: &mut R) -> AssetResult<CobjHeader> {
    let mut bytes = [0u8; CobjHeader::SIZE];
    reader
        .read_exact(&mut bytes)
        .map_err(|_| AssetError::Truncated("header"))?;
    let header = CobjHeader::from_bytes(&bytes).ok_or(AssetError::Truncated("header"))?;
    header.validate()?;
    Ok(header)
}

fn read_body<R: Read>(
    reader: &mut R,
    header: &CobjHeader,
    len: BodyLen,
) -> AssetResult<Geometry> {
    let vertex_count = header.vertex_count as usize;
    let index_count = header.index_count as usize;

    let mut vertices: Vec<MeshVertex> = read_records(reader, vertex_count, "vertices", len)?;
    let mut indices: Vec<u32> = read_records(reader, index_count, "indices", len)?;

    if cfg!(target_endian = "big") {
        for v in &mut vertices {
            for f in v.position.iter_mut().chain(&mut v.normal).chain(&mut v.uv) {
                *f = f32::from_bits(u32::from_le(f.to_bits()));
            }
        }
        for i in &mut indices {
            *i = u32::from_le(*i);
        }
    }

    if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(AssetError::IndexOutOfRange {
            index: bad as i64,
            count: vertex_count,
        });
    }

    Ok(Geometry {
        data: MeshData::new(vertices, indices),
        aabb: header.aabb(),
        material_name: None,
    })
}

fn read_records<T: Pod, R: Read>(
    reader: &mut R,
    count: usize,
    what: &'static str,
    len: BodyLen,
) -> AssetResult<Vec<T>> {
    if len == BodyLen::Verified {
        let mut records: Vec<T> = Vec::new();
        records
            .try_reserve_exact(count)
            .map_err(|_| AssetError::Allocation { what, count })?;
        records.resize(count, T::zeroed());
        reader
            .read_exact(bytemuck::cast_slice_mut(&mut records))
            .map_err(|_| AssetError::Truncated(what))?;
        return Ok(records);
    }

    let mut records: Vec<T> = Vec::new();
    let mut chunk = vec![T::zeroed(); count.min(READ_CHUNK)];
    while records.len() < count {
        let n = (count - records.len()).min(READ_CHUNK);
        reader
            .read_exact(bytemuck::cast_slice_mut(&mut chunk[..n]))
            .map_err(|_| AssetError::Truncated(what))?;
        records
            .try_reserve(n)
            .map_err(|_| AssetError::Allocation { what, count })?;
        records.extend_from_slice(&chunk[..n]);
    }
    records.shrink_to_fit();
    Ok(records)
}

/// Serialize mesh data to the binary format.
pub fn write_cobj<W: Write>(mut writer: W, data: &MeshData, aabb: &Aabb) -> io::Result<()> {
    let too_big = |what| io::Error::new(io::ErrorKind::InvalidInput, format!("too many {what}"));
    let vertex_count = u32::try_from(data.vertices.len()).map_err(|_| too_big("vertices"))?;
    let index_count = u32::try_from(data.indices.len()).map_err(|_| too_big("indices"))?;

    writer.write_all(&CobjHeader::new(vertex_count, index_count, *aabb).to_bytes())?;
    for v in &data.vertices {
        for f in v.position.iter().chain(&v.normal).chain(&v.uv) {
            writer.write_all(&f.to_le_bytes())?;
        }
    }
    for i in &data.indices {
        writer.write_all(&i.to_le_bytes())?;
    }
    writer.flush()
}

/// Write `geometry` to `path` in the binary format.
pub fn save_cobj(path: impl AsRef<Path>, geometry: &Geometry) -> AssetResult<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| AssetError::io(path, e))?;
    write_cobj(BufWriter::new(file), &geometry.data, &geometry.aabb)
        .map_err(|e| AssetError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{DEFAULT_NORMAL, DEFAULT_UV};

    fn quad() -> Geometry {
        let vertices = vec![
            MeshVertex::new([0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]),
            MeshVertex::new([1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0]),
            MeshVertex::new([1.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0]),
            MeshVertex::new([0.0, 1.0, -0.5], DEFAULT_NORMAL, DEFAULT_UV),
        ];
        let aabb = Aabb::from_vertices(&vertices);
        Geometry {
            data: MeshData::new(vertices, vec![0, 1, 2, 0, 2, 3]),
            aabb,
            material_name: None,
        }
    }

    fn encode(geometry: &Geometry) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_cobj(&mut bytes, &geometry.data, &geometry.aabb).unwrap();
        bytes
    }

    #[test]
    fn write_then_read_preserves_mesh() {
        let original = quad();
        let bytes = encode(&original);
        assert_eq!(
            bytes.len(),
            CobjHeader::SIZE + 4 * MeshVertex::SIZE + 6 * 4
        );
        let parsed = read_cobj(bytes.as_slice()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn header_layout_is_little_endian() {
        let bytes = encode(&quad());
        assert_eq!(&bytes[0..4], b"CGMF");
        assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &4u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &6u32.to_le_bytes());
        assert_eq!(&bytes[28..32], &1.0f32.to_le_bytes());
    }

    #[test]
    fn mutated_magic_is_rejected() {
        let mut bytes = encode(&quad());
        bytes[0] = b'X';
        let err = read_cobj(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, AssetError::InvalidMagic { found } if &found == b"XGMF"));
    }

    #[test]
    fn other_versions_are_rejected() {
        for version in [0u32, 2, 99] {
            let mut bytes = encode(&quad());
            bytes[4..8].copy_from_slice(&version.to_le_bytes());
            let err = read_cobj(bytes.as_slice()).unwrap_err();
            assert!(matches!(err, AssetError::UnsupportedVersion(v) if v == version));
        }
    }

    #[test]
    fn zero_vertex_header_is_rejected() {
        let header = CobjHeader::new(0, 10, Aabb::default());
        let err = read_cobj(header.to_bytes().as_slice()).unwrap_err();
        assert!(matches!(err, AssetError::ZeroGeometry { positions: 0, .. }));
    }

    #[test]
    fn truncated_body_is_rejected() {
        let bytes = encode(&quad());
        let err = read_cobj(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, AssetError::Truncated("indices")));
        let err = read_cobj(&bytes[..CobjHeader::SIZE + 10]).unwrap_err();
        assert!(matches!(err, AssetError::Truncated("vertices")));
        let err = read_cobj(&bytes[..12]).unwrap_err();
        assert!(matches!(err, AssetError::Truncated("header")));
    }

    #[test]
    fn lying_header_on_a_stream_fails_as_truncated() {
        let header = CobjHeader::new(u32::MAX, u32::MAX, Aabb::default());
        let mut bytes = header.to_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 64]);
        let err = read_cobj(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, AssetError::Truncated("vertices")));
    }

    #[test]
    fn stream_reads_span_several_chunks() {
        let count = READ_CHUNK * 2 + 4;
        let vertices: Vec<MeshVertex> = (0..count)
            .map(|i| MeshVertex::new([i as f32, 0.0, 0.0], DEFAULT_NORMAL, DEFAULT_UV))
            .collect();
        let indices: Vec<u32> = (0..count as u32).collect();
        let data = MeshData::new(vertices, indices);
        let aabb = Aabb::from_vertices(&data.vertices);

        let mut bytes = Vec::new();
        write_cobj(&mut bytes, &data, &aabb).unwrap();
        let parsed = read_cobj(bytes.as_slice()).unwrap();
        assert_eq!(parsed.data, data);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut geometry = quad();
        geometry.data.indices[4] = 4;
        let err = read_cobj(encode(&geometry).as_slice()).unwrap_err();
        assert!(matches!(err, AssetError::IndexOutOfRange { index: 4, count: 4 }));
    }

    #[test]
    fn oversized_header_fails_before_allocating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.cobj");
        let header = CobjHeader::new(u32::MAX, u32::MAX, Aabb::default());
        std::fs::write(&path, header.to_bytes()).unwrap();
        let err = load_cobj_from_path(&path).unwrap_err();
        assert!(matches!(err, AssetError::Truncated("mesh body")));
    }

    #[test]
    fn save_and_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.cobj");
        save_cobj(&path, &quad()).unwrap();
        assert_eq!(load_cobj_from_path(&path).unwrap(), quad());
    }
}
