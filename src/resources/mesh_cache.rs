//! Binary mesh cache.
//!
//! Layout (little endian):
//!
//! ```text
//! "MSHC" | version: u32 | section count: u32 | sections...
//! section = tag: [u8; 4] | length: u64 | payload
//! ```
//!
//! Sections are `INFO` (counts, bounds, name), `VERT` (packed [`Vertex`]
//! array) and `INDX` (`u32` indices). Unknown tags are skipped. Any
//! version other than [`MESH_CACHE_VERSION`] is rejected and the caller
//! rebuilds the cache from the source asset.

use super::Mesh;
use crate::backend::types::Vertex;
use crate::scene::Aabb;
use glam::Vec3;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

pub const MESH_CACHE_MAGIC: [u8; 4] = *b"MSHC";
pub const MESH_CACHE_VERSION: u32 = 2;

const TAG_INFO: [u8; 4] = *b"INFO";
const TAG_VERTICES: [u8; 4] = *b"VERT";
const TAG_INDICES: [u8; 4] = *b"INDX";

#[derive(Error, Debug)]
pub enum MeshCacheError {
    #[error("mesh cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a mesh cache file")]
    BadMagic,
    #[error("mesh cache version {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("corrupt mesh cache: {0}")]
    Corrupt(&'static str),
    #[error("no source asset to rebuild {0}")]
    NoSource(String),
}

pub fn write(mesh: &Mesh, out: &mut impl Write) -> Result<(), MeshCacheError> {
    out.write_all(&MESH_CACHE_MAGIC)?;
    out.write_all(&MESH_CACHE_VERSION.to_le_bytes())?;
    out.write_all(&3u32.to_le_bytes())?;

    let mut info = Vec::new();
    info.extend_from_slice(&(mesh.vertices.len() as u32).to_le_bytes());
    info.extend_from_slice(&(mesh.indices.len() as u32).to_le_bytes());
    for v in mesh.bounds.min.to_array().into_iter().chain(mesh.bounds.max.to_array()) {
        info.extend_from_slice(&v.to_le_bytes());
    }
    info.extend_from_slice(mesh.name.as_bytes());

    write_section(out, TAG_INFO, &info)?;
    write_section(out, TAG_VERTICES, mesh.vertex_bytes())?;
    write_section(out, TAG_INDICES, mesh.index_bytes())?;
    Ok(())
}

fn write_section(out: &mut impl Write, tag: [u8; 4], payload: &[u8]) -> Result<(), MeshCacheError> {
    out.write_all(&tag)?;
    out.write_all(&(payload.len() as u64).to_le_bytes())?;
    out.write_all(payload)?;
    Ok(())
}

struct Info {
    vertex_count: usize,
    index_count: usize,
    bounds: Aabb,
    name: String,
}

fn parse_info(payload: &[u8]) -> Result<Info, MeshCacheError> {
    const FIXED: usize = 4 + 4 + 6 * 4;
    if payload.len() < FIXED {
        return Err(MeshCacheError::Corrupt("short INFO section"));
    }
    let word = |i: usize| [payload[i], payload[i + 1], payload[i + 2], payload[i + 3]];
    let float = |i: usize| f32::from_le_bytes(word(8 + i * 4));
    let name = String::from_utf8(payload[FIXED..].to_vec()).map_err(|_| MeshCacheError::Corrupt("mesh name is not UTF-8"))?;
    Ok(Info {
        vertex_count: u32::from_le_bytes(word(0)) as usize,
        index_count: u32::from_le_bytes(word(4)) as usize,
        bounds: Aabb::new(Vec3::new(float(0), float(1), float(2)), Vec3::new(float(3), float(4), float(5))),
        name,
    })
}

pub fn read(input: &mut impl Read) -> Result<Mesh, MeshCacheError> {
    let mut magic = [0u8; 4];
    input.read_exact(&mut magic)?;
    if magic != MESH_CACHE_MAGIC {
        return Err(MeshCacheError::BadMagic);
    }
    let version = read_u32(input)?;
    if version != MESH_CACHE_VERSION {
        return Err(MeshCacheError::VersionMismatch {
            found: version,
            expected: MESH_CACHE_VERSION,
        });
    }

    let section_count = read_u32(input)?;
    let mut info = None;
    let mut vertices = None;
    let mut indices = None;
    for _ in 0..section_count {
        let mut tag = [0u8; 4];
        input.read_exact(&mut tag)?;
        let mut length = [0u8; 8];
        input.read_exact(&mut length)?;
        let length = u64::from_le_bytes(length);

        let mut payload = Vec::new();
        input.by_ref().take(length).read_to_end(&mut payload)?;
        if payload.len() as u64 != length {
            return Err(MeshCacheError::Corrupt("truncated section"));
        }

        match tag {
            TAG_INFO => info = Some(parse_info(&payload)?),
            TAG_VERTICES => {
                if payload.len() % std::mem::size_of::<Vertex>() != 0 {
                    return Err(MeshCacheError::Corrupt("vertex section size"));
                }
                // The byte buffer has no alignment guarantee
                vertices = Some(
                    payload
                        .chunks_exact(std::mem::size_of::<Vertex>())
                        .map(bytemuck::pod_read_unaligned::<Vertex>)
                        .collect::<Vec<_>>(),
                );
            }
            TAG_INDICES => {
                if payload.len() % 4 != 0 {
                    return Err(MeshCacheError::Corrupt("index section size"));
                }
                indices = Some(
                    payload
                        .chunks_exact(4)
                        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                        .collect::<Vec<_>>(),
                );
            }
            other => log::debug!("Skipping unknown mesh cache section {:?}", String::from_utf8_lossy(&other)),
        }
    }

    let info = info.ok_or(MeshCacheError::Corrupt("missing INFO section"))?;
    let vertices: Vec<Vertex> = vertices.ok_or(MeshCacheError::Corrupt("missing VERT section"))?;
    let indices: Vec<u32> = indices.ok_or(MeshCacheError::Corrupt("missing INDX section"))?;
    if vertices.len() != info.vertex_count || indices.len() != info.index_count {
        return Err(MeshCacheError::Corrupt("element counts disagree with INFO"));
    }
    if indices.iter().any(|&i| i as usize >= vertices.len()) {
        return Err(MeshCacheError::Corrupt("index out of range"));
    }

    Ok(Mesh {
        name: info.name,
        vertices,
        indices,
        bounds: info.bounds,
    })
}

fn read_u32(input: &mut impl Read) -> Result<u32, MeshCacheError> {
    let mut bytes = [0u8; 4];
    input.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

pub fn load(path: &Path) -> Result<Mesh, MeshCacheError> {
    let mut file = std::io::BufReader::new(std::fs::File::open(path)?);
    read(&mut file)
}

pub fn save(mesh: &Mesh, path: &Path) -> Result<(), MeshCacheError> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write(mesh, &mut file)?;
    file.flush()?;
    Ok(())
}

/// Load `path`, or call `rebuild` and rewrite the cache when it is
/// missing, stale or unreadable.
pub fn load_or_rebuild<E>(path: &Path, rebuild: impl FnOnce() -> Result<Mesh, E>) -> Result<Mesh, E> {
    match load(path) {
        Ok(mesh) => return Ok(mesh),
        Err(MeshCacheError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No mesh cache at {}", path.display());
        }
        Err(e) => log::info!("Rebuilding mesh cache {}: {e}", path.display()),
    }
    let mesh = rebuild()?;
    if let Err(e) = save(&mesh, path) {
        log::warn!("Failed to write mesh cache {}: {e}", path.display());
    }
    Ok(mesh)
}
