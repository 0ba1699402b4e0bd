//! Little-endian binary codec for [`BindData`].
//!
//! Layout: magic `SDEF`, `u32` version, the bind matrix as 16 `f64` (row
//! major), source vertex count and target polygon count as `u32`, sparse flag
//! as `u8`, target name as `u32` length plus UTF-8 bytes, then the bound
//! vertices. Each vertex is its `u32` source index and `u32` bind count
//! followed by its binds: `u8` mode tag, `u32` index count and indices, `u32`
//! weight count and `f64` weights, `f64` influence and `f64` normal offset.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::geom::Transform;

use super::data::{Bind, BindData, BindMode, BoundVertex};
use super::error::PersistError;

pub const MAGIC: [u8; 4] = *b"SDEF";
pub const VERSION: u32 = 1;

/// Cap for up-front allocations driven by counts read from the stream.
const PREALLOC_LIMIT: usize = 4096;

fn write_len<W: Write>(writer: &mut W, len: usize) -> Result<(), PersistError> {
    let len = u32::try_from(len).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "length exceeds u32")
    })?;
    writer.write_u32::<LittleEndian>(len)?;
    Ok(())
}

fn read_len<R: Read>(reader: &mut R) -> Result<usize, PersistError> {
    Ok(reader.read_u32::<LittleEndian>()? as usize)
}

pub fn encode_bind_data<W: Write>(data: &BindData, writer: &mut W) -> Result<(), PersistError> {
    writer.write_all(&MAGIC)?;
    writer.write_u32::<LittleEndian>(VERSION)?;

    for row in data.matrix.as_matrix() {
        for &value in row {
            writer.write_f64::<LittleEndian>(value)?;
        }
    }
    write_len(writer, data.source_vertex_count)?;
    write_len(writer, data.target_polygon_count)?;
    writer.write_u8(u8::from(data.sparse))?;
    write_len(writer, data.target_name.len())?;
    writer.write_all(data.target_name.as_bytes())?;

    write_len(writer, data.verts.len())?;
    for vertex in &data.verts {
        writer.write_u32::<LittleEndian>(vertex.vertex_idx)?;
        write_len(writer, vertex.binds.len())?;
        for bind in &vertex.binds {
            writer.write_u8(bind.mode.tag())?;
            write_len(writer, bind.vert_inds.len())?;
            for &index in &bind.vert_inds {
                writer.write_u32::<LittleEndian>(index)?;
            }
            write_len(writer, bind.vert_weights.len())?;
            for &weight in &bind.vert_weights {
                writer.write_f64::<LittleEndian>(weight)?;
            }
            writer.write_f64::<LittleEndian>(bind.influence)?;
            writer.write_f64::<LittleEndian>(bind.normal_dist)?;
        }
    }

    Ok(())
}

fn decode_bind<R: Read>(reader: &mut R) -> Result<Bind, PersistError> {
    let tag = reader.read_u8()?;
    let mode = BindMode::from_tag(tag).ok_or(PersistError::UnknownMode(tag))?;

    let index_count = read_len(reader)?;
    if index_count < 3 {
        return Err(PersistError::TooFewVertices {
            mode: mode.name(),
            found: index_count,
        });
    }
    let mut vert_inds = Vec::with_capacity(index_count.min(PREALLOC_LIMIT));
    for _ in 0..index_count {
        vert_inds.push(reader.read_u32::<LittleEndian>()?);
    }

    let weight_count = read_len(reader)?;
    let expected = match mode {
        BindMode::Ngon => index_count,
        BindMode::Triangle | BindMode::Centroid => 3,
    };
    if weight_count != expected {
        return Err(PersistError::WeightCount {
            mode: mode.name(),
            found: weight_count,
            expected,
        });
    }
    let mut vert_weights = Vec::with_capacity(weight_count.min(PREALLOC_LIMIT));
    for _ in 0..weight_count {
        vert_weights.push(reader.read_f64::<LittleEndian>()?);
    }

    Ok(Bind {
        mode,
        vert_inds,
        vert_weights,
        influence: reader.read_f64::<LittleEndian>()?,
        normal_dist: reader.read_f64::<LittleEndian>()?,
    })
}

pub fn decode_bind_data<R: Read>(reader: &mut R) -> Result<BindData, PersistError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(PersistError::BadMagic(magic));
    }
    let version = reader.read_u32::<LittleEndian>()?;
    if version != VERSION {
        return Err(PersistError::UnsupportedVersion(version));
    }

    let mut m = [[0.0; 4]; 4];
    for row in &mut m {
        for value in row.iter_mut() {
            *value = reader.read_f64::<LittleEndian>()?;
        }
    }
    let source_vertex_count = read_len(reader)?;
    let target_polygon_count = read_len(reader)?;
    let sparse = reader.read_u8()? != 0;

    let name_len = read_len(reader)?;
    let mut name = Vec::with_capacity(name_len.min(PREALLOC_LIMIT));
    reader.by_ref().take(name_len as u64).read_to_end(&mut name)?;
    if name.len() != name_len {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }
    let target_name = String::from_utf8(name).map_err(|_| PersistError::InvalidName)?;

    let vert_count = read_len(reader)?;
    let mut verts = Vec::with_capacity(vert_count.min(PREALLOC_LIMIT));
    for _ in 0..vert_count {
        let vertex_idx = reader.read_u32::<LittleEndian>()?;
        if vertex_idx as usize >= source_vertex_count {
            return Err(PersistError::VertexIndex {
                index: vertex_idx as usize,
                count: source_vertex_count,
            });
        }
        let bind_count = read_len(reader)?;
        let mut binds = Vec::with_capacity(bind_count.min(PREALLOC_LIMIT));
        for _ in 0..bind_count {
            binds.push(decode_bind(reader)?);
        }
        verts.push(BoundVertex { vertex_idx, binds });
    }

    log::debug!("decoded bind data: {vert_count} vertices for '{target_name}'");

    Ok(BindData {
        matrix: Transform::from_matrix(m),
        source_vertex_count,
        target_polygon_count,
        sparse,
        target_name,
        verts,
    })
}
