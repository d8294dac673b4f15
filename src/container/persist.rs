//! Serialisation and storage for [`BloscContainer`] (spec.md §6a).
//!
//! The on-disk byte layout is internal to this crate (spec.md §6 explicitly
//! leaves it unspecified); `sequential` storage writes exactly the
//! [`serialize_container`] bytes to one file, `!sequential` storage spreads
//! the same information across a small directory — one file per chunk plus
//! a manifest — mirroring the teacher's `store/filesystem.rs` split between
//! a single-file store and a walked directory tree.

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use fs4::FileExt;

use crate::config::{ChunkParams, CompressionConfig, Storage};
use crate::error::{CatervaError, Result};

use super::blosc_backend::{BlockAddress, BloscContainer, ChunkSlot, CompressedChunk};
use super::Container;

fn compressor_code(c: blosc::Compressor) -> u8 {
    use blosc::Compressor::*;
    match c {
        BloscLZ => 0,
        LZ4 => 1,
        LZ4HC => 2,
        Snappy => 3,
        Zlib => 4,
        Zstd => 5,
        Invalid => 255,
    }
}

fn compressor_from_code(code: u8) -> Result<blosc::Compressor> {
    use blosc::Compressor::*;
    Ok(match code {
        0 => BloscLZ,
        1 => LZ4,
        2 => LZ4HC,
        3 => Snappy,
        4 => Zlib,
        5 => Zstd,
        _ => return Err(CatervaError::InvalidStorage(format!("unknown compressor code {code}"))),
    })
}

fn clevel_from_code(code: u8) -> Result<blosc::Clevel> {
    use blosc::Clevel::*;
    Ok(match code {
        0 => None,
        1 => L1,
        2 => L2,
        3 => L3,
        4 => L4,
        5 => L5,
        6 => L6,
        7 => L7,
        8 => L8,
        9 => L9,
        _ => return Err(CatervaError::InvalidStorage(format!("unknown clevel code {code}"))),
    })
}

fn shuffle_from_code(code: u8) -> Result<blosc::ShuffleMode> {
    use blosc::ShuffleMode::*;
    Ok(match code {
        0 => None,
        1 => Byte,
        2 => Bit,
        _ => return Err(CatervaError::InvalidStorage(format!("unknown shuffle code {code}"))),
    })
}

fn write_bytes<W: Write>(w: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    w.write_u64::<LittleEndian>(bytes.len() as u64)?;
    w.write_all(bytes)
}

fn read_bytes<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let len = r.read_u64::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn write_meta_table<W: Write>(w: &mut W, table: &[(String, Vec<u8>)]) -> std::io::Result<()> {
    w.write_u32::<LittleEndian>(table.len() as u32)?;
    for (name, value) in table {
        write_bytes(w, name.as_bytes())?;
        write_bytes(w, value)?;
    }
    Ok(())
}

fn read_meta_table<R: Read>(r: &mut R) -> Result<Vec<(String, Vec<u8>)>> {
    let n = r.read_u32::<LittleEndian>()?;
    let mut out = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let name = String::from_utf8(read_bytes(r)?)
            .map_err(|_| CatervaError::InvalidStorage("metadata name is not valid utf-8".into()))?;
        let value = read_bytes(r)?;
        out.push((name, value));
    }
    Ok(out)
}

fn write_chunk<W: Write>(w: &mut W, chunk: &ChunkSlot) -> std::io::Result<()> {
    match chunk {
        ChunkSlot::Special { pattern } => {
            w.write_u8(0)?;
            write_bytes(w, pattern)?;
        }
        ChunkSlot::Compressed(c) => {
            w.write_u8(1)?;
            w.write_u32::<LittleEndian>(c.block_addrs.len() as u32)?;
            for addr in &c.block_addrs {
                w.write_u64::<LittleEndian>(addr.offset)?;
                w.write_u64::<LittleEndian>(addr.nbytes)?;
            }
            write_bytes(w, &c.payload)?;
        }
    }
    Ok(())
}

fn read_chunk<R: Read>(r: &mut R) -> Result<ChunkSlot> {
    let tag = r.read_u8()?;
    match tag {
        0 => Ok(ChunkSlot::Special { pattern: read_bytes(r)? }),
        1 => {
            let n = r.read_u32::<LittleEndian>()?;
            let mut block_addrs = Vec::with_capacity(n as usize);
            for _ in 0..n {
                let offset = r.read_u64::<LittleEndian>()?;
                let nbytes = r.read_u64::<LittleEndian>()?;
                block_addrs.push(BlockAddress { offset, nbytes });
            }
            let payload = read_bytes(r)?;
            Ok(ChunkSlot::Compressed(CompressedChunk { block_addrs, payload }))
        }
        _ => Err(CatervaError::InvalidStorage(format!("unknown chunk tag {tag}"))),
    }
}

fn write_params<W: Write>(w: &mut W, params: &ChunkParams) -> std::io::Result<()> {
    w.write_u64::<LittleEndian>(params.itemsize as u64)?;
    w.write_u8(params.extchunkshape.len() as u8)?;
    for v in &params.extchunkshape {
        w.write_i32::<LittleEndian>(*v)?;
    }
    for v in &params.blockshape {
        w.write_i32::<LittleEndian>(*v)?;
    }
    Ok(())
}

fn read_params<R: Read>(r: &mut R) -> Result<ChunkParams> {
    let itemsize = r.read_u64::<LittleEndian>()? as usize;
    let ndim = r.read_u8()? as usize;
    let mut extchunkshape = crate::shape::TileShape::with_capacity(ndim);
    for _ in 0..ndim {
        extchunkshape.push(r.read_i32::<LittleEndian>()?);
    }
    let mut blockshape = crate::shape::TileShape::with_capacity(ndim);
    for _ in 0..ndim {
        blockshape.push(r.read_i32::<LittleEndian>()?);
    }
    Ok(ChunkParams { itemsize, extchunkshape, blockshape })
}

fn write_compression<W: Write>(w: &mut W, c: &CompressionConfig) -> std::io::Result<()> {
    w.write_u8(compressor_code(c.compressor))?;
    w.write_u8(c.clevel as u8)?;
    w.write_u8(c.shuffle as u8)?;
    Ok(())
}

fn read_compression<R: Read>(r: &mut R) -> Result<CompressionConfig> {
    let compressor = compressor_from_code(r.read_u8()?)?;
    let clevel = clevel_from_code(r.read_u8()?)?;
    let shuffle = shuffle_from_code(r.read_u8()?)?;
    Ok(CompressionConfig { compressor, clevel, shuffle })
}

const MAGIC: &[u8; 4] = b"CATV";
const FORMAT_VERSION: u8 = 0;

pub(crate) fn serialize_container(c: &BloscContainer) -> Result<Vec<u8>> {
    let mut w = Cursor::new(Vec::new());
    w.write_all(MAGIC)?;
    w.write_u8(FORMAT_VERSION)?;
    write_params(&mut w, c.params())?;
    write_compression(&mut w, c.compression())?;
    w.write_u32::<LittleEndian>(c.chunks().len() as u32)?;
    for chunk in c.chunks() {
        write_chunk(&mut w, chunk)?;
    }
    write_meta_table(&mut w, c.fixed_meta())?;
    write_meta_table(&mut w, c.var_meta())?;

    let mut bytes = w.into_inner();
    let checksum = crc32c::crc32c(&bytes);
    bytes.write_u32::<LittleEndian>(checksum)?;
    Ok(bytes)
}

pub(crate) fn deserialize_container(bytes: &[u8]) -> Result<BloscContainer> {
    if bytes.len() < 4 {
        return Err(CatervaError::InvalidStorage("container frame too short".into()));
    }
    let (body, trailer) = bytes.split_at(bytes.len() - 4);
    let stored_checksum = u32::from_le_bytes(trailer.try_into().unwrap());
    if crc32c::crc32c(body) != stored_checksum {
        return Err(CatervaError::InvalidStorage("container frame failed checksum verification".into()));
    }

    let mut r = Cursor::new(body);
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(CatervaError::InvalidStorage("not a caterva container frame".into()));
    }
    let version = r.read_u8()?;
    if version > FORMAT_VERSION {
        return Err(CatervaError::InvalidStorage(format!(
            "container frame version {version} is newer than supported {FORMAT_VERSION}"
        )));
    }
    let params = read_params(&mut r)?;
    let compression = read_compression(&mut r)?;
    let nchunks = r.read_u32::<LittleEndian>()?;
    let mut chunks = Vec::with_capacity(nchunks as usize);
    for _ in 0..nchunks {
        chunks.push(read_chunk(&mut r)?);
    }
    let fixed_meta = read_meta_table(&mut r)?;
    let var_meta = read_meta_table(&mut r)?;
    Ok(BloscContainer::from_parts(params, compression, chunks, fixed_meta, var_meta))
}

pub(crate) fn persist(c: &BloscContainer, storage: &Storage) -> Result<()> {
    let Some(path) = storage.urlpath.as_ref() else {
        return Ok(());
    };
    if storage.sequential {
        persist_sequential(c, path)
    } else {
        persist_sparse(c, path)
    }
}

fn persist_sequential(c: &BloscContainer, path: &Path) -> Result<()> {
    let bytes = serialize_container(c)?;
    let file = fs::File::create(path)?;
    file.lock_exclusive()?;
    (&file).write_all(&bytes)?;
    FileExt::unlock(&file)?;
    Ok(())
}

/// Sparse directory layout: `manifest.bin` holds header/metadata, and each
/// chunk gets its own `chunk.<n>.bin` file (grounded on the teacher's
/// `store/filesystem.rs`, which likewise splits a store into one file per
/// key rather than one contiguous blob).
fn persist_sparse(c: &BloscContainer, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;

    let mut manifest = Cursor::new(Vec::new());
    manifest.write_all(MAGIC)?;
    manifest.write_u8(FORMAT_VERSION)?;
    write_params(&mut manifest, c.params())?;
    write_compression(&mut manifest, c.compression())?;
    manifest.write_u32::<LittleEndian>(c.chunks().len() as u32)?;
    write_meta_table(&mut manifest, c.fixed_meta())?;
    write_meta_table(&mut manifest, c.var_meta())?;

    let manifest_path = dir.join("manifest.bin");
    let file = fs::File::create(&manifest_path)?;
    file.lock_exclusive()?;
    (&file).write_all(&manifest.into_inner())?;
    FileExt::unlock(&file)?;

    for (i, chunk) in c.chunks().iter().enumerate() {
        let mut buf = Cursor::new(Vec::new());
        write_chunk(&mut buf, chunk)?;
        let chunk_path = dir.join(format!("chunk.{i}.bin"));
        fs::write(chunk_path, buf.into_inner())?;
    }
    Ok(())
}

pub(crate) fn open(storage: &Storage) -> Result<BloscContainer> {
    let path = storage
        .urlpath
        .as_ref()
        .ok_or_else(|| CatervaError::InvalidStorage("open requires a storage path".into()))?;
    if storage.sequential {
        open_sequential(path)
    } else {
        open_sparse(path)
    }
}

fn open_sequential(path: &Path) -> Result<BloscContainer> {
    let bytes = fs::read(path)?;
    deserialize_container(&bytes)
}

fn open_sparse(dir: &Path) -> Result<BloscContainer> {
    let manifest_bytes = fs::read(dir.join("manifest.bin"))?;
    let mut r = Cursor::new(&manifest_bytes[..]);
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(CatervaError::InvalidStorage("not a caterva container manifest".into()));
    }
    let version = r.read_u8()?;
    if version > FORMAT_VERSION {
        return Err(CatervaError::InvalidStorage(format!(
            "container manifest version {version} is newer than supported {FORMAT_VERSION}"
        )));
    }
    let params = read_params(&mut r)?;
    let compression = read_compression(&mut r)?;
    let nchunks = r.read_u32::<LittleEndian>()?;
    let fixed_meta = read_meta_table(&mut r)?;
    let var_meta = read_meta_table(&mut r)?;

    let mut chunks = Vec::with_capacity(nchunks as usize);
    for i in 0..nchunks {
        let bytes = fs::read(dir.join(format!("chunk.{i}.bin")))?;
        let mut cr = Cursor::new(&bytes[..]);
        chunks.push(read_chunk(&mut cr)?);
    }
    Ok(BloscContainer::from_parts(params, compression, chunks, fixed_meta, var_meta))
}

pub(crate) fn remove_urlpath(path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}
