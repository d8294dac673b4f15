use blosc::Context;

use crate::config::{ChunkParams, CompressionConfig, Storage};
use crate::error::{CatervaError, Result};
use crate::shape::{self, CoordVec};

use super::persist;
use super::Container;

/// One compressed block's location inside a chunk's concatenated payload.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BlockAddress {
    pub offset: u64,
    pub nbytes: u64,
}

/// A chunk that has been run through the codec: one block per cell of the
/// chunk's block grid, each compressed independently so that a read can
/// decompress only the blocks it actually needs.
#[derive(Clone, Debug)]
pub(crate) struct CompressedChunk {
    pub block_addrs: Vec<BlockAddress>,
    pub payload: Vec<u8>,
}

/// A chunk that skips the codec entirely: every item is `pattern` repeated.
/// Used for `zeros`/`full`/uninitialised fills so those containers cost no
/// compression time and a fixed, tiny amount of storage (spec.md §4.7).
#[derive(Clone, Debug)]
pub(crate) enum ChunkSlot {
    Special { pattern: Vec<u8> },
    Compressed(CompressedChunk),
}

/// Reference [`Container`] backend: real Blosc compression via the `blosc`
/// crate, block-offset-table chunk layout grounded on the teacher's
/// `ChunkIndex`/`ChunkSpec` (`chunk_arr.rs`) and `ShardingIndexedCodec`
/// (`codecs/ab/sharding_indexed.rs`).
///
/// Holds no interior mutability, so shared immutable references (`&self`)
/// — used by every read path — are `Sync` for free; the one open question
/// spec.md §9 flags (safety of concurrent reads) is therefore answered at
/// the type level rather than by a runtime lock.
pub struct BloscContainer {
    params: ChunkParams,
    compression: CompressionConfig,
    chunks: Vec<ChunkSlot>,
    fixed_meta: Vec<(String, Vec<u8>)>,
    var_meta: Vec<(String, Vec<u8>)>,
}

impl BloscContainer {
    fn blocks_grid(&self) -> CoordVec<i64> {
        let ndim = self.params.extchunkshape.len();
        if ndim == 0 {
            return smallvec::smallvec![1];
        }
        self.params
            .extchunkshape
            .iter()
            .zip(self.params.blockshape.iter())
            .map(|(e, b)| (*e as i64) / (*b as i64))
            .collect()
    }

    fn extchunkshape_i64(&self) -> CoordVec<i64> {
        self.params.extchunkshape.iter().map(|v| *v as i64).collect()
    }

    fn blockshape_i64(&self) -> CoordVec<i64> {
        self.params.blockshape.iter().map(|v| *v as i64).collect()
    }

    fn blocknitems(&self) -> usize {
        if self.params.blockshape.is_empty() {
            return 1;
        }
        self.params.blockshape.iter().map(|b| *b as usize).product()
    }

    fn extchunknitems(&self) -> usize {
        if self.params.extchunkshape.is_empty() {
            return 1;
        }
        self.params.extchunkshape.iter().map(|v| *v as usize).product()
    }

    fn compress_block(&self, block: &[u8]) -> Result<Vec<u8>> {
        let ctx = Context::new()
            .compressor(self.compression.compressor)
            .map_err(|_| CatervaError::CodecFailed("unsupported compressor".into()))?
            .clevel(self.compression.clevel)
            .shuffle(self.compression.shuffle)
            .typesize(Some(self.params.itemsize));
        let buffer = ctx.compress(block);
        Ok(buffer.into())
    }

    fn decompress_block(&self, compressed: &[u8]) -> Result<Vec<u8>> {
        unsafe { blosc::decompress_bytes(compressed) }
            .map_err(|_| CatervaError::CodecFailed("block decompression failed".into()))
    }

    fn compress_raw(&self, raw: &[u8]) -> Result<CompressedChunk> {
        let ndim = self.params.extchunkshape.len();
        let extchunkshape = self.extchunkshape_i64();
        let blockshape = self.blockshape_i64();
        let grid = self.blocks_grid();
        let nblocks: i64 = grid.iter().product();
        let block_nitems = self.blocknitems();
        let itemsize = self.params.itemsize;

        let mut block_addrs = Vec::with_capacity(nblocks as usize);
        let mut payload = Vec::new();
        let grid_strides = shape::strides(&grid);

        for b in 0..nblocks {
            let block_idx = shape::lin_to_multi(b, &grid, &grid_strides);
            let start: CoordVec<i64> = block_idx
                .iter()
                .zip(blockshape.iter())
                .map(|(i, bs)| i * bs)
                .collect();
            let stop: CoordVec<i64> = start.iter().zip(blockshape.iter()).map(|(s, bs)| s + bs).collect();

            let mut block_buf = vec![0u8; block_nitems * itemsize];
            if ndim == 0 {
                block_buf.copy_from_slice(&raw[..itemsize]);
            } else {
                crate::copy_rect::copy_rect(
                    itemsize,
                    raw,
                    &extchunkshape,
                    &start,
                    &stop,
                    &mut block_buf,
                    &blockshape,
                    &shape::CoordVec::from_elem(0, ndim),
                );
            }

            let compressed = self.compress_block(&block_buf)?;
            block_addrs.push(BlockAddress {
                offset: payload.len() as u64,
                nbytes: compressed.len() as u64,
            });
            payload.extend_from_slice(&compressed);
        }

        Ok(CompressedChunk { block_addrs, payload })
    }

    fn decompress_into(&self, chunk: &CompressedChunk, out: &mut [u8], mask: Option<&[bool]>) -> Result<()> {
        let ndim = self.params.extchunkshape.len();
        let extchunkshape = self.extchunkshape_i64();
        let blockshape = self.blockshape_i64();
        let grid = self.blocks_grid();
        let grid_strides = shape::strides(&grid);
        let itemsize = self.params.itemsize;

        for (b, addr) in chunk.block_addrs.iter().enumerate() {
            if let Some(m) = mask {
                if m[b] {
                    continue;
                }
            }
            let compressed = &chunk.payload[addr.offset as usize..(addr.offset + addr.nbytes) as usize];
            let block_buf = self.decompress_block(compressed)?;

            let block_idx = shape::lin_to_multi(b as i64, &grid, &grid_strides);
            let start: CoordVec<i64> = block_idx
                .iter()
                .zip(blockshape.iter())
                .map(|(i, bs)| i * bs)
                .collect();
            let stop: CoordVec<i64> = start.iter().zip(blockshape.iter()).map(|(s, bs)| s + bs).collect();

            if ndim == 0 {
                out[..itemsize].copy_from_slice(&block_buf[..itemsize]);
            } else {
                crate::copy_rect::copy_rect(
                    itemsize,
                    &block_buf,
                    &blockshape,
                    &shape::CoordVec::from_elem(0, ndim),
                    &(stop.iter().zip(start.iter()).map(|(e, s)| e - s).collect::<CoordVec<i64>>()),
                    out,
                    &extchunkshape,
                    &start,
                );
            }
        }
        Ok(())
    }

    fn fill_from_pattern(pattern: &[u8], out: &mut [u8]) {
        for chunk in out.chunks_mut(pattern.len()) {
            chunk.copy_from_slice(&pattern[..chunk.len()]);
        }
    }
}

impl Container for BloscContainer {
    fn new(params: ChunkParams, compression: CompressionConfig) -> Self {
        Self {
            params,
            compression,
            chunks: Vec::new(),
            fixed_meta: Vec::new(),
            var_meta: Vec::new(),
        }
    }

    fn params(&self) -> &ChunkParams {
        &self.params
    }

    fn nchunks(&self) -> usize {
        self.chunks.len()
    }

    fn push_chunk(&mut self, raw: &[u8]) -> Result<usize> {
        let compressed = self.compress_raw(raw)?;
        self.chunks.push(ChunkSlot::Compressed(compressed));
        Ok(self.chunks.len() - 1)
    }

    fn update_chunk(&mut self, index: usize, raw: &[u8]) -> Result<()> {
        if index >= self.chunks.len() {
            return Err(CatervaError::InvalidIndex(format!("no chunk at index {index}")));
        }
        let compressed = self.compress_raw(raw)?;
        self.chunks[index] = ChunkSlot::Compressed(compressed);
        Ok(())
    }

    fn push_special(&mut self, pattern: &[u8]) -> Result<usize> {
        if pattern.len() != self.params.itemsize {
            return Err(CatervaError::InvalidArgument(
                "special chunk pattern must be exactly one item wide".into(),
            ));
        }
        self.chunks.push(ChunkSlot::Special { pattern: pattern.to_vec() });
        Ok(self.chunks.len() - 1)
    }

    fn decompress_chunk(&self, index: usize, out: &mut [u8]) -> Result<()> {
        match self.chunks.get(index) {
            None => Err(CatervaError::InvalidIndex(format!("no chunk at index {index}"))),
            Some(ChunkSlot::Special { pattern }) => {
                Self::fill_from_pattern(pattern, out);
                Ok(())
            }
            Some(ChunkSlot::Compressed(c)) => self.decompress_into(c, out, None),
        }
    }

    fn decompress_chunk_masked(&self, index: usize, out: &mut [u8], mask: &[bool]) -> Result<()> {
        match self.chunks.get(index) {
            None => Err(CatervaError::InvalidIndex(format!("no chunk at index {index}"))),
            Some(ChunkSlot::Special { pattern }) => {
                let nitems = self.extchunknitems();
                let block_nitems = self.blocknitems();
                let grid = self.blocks_grid();
                let grid_strides = shape::strides(&grid);
                let nblocks = grid.iter().product::<i64>();
                let extchunkshape = self.extchunkshape_i64();
                let blockshape = self.blockshape_i64();
                let ndim = extchunkshape.len();
                let itemsize = self.params.itemsize;
                let _ = nitems;
                for b in 0..nblocks {
                    if mask[b as usize] {
                        continue;
                    }
                    let block_idx = shape::lin_to_multi(b, &grid, &grid_strides);
                    let start: CoordVec<i64> = block_idx.iter().zip(blockshape.iter()).map(|(i, bs)| i * bs).collect();
                    let stop: CoordVec<i64> = start.iter().zip(blockshape.iter()).map(|(s, bs)| s + bs).collect();
                    let mut block_buf = vec![0u8; block_nitems * itemsize];
                    Self::fill_from_pattern(pattern, &mut block_buf);
                    if ndim == 0 {
                        out[..itemsize].copy_from_slice(&block_buf[..itemsize]);
                    } else {
                        crate::copy_rect::copy_rect(
                            itemsize,
                            &block_buf,
                            &blockshape,
                            &shape::CoordVec::from_elem(0, ndim),
                            &(stop.iter().zip(start.iter()).map(|(e, s)| e - s).collect::<CoordVec<i64>>()),
                            out,
                            &extchunkshape,
                            &start,
                        );
                    }
                }
                Ok(())
            }
            Some(ChunkSlot::Compressed(c)) => self.decompress_into(c, out, Some(mask)),
        }
    }

    fn duplicate(&self) -> Self {
        Self {
            params: self.params.clone(),
            compression: self.compression.clone(),
            chunks: self.chunks.clone(),
            fixed_meta: self.fixed_meta.clone(),
            var_meta: self.var_meta.clone(),
        }
    }

    fn retagged(&self, params: ChunkParams) -> Self {
        let fixed_meta = self
            .fixed_meta
            .iter()
            .filter(|(n, _)| n != crate::descriptor::DESCRIPTOR_NAME)
            .cloned()
            .collect();
        Self {
            params,
            compression: self.compression.clone(),
            chunks: self.chunks.clone(),
            fixed_meta,
            var_meta: self.var_meta.clone(),
        }
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        persist::serialize_container(self)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        persist::deserialize_container(bytes)
    }

    fn persist(&self, storage: &Storage) -> Result<()> {
        persist::persist(self, storage)
    }

    fn open(storage: &Storage) -> Result<Self> {
        persist::open(storage)
    }

    fn remove_urlpath(path: &std::path::Path) -> Result<()> {
        persist::remove_urlpath(path)
    }

    fn meta_add(&mut self, name: &str, value: Vec<u8>) -> Result<()> {
        if self.fixed_meta.iter().any(|(n, _)| n == name) {
            return Err(CatervaError::InvalidArgument(format!("fixed metadata {name} already exists")));
        }
        self.fixed_meta.push((name.to_string(), value));
        Ok(())
    }

    fn meta_get(&self, name: &str) -> Option<&[u8]> {
        self.fixed_meta.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_slice())
    }

    fn meta_exists(&self, name: &str) -> bool {
        self.fixed_meta.iter().any(|(n, _)| n == name)
    }

    fn meta_update(&mut self, name: &str, value: Vec<u8>) -> Result<()> {
        let entry = self
            .fixed_meta
            .iter_mut()
            .find(|(n, _)| n == name)
            .ok_or_else(|| CatervaError::InvalidArgument(format!("no fixed metadata named {name}")))?;
        if entry.1.len() != value.len() {
            return Err(CatervaError::InvalidArgument(
                "fixed metadata update must preserve byte length".into(),
            ));
        }
        entry.1 = value;
        Ok(())
    }

    fn vlmeta_add(&mut self, name: &str, value: Vec<u8>) -> Result<()> {
        if self.var_meta.iter().any(|(n, _)| n == name) {
            return Err(CatervaError::InvalidArgument(format!("variable metadata {name} already exists")));
        }
        self.var_meta.push((name.to_string(), value));
        Ok(())
    }

    fn vlmeta_get(&self, name: &str) -> Option<&[u8]> {
        self.var_meta.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_slice())
    }

    fn vlmeta_exists(&self, name: &str) -> bool {
        self.var_meta.iter().any(|(n, _)| n == name)
    }

    fn vlmeta_update(&mut self, name: &str, value: Vec<u8>) -> Result<()> {
        let entry = self
            .var_meta
            .iter_mut()
            .find(|(n, _)| n == name)
            .ok_or_else(|| CatervaError::InvalidArgument(format!("no variable metadata named {name}")))?;
        entry.1 = value;
        Ok(())
    }

    fn vlmeta_delete(&mut self, name: &str) -> Result<()> {
        let before = self.var_meta.len();
        self.var_meta.retain(|(n, _)| n != name);
        if self.var_meta.len() == before {
            return Err(CatervaError::InvalidArgument(format!("no variable metadata named {name}")));
        }
        Ok(())
    }

    fn meta_names(&self) -> Vec<String> {
        self.fixed_meta.iter().map(|(n, _)| n.clone()).collect()
    }

    fn vlmeta_names(&self) -> Vec<String> {
        self.var_meta.iter().map(|(n, _)| n.clone()).collect()
    }
}

mod accessors {
    use super::*;

    impl BloscContainer {
        pub(crate) fn chunks(&self) -> &[ChunkSlot] {
            &self.chunks
        }
        pub(crate) fn fixed_meta(&self) -> &[(String, Vec<u8>)] {
            &self.fixed_meta
        }
        pub(crate) fn var_meta(&self) -> &[(String, Vec<u8>)] {
            &self.var_meta
        }
        pub(crate) fn compression(&self) -> &CompressionConfig {
            &self.compression
        }
        pub(crate) fn from_parts(
            params: ChunkParams,
            compression: CompressionConfig,
            chunks: Vec<ChunkSlot>,
            fixed_meta: Vec<(String, Vec<u8>)>,
            var_meta: Vec<(String, Vec<u8>)>,
        ) -> Self {
            Self { params, compression, chunks, fixed_meta, var_meta }
        }
    }
}
