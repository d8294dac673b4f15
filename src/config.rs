//! Configuration surface (spec.md §6 table): codec selection, storage
//! location, and the allocator-capability substitute used for scratch
//! buffers (spec.md §9 re-architecture notes).

use std::path::PathBuf;

pub use blosc::{Clevel, Compressor, ShuffleMode};

use crate::shape::TileShape;

/// Codec selection and level passed to the container (`compcodec`,
/// `compmeta` is folded into `shuffle`, `complevel`).
#[derive(Clone, Debug)]
pub struct CompressionConfig {
    pub compressor: Compressor,
    pub clevel: Clevel,
    pub shuffle: ShuffleMode,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            compressor: Compressor::BloscLZ,
            clevel: Clevel::L5,
            shuffle: ShuffleMode::Byte,
        }
    }
}

/// Where (if anywhere) the container is persisted, and how.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Storage {
    /// If set, the container is persisted at this path.
    pub urlpath: Option<PathBuf>,
    /// If true, persist as a single contiguous frame file; else as a
    /// sparse directory with one file per chunk.
    pub sequential: bool,
}

/// Codec internal threading width (`nthreads`); contained inside a single
/// codec call and invisible to callers' ordering (spec.md §5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    pub nthreads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self { nthreads: 1 }
    }
}

/// Policy for [`crate::Array::empty`]: whether freshly allocated chunks
/// must read back as zero, or may contain unspecified bytes.
///
/// Replaces the C original's silent "uninitialised but actually zero"
/// behaviour (spec.md §9) with an explicit choice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum InitPolicy {
    Uninit,
    #[default]
    Zero,
}

/// Reusable scratch capability for the slice engine: the decompression
/// buffer and the per-block mask. Modelled as an explicit capability
/// rather than a pluggable global allocator, per spec.md §9's
/// re-architecture note — this is the one place the C original threads
/// an allocator argument by hand.
#[derive(Default)]
pub struct Scratch {
    chunk_buf: Vec<u8>,
    mask: Vec<bool>,
}

impl Scratch {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn chunk_buf(&mut self, len: usize) -> &mut [u8] {
        if self.chunk_buf.len() < len {
            self.chunk_buf.resize(len, 0);
        }
        &mut self.chunk_buf[..len]
    }

    /// Disjoint borrows of both buffers at once, for callers (the slice
    /// engine) that need to fill the mask and then decompress into the
    /// chunk buffer in the same call.
    pub(crate) fn chunk_buf_and_mask(
        &mut self,
        chunk_len: usize,
        n_blocks: usize,
    ) -> (&mut [u8], &mut [bool]) {
        if self.chunk_buf.len() < chunk_len {
            self.chunk_buf.resize(chunk_len, 0);
        }
        self.mask.clear();
        self.mask.resize(n_blocks, false);
        (&mut self.chunk_buf[..chunk_len], &mut self.mask)
    }
}

/// Parameters a codec invocation needs about the chunk shape (the
/// `cparams` in `chunk_repeat_value`, spec.md §6).
#[derive(Clone, Debug)]
pub struct ChunkParams {
    pub itemsize: usize,
    pub extchunkshape: TileShape,
    pub blockshape: TileShape,
}
