//! Index arithmetic and the chunk/block grid (component A), plus the array
//! header that derives extended shapes and counts from it (component D).

use smallvec::SmallVec;

use crate::error::{CatervaError, Result};

/// Upper bound on dimensionality supported by the wire format and by every
/// fixed-size array in this crate.
pub const MAX_NDIM: usize = 8;

/// A small coordinate vector, stack-allocated for the common case of
/// `ndim <= MAX_NDIM`.
pub type CoordVec<T> = SmallVec<[T; MAX_NDIM]>;

/// Logical shape components: one `i64` per axis, matching the descriptor's
/// wire width (spec.md §4.6).
pub type Shape = CoordVec<i64>;

/// Chunk/block shape components: one `i32` per axis, matching the
/// descriptor's wire width.
pub type TileShape = CoordVec<i32>;

/// Row-major strides for `shape`: `stride[n-1] = 1`, `stride[i] = stride[i+1] * shape[i+1]`.
pub fn strides(shape: &[i64]) -> CoordVec<i64> {
    let n = shape.len();
    let mut s: CoordVec<i64> = smallvec::smallvec![1; n];
    for i in (0..n.saturating_sub(1)).rev() {
        s[i] = s[i + 1] * shape[i + 1];
    }
    s
}

/// Convert a linear offset into a multi-index, given the strides of its box.
pub fn lin_to_multi(mut lin: i64, shape: &[i64], strides: &[i64]) -> CoordVec<i64> {
    let mut idx: CoordVec<i64> = smallvec::smallvec![0; shape.len()];
    for j in 0..shape.len() {
        idx[j] = lin / strides[j];
        lin %= strides[j];
    }
    idx
}

/// Convert a multi-index into a linear offset, given the strides of its box.
pub fn multi_to_lin(idx: &[i64], strides: &[i64]) -> i64 {
    idx.iter().zip(strides.iter()).map(|(i, s)| i * s).sum()
}

fn div_ceil_mul(n: i32, d: i32) -> i32 {
    ((n + d - 1) / d) * d
}

/// The full set of shapes, counts and grids derived from `(ndim, shape,
/// chunkshape, blockshape)`. This is the single place that recomputes
/// derived state after a structural change (spec.md §9 "duplicated
/// shape-update path" redesign flag).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrayShape {
    ndim: usize,
    itemsize: usize,
    shape: Shape,
    chunkshape: TileShape,
    blockshape: TileShape,
    extshape: Shape,
    extchunkshape: TileShape,
}

impl ArrayShape {
    pub fn new(
        itemsize: usize,
        shape: Shape,
        chunkshape: TileShape,
        blockshape: TileShape,
    ) -> Result<Self> {
        let ndim = shape.len();
        if ndim > MAX_NDIM {
            return Err(CatervaError::InvalidIndex(format!(
                "ndim {ndim} exceeds maximum {MAX_NDIM}"
            )));
        }
        if chunkshape.len() != ndim || blockshape.len() != ndim {
            return Err(CatervaError::InvalidArgument(
                "shape, chunkshape and blockshape must have equal length".into(),
            ));
        }
        if itemsize == 0 {
            return Err(CatervaError::InvalidArgument("itemsize must be > 0".into()));
        }
        for (i, s) in shape.iter().enumerate() {
            if *s < 0 {
                return Err(CatervaError::InvalidArgument(format!(
                    "shape[{i}] = {s} is negative"
                )));
            }
        }
        for (i, c) in chunkshape.iter().enumerate() {
            if *c < 1 {
                return Err(CatervaError::InvalidArgument(format!(
                    "chunkshape[{i}] = {c} must be >= 1"
                )));
            }
        }
        for (i, b) in blockshape.iter().enumerate() {
            if *b < 1 {
                return Err(CatervaError::InvalidArgument(format!(
                    "blockshape[{i}] = {b} must be >= 1"
                )));
            }
        }

        let mut this = Self {
            ndim,
            itemsize,
            shape,
            chunkshape,
            blockshape,
            extshape: SmallVec::new(),
            extchunkshape: SmallVec::new(),
        };
        this.recompute();
        Ok(this)
    }

    /// The only routine that derives `extshape`/`extchunkshape` from the
    /// primary shapes. Called after every structural change (resize,
    /// squeeze, construction).
    pub(crate) fn recompute(&mut self) {
        self.extshape = self
            .shape
            .iter()
            .zip(self.chunkshape.iter())
            .map(|(s, c)| {
                if *s > 0 {
                    div_ceil_mul(*s as i32, *c) as i64
                } else {
                    0
                }
            })
            .collect();
        self.extchunkshape = self
            .chunkshape
            .iter()
            .zip(self.blockshape.iter())
            .map(|(c, b)| div_ceil_mul(*c, *b))
            .collect();
    }

    pub fn ndim(&self) -> usize {
        self.ndim
    }

    pub fn itemsize(&self) -> usize {
        self.itemsize
    }

    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    pub fn chunkshape(&self) -> &[i32] {
        &self.chunkshape
    }

    pub fn blockshape(&self) -> &[i32] {
        &self.blockshape
    }

    pub fn extshape(&self) -> &[i64] {
        &self.extshape
    }

    pub fn extchunkshape(&self) -> &[i32] {
        &self.extchunkshape
    }

    pub fn set_shape(&mut self, shape: Shape) -> Result<()> {
        if shape.len() != self.ndim {
            return Err(CatervaError::InvalidArgument(
                "resize must preserve dimensionality".into(),
            ));
        }
        for (i, s) in shape.iter().enumerate() {
            if *s < 0 {
                return Err(CatervaError::InvalidArgument(format!(
                    "shape[{i}] = {s} is negative"
                )));
            }
        }
        self.shape = shape;
        self.recompute();
        Ok(())
    }

    /// Rebuild with a subset of axes removed (squeeze), in the style of
    /// [`ArrayShape::new`].
    pub fn with_axes_removed(&self, drop: &[bool]) -> Result<Self> {
        debug_assert_eq!(drop.len(), self.ndim);
        let shape: Shape = self
            .shape
            .iter()
            .zip(drop.iter())
            .filter(|(_, d)| !**d)
            .map(|(s, _)| *s)
            .collect();
        let chunkshape: TileShape = self
            .chunkshape
            .iter()
            .zip(drop.iter())
            .filter(|(_, d)| !**d)
            .map(|(c, _)| *c)
            .collect();
        let blockshape: TileShape = self
            .blockshape
            .iter()
            .zip(drop.iter())
            .filter(|(_, d)| !**d)
            .map(|(b, _)| *b)
            .collect();
        Self::new(self.itemsize, shape, chunkshape, blockshape)
    }

    pub fn nitems(&self) -> i64 {
        if self.ndim == 0 {
            return 1;
        }
        self.shape.iter().product()
    }

    pub fn chunknitems(&self) -> i64 {
        if self.ndim == 0 {
            return 1;
        }
        self.chunkshape.iter().map(|c| *c as i64).product()
    }

    pub fn blocknitems(&self) -> i64 {
        if self.ndim == 0 {
            return 1;
        }
        self.blockshape.iter().map(|b| *b as i64).product()
    }

    pub fn extnitems(&self) -> i64 {
        if self.ndim == 0 {
            return 1;
        }
        self.extshape.iter().product()
    }

    pub fn extchunknitems(&self) -> i64 {
        if self.ndim == 0 {
            return 1;
        }
        self.extchunkshape.iter().map(|c| *c as i64).product()
    }

    /// Number of chunks the container must hold (0 if any axis is empty).
    pub fn nchunks(&self) -> i64 {
        let cn = self.chunknitems();
        if cn == 0 {
            return 0;
        }
        self.extnitems() / cn
    }

    /// Grid dimensions of the chunk grid: `extshape[i] / chunkshape[i]`.
    pub fn chunks_in_array(&self) -> CoordVec<i64> {
        if self.ndim == 0 {
            return smallvec::smallvec![1];
        }
        self.extshape
            .iter()
            .zip(self.chunkshape.iter())
            .map(|(e, c)| e / (*c as i64))
            .collect()
    }

    /// Grid dimensions of the block grid inside a chunk: `extchunkshape[i] / blockshape[i]`.
    pub fn blocks_in_chunk(&self) -> CoordVec<i64> {
        if self.ndim == 0 {
            return smallvec::smallvec![1];
        }
        self.extchunkshape
            .iter()
            .zip(self.blockshape.iter())
            .map(|(e, b)| (*e as i64) / (*b as i64))
            .collect()
    }
}
