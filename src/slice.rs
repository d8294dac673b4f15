//! The slice engine (component E, spec.md §4.3): translates a READ or WRITE
//! hyperrectangle into per-chunk container calls, decompressing (or
//! skipping) exactly the blocks each chunk actually needs.

use crate::config::Scratch;
use crate::container::Container;
use crate::copy_rect::copy_rect;
use crate::error::Result;
use crate::shape::{self, ArrayShape, CoordVec};

fn clip(a_start: i64, a_stop: i64, b_start: i64, b_stop: i64) -> Option<(i64, i64)> {
    let lo = a_start.max(b_start);
    let hi = a_stop.min(b_stop);
    if lo < hi {
        Some((lo, hi))
    } else {
        None
    }
}

/// Per-chunk geometry shared by both the read and write paths.
struct ChunkWindow {
    index: usize,
    /// Chunk's origin in the array's extended (padded) coordinate space.
    chunk_start: CoordVec<i64>,
    /// Intersection of the requested rectangle with this chunk, in array
    /// coordinates.
    isect_start: CoordVec<i64>,
    isect_stop: CoordVec<i64>,
    is_full_chunk: bool,
}

fn chunk_windows(ashape: &ArrayShape, start: &[i64], stop: &[i64]) -> Vec<ChunkWindow> {
    let ndim = ashape.ndim();
    if ndim == 0 {
        return vec![ChunkWindow {
            index: 0,
            chunk_start: CoordVec::new(),
            isect_start: CoordVec::new(),
            isect_stop: CoordVec::new(),
            is_full_chunk: true,
        }];
    }
    if start.iter().zip(stop.iter()).any(|(a, b)| a >= b) {
        return Vec::new();
    }

    let chunks_in_array = ashape.chunks_in_array();
    let chunkshape: CoordVec<i64> = ashape.chunkshape().iter().map(|c| *c as i64).collect();
    let grid_strides = shape::strides(&chunks_in_array);
    let ngrid: i64 = chunks_in_array.iter().product();

    let mut out = Vec::new();
    for g in 0..ngrid {
        let grid_idx = shape::lin_to_multi(g, &chunks_in_array, &grid_strides);
        let chunk_start: CoordVec<i64> = grid_idx.iter().zip(chunkshape.iter()).map(|(i, c)| i * c).collect();
        let chunk_stop: CoordVec<i64> = chunk_start.iter().zip(chunkshape.iter()).map(|(s, c)| s + c).collect();

        let mut isect_start = CoordVec::with_capacity(ndim);
        let mut isect_stop = CoordVec::with_capacity(ndim);
        let mut any_empty = false;
        for i in 0..ndim {
            match clip(start[i], stop[i], chunk_start[i], chunk_stop[i]) {
                Some((lo, hi)) => {
                    isect_start.push(lo);
                    isect_stop.push(hi);
                }
                None => {
                    any_empty = true;
                    break;
                }
            }
        }
        if any_empty {
            continue;
        }

        let is_full_chunk = (0..ndim).all(|i| isect_start[i] == chunk_start[i] && isect_stop[i] == chunk_stop[i]);

        out.push(ChunkWindow {
            index: g as usize,
            chunk_start,
            isect_start,
            isect_stop,
            is_full_chunk,
        });
    }
    out
}

/// Number of blocks in a chunk's block grid (the length `block_mask` fills).
fn nblocks_in_chunk(ashape: &ArrayShape) -> usize {
    ashape.blocks_in_chunk().iter().product::<i64>() as usize
}

/// Per-block mask for a chunk window: `true` means "this block lies
/// entirely outside the requested rectangle, skip its decompression"
/// (spec.md §4.3 `set_maskout`). Fills `mask` in place (reused scratch
/// storage) rather than allocating a fresh vector per chunk.
fn block_mask(ashape: &ArrayShape, win: &ChunkWindow, mask: &mut [bool]) {
    let ndim = ashape.ndim();
    if ndim == 0 {
        mask[0] = false;
        return;
    }
    let blocks_in_chunk = ashape.blocks_in_chunk();
    let blockshape: CoordVec<i64> = ashape.blockshape().iter().map(|b| *b as i64).collect();
    let grid_strides = shape::strides(&blocks_in_chunk);
    let nblocks: i64 = blocks_in_chunk.iter().product();

    for b in 0..nblocks {
        let block_idx = shape::lin_to_multi(b, &blocks_in_chunk, &grid_strides);
        let mut keep = true;
        for i in 0..ndim {
            let block_lo = win.chunk_start[i] + block_idx[i] * blockshape[i];
            let block_hi = block_lo + blockshape[i];
            if clip(win.isect_start[i], win.isect_stop[i], block_lo, block_hi).is_none() {
                keep = false;
                break;
            }
        }
        mask[b as usize] = !keep;
    }
}

/// `out` is densely packed in the shape of `[stop - start)` (no padding).
pub fn get_slice_buffer<C: Container>(
    container: &C,
    ashape: &ArrayShape,
    start: &[i64],
    stop: &[i64],
    out: &mut [u8],
    scratch: &mut Scratch,
) -> Result<()> {
    let itemsize = ashape.itemsize();
    let ndim = ashape.ndim();
    let out_shape: CoordVec<i64> = stop.iter().zip(start.iter()).map(|(e, s)| e - s).collect();

    for win in chunk_windows(ashape, start, stop) {
        if ndim == 0 {
            container.decompress_chunk(0, out)?;
            continue;
        }

        let extchunkshape_i64: CoordVec<i64> = ashape.extchunkshape().iter().map(|v| *v as i64).collect();
        let chunk_nitems = ashape.extchunknitems() as usize;
        let (chunk_buf, mask) =
            scratch.chunk_buf_and_mask(chunk_nitems * itemsize, nblocks_in_chunk(ashape));
        block_mask(ashape, &win, mask);
        container.decompress_chunk_masked(win.index, chunk_buf, mask)?;

        let local_start: CoordVec<i64> = win
            .isect_start
            .iter()
            .zip(win.chunk_start.iter())
            .map(|(a, b)| a - b)
            .collect();
        let local_stop: CoordVec<i64> = win
            .isect_stop
            .iter()
            .zip(win.chunk_start.iter())
            .map(|(a, b)| a - b)
            .collect();
        let dst_start: CoordVec<i64> = win.isect_start.iter().zip(start.iter()).map(|(a, b)| a - b).collect();

        copy_rect(
            itemsize,
            chunk_buf,
            &extchunkshape_i64,
            &local_start,
            &local_stop,
            out,
            &out_shape,
            &dst_start,
        );
    }
    Ok(())
}

/// `input` is densely packed in the shape of `[stop - start)` (no padding).
pub fn set_slice_buffer<C: Container>(
    container: &mut C,
    ashape: &ArrayShape,
    start: &[i64],
    stop: &[i64],
    input: &[u8],
    scratch: &mut Scratch,
) -> Result<()> {
    let itemsize = ashape.itemsize();
    let ndim = ashape.ndim();
    let in_shape: CoordVec<i64> = stop.iter().zip(start.iter()).map(|(e, s)| e - s).collect();

    let windows = chunk_windows(ashape, start, stop);
    for win in windows {
        if ndim == 0 {
            container.update_chunk(0, input)?;
            continue;
        }

        let extchunkshape_i64: CoordVec<i64> = ashape.extchunkshape().iter().map(|v| *v as i64).collect();
        let chunk_nitems = ashape.extchunknitems() as usize;

        let local_start: CoordVec<i64> = win
            .isect_start
            .iter()
            .zip(win.chunk_start.iter())
            .map(|(a, b)| a - b)
            .collect();
        let local_stop: CoordVec<i64> = win
            .isect_stop
            .iter()
            .zip(win.chunk_start.iter())
            .map(|(a, b)| a - b)
            .collect();
        let src_start: CoordVec<i64> = win.isect_start.iter().zip(start.iter()).map(|(a, b)| a - b).collect();

        if win.is_full_chunk {
            // Whole chunk is overwritten: build the new raw buffer straight
            // from `input` without paying for a decompress of stale data.
            let mut raw = vec![0u8; chunk_nitems * itemsize];
            copy_rect(
                itemsize,
                input,
                &in_shape,
                &src_start,
                &(src_start.iter().zip(local_stop.iter()).zip(local_start.iter())
                    .map(|((s, hi), lo)| s + (hi - lo))
                    .collect::<CoordVec<i64>>()),
                &mut raw,
                &extchunkshape_i64,
                &local_start,
            );
            container.update_chunk(win.index, &raw)?;
        } else {
            let mut chunk_buf = scratch.chunk_buf(chunk_nitems * itemsize).to_vec();
            container.decompress_chunk(win.index, &mut chunk_buf)?;
            copy_rect(
                itemsize,
                input,
                &in_shape,
                &src_start,
                &(src_start.iter().zip(local_stop.iter()).zip(local_start.iter())
                    .map(|((s, hi), lo)| s + (hi - lo))
                    .collect::<CoordVec<i64>>()),
                &mut chunk_buf,
                &extchunkshape_i64,
                &local_start,
            );
            container.update_chunk(win.index, &chunk_buf)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChunkParams, CompressionConfig};
    use crate::container::BloscContainer;
    use crate::shape::{Shape, TileShape};

    fn ashape_2d_itemsize1() -> ArrayShape {
        let shape: Shape = [5i64, 6].into_iter().collect();
        let chunkshape: TileShape = [3i32, 3].into_iter().collect();
        let blockshape: TileShape = [2i32, 2].into_iter().collect();
        ArrayShape::new(1, shape, chunkshape, blockshape).unwrap()
    }

    #[test]
    fn slice_engine_recovers_written_sub_rectangle() {
        let ashape = ashape_2d_itemsize1();
        let params = ChunkParams {
            itemsize: 1,
            extchunkshape: ashape.extchunkshape().iter().copied().collect(),
            blockshape: ashape.blockshape().iter().copied().collect(),
        };
        let mut container = BloscContainer::new(params, CompressionConfig::default());
        let mut scratch = Scratch::new();

        let nchunks: i64 = ashape.chunks_in_array().iter().product();
        for _ in 0..nchunks {
            container.push_special(&[0u8]).unwrap();
        }

        // Fill the whole extended array [6,6] with its row-major linear
        // index so we know exactly what every chunk should contain.
        let extshape = ashape.extshape();
        let ext_nitems: i64 = extshape.iter().product();
        let full: Vec<u8> = (0..ext_nitems).map(|v| v as u8).collect();
        set_slice_buffer(&mut container, &ashape, &[0, 0], extshape, &full, &mut scratch).unwrap();

        let mut out = vec![0u8; 4];
        get_slice_buffer(&container, &ashape, &[2, 2], &[4, 4], &mut out, &mut scratch).unwrap();

        let stride0 = extshape[1];
        let expected: Vec<u8> = vec![
            (2 * stride0 + 2) as u8,
            (2 * stride0 + 3) as u8,
            (3 * stride0 + 2) as u8,
            (3 * stride0 + 3) as u8,
        ];
        assert_eq!(out, expected);
    }
}
