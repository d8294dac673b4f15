//! The padded-rectangle copy primitive (component B, spec.md §4.2).
//!
//! Copies an axis-aligned hyperrectangle between two dense, row-major,
//! padded buffers. The innermost axis is always copied as one contiguous
//! byte run; the outer axes are enumerated as nested counters.

/// Copy `[src_start, src_stop)` out of `src` (outer box `src_padded_shape`)
/// into `dst` (outer box `dst_padded_shape`) starting at `dst_start`.
///
/// A no-op if any axis of the copy shape is zero. Caller guarantees
/// `src_start[i] + (src_stop[i]-src_start[i]) <= src_padded_shape[i]` and
/// likewise for `dst`; overlap between `src` and `dst` is undefined
/// behaviour from the caller's perspective (the slice engine never
/// creates it), though this implementation does not invoke any unsafe
/// aliasing and simply reads then writes per run.
#[allow(clippy::too_many_arguments)]
pub fn copy_rect(
    itemsize: usize,
    src: &[u8],
    src_padded_shape: &[i64],
    src_start: &[i64],
    src_stop: &[i64],
    dst: &mut [u8],
    dst_padded_shape: &[i64],
    dst_start: &[i64],
) {
    let ndim = src_padded_shape.len();
    debug_assert_eq!(dst_padded_shape.len(), ndim);
    debug_assert_eq!(src_start.len(), ndim);
    debug_assert_eq!(src_stop.len(), ndim);
    debug_assert_eq!(dst_start.len(), ndim);

    if ndim == 0 {
        dst[..itemsize].copy_from_slice(&src[..itemsize]);
        return;
    }

    let copy_shape: Vec<i64> = src_start
        .iter()
        .zip(src_stop.iter())
        .map(|(a, b)| b - a)
        .collect();
    if copy_shape.contains(&0) {
        return;
    }

    let src_strides = crate::shape::strides(src_padded_shape);
    let dst_strides = crate::shape::strides(dst_padded_shape);

    let run_len = copy_shape[ndim - 1] as usize * itemsize;
    let outer_shape = &copy_shape[..ndim - 1];
    let outer_nruns: i64 = if outer_shape.is_empty() {
        1
    } else {
        outer_shape.iter().product()
    };

    let outer_strides = crate::shape::strides(outer_shape);
    for run in 0..outer_nruns {
        let outer_idx = crate::shape::lin_to_multi(run, outer_shape, &outer_strides);

        let mut src_off = *src_start.last().unwrap();
        let mut dst_off = *dst_start.last().unwrap();
        for j in 0..ndim - 1 {
            src_off += (src_start[j] + outer_idx[j]) * src_strides[j];
            dst_off += (dst_start[j] + outer_idx[j]) * dst_strides[j];
        }
        let src_byte = src_off as usize * itemsize;
        let dst_byte = dst_off as usize * itemsize;

        dst[dst_byte..dst_byte + run_len].copy_from_slice(&src[src_byte..src_byte + run_len]);
    }
}
