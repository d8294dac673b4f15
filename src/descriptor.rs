//! The dimension descriptor sidecar (component C, spec.md §4.6): a
//! compact, version-tagged, big-endian tuple `(ndim, shape, chunkshape,
//! blockshape)` carried as a metadata entry named `"caterva"`.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Write};

use crate::error::{CatervaError, Result};
use crate::shape::{Shape, TileShape, MAX_NDIM};

/// Reserved name for the fixed-metadata entry holding the descriptor.
pub const DESCRIPTOR_NAME: &str = "caterva";

const METALAYER_VERSION: u8 = 0;
const TUPLE5_MARKER: u8 = 0x95;
const FIXARRAY_BASE: u8 = 0x90;
const INT64_MARKER: u8 = 0xd3;
const INT32_MARKER: u8 = 0xd2;

/// Serialise `(ndim, shape, chunkshape, blockshape)` into the descriptor's
/// wire format. `ndim` is implied by `shape.len()`.
pub fn serialize(shape: &[i64], chunkshape: &[i32], blockshape: &[i32]) -> Result<Vec<u8>> {
    let ndim = shape.len();
    if ndim > MAX_NDIM || chunkshape.len() != ndim || blockshape.len() != ndim {
        return Err(CatervaError::InvalidArgument(
            "descriptor shapes must agree in length and not exceed MAX_NDIM".into(),
        ));
    }

    let mut w = Cursor::new(Vec::new());
    w.write_u8(TUPLE5_MARKER).unwrap();
    w.write_u8(METALAYER_VERSION).unwrap();
    w.write_u8(ndim as u8).unwrap();

    write_fixarray_i64(&mut w, shape).unwrap();
    write_fixarray_i32(&mut w, chunkshape).unwrap();
    write_fixarray_i32(&mut w, blockshape).unwrap();

    Ok(w.into_inner())
}

fn write_fixarray_i64<W: Write>(w: &mut W, values: &[i64]) -> io::Result<()> {
    w.write_u8(FIXARRAY_BASE | values.len() as u8)?;
    for v in values {
        w.write_u8(INT64_MARKER)?;
        w.write_i64::<BigEndian>(*v)?;
    }
    Ok(())
}

fn write_fixarray_i32<W: Write>(w: &mut W, values: &[i32]) -> io::Result<()> {
    w.write_u8(FIXARRAY_BASE | values.len() as u8)?;
    for v in values {
        w.write_u8(INT32_MARKER)?;
        w.write_i32::<BigEndian>(*v)?;
    }
    Ok(())
}

/// Deserialise a descriptor. Tolerant of `ndim < MAX_NDIM`; axes beyond the
/// encoded `ndim` are not produced here (callers pad with 1 as needed per
/// spec.md §4.6 — there is nothing to pad since the vectors are exactly
/// `ndim` long by construction of [`serialize`]).
pub fn deserialize(bytes: &[u8]) -> Result<(Shape, TileShape, TileShape)> {
    let mut r = Cursor::new(bytes);
    let marker = r
        .read_u8()
        .map_err(|_| CatervaError::InvalidArgument("descriptor too short".into()))?;
    if marker != TUPLE5_MARKER {
        return Err(CatervaError::InvalidArgument(
            "descriptor missing 5-tuple marker".into(),
        ));
    }
    let version = r.read_u8()?;
    if version > METALAYER_VERSION {
        return Err(CatervaError::InvalidArgument(format!(
            "descriptor version {version} is newer than supported {METALAYER_VERSION}"
        )));
    }
    let ndim = r.read_u8()? as usize;
    if ndim > MAX_NDIM {
        return Err(CatervaError::InvalidIndex(format!(
            "descriptor ndim {ndim} exceeds maximum {MAX_NDIM}"
        )));
    }
    if ndim < MAX_NDIM {
        log::warn!("opening container with ndim {ndim} below compile-time maximum {MAX_NDIM}");
    }

    let shape = read_fixarray_i64(&mut r, ndim)?;
    let chunkshape = read_fixarray_i32(&mut r, ndim)?;
    let blockshape = read_fixarray_i32(&mut r, ndim)?;

    Ok((shape, chunkshape, blockshape))
}

fn read_fixarray_i64(r: &mut Cursor<&[u8]>, ndim: usize) -> Result<Shape> {
    let head = r.read_u8()?;
    if head != FIXARRAY_BASE | ndim as u8 {
        return Err(CatervaError::InvalidArgument(
            "descriptor shape entry has wrong fixarray length".into(),
        ));
    }
    let mut out = Shape::with_capacity(ndim);
    for _ in 0..ndim {
        let tag = r.read_u8()?;
        if tag != INT64_MARKER {
            return Err(CatervaError::InvalidArgument(
                "descriptor shape entry missing int64 marker".into(),
            ));
        }
        out.push(r.read_i64::<BigEndian>()?);
    }
    Ok(out)
}

fn read_fixarray_i32(r: &mut Cursor<&[u8]>, ndim: usize) -> Result<TileShape> {
    let head = r.read_u8()?;
    if head != FIXARRAY_BASE | ndim as u8 {
        return Err(CatervaError::InvalidArgument(
            "descriptor chunk/block entry has wrong fixarray length".into(),
        ));
    }
    let mut out = TileShape::with_capacity(ndim);
    for _ in 0..ndim {
        let tag = r.read_u8()?;
        if tag != INT32_MARKER {
            return Err(CatervaError::InvalidArgument(
                "descriptor chunk/block entry missing int32 marker".into(),
            ));
        }
        out.push(r.read_i32::<BigEndian>()?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let shape = vec![5i64, 6, 7];
        let chunkshape = vec![3i32, 3, 3];
        let blockshape = vec![2i32, 2, 2];
        let bytes = serialize(&shape, &chunkshape, &blockshape).unwrap();
        let (s2, c2, b2) = deserialize(&bytes).unwrap();
        assert_eq!(&s2[..], &shape[..]);
        assert_eq!(&c2[..], &chunkshape[..]);
        assert_eq!(&b2[..], &blockshape[..]);
    }

    #[test]
    fn literal_scenario_6() {
        let shape = vec![5i64, 6, 7];
        let chunkshape = vec![3i32, 3, 3];
        let blockshape = vec![2i32, 2, 2];
        let bytes = serialize(&shape, &chunkshape, &blockshape).unwrap();
        let expected_prefix = [
            0x95, 0x00, 0x03, 0x93, 0xd3, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0xd3,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0xd3, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x07,
        ];
        assert_eq!(&bytes[..expected_prefix.len()], &expected_prefix[..]);
    }

    #[test]
    fn rejects_oversized_ndim() {
        let shape = vec![1i64; MAX_NDIM + 1];
        let chunkshape = vec![1i32; MAX_NDIM + 1];
        let blockshape = vec![1i32; MAX_NDIM + 1];
        assert!(serialize(&shape, &chunkshape, &blockshape).is_err());
    }
}
