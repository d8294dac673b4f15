//! End-to-end scenarios from spec.md §8, exercised through the public
//! `Array`/`Container` surface.

use caterva::config::Compressor;
use caterva::{BloscArray, CompressionConfig, InitPolicy, Storage};

fn le_bytes(values: &[i64], itemsize: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * itemsize);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes()[..itemsize]);
    }
    out
}

fn read_le(buf: &[u8], itemsize: usize) -> Vec<i64> {
    buf.chunks(itemsize)
        .map(|c| {
            let mut b = [0u8; 8];
            b[..itemsize].copy_from_slice(c);
            i64::from_le_bytes(b)
        })
        .collect()
}

/// Scenario 1: 2-D, itemsize=8, shape=[8,8], chunkshape=[4,4],
/// blockshape=[4,4], buffer 0..63 row-major round-trips through
/// `to_buffer`. (The byte layout of a chunk inside the container is an
/// implementation-defined wire detail per spec.md §6/DESIGN.md, not a
/// portable property, so only the round-trip is asserted here.)
#[test]
fn scenario1_roundtrip_8x8() {
    let values: Vec<i64> = (0..64).collect();
    let buffer = le_bytes(&values, 8);

    let mut arr = BloscArray::from_buffer(
        8,
        [8i64, 8].into_iter().collect(),
        [4i32, 4].into_iter().collect(),
        [4i32, 4].into_iter().collect(),
        &buffer,
        CompressionConfig::default(),
        Storage::default(),
    )
    .unwrap();
    assert_eq!(arr.to_buffer().unwrap(), buffer);
}

/// Scenario 2: 3-D, itemsize=8, shape=[10,10,10], chunkshape=[3,5,2],
/// blockshape=[3,3,2], after from_buffer(0..999), a 3x7x7 read starting
/// at [3,0,3] begins 303,304,305,306,307,308,309,313.
#[test]
fn scenario2_3d_sub_rectangle() {
    let values: Vec<i64> = (0..1000).collect();
    let buffer = le_bytes(&values, 8);

    let mut arr = BloscArray::from_buffer(
        8,
        [10i64, 10, 10].into_iter().collect(),
        [3i32, 5, 2].into_iter().collect(),
        [3i32, 3, 2].into_iter().collect(),
        &buffer,
        CompressionConfig::default(),
        Storage::default(),
    )
    .unwrap();

    let mut out = vec![0u8; 3 * 7 * 7 * 8];
    arr.get_slice_buffer(&[3, 0, 3], &[6, 7, 10], &mut out).unwrap();
    let got = read_le(&out, 8);
    assert_eq!(&got[..8], &[303, 304, 305, 306, 307, 308, 309, 313]);
}

/// Scenario 3: a single chunk spanning the whole 1-D array round-trips.
#[test]
fn scenario3_single_chunk_1d() {
    let values: Vec<i64> = (0..30).collect();
    let buffer = le_bytes(&values, 8);
    let mut arr = BloscArray::from_buffer(
        8,
        [30i64].into_iter().collect(),
        [30i32].into_iter().collect(),
        [30i32].into_iter().collect(),
        &buffer,
        CompressionConfig::default(),
        Storage::default(),
    )
    .unwrap();
    let mut out = vec![0u8; 30 * 8];
    arr.get_slice_buffer(&[0], &[30], &mut out).unwrap();
    assert_eq!(out, buffer);
}

/// Scenario 4: 2-D, itemsize=1, non-divisible chunking, sub-rectangle read.
#[test]
fn scenario4_non_divisible_chunking() {
    let values: Vec<u8> = (0u8..30).collect();
    let mut arr = BloscArray::from_buffer(
        1,
        [5i64, 6].into_iter().collect(),
        [3i32, 3].into_iter().collect(),
        [2i32, 2].into_iter().collect(),
        &values,
        CompressionConfig::default(),
        Storage::default(),
    )
    .unwrap();
    let mut out = vec![0u8; 4];
    arr.get_slice_buffer(&[2, 2], &[4, 4], &mut out).unwrap();
    assert_eq!(out, vec![14, 15, 20, 21]);
}

/// Scenario 5: resize grows the array; the preserved region keeps its
/// values, the newly valid region reads back zero.
#[test]
fn scenario5_resize_preserves_and_zero_fills() {
    let values: Vec<i64> = (0..50).collect();
    let buffer = le_bytes(&values, 8);
    let mut arr = BloscArray::from_buffer(
        8,
        [10i64, 5].into_iter().collect(),
        [3i32, 3].into_iter().collect(),
        [3i32, 3].into_iter().collect(),
        &buffer,
        CompressionConfig::default(),
        Storage::default(),
    )
    .unwrap();

    arr.resize(&[7, 8]).unwrap();
    assert_eq!(arr.shape(), &[7, 8]);

    let mut preserved = vec![0u8; 7 * 5 * 8];
    arr.get_slice_buffer(&[0, 0], &[7, 5], &mut preserved).unwrap();
    let expected: Vec<i64> = (0..35).collect();
    assert_eq!(read_le(&preserved, 8), expected);

    let mut fresh = vec![1u8; 7 * 3 * 8];
    arr.get_slice_buffer(&[0, 5], &[7, 8], &mut fresh).unwrap();
    assert!(fresh.iter().all(|b| *b == 0));
}

/// Shrink followed by extending back restores the preserved interior and
/// zero-fills the newly re-exposed region.
#[test]
fn resize_shrink_then_extend_back() {
    let values: Vec<i64> = (0..50).collect();
    let buffer = le_bytes(&values, 8);
    let mut arr = BloscArray::from_buffer(
        8,
        [10i64, 5].into_iter().collect(),
        [3i32, 3].into_iter().collect(),
        [3i32, 3].into_iter().collect(),
        &buffer,
        CompressionConfig::default(),
        Storage::default(),
    )
    .unwrap();

    arr.resize(&[4, 5]).unwrap();
    arr.resize(&[10, 5]).unwrap();

    let mut preserved = vec![0u8; 4 * 5 * 8];
    arr.get_slice_buffer(&[0, 0], &[4, 5], &mut preserved).unwrap();
    let expected: Vec<i64> = (0..20).collect();
    assert_eq!(read_le(&preserved, 8), expected);

    let mut reexposed = vec![1u8; 6 * 5 * 8];
    arr.get_slice_buffer(&[4, 0], &[10, 5], &mut reexposed).unwrap();
    assert!(reexposed.iter().all(|b| *b == 0));
}

/// `append` grows one axis and the new region holds the appended values.
#[test]
fn append_grows_axis_and_preserves_old_data() {
    let values: Vec<i64> = (0..20).collect();
    let buffer = le_bytes(&values, 8);
    let mut arr = BloscArray::from_buffer(
        8,
        [4i64, 5].into_iter().collect(),
        [2i32, 5].into_iter().collect(),
        [2i32, 5].into_iter().collect(),
        &buffer,
        CompressionConfig::default(),
        Storage::default(),
    )
    .unwrap();

    let appended: Vec<i64> = (100..115).collect();
    let appended_buf = le_bytes(&appended, 8);
    arr.append(0, &appended_buf).unwrap();

    assert_eq!(arr.shape(), &[7, 5]);
    let mut out = vec![0u8; 7 * 5 * 8];
    arr.get_slice_buffer(&[0, 0], &[7, 5], &mut out).unwrap();
    let got = read_le(&out, 8);
    assert_eq!(&got[..20], &values[..]);
    assert_eq!(&got[20..], &appended[..]);
}

/// squeeze drops a unit axis without disturbing the data under axis
/// relabelling.
#[test]
fn squeeze_preserves_buffer_contents() {
    let values: Vec<i64> = (0..24).collect();
    let buffer = le_bytes(&values, 8);
    let mut arr = BloscArray::from_buffer(
        8,
        [4i64, 1, 6].into_iter().collect(),
        [2i32, 1, 3].into_iter().collect(),
        [2i32, 1, 3].into_iter().collect(),
        &buffer,
        CompressionConfig::default(),
        Storage::default(),
    )
    .unwrap();

    arr.squeeze(None).unwrap();
    assert_eq!(arr.shape(), &[4, 6]);
    assert_eq!(arr.to_buffer().unwrap(), buffer);
}

/// `copy` re-tiling to a different chunk/block shape preserves contents
/// and carries forward user metadata.
#[test]
fn copy_retile_preserves_contents_and_metadata() {
    let values: Vec<i64> = (0..64).collect();
    let buffer = le_bytes(&values, 8);
    let mut arr = BloscArray::from_buffer(
        8,
        [8i64, 8].into_iter().collect(),
        [4i32, 4].into_iter().collect(),
        [4i32, 4].into_iter().collect(),
        &buffer,
        CompressionConfig::default(),
        Storage::default(),
    )
    .unwrap();
    arr.vlmeta_add("note", b"hello".to_vec()).unwrap();

    let mut copied = arr
        .copy([2i32, 2].into_iter().collect(), [2i32, 2].into_iter().collect(), Storage::default())
        .unwrap();
    assert_eq!(copied.to_buffer().unwrap(), buffer);
    assert_eq!(copied.vlmeta_get("note"), Some(&b"hello"[..]));
}

/// Serialising a container and reconstructing an Array from those bytes
/// reproduces the original array.
#[test]
fn serialize_and_from_serialized_round_trip() {
    let values: Vec<i64> = (0..27).collect();
    let buffer = le_bytes(&values, 8);
    let arr = BloscArray::from_buffer(
        8,
        [3i64, 3, 3].into_iter().collect(),
        [2i32, 2, 2].into_iter().collect(),
        [1i32, 1, 1].into_iter().collect(),
        &buffer,
        CompressionConfig::default(),
        Storage::default(),
    )
    .unwrap();

    let bytes = arr.to_bytes().unwrap();
    let mut reconstructed = BloscArray::from_serialized(&bytes).unwrap();
    assert_eq!(reconstructed.shape(), arr.shape());
    assert_eq!(reconstructed.to_buffer().unwrap(), buffer);
}

/// Persisting to a sequential frame file and reopening it reproduces the
/// array (spec.md §6a persist/open).
#[test]
fn persist_sequential_and_open_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.catv");
    let storage = Storage { urlpath: Some(path.clone()), sequential: true };

    let values: Vec<i64> = (0..16).collect();
    let buffer = le_bytes(&values, 8);
    let arr = BloscArray::from_buffer(
        8,
        [4i64, 4].into_iter().collect(),
        [2i32, 2].into_iter().collect(),
        [2i32, 2].into_iter().collect(),
        &buffer,
        CompressionConfig::default(),
        storage.clone(),
    )
    .unwrap();
    drop(arr);

    assert!(path.is_file());
    let mut reopened = BloscArray::open(storage).unwrap();
    assert_eq!(reopened.to_buffer().unwrap(), buffer);
}

/// Persisting sparse (one file per chunk) and reopening round-trips too.
#[test]
fn persist_sparse_and_open_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sparse_container");
    let storage = Storage { urlpath: Some(path.clone()), sequential: false };

    let values: Vec<i64> = (0..16).collect();
    let buffer = le_bytes(&values, 8);
    let arr = BloscArray::from_buffer(
        8,
        [4i64, 4].into_iter().collect(),
        [2i32, 2].into_iter().collect(),
        [2i32, 2].into_iter().collect(),
        &buffer,
        CompressionConfig::default(),
        storage.clone(),
    )
    .unwrap();
    drop(arr);

    assert!(path.is_dir());
    let mut reopened = BloscArray::open(storage.clone()).unwrap();
    assert_eq!(reopened.to_buffer().unwrap(), buffer);

    reopened.remove_urlpath().unwrap();
    assert!(!path.exists());
}

/// ndim=0 behaves as a scalar store.
#[test]
fn scalar_array_read_write() {
    let mut arr = BloscArray::zeros(
        8,
        [].into_iter().collect(),
        [].into_iter().collect(),
        [].into_iter().collect(),
        CompressionConfig::default(),
        Storage::default(),
    )
    .unwrap();
    let mut out = vec![0u8; 8];
    arr.get_slice_buffer(&[], &[], &mut out).unwrap();
    assert_eq!(out, vec![0u8; 8]);

    arr.set_slice_buffer(&[], &[], &42i64.to_le_bytes()).unwrap();
    let mut out2 = vec![0u8; 8];
    arr.get_slice_buffer(&[], &[], &mut out2).unwrap();
    assert_eq!(i64::from_le_bytes(out2.try_into().unwrap()), 42);
}

/// Any axis with extent 0 yields an empty array whose slice ops are
/// no-ops.
#[test]
fn zero_extent_axis_is_empty() {
    let mut arr = BloscArray::zeros(
        4,
        [0i64, 5].into_iter().collect(),
        [3i32, 3].into_iter().collect(),
        [2i32, 2].into_iter().collect(),
        CompressionConfig::default(),
        Storage::default(),
    )
    .unwrap();
    assert_eq!(arr.to_buffer().unwrap().len(), 0);
    arr.get_slice_buffer(&[0, 0], &[0, 5], &mut []).unwrap();
}

/// The metadata surface: fixed entries reject length-changing updates,
/// the reserved descriptor name is blocked at the Array level, variable
/// entries can grow, shrink, and be deleted.
#[test]
fn metadata_surface_behaviour() {
    let mut arr = BloscArray::zeros(
        4,
        [4i64].into_iter().collect(),
        [2i32].into_iter().collect(),
        [2i32].into_iter().collect(),
        CompressionConfig::default(),
        Storage::default(),
    )
    .unwrap();

    assert!(arr.meta_add("caterva", vec![1]).is_err());

    arr.meta_add("units", b"meters".to_vec()).unwrap();
    assert_eq!(arr.meta_get("units"), Some(&b"meters"[..]));
    assert!(arr.meta_update("units", b"feet!!".to_vec()).is_ok());
    assert!(arr.meta_update("units", b"nope".to_vec()).is_err());

    arr.vlmeta_add("tag", b"short".to_vec()).unwrap();
    arr.vlmeta_update("tag", b"a much longer value entirely".to_vec()).unwrap();
    assert_eq!(arr.vlmeta_get("tag"), Some(&b"a much longer value entirely"[..]));
    arr.vlmeta_delete("tag").unwrap();
    assert!(!arr.vlmeta_exists("tag"));
}

/// The reference backend actually compresses: a constant buffer's
/// container serialisation is smaller than the raw buffer it encodes.
#[test]
fn compression_reduces_storage_for_compressible_data() {
    let nitems = 512 * 512;
    let buffer = vec![7u8; nitems];
    let arr = BloscArray::from_buffer(
        1,
        [512i64, 512].into_iter().collect(),
        [256i32, 256].into_iter().collect(),
        [64i32, 64].into_iter().collect(),
        &buffer,
        CompressionConfig { compressor: Compressor::BloscLZ, ..CompressionConfig::default() },
        Storage::default(),
    )
    .unwrap();
    let bytes = arr.to_bytes().unwrap();
    assert!(bytes.len() < buffer.len());
}

#[test]
fn uninit_and_zero_init_policy_both_read_zero() {
    let a = BloscArray::empty(
        4,
        [4i64].into_iter().collect(),
        [2i32].into_iter().collect(),
        [2i32].into_iter().collect(),
        CompressionConfig::default(),
        Storage::default(),
        InitPolicy::Uninit,
    )
    .unwrap();
    let mut a = a;
    assert_eq!(a.to_buffer().unwrap(), vec![0u8; 16]);
}
