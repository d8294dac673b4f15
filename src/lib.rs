//! Compressed, chunked, blocked n-dimensional arrays.
//!
//! An [`Array`] stores its logical n-dimensional content as a grid of
//! independently compressed chunks (component D), each chunk itself split
//! into blocks (the codec's decompression granularity). Reads and writes go
//! through the slice engine ([`slice`]), which only touches the chunks and
//! blocks a given hyperrectangle actually overlaps.
//!
//! The codec itself sits behind the [`container::Container`] trait; the
//! reference backend, [`container::BloscContainer`], drives the real
//! `blosc` C library.

pub mod array;
pub mod config;
pub mod container;
pub mod copy_rect;
pub mod descriptor;
pub mod error;
pub mod shape;
pub mod slice;

pub use array::Array;
pub use config::{ChunkParams, CompressionConfig, Config, InitPolicy, Scratch, Storage};
pub use container::{BloscContainer, Container};
pub use error::{CatervaError, Result};
pub use shape::{ArrayShape, CoordVec, Shape, TileShape, MAX_NDIM};

/// Convenience alias for the common case of the reference Blosc-backed
/// container.
pub type BloscArray = Array<BloscContainer>;
