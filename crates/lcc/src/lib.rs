//! LCC: packed Gaussian splat scenes with precomputed LOD levels.
//!
//! - `meta.lcc` (JSON) lists splat counts per level, the bounding box and the
//!   value ranges packed attributes were normalized against.
//! - `data.bin` holds every level back to back, finest first, as fixed
//!   32-byte records. A level is fetched as one byte range.
//! - `shcoef.bin` (Extended scenes only) holds 64-byte SH records in the same
//!   order.
//! - `index.bin` (spatial index) is not read by this crate.
//!
//! Record layout (little-endian):
//!   00  : f32[3]  position
//!   0C  : u8[4]   r, g, b, opacity         (value / 255)
//!   10  : u16[3]  scale                    (value / 65535, then `scale` range)
//!   16  : u32     rotation                 (10/10/10 components + 2-bit selector)
//!   1A  : u16[3]  reserved
//!
//! SH record:
//!   00  : u32[15] coefficient i as 11/10/11-bit RGB (then `shcoef` range)
//!   3C  : u32     reserved
//!
//! Level byte offset = sum(counts[0..level]) * record size; the decoder
//! bounds-checks every record against the buffer it is handed.

pub mod axes;
pub mod covariance;
pub mod encode;
pub mod error;
pub mod meta;
pub mod record;
pub mod scene;
pub mod sh;
pub mod source;

pub use axes::AxisAdapter;
pub use covariance::{covariance_from_scale_rotation, SymMat3};
pub use encode::{encode_level, encode_sh_level, metadata_for, write_scene, SplatRecord};
pub use error::{LccError, Result};
pub use meta::{
    AttributeRange, BoundingBox, ByteRange, Metadata, Mode, Range3, RECORD_SIZE, SH_RECORD_SIZE,
};
pub use record::{decode_quaternion, encode_quaternion, PackedRecord};
pub use scene::{decode, decode_with, Scene, Splat};
pub use sh::{decode_sh, ShCoeffs, SH_COEFFS};
pub use source::{ByteSource, FileSource};

#[cfg(feature = "mmap")]
pub use source::MmapSource;

pub const META_FILE: &str = "meta.lcc";
pub const DATA_FILE: &str = "data.bin";
pub const SH_FILE: &str = "shcoef.bin";
