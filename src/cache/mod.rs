//! On-disk BVH cache: record stream, build stamp and mesh buffers.

mod buffers;
mod stamp;
mod stream;

pub use buffers::{pad_buffer, write_mesh_buffers, MESH_BUFFER_FILES, PADDED_STRIDE};
pub use stamp::{bvh_path, clear_cache, must_build_bvh, stamp_path, write_stamp, Stamp, BVH_FILE, STAMP_FILE};
pub use stream::{
    layout_of, read_all, read_bvh, read_header, record_sizes, write_bvh, BvhFile, BvhRecord, BvhWriter,
    RECORD_HEADER_SIZE,
};
