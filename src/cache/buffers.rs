//! Raw mesh buffers written next to the BVH for device-side shading.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use bytemuck::Pod;

use crate::mesh::TriMesh;
use crate::util::Result;

/// Element stride of padded 2- and 3-component buffers.
pub const PADDED_STRIDE: usize = 16;

/// Buffer files produced by [`write_mesh_buffers`].
pub const MESH_BUFFER_FILES: [&str; 6] = [
    "vertices.bin",
    "normals.bin",
    "face_normals.bin",
    "face_area.bin",
    "indices.bin",
    "texcoords.bin",
];

/// Raw bytes of `elems`, each zero-extended to `stride` bytes when `pad` is set.
pub fn pad_buffer<T: Pod>(elems: &[T], pad: bool, stride: usize) -> Vec<u8> {
    let bytes: &[u8] = bytemuck::cast_slice(elems);
    let size = std::mem::size_of::<T>();
    if !pad || stride <= size {
        return bytes.to_vec();
    }
    let mut out = vec![0u8; stride * elems.len()];
    for (dst, src) in out.chunks_exact_mut(stride).zip(bytes.chunks_exact(size)) {
        dst[..size].copy_from_slice(src);
    }
    out
}

fn write_buffer(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(bytes)?;
    w.flush()?;
    Ok(())
}

/// Write positions, normals, face data, indices and texcoords into `dir`.
#[tracing::instrument(skip_all, fields(dir = %dir.as_ref().display(), pad = pad))]
pub fn write_mesh_buffers(mesh: &TriMesh, dir: impl AsRef<Path>, pad: bool) -> Result<()> {
    let dir = dir.as_ref();
    let buffers = [
        pad_buffer(&mesh.vertices, pad, PADDED_STRIDE),
        pad_buffer(&mesh.normals, pad, PADDED_STRIDE),
        pad_buffer(&mesh.face_normals, pad, PADDED_STRIDE),
        pad_buffer(&mesh.face_area, false, 0),
        pad_buffer(&mesh.indices, false, 0),
        pad_buffer(&mesh.texcoords, pad, PADDED_STRIDE),
    ];
    for (name, bytes) in MESH_BUFFER_FILES.iter().zip(&buffers) {
        write_buffer(&dir.join(name), bytes)?;
        tracing::debug!("Wrote {} ({} bytes)", name, bytes.len());
    }
    Ok(())
}
