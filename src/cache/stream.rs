//! BVH record serialization.
//!
//! A cache file is a sequence of records, one per built geometry:
//!
//! ```text
//! u32 node record size   (little-endian)
//! u32 bundle record size (little-endian)
//! node records
//! bundle records
//! ```
//!
//! Records carry no counts. Nodes are written top-down, so every node but
//! the root is referenced by an earlier one, and the last bundle is the one
//! ending the leaf with the highest offset. The reader recovers both counts
//! from that structure.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::mem::size_of;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use memmap2::Mmap;

use crate::bvh::{BvhNTriM, Bvh2Tri1, Bvh4Tri4, Bvh8Tri4, ChildRef, TriBundle, WideNode};
use crate::target::BvhWidth;
use crate::util::{Error, Result};

/// Bytes of the record header.
pub const RECORD_HEADER_SIZE: usize = 8;

/// Append one record to `w`. Returns the number of bytes written.
pub fn write_bvh<L: BvhNTriM, W: Write>(w: &mut W, nodes: &[L::Node], tris: &[L::Tri]) -> Result<u64> {
    w.write_u32::<LittleEndian>(size_of::<L::Node>() as u32)?;
    w.write_u32::<LittleEndian>(size_of::<L::Tri>() as u32)?;
    let node_bytes: &[u8] = bytemuck::cast_slice(nodes);
    let tri_bytes: &[u8] = bytemuck::cast_slice(tris);
    w.write_all(node_bytes)?;
    w.write_all(tri_bytes)?;

    tracing::info!("BVH with {} node(s), {} tri(s)", nodes.len(), tris.len());
    Ok((RECORD_HEADER_SIZE + node_bytes.len() + tri_bytes.len()) as u64)
}

/// Buffered writer appending records to a cache file.
pub struct BvhWriter {
    writer: BufWriter<File>,
    pos: u64,
}

impl BvhWriter {
    /// Create or truncate `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
        Ok(Self::from_file(file, 0))
    }

    /// Open `path` for appending, creating it when missing.
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        let pos = file.metadata()?.len();
        Ok(Self::from_file(file, pos))
    }

    fn from_file(file: File, pos: u64) -> Self {
        Self {
            writer: BufWriter::with_capacity(1024 * 1024, file),
            pos,
        }
    }

    /// Current end of file.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Append one record.
    pub fn write<L: BvhNTriM>(&mut self, nodes: &[L::Node], tris: &[L::Tri]) -> Result<()> {
        self.pos += write_bvh::<L, _>(&mut self.writer, nodes, tris)?;
        Ok(())
    }

    /// Flush and sync to disk.
    pub fn finish(mut self) -> Result<u64> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(self.pos)
    }
}

/// One decoded record.
#[derive(Debug, Clone)]
pub struct BvhRecord<L: BvhNTriM> {
    pub nodes: Vec<L::Node>,
    pub tris: Vec<L::Tri>,
}

/// Layout whose record sizes match a header.
pub fn layout_of(node_size: usize, tri_size: usize) -> Option<BvhWidth> {
    [BvhWidth::Bvh2Tri1, BvhWidth::Bvh4Tri4, BvhWidth::Bvh8Tri4]
        .into_iter()
        .find(|w| record_sizes(*w) == (node_size, tri_size))
}

/// `(node size, bundle size)` in bytes for a layout.
pub fn record_sizes(width: BvhWidth) -> (usize, usize) {
    fn sizes<L: BvhNTriM>() -> (usize, usize) {
        (size_of::<L::Node>(), size_of::<L::Tri>())
    }
    match width {
        BvhWidth::Bvh2Tri1 => sizes::<Bvh2Tri1>(),
        BvhWidth::Bvh4Tri4 => sizes::<Bvh4Tri4>(),
        BvhWidth::Bvh8Tri4 => sizes::<Bvh8Tri4>(),
    }
}

fn read_u32(data: &[u8], pos: usize) -> Result<u32> {
    let bytes = data.get(pos..pos + 4).ok_or(Error::Truncated(pos as u64))?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Record header at `pos`: `(node size, bundle size)`.
pub fn read_header(data: &[u8], pos: usize) -> Result<(usize, usize)> {
    Ok((read_u32(data, pos)? as usize, read_u32(data, pos + 4)? as usize))
}

fn read_record<T: bytemuck::Pod>(data: &[u8], pos: usize) -> Result<T> {
    let bytes = data
        .get(pos..pos + size_of::<T>())
        .ok_or(Error::Truncated(pos as u64))?;
    Ok(bytemuck::pod_read_unaligned(bytes))
}

/// Decode the record starting at `*pos` and advance past it.
pub fn read_bvh<L: BvhNTriM>(data: &[u8], pos: &mut usize) -> Result<BvhRecord<L>> {
    let (node_size, tri_size) = read_header(data, *pos)?;
    let (expected_node, expected_tri) = (size_of::<L::Node>(), size_of::<L::Tri>());
    if (node_size, tri_size) != (expected_node, expected_tri) {
        return Err(Error::LayoutMismatch {
            layout: L::NAME,
            node: expected_node,
            tri: expected_tri,
            found_node: node_size,
            found_tri: tri_size,
        });
    }
    let mut cursor = *pos + RECORD_HEADER_SIZE;

    // Nodes up to the highest referenced index
    let mut nodes: Vec<L::Node> = Vec::new();
    let mut node_count = 1;
    let mut last_leaf: Option<usize> = None;
    while nodes.len() < node_count {
        let node: L::Node = read_record(data, cursor)?;
        cursor += node_size;
        for (_, child) in node.children() {
            match child {
                ChildRef::Node(i) => node_count = node_count.max(i as usize + 1),
                ChildRef::Leaf(off) => last_leaf = last_leaf.max(Some(off as usize)),
                ChildRef::Empty => {}
            }
        }
        nodes.push(node);
    }
    let last_leaf = last_leaf.ok_or_else(|| Error::invalid(format!("record at byte {} has no leaves", *pos)))?;

    // Bundles up to the end of the last leaf
    let mut tris: Vec<L::Tri> = Vec::new();
    loop {
        let tri: L::Tri = read_record(data, cursor)?;
        cursor += tri_size;
        let done = tris.len() >= last_leaf && tri.ends_leaf();
        tris.push(tri);
        if done {
            break;
        }
    }

    tracing::debug!(
        layout = L::NAME,
        nodes = nodes.len(),
        bundles = tris.len(),
        offset = *pos,
        "read BVH record"
    );
    *pos = cursor;
    Ok(BvhRecord { nodes, tris })
}

/// Decode every record of `data`.
pub fn read_all<L: BvhNTriM>(data: &[u8]) -> Result<Vec<BvhRecord<L>>> {
    let mut pos = 0;
    let mut records = Vec::new();
    while pos < data.len() {
        records.push(read_bvh::<L>(data, &mut pos)?);
    }
    Ok(records)
}

/// Read-only view of a cache file.
pub struct BvhFile {
    map: Option<Mmap>,
}

impl BvhFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let size = file.metadata()?.len();
        // Mapping an empty file fails on some platforms
        let map = if size > 0 {
            // Safety: mapped read-only, the cache is not modified while read
            Some(unsafe { Mmap::map(&file) }?)
        } else {
            None
        };
        Ok(Self { map })
    }

    /// Raw file contents.
    pub fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    /// Layout of the first record, if any.
    pub fn layout(&self) -> Result<Option<BvhWidth>> {
        if self.bytes().is_empty() {
            return Ok(None);
        }
        let (node_size, tri_size) = read_header(self.bytes(), 0)?;
        Ok(layout_of(node_size, tri_size))
    }

    /// Decode every record as layout `L`.
    pub fn records<L: BvhNTriM>(&self) -> Result<Vec<BvhRecord<L>>> {
        read_all::<L>(self.bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bvh::{build_bvh, Node8, Tri1, Tri4};
    use crate::config::BuildConfig;
    use crate::mesh::Triangle;
    use crate::util::Vec3;

    fn strip(n: usize) -> Vec<Triangle> {
        (0..n)
            .map(|i| {
                let o = Vec3::new(i as f32, (i % 3) as f32, 0.0);
                Triangle::new(o, o + Vec3::X, o + Vec3::Z, i as u32, (i % 2) as u32)
            })
            .collect()
    }

    fn build<L: BvhNTriM>(n: usize) -> (Vec<L::Node>, Vec<L::Tri>) {
        let (mut nodes, mut tris) = (Vec::new(), Vec::new());
        build_bvh::<L>(&strip(n), &mut nodes, &mut tris, &BuildConfig::default()).unwrap();
        (nodes, tris)
    }

    #[test]
    fn test_round_trip_is_byte_exact() {
        let (nodes, tris) = build::<Bvh8Tri4>(150);
        let mut buf = Vec::new();
        let written = write_bvh::<Bvh8Tri4, _>(&mut buf, &nodes, &tris).unwrap();
        assert_eq!(written as usize, buf.len());
        assert_eq!(read_header(&buf, 0).unwrap(), (224, 224));

        let mut pos = 0;
        let record = read_bvh::<Bvh8Tri4>(&buf, &mut pos).unwrap();
        assert_eq!(pos, buf.len());
        assert_eq!(bytemuck::cast_slice::<Node8, u8>(&record.nodes), bytemuck::cast_slice::<Node8, u8>(&nodes));
        assert_eq!(bytemuck::cast_slice::<Tri4, u8>(&record.tris), bytemuck::cast_slice::<Tri4, u8>(&tris));
    }

    #[test]
    fn test_concatenated_records() {
        let a = build::<Bvh2Tri1>(1);
        let b = build::<Bvh2Tri1>(37);
        let mut buf = Vec::new();
        write_bvh::<Bvh2Tri1, _>(&mut buf, &a.0, &a.1).unwrap();
        write_bvh::<Bvh2Tri1, _>(&mut buf, &b.0, &b.1).unwrap();

        let records = read_all::<Bvh2Tri1>(&buf).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].nodes, a.0);
        assert_eq!(records[0].tris, a.1);
        assert_eq!(records[1].nodes, b.0);
        assert_eq!(bytemuck::cast_slice::<Tri1, u8>(&records[1].tris), bytemuck::cast_slice::<Tri1, u8>(&b.1));
    }

    #[test]
    fn test_layout_mismatch() {
        let (nodes, tris) = build::<Bvh4Tri4>(10);
        let mut buf = Vec::new();
        write_bvh::<Bvh4Tri4, _>(&mut buf, &nodes, &tris).unwrap();
        let mut pos = 0;
        assert!(matches!(
            read_bvh::<Bvh8Tri4>(&buf, &mut pos),
            Err(Error::LayoutMismatch {
                found_node: 112,
                found_tri: 224,
                ..
            })
        ));
        assert_eq!(layout_of(112, 224), Some(BvhWidth::Bvh4Tri4));
        assert_eq!(layout_of(1, 2), None);
    }

    #[test]
    fn test_truncated_record() {
        let (nodes, tris) = build::<Bvh4Tri4>(40);
        let mut buf = Vec::new();
        write_bvh::<Bvh4Tri4, _>(&mut buf, &nodes, &tris).unwrap();
        buf.truncate(buf.len() - 10);
        let mut pos = 0;
        assert!(matches!(read_bvh::<Bvh4Tri4>(&buf, &mut pos), Err(Error::Truncated(_))));
    }

    #[test]
    fn test_writer_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bvh.bin");
        let (nodes, tris) = build::<Bvh4Tri4>(20);

        let mut w = BvhWriter::create(&path).unwrap();
        w.write::<Bvh4Tri4>(&nodes, &tris).unwrap();
        let first = w.finish().unwrap();

        let mut w = BvhWriter::append(&path).unwrap();
        assert_eq!(w.pos(), first);
        w.write::<Bvh4Tri4>(&nodes, &tris).unwrap();
        let total = w.finish().unwrap();
        assert_eq!(total, 2 * first);

        let file = BvhFile::open(&path).unwrap();
        assert_eq!(file.layout().unwrap(), Some(BvhWidth::Bvh4Tri4));
        assert_eq!(file.records::<Bvh4Tri4>().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let bvh = BvhFile::open(file.path()).unwrap();
        assert!(bvh.bytes().is_empty());
        assert_eq!(bvh.layout().unwrap(), None);
        assert!(bvh.records::<Bvh8Tri4>().unwrap().is_empty());
    }
}
