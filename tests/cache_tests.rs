//! Integration tests for the on-disk cache: stamp protocol, record files and
//! mesh buffers.

use std::fs;

use widebvh::cache::{bvh_path, read_all, stamp_path, write_bvh, BvhRecord, MESH_BUFFER_FILES};
use widebvh::prelude::*;
use widebvh::util::Vec3;

use tempfile::{tempdir, NamedTempFile};

fn tetrahedron() -> TriMesh {
    let vertices = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(0.0, 0.0, 1.0),
    ];
    let indices = vec![0, 2, 1, 0, 0, 1, 3, 1, 0, 3, 2, 2, 1, 2, 3, 3];
    TriMesh::new(vertices, indices).expect("valid tetrahedron")
}

fn grid(n: u32) -> TriMesh {
    let mut vertices = Vec::new();
    for y in 0..=n {
        for x in 0..=n {
            vertices.push(Vec3::new(x as f32, y as f32, ((x + y) % 3) as f32 * 0.1));
        }
    }
    let mut indices = Vec::new();
    for y in 0..n {
        for x in 0..n {
            let i = y * (n + 1) + x;
            indices.extend_from_slice(&[i, i + 1, i + n + 2, 0]);
            indices.extend_from_slice(&[i, i + n + 2, i + n + 1, 0]);
        }
    }
    TriMesh::new(vertices, indices).expect("valid grid")
}

#[test]
fn test_stamp_protocol_end_to_end() {
    let dir = tempdir().expect("temp dir");
    let config = BuildConfig::default();
    let mesh = tetrahedron();

    assert!(must_build_bvh(dir.path(), "tet.json", Target::Avx2).unwrap());
    let options = ConvertOptions::new(dir.path(), Target::Avx2, "tet.json");
    assert!(matches!(build_cache(&mesh, &options, &config).unwrap(), BuildOutcome::Built(_)));
    assert!(!must_build_bvh(dir.path(), "tet.json", Target::Avx2).unwrap());

    let stamp = fs::read_to_string(stamp_path(dir.path())).unwrap();
    assert_eq!(stamp, "1 tet.json");

    // Same pair is reused without touching the cache
    let before = fs::read(bvh_path(dir.path())).unwrap();
    assert_eq!(build_cache(&mesh, &options, &config).unwrap(), BuildOutcome::Reused);
    assert_eq!(fs::read(bvh_path(dir.path())).unwrap(), before);

    // Either token changing forces a rebuild
    assert!(must_build_bvh(dir.path(), "tet.json", Target::Sse42).unwrap());
    assert!(must_build_bvh(dir.path(), "cube.json", Target::Avx2).unwrap());
}

#[test]
fn test_stale_cache_is_replaced() {
    let dir = tempdir().expect("temp dir");
    fs::write(bvh_path(dir.path()), b"garbage from an interrupted run").unwrap();
    fs::write(stamp_path(dir.path()), "6 old.json").unwrap();

    let options = ConvertOptions::new(dir.path(), Target::Generic, "grid");
    build_cache(&grid(8), &options, &BuildConfig::default()).unwrap();

    let report = inspect_cache(bvh_path(dir.path()), Some(BvhWidth::Bvh4Tri4)).expect("rebuilt cache is valid");
    assert_eq!(report.records.len(), 1);
    assert_eq!(fs::read_to_string(stamp_path(dir.path())).unwrap(), "0 grid");
}

#[test]
fn test_file_round_trip_is_byte_exact() {
    let prims = prepare_triangles(&grid(10), "grid").unwrap();
    let (mut nodes, mut tris) = (Vec::new(), Vec::new());
    build_bvh::<Bvh8Tri4>(&prims, &mut nodes, &mut tris, &BuildConfig::default()).unwrap();

    let temp = NamedTempFile::new().expect("temp file");
    let mut writer = BvhWriter::create(temp.path()).unwrap();
    writer.write::<Bvh8Tri4>(&nodes, &tris).unwrap();
    let size = writer.finish().unwrap();

    let expected = 8 + nodes.len() * 224 + tris.len() * 224;
    assert_eq!(size as usize, expected);

    let file = BvhFile::open(temp.path()).unwrap();
    assert_eq!(file.bytes().len(), expected);
    assert_eq!(&file.bytes()[..8], &[224, 0, 0, 0, 224, 0, 0, 0]);

    let records: Vec<BvhRecord<Bvh8Tri4>> = file.records().unwrap();
    assert_eq!(records.len(), 1);
    let node_bytes: &[u8] = bytemuck::cast_slice(&nodes);
    let tri_bytes: &[u8] = bytemuck::cast_slice(&tris);
    assert_eq!(bytemuck::cast_slice::<_, u8>(&records[0].nodes), node_bytes);
    assert_eq!(bytemuck::cast_slice::<_, u8>(&records[0].tris), tri_bytes);
}

#[test]
fn test_multi_geometry_file() {
    let dir = tempdir().expect("temp dir");
    let path = bvh_path(dir.path());
    let config = BuildConfig::default();

    let mut writer = BvhWriter::create(&path).unwrap();
    append_geometry(&mut writer, &tetrahedron(), "tet", BvhWidth::Bvh2Tri1, &config).unwrap();
    append_geometry(&mut writer, &grid(6), "grid", BvhWidth::Bvh2Tri1, &config).unwrap();
    append_geometry(&mut writer, &tetrahedron(), "tet", BvhWidth::Bvh2Tri1, &config).unwrap();
    writer.finish().unwrap();

    let report = inspect_cache(&path, None).unwrap();
    assert_eq!(report.width, BvhWidth::Bvh2Tri1);
    assert_eq!(report.records.len(), 3);
    assert_eq!(report.records[0], report.records[2]);
    assert!(report.records[1].references >= 72);
}

#[test]
fn test_in_memory_concatenation() {
    let mut buf = Vec::new();
    for n in [1, 3, 5] {
        let prims = prepare_triangles(&grid(n), "grid").unwrap();
        let (mut nodes, mut tris) = (Vec::new(), Vec::new());
        build_bvh::<Bvh4Tri4>(&prims, &mut nodes, &mut tris, &BuildConfig::default()).unwrap();
        write_bvh::<Bvh4Tri4, _>(&mut buf, &nodes, &tris).unwrap();
    }
    let records = read_all::<Bvh4Tri4>(&buf).unwrap();
    assert_eq!(records.len(), 3);
    for r in &records {
        validate::<Bvh4Tri4>(&r.nodes, &r.tris).unwrap();
    }
}

#[test]
fn test_mesh_buffers_and_padding() {
    let dir = tempdir().expect("temp dir");
    let mesh = grid(2);

    let mut options = ConvertOptions::new(dir.path(), Target::NvvmMegakernel, "grid");
    options.mesh_buffers = true;
    assert!(options.padding);
    build_cache(&mesh, &options, &BuildConfig::default()).unwrap();
    for name in MESH_BUFFER_FILES {
        assert!(dir.path().join(name).exists(), "{} missing", name);
    }
    let len = |name: &str| fs::metadata(dir.path().join(name)).unwrap().len() as usize;
    assert_eq!(len("vertices.bin"), mesh.vertices.len() * 16);
    assert_eq!(len("indices.bin"), mesh.indices.len() * 4);
    assert_eq!(len("face_area.bin"), mesh.num_tris() * 4);

    let unpadded = tempdir().expect("temp dir");
    let mut options = ConvertOptions::new(unpadded.path(), Target::Avx, "grid");
    options.mesh_buffers = true;
    build_cache(&mesh, &options, &BuildConfig::default()).unwrap();
    assert_eq!(
        fs::metadata(unpadded.path().join("vertices.bin")).unwrap().len() as usize,
        mesh.vertices.len() * 12
    );
    assert_eq!(
        fs::metadata(unpadded.path().join("texcoords.bin")).unwrap().len() as usize,
        mesh.vertices.len() * 8
    );
}

#[test]
fn test_json_soup_to_cache() {
    let dir = tempdir().expect("temp dir");
    let soup_path = dir.path().join("tri.json");
    fs::write(
        &soup_path,
        r#"{ "vertices": [[0,0,0],[1,0,0],[0,1,0],[0,0,1]], "indices": [0,1,2,0, 0,2,3,1] }"#,
    )
    .unwrap();

    let mesh = MeshSoup::load(&soup_path).unwrap().into_mesh().unwrap();
    let out = dir.path().join("data");
    let options = ConvertOptions::new(&out, Target::AmdgpuStreaming, soup_path.display().to_string());
    let outcome = build_cache(&mesh, &options, &BuildConfig::default()).unwrap();
    assert!(matches!(outcome, BuildOutcome::Built(ref s) if s.primitives == 2));
    assert!(bvh_path(&out).exists());
}

#[test]
fn test_config_file() {
    let temp = NamedTempFile::new().expect("temp file");
    fs::write(temp.path(), r#"{ "bins": 8, "spatial_splits": false, "max_leaf_size": 4 }"#).unwrap();
    let config = BuildConfig::load(temp.path()).unwrap();
    assert_eq!(config.bins, 8);
    assert!(!config.spatial_splits);

    fs::write(temp.path(), r#"{ "bins": 0 }"#).unwrap();
    assert!(matches!(BuildConfig::load(temp.path()), Err(Error::Config(_))));
}
