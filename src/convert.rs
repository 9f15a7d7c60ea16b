//! Mesh to BVH cache conversion.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::bvh::{build_bvh, validate, BuildStats, BvhNTriM, BvhSummary, Bvh2Tri1, Bvh4Tri4, Bvh8Tri4};
use crate::cache::{bvh_path, clear_cache, must_build_bvh, write_mesh_buffers, write_stamp, BvhFile, BvhWriter};
use crate::config::{BuildConfig, ConvertOptions};
use crate::mesh::{prepare_triangles, Triangle, TriMesh};
use crate::target::BvhWidth;
use crate::util::{Error, Result};

/// What [`build_cache`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    Built(BuildStats),
    /// The stamp matched and the existing cache was kept.
    Reused,
}

/// Build the BVH cache for `mesh` unless the stamp in the output directory
/// already matches `(target, name)`.
///
/// A stale cache is deleted before building. The stamp is written last, once
/// the cache file is complete.
#[tracing::instrument(skip_all, fields(name = %options.name, target = %options.target))]
pub fn build_cache(mesh: &TriMesh, options: &ConvertOptions, config: &BuildConfig) -> Result<BuildOutcome> {
    let dir = &options.output_dir;
    fs::create_dir_all(dir)?;

    if !options.force && !must_build_bvh(dir, &options.name, options.target)? {
        info!("Reusing existing BVH for '{}'", options.name);
        return Ok(BuildOutcome::Reused);
    }

    clear_cache(dir)?;
    info!("Generating BVH for '{}' ({})", options.name, options.target.width());

    let mut writer = BvhWriter::create(bvh_path(dir))?;
    let stats = append_geometry(&mut writer, mesh, &options.name, options.target.width(), config)?;
    writer.finish()?;

    if options.mesh_buffers {
        write_mesh_buffers(mesh, dir, options.padding)?;
    }
    write_stamp(dir, &options.name, options.target)?;
    Ok(BuildOutcome::Built(stats))
}

/// Build `mesh` in layout `width` and append it as one more record.
pub fn append_geometry(
    writer: &mut BvhWriter,
    mesh: &TriMesh,
    name: &str,
    width: BvhWidth,
    config: &BuildConfig,
) -> Result<BuildStats> {
    let prims = prepare_triangles(mesh, name)?;
    let stats = match width {
        BvhWidth::Bvh2Tri1 => build_record::<Bvh2Tri1>(writer, &prims, config)?,
        BvhWidth::Bvh4Tri4 => build_record::<Bvh4Tri4>(writer, &prims, config)?,
        BvhWidth::Bvh8Tri4 => build_record::<Bvh8Tri4>(writer, &prims, config)?,
    };
    info!(
        nodes = stats.nodes,
        leaves = stats.leaves,
        references = stats.references,
        spatial_splits = stats.spatial_splits,
        depth = stats.max_depth,
        "Built {} for '{}'",
        width,
        name
    );
    Ok(stats)
}

fn build_record<L: BvhNTriM>(writer: &mut BvhWriter, prims: &[Triangle], config: &BuildConfig) -> Result<BuildStats> {
    let mut nodes = Vec::new();
    let mut tris = Vec::new();
    let stats = build_bvh::<L>(prims, &mut nodes, &mut tris, config)?;
    writer.write::<L>(&nodes, &tris)?;
    Ok(stats)
}

/// Layout and per-record summaries of a cache file.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheReport {
    pub width: BvhWidth,
    pub records: Vec<BvhSummary>,
}

/// Read and validate every record of a cache file.
///
/// With `width` set, records must have that layout; otherwise the layout is
/// taken from the first record header.
pub fn inspect_cache(path: impl AsRef<Path>, width: Option<BvhWidth>) -> Result<CacheReport> {
    let path = path.as_ref();
    let file = BvhFile::open(path)?;
    let width = match width {
        Some(w) => w,
        None => file.layout()?.ok_or_else(|| {
            Error::invalid(format!("{}: empty file or unknown record sizes", path.display()))
        })?,
    };

    fn summarize<L: BvhNTriM>(file: &BvhFile) -> Result<Vec<BvhSummary>> {
        file.records::<L>()?
            .iter()
            .map(|r| validate::<L>(&r.nodes, &r.tris))
            .collect()
    }

    let records = match width {
        BvhWidth::Bvh2Tri1 => summarize::<Bvh2Tri1>(&file)?,
        BvhWidth::Bvh4Tri4 => summarize::<Bvh4Tri4>(&file)?,
        BvhWidth::Bvh8Tri4 => summarize::<Bvh8Tri4>(&file)?,
    };
    Ok(CacheReport { width, records })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Target;
    use crate::util::Vec3;

    fn quad() -> TriMesh {
        TriMesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
            vec![0, 1, 2, 0, 0, 2, 3, 1],
        )
        .unwrap()
    }

    #[test]
    fn test_build_then_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let options = ConvertOptions::new(dir.path(), Target::Sse42, "quad");
        let config = BuildConfig::default();

        let outcome = build_cache(&quad(), &options, &config).unwrap();
        assert!(matches!(outcome, BuildOutcome::Built(ref s) if s.primitives == 2));
        assert_eq!(build_cache(&quad(), &options, &config).unwrap(), BuildOutcome::Reused);

        let forced = ConvertOptions {
            force: true,
            ..options.clone()
        };
        assert!(matches!(build_cache(&quad(), &forced, &config).unwrap(), BuildOutcome::Built(_)));

        let report = inspect_cache(bvh_path(dir.path()), None).unwrap();
        assert_eq!(report.width, BvhWidth::Bvh4Tri4);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].references, 2);
    }

    #[test]
    fn test_padded_names_are_reused() {
        for name in [" scene.obj", "scene.obj "] {
            let dir = tempfile::tempdir().unwrap();
            let options = ConvertOptions::new(dir.path(), Target::Avx2, name);
            build_cache(&quad(), &options, &BuildConfig::default()).unwrap();
            assert!(!must_build_bvh(dir.path(), name, Target::Avx2).unwrap(), "{:?}", name);
            assert_eq!(
                build_cache(&quad(), &options, &BuildConfig::default()).unwrap(),
                BuildOutcome::Reused
            );
        }
    }

    #[test]
    fn test_target_change_rebuilds() {
        let dir = tempfile::tempdir().unwrap();
        let config = BuildConfig::default();
        let cpu = ConvertOptions::new(dir.path(), Target::Avx2, "quad");
        build_cache(&quad(), &cpu, &config).unwrap();

        let gpu = ConvertOptions::new(dir.path(), Target::AmdgpuStreaming, "quad");
        assert!(matches!(build_cache(&quad(), &gpu, &config).unwrap(), BuildOutcome::Built(_)));
        let report = inspect_cache(bvh_path(dir.path()), Some(BvhWidth::Bvh2Tri1)).unwrap();
        assert_eq!(report.records.len(), 1);
        assert!(inspect_cache(bvh_path(dir.path()), Some(BvhWidth::Bvh8Tri4)).is_err());
    }

    #[test]
    fn test_empty_mesh_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mesh = TriMesh::new(vec![Vec3::ZERO], Vec::new()).unwrap();
        let options = ConvertOptions::new(dir.path(), Target::Generic, "empty.obj");
        let err = build_cache(&mesh, &options, &BuildConfig::default()).unwrap_err();
        assert!(matches!(err, Error::EmptyMesh(ref name) if name == "empty.obj"));
        // No stamp for a failed build
        assert!(must_build_bvh(dir.path(), "empty.obj", Target::Generic).unwrap());
    }

    #[test]
    fn test_append_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let path = bvh_path(dir.path());
        let mut writer = BvhWriter::create(&path).unwrap();
        append_geometry(&mut writer, &quad(), "a", BvhWidth::Bvh8Tri4, &BuildConfig::default()).unwrap();
        append_geometry(&mut writer, &quad(), "b", BvhWidth::Bvh8Tri4, &BuildConfig::default()).unwrap();
        writer.finish().unwrap();

        let report = inspect_cache(&path, None).unwrap();
        assert_eq!(report.width, BvhWidth::Bvh8Tri4);
        assert_eq!(report.records.len(), 2);
    }
}
