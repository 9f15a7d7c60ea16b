//! Build stamp: records which (target, source) the cached BVH was built for.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::target::Target;
use crate::util::{Error, Result};

/// Cache file name inside the output directory.
pub const BVH_FILE: &str = "bvh.bin";
/// Stamp file name inside the output directory.
pub const STAMP_FILE: &str = "bvh.stamp";

/// Contents of a stamp file: `"<target id> <name>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    pub target: Target,
    pub name: String,
}

impl Stamp {
    pub fn new(target: Target, name: impl Into<String>) -> Self {
        Self {
            target,
            name: name.into(),
        }
    }

    /// Read a stamp, `None` when the file does not exist.
    pub fn read(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Self::parse(&text)
            .map(Some)
            .map_err(|reason| Error::InvalidStamp {
                path: path.to_path_buf(),
                reason,
            })
    }

    /// The name is everything after the single separator that follows the
    /// target id, minus one trailing line break. It is kept verbatim
    /// otherwise, so it may contain or start with spaces.
    fn parse(text: &str) -> std::result::Result<Self, String> {
        let text = text.trim_start();
        let (id, name) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
        let id: u32 = id.parse().map_err(|_| format!("bad target id '{}'", id))?;
        let target = Target::from_id(id).ok_or_else(|| format!("unknown target id {}", id))?;
        let name = name.strip_suffix('\n').map_or(name, |n| n.strip_suffix('\r').unwrap_or(n));
        Ok(Self::new(target, name))
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, format!("{} {}", self.target.id(), self.name))?;
        Ok(())
    }
}

pub fn bvh_path(dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref().join(BVH_FILE)
}

pub fn stamp_path(dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref().join(STAMP_FILE)
}

/// True when the BVH in `dir` was not built for `(target, name)`.
///
/// A missing or unreadable stamp forces a rebuild.
pub fn must_build_bvh(dir: impl AsRef<Path>, name: &str, target: Target) -> Result<bool> {
    match Stamp::read(stamp_path(dir)) {
        Ok(Some(stamp)) => Ok(stamp.target != target || stamp.name != name),
        Ok(None) => Ok(true),
        Err(Error::InvalidStamp { path, reason }) => {
            tracing::warn!("Ignoring stamp {}: {}", path.display(), reason);
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

/// Record a successful build of `(target, name)` in `dir`.
pub fn write_stamp(dir: impl AsRef<Path>, name: &str, target: Target) -> Result<()> {
    Stamp::new(target, name).write(stamp_path(dir))
}

/// Delete the cache and stamp in `dir`. Missing files are fine.
pub fn clear_cache(dir: impl AsRef<Path>) -> Result<()> {
    for path in [stamp_path(&dir), bvh_path(&dir)] {
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!("Removed {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
