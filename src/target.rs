//! Hardware targets and the BVH widths they consume.

use std::fmt;
use std::str::FromStr;

use crate::util::{Error, Result};

/// Hardware target of the generated structure.
///
/// Discriminants are stable: they are written to the build stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Target {
    Generic = 0,
    Avx2 = 1,
    Avx2Embree = 2,
    Avx = 3,
    Sse42 = 4,
    Asimd = 5,
    NvvmStreaming = 6,
    NvvmMegakernel = 7,
    AmdgpuStreaming = 8,
    AmdgpuMegakernel = 9,
}

/// Node/bundle width pair selected by a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BvhWidth {
    /// 2-wide nodes, single triangles (GPU).
    Bvh2Tri1,
    /// 4-wide nodes, 4-wide triangle bundles (SSE/NEON).
    Bvh4Tri4,
    /// 8-wide nodes, 4-wide triangle bundles (AVX).
    Bvh8Tri4,
}

impl Target {
    pub const ALL: [Target; 10] = [
        Target::Generic,
        Target::Avx2,
        Target::Avx2Embree,
        Target::Avx,
        Target::Sse42,
        Target::Asimd,
        Target::NvvmStreaming,
        Target::NvvmMegakernel,
        Target::AmdgpuStreaming,
        Target::AmdgpuMegakernel,
    ];

    /// Stable integer id.
    #[inline]
    pub fn id(self) -> u32 {
        self as u32
    }

    /// Look up a target by its integer id.
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.id() == id)
    }

    /// Canonical name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Target::Generic => "generic",
            Target::Avx2 => "avx2",
            Target::Avx2Embree => "avx2-embree",
            Target::Avx => "avx",
            Target::Sse42 => "sse42",
            Target::Asimd => "asimd",
            Target::NvvmStreaming => "nvvm-streaming",
            Target::NvvmMegakernel => "nvvm-megakernel",
            Target::AmdgpuStreaming => "amdgpu-streaming",
            Target::AmdgpuMegakernel => "amdgpu-megakernel",
        }
    }

    /// True for GPU targets.
    pub fn is_gpu(self) -> bool {
        matches!(
            self,
            Target::NvvmStreaming
                | Target::NvvmMegakernel
                | Target::AmdgpuStreaming
                | Target::AmdgpuMegakernel
        )
    }

    /// Width pair consumed by this target's traversal code.
    pub fn width(self) -> BvhWidth {
        match self {
            t if t.is_gpu() => BvhWidth::Bvh2Tri1,
            Target::Generic | Target::Asimd | Target::Sse42 => BvhWidth::Bvh4Tri4,
            _ => BvhWidth::Bvh8Tri4,
        }
    }

    /// Pick the best CPU target for the host.
    pub fn detect() -> Self {
        let target = Self::detect_cpu();
        if target == Target::Generic {
            tracing::warn!(
                "No vector instruction set detected. Select the target platform manually to improve performance."
            );
        }
        target
    }

    #[cfg(target_arch = "x86_64")]
    fn detect_cpu() -> Self {
        if std::arch::is_x86_feature_detected!("avx2") {
            Target::Avx2
        } else if std::arch::is_x86_feature_detected!("avx") {
            Target::Avx
        } else if std::arch::is_x86_feature_detected!("sse4.2") {
            Target::Sse42
        } else {
            Target::Generic
        }
    }

    #[cfg(target_arch = "aarch64")]
    fn detect_cpu() -> Self {
        if std::arch::is_aarch64_feature_detected!("neon") {
            Target::Asimd
        } else {
            Target::Generic
        }
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    fn detect_cpu() -> Self {
        Target::Generic
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "generic" => Target::Generic,
            "sse42" => Target::Sse42,
            "avx" => Target::Avx,
            "avx2" => Target::Avx2,
            "avx2-embree" => Target::Avx2Embree,
            "asimd" => Target::Asimd,
            "nvvm" | "nvvm-streaming" => Target::NvvmStreaming,
            "nvvm-megakernel" => Target::NvvmMegakernel,
            "amdgpu" | "amdgpu-streaming" => Target::AmdgpuStreaming,
            "amdgpu-megakernel" => Target::AmdgpuMegakernel,
            _ => return Err(Error::UnknownTarget(s.to_string())),
        })
    }
}

impl BvhWidth {
    /// `(node width, bundle width)`.
    pub fn dims(self) -> (usize, usize) {
        match self {
            BvhWidth::Bvh2Tri1 => (2, 1),
            BvhWidth::Bvh4Tri4 => (4, 4),
            BvhWidth::Bvh8Tri4 => (8, 4),
        }
    }
}

impl fmt::Display for BvhWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (n, m) = self.dims();
        write!(f, "BVH{}/TRI{}", n, m)
    }
}
