//! CPU-feature probe, used to pick which prebuilt engine binary variant to run and to
//! report capability in the `cpuid` CLI subcommand.

use serde::{Deserialize, Serialize};

/// Summary of the running CPU's relevant feature set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CpuInfo {
    pub vendor: String,
    /// At least SSE4.1+POPCNT (or better); the floor for a "modern" engine build.
    pub modern: bool,
    /// BMI2 and AVX2 both present (the usual gate for a bmi2-tuned engine build).
    pub bmi2: bool,
}

/// Build-tier name, cascading from best to worst. Mirrors the tiers a prebuilt engine
/// binary is typically shipped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTier {
    Avx512,
    Bmi2,
    Avx2,
    Sse41Popcnt,
    Ssse3,
    Sse3Popcnt,
    General,
}

impl BuildTier {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildTier::Avx512 => "avx512",
            BuildTier::Bmi2 => "bmi2",
            BuildTier::Avx2 => "avx2",
            BuildTier::Sse41Popcnt => "sse41-popcnt",
            BuildTier::Ssse3 => "ssse3",
            BuildTier::Sse3Popcnt => "sse3-popcnt",
            BuildTier::General => "general",
        }
    }
}

#[cfg(target_arch = "x86_64")]
fn probe() -> (CpuInfo, BuildTier) {
    use raw_cpuid::CpuId;

    let cpuid = CpuId::new();
    let vendor = cpuid
        .get_vendor_info()
        .map(|v| v.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let feature = cpuid.get_feature_info();
    let ext = cpuid.get_extended_feature_info();

    let sse3 = feature.as_ref().is_some_and(|f| f.has_sse3());
    let ssse3 = feature.as_ref().is_some_and(|f| f.has_ssse3());
    let sse41 = feature.as_ref().is_some_and(|f| f.has_sse41());
    let popcnt = feature.as_ref().is_some_and(|f| f.has_popcnt());
    let avx2 = ext.as_ref().is_some_and(|e| e.has_avx2());
    let bmi2 = ext.as_ref().is_some_and(|e| e.has_bmi2());
    let avx512f = ext.as_ref().is_some_and(|e| e.has_avx512f());

    let tier = if avx512f {
        BuildTier::Avx512
    } else if bmi2 && avx2 {
        BuildTier::Bmi2
    } else if avx2 {
        BuildTier::Avx2
    } else if sse41 && popcnt {
        BuildTier::Sse41Popcnt
    } else if ssse3 {
        BuildTier::Ssse3
    } else if sse3 && popcnt {
        BuildTier::Sse3Popcnt
    } else {
        BuildTier::General
    };

    let modern = !matches!(tier, BuildTier::General);
    (CpuInfo { vendor, modern, bmi2: bmi2 && avx2 }, tier)
}

#[cfg(not(target_arch = "x86_64"))]
fn probe() -> (CpuInfo, BuildTier) {
    (
        CpuInfo { vendor: "unknown".to_string(), modern: false, bmi2: false },
        BuildTier::General,
    )
}

/// Detect the running CPU's relevant feature set.
pub fn detect_cpu() -> CpuInfo {
    probe().0
}

/// Pick the best engine-build tier this CPU supports.
pub fn best_build_tier() -> BuildTier {
    probe().1
}
