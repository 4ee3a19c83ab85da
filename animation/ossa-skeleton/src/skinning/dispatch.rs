//! CPU feature detection and skinning strategy selection

use super::{SkinningInput, SkinningOutput, scalar};
use crate::error::SkeletonError;
use glam::Mat4;
use log::{debug, warn};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

#[cfg(target_arch = "aarch64")]
use super::aarch64;
#[cfg(target_arch = "x86_64")]
use super::x86_64;

/// CPU capabilities detected at runtime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuFeatures {
    /// SSE2 (x86-64 baseline)
    pub has_sse2: bool,
    /// SSE4.1
    pub has_sse41: bool,
    /// AVX2 for 256-bit vector operations
    pub has_avx2: bool,
    /// NEON (ARM64 baseline)
    pub has_neon: bool,
}

/// Runtime CPU feature detection
pub fn detect_cpu_features() -> CpuFeatures {
    #[cfg(target_arch = "x86_64")]
    {
        CpuFeatures {
            has_sse2: is_x86_feature_detected!("sse2"),
            has_sse41: is_x86_feature_detected!("sse4.1"),
            has_avx2: is_x86_feature_detected!("avx2"),
            has_neon: false,
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        CpuFeatures {
            has_neon: std::arch::is_aarch64_feature_detected!("neon"),
            ..CpuFeatures::default()
        }
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        CpuFeatures::default()
    }
}

/// Which skinning implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum SkinningStrategy {
    /// Plain Rust, available everywhere
    Portable,
    /// SSE2 paths (x86-64)
    Sse,
    /// NEON paths (ARM64)
    Neon,
}

static GLOBAL_STRATEGY: OnceLock<SkinningStrategy> = OnceLock::new();

impl SkinningStrategy {
    /// Environment variable that forces a strategy
    pub const ENV_VAR: &'static str = "OSSA_SKINNING";

    pub const ALL: [Self; 3] = [Self::Portable, Self::Sse, Self::Neon];

    pub fn name(self) -> &'static str {
        match self {
            Self::Portable => "portable",
            Self::Sse => "sse",
            Self::Neon => "neon",
        }
    }

    /// Whether this strategy can run on a CPU with `features`.
    pub fn is_supported(self, features: &CpuFeatures) -> bool {
        match self {
            Self::Portable => true,
            Self::Sse => cfg!(target_arch = "x86_64") && features.has_sse2,
            Self::Neon => cfg!(target_arch = "aarch64") && features.has_neon,
        }
    }

    /// Every strategy usable with `features`, portable first.
    pub fn available(features: &CpuFeatures) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|strategy| strategy.is_supported(features))
            .collect()
    }

    /// Fastest strategy usable with `features`.
    pub fn best(features: &CpuFeatures) -> Self {
        [Self::Sse, Self::Neon]
            .into_iter()
            .find(|strategy| strategy.is_supported(features))
            .unwrap_or(Self::Portable)
    }

    /// Detect the CPU and pick a strategy, honouring `OSSA_SKINNING`.
    pub fn detect() -> Self {
        let features = detect_cpu_features();
        if let Ok(value) = std::env::var(Self::ENV_VAR) {
            match value.parse::<Self>() {
                Ok(strategy) if strategy.is_supported(&features) => return strategy,
                Ok(strategy) => warn!(
                    "{}={value}: {strategy} is not supported on this CPU, detecting instead",
                    Self::ENV_VAR
                ),
                Err(err) => warn!("{}={value}: {err}, detecting instead", Self::ENV_VAR),
            }
        }
        Self::best(&features)
    }

    /// The process-wide strategy, chosen on first use and reused after.
    pub fn global() -> Self {
        *GLOBAL_STRATEGY.get_or_init(|| {
            let strategy = Self::detect();
            debug!("selected skinning strategy: {strategy}");
            strategy
        })
    }

    /// Run a pass whose buffers have passed `check_buffers`. A strategy that
    /// is not compiled for this architecture runs the portable path.
    #[allow(unsafe_code)]
    pub(crate) fn run(
        self,
        input: &SkinningInput<'_>,
        output: &mut SkinningOutput<'_>,
        matrices: &[Mat4],
    ) {
        match self {
            // SAFETY: SSE2 is baseline on x86-64 and the caller checked the
            // buffers.
            #[cfg(target_arch = "x86_64")]
            Self::Sse => unsafe { x86_64::skin_sse2(input, output, matrices) },
            // SAFETY: NEON is baseline on ARM64 and the caller checked the
            // buffers.
            #[cfg(target_arch = "aarch64")]
            Self::Neon => unsafe { aarch64::skin_neon(input, output, matrices) },
            _ => scalar::skin(input, output, matrices),
        }
    }
}

impl fmt::Display for SkinningStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SkinningStrategy {
    type Err = SkeletonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "portable" | "scalar" => Ok(Self::Portable),
            "sse" | "sse2" => Ok(Self::Sse),
            "neon" => Ok(Self::Neon),
            other => Err(SkeletonError::invalid_argument(format!(
                "unknown skinning strategy '{other}' (expected portable, sse or neon)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_feature_detection_stability() {
        assert_eq!(detect_cpu_features(), detect_cpu_features());
    }

    #[test]
    fn test_portable_always_available() {
        let none = CpuFeatures::default();
        assert_eq!(SkinningStrategy::available(&none), vec![SkinningStrategy::Portable]);
        assert_eq!(SkinningStrategy::best(&none), SkinningStrategy::Portable);

        let detected = SkinningStrategy::available(&detect_cpu_features());
        assert_eq!(detected[0], SkinningStrategy::Portable);
    }

    #[test]
    fn test_global_is_stable_and_supported() {
        let first = SkinningStrategy::global();
        assert_eq!(first, SkinningStrategy::global());
        assert!(first.is_supported(&detect_cpu_features()));
    }

    #[test_case("portable", SkinningStrategy::Portable)]
    #[test_case("SSE", SkinningStrategy::Sse)]
    #[test_case(" neon ", SkinningStrategy::Neon)]
    fn test_parse(text: &str, expected: SkinningStrategy) {
        assert_eq!(text.parse::<SkinningStrategy>().unwrap(), expected);
    }

    #[test]
    fn test_parse_unknown() {
        assert!(matches!(
            "avx512".parse::<SkinningStrategy>(),
            Err(SkeletonError::InvalidArgument(_))
        ));
    }
}
