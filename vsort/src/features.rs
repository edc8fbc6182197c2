use std::{fmt, str::FromStr};

use crate::error::FeatureError;

/// Environment variable that replaces runtime detection with an explicit
/// feature list, e.g. `VSORT_FEATURES=x86-64-v3` or `VSORT_FEATURES=sse4.1,avx2`.
pub const FEATURES_ENV: &str = "VSORT_FEATURES";

/// The x86 instruction-set extensions that instruction selection cares about.
///
/// Every planning function takes one of these explicitly, so the same
/// analysis can be run for targets other than the one being compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TargetFeatures {
    pub sse2: bool,
    pub sse3: bool,
    pub ssse3: bool,
    pub sse4_1: bool,
    pub sse4_2: bool,
    pub avx: bool,
    pub avx2: bool,
    pub avx512f: bool,
    pub avx512vl: bool,
    pub avx512bw: bool,
    pub avx512vbmi: bool,
}

const NAMES: [&str; 11] = [
    "sse2",
    "sse3",
    "ssse3",
    "sse4.1",
    "sse4.2",
    "avx",
    "avx2",
    "avx512f",
    "avx512vl",
    "avx512bw",
    "avx512vbmi",
];

impl TargetFeatures {
    pub const NONE: Self = Self::from_flags([false; 11]);
    pub const ALL: Self = Self::from_flags([true; 11]);

    /// x86-64-v2
    pub const SSE4_2: Self = Self::from_flags([
        true, true, true, true, true, false, false, false, false, false, false,
    ]);
    /// x86-64-v3
    pub const AVX2: Self = Self::from_flags([
        true, true, true, true, true, true, true, false, false, false, false,
    ]);
    /// x86-64-v4
    pub const AVX512: Self = Self::from_flags([
        true, true, true, true, true, true, true, true, true, true, false,
    ]);
    /// Ice Lake and later
    pub const AVX512_VBMI: Self = Self::ALL;

    /// The features this crate was compiled with.
    pub const COMPILED: Self = Self::from_flags([
        cfg!(target_feature = "sse2"),
        cfg!(target_feature = "sse3"),
        cfg!(target_feature = "ssse3"),
        cfg!(target_feature = "sse4.1"),
        cfg!(target_feature = "sse4.2"),
        cfg!(target_feature = "avx"),
        cfg!(target_feature = "avx2"),
        cfg!(target_feature = "avx512f"),
        cfg!(target_feature = "avx512vl"),
        cfg!(target_feature = "avx512bw"),
        cfg!(target_feature = "avx512vbmi"),
    ]);

    pub const fn from_flags(flags: [bool; 11]) -> Self {
        Self {
            sse2: flags[0],
            sse3: flags[1],
            ssse3: flags[2],
            sse4_1: flags[3],
            sse4_2: flags[4],
            avx: flags[5],
            avx2: flags[6],
            avx512f: flags[7],
            avx512vl: flags[8],
            avx512bw: flags[9],
            avx512vbmi: flags[10],
        }
    }

    pub const fn flags(&self) -> [bool; 11] {
        [
            self.sse2,
            self.sse3,
            self.ssse3,
            self.sse4_1,
            self.sse4_2,
            self.avx,
            self.avx2,
            self.avx512f,
            self.avx512vl,
            self.avx512bw,
            self.avx512vbmi,
        ]
    }

    pub const fn union(self, other: Self) -> Self {
        let a = self.flags();
        let b = other.flags();
        let mut out = [false; 11];
        let mut i = 0;
        while i < 11 {
            out[i] = a[i] || b[i];
            i += 1;
        }
        Self::from_flags(out)
    }

    /// Every feature in `self` is also in `other`.
    pub const fn is_subset_of(&self, other: &Self) -> bool {
        let a = self.flags();
        let b = other.flags();
        let mut i = 0;
        while i < 11 {
            if a[i] && !b[i] {
                return false;
            }
            i += 1;
        }
        true
    }

    /// Adds the features implied by the ones already present
    /// (AVX2 implies AVX implies SSE4.2, and so on down).
    pub const fn with_implied(self) -> Self {
        let mut f = self.flags();
        // avx512bw, avx512vl and avx512vbmi all imply avx512f
        if f[8] || f[9] || f[10] {
            f[7] = true;
        }
        let mut i = 7;
        while i > 0 {
            if f[i] {
                f[i - 1] = true;
            }
            i -= 1;
        }
        Self::from_flags(f)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static str> {
        self.flags()
            .into_iter()
            .zip(NAMES)
            .filter_map(|(on, name)| on.then_some(name))
    }

    /// Reads the CPU's capabilities at runtime.
    ///
    /// When [`FEATURES_ENV`] is set it takes precedence over detection; an
    /// unparsable value is logged and ignored.
    pub fn detect() -> Self {
        if let Ok(value) = std::env::var(FEATURES_ENV) {
            match value.parse::<TargetFeatures>() {
                Ok(features) => {
                    log::info!("{FEATURES_ENV}={value}: using {features}");
                    return features;
                }
                Err(e) => log::warn!("ignoring {FEATURES_ENV}={value}: {e}"),
            }
        }

        #[cfg(target_arch = "x86_64")]
        {
            let features = Self {
                sse2: is_x86_feature_detected!("sse2"),
                sse3: is_x86_feature_detected!("sse3"),
                ssse3: is_x86_feature_detected!("ssse3"),
                sse4_1: is_x86_feature_detected!("sse4.1"),
                sse4_2: is_x86_feature_detected!("sse4.2"),
                avx: is_x86_feature_detected!("avx"),
                avx2: is_x86_feature_detected!("avx2"),
                avx512f: is_x86_feature_detected!("avx512f"),
                avx512vl: is_x86_feature_detected!("avx512vl"),
                avx512bw: is_x86_feature_detected!("avx512bw"),
                avx512vbmi: is_x86_feature_detected!("avx512vbmi"),
            };
            log::info!("detected CPU features: {features}");
            if !features.is_subset_of(&Self::COMPILED) {
                log::debug!(
                    "CPU supports more than the compiled target ({}); rebuild with \
                     -C target-cpu=native to use native registers",
                    Self::COMPILED
                );
            }
            features
        }

        #[cfg(not(target_arch = "x86_64"))]
        {
            log::info!("not an x86_64 target, using emulated registers only");
            Self::NONE
        }
    }
}

impl fmt::Display for TargetFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.iter();
        match names.next() {
            None => f.write_str("none"),
            Some(first) => {
                f.write_str(first)?;
                for name in names {
                    write!(f, ",{name}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for TargetFeatures {
    type Err = FeatureError;

    /// Parses a comma or whitespace separated list of feature names and
    /// `x86-64-v2`/`v3`/`v4` levels. Implied features are added.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut features = Self::NONE;
        let mut seen = false;
        for token in s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            seen = true;
            let token = token.to_ascii_lowercase();
            let parsed = match token.as_str() {
                "none" => Self::NONE,
                "all" => Self::ALL,
                "x86-64-v2" => Self::SSE4_2,
                "x86-64-v3" => Self::AVX2,
                "x86-64-v4" => Self::AVX512,
                name => {
                    let pos = NAMES
                        .iter()
                        .position(|n| *n == name || n.replace('.', "_") == name)
                        .ok_or_else(|| FeatureError::UnknownFeature(token.clone()))?;
                    let mut flags = [false; 11];
                    flags[pos] = true;
                    Self::from_flags(flags)
                }
            };
            features = features.union(parsed);
        }
        if !seen {
            return Err(FeatureError::Empty);
        }
        Ok(features.with_implied())
    }
}
