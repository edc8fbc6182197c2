//! Instruction selection for one compare-exchange stage.

use std::{fmt, marker::PhantomData};

use crate::{
    analysis::{
        build_across_lanes_vec_initializer, build_blend_mask, build_blend_vec_initializer,
        build_shuffle_mask,
        encode_index, in_same_lanes, permute_index, rotations_used, selection_mask, widen_mask,
        LanePerm, Permutation, MAX_BYTES,
    },
    features::TargetFeatures,
    register::RegisterWidth,
    SimdRegister, SortElement,
};

/// How a register is permuted. Byte arrays are little-endian register images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermuteLowering {
    Identity,
    /// `pshufd`, one pattern for every sub-lane. Also moves 64-bit lanes in pairs.
    ShuffleDwords { imm: u8 },
    /// `pshuflw` followed by `pshufhw`.
    ShuffleWords { lo: u8, hi: u8 },
    /// `pshufb` with a sub-lane local control.
    ShuffleBytes { control: [u8; MAX_BYTES] },
    /// `pshufb` of the register rotated by each sub-lane count in `rotations`,
    /// merged with OR. Controls zero every byte owned by another rotation.
    SplitLaneBytes {
        rotations: u8,
        controls: [[u8; MAX_BYTES]; 4],
    },
    /// `vpermq` with an immediate (256-bit only).
    PermuteQwords { imm: u8 },
    /// `permutexvar` at `granularity` bytes per index.
    PermuteVar {
        granularity: usize,
        control: [u8; MAX_BYTES],
    },
    Unsupported,
}

const fn feature_set(flags: [bool; 11]) -> TargetFeatures {
    TargetFeatures::from_flags(flags).with_implied()
}

const SSE2: TargetFeatures = feature_set([
    true, false, false, false, false, false, false, false, false, false, false,
]);
const SSSE3: TargetFeatures = feature_set([
    false, false, true, false, false, false, false, false, false, false, false,
]);
const SSE4_1: TargetFeatures = feature_set([
    false, false, false, true, false, false, false, false, false, false, false,
]);
const AVX2: TargetFeatures = feature_set([
    false, false, false, false, false, false, true, false, false, false, false,
]);
const AVX512F: TargetFeatures = feature_set([
    false, false, false, false, false, false, false, true, false, false, false,
]);
const AVX512BW: TargetFeatures = feature_set([
    false, false, false, false, false, false, false, false, false, true, false,
]);
const AVX512VBMI: TargetFeatures = feature_set([
    false, false, false, false, false, false, false, false, false, false, true,
]);
const AVX512VL: TargetFeatures = feature_set([
    false, false, false, false, false, false, false, false, true, false, false,
]);

const fn by_width(width: RegisterWidth, xmm: TargetFeatures, ymm: TargetFeatures, zmm: TargetFeatures) -> TargetFeatures {
    match width {
        RegisterWidth::Xmm => xmm,
        RegisterWidth::Ymm => ymm,
        RegisterWidth::Zmm => zmm,
    }
}

/// Features an AVX-512 instruction needs at `width`: VL below 512 bits.
const fn avx512(base: TargetFeatures, width: RegisterWidth) -> TargetFeatures {
    match width {
        RegisterWidth::Zmm => base,
        _ => base.union(AVX512VL),
    }
}

impl PermuteLowering {
    /// Extensions needed to encode this lowering at `width`, or `None` if
    /// no such instruction exists for that register.
    pub const fn requires(&self, width: RegisterWidth) -> Option<TargetFeatures> {
        match self {
            Self::Identity => Some(TargetFeatures::NONE),
            Self::ShuffleDwords { .. } => Some(by_width(width, SSE2, AVX2, AVX512F)),
            Self::ShuffleWords { .. } => Some(by_width(width, SSE2, AVX2, AVX512BW)),
            Self::ShuffleBytes { .. } => Some(by_width(width, SSSE3, AVX2, AVX512BW)),
            Self::SplitLaneBytes { .. } => match width {
                RegisterWidth::Xmm => None,
                RegisterWidth::Ymm => Some(AVX2),
                RegisterWidth::Zmm => Some(AVX512BW),
            },
            Self::PermuteQwords { .. } => match width {
                RegisterWidth::Ymm => Some(AVX2),
                _ => None,
            },
            Self::PermuteVar { granularity, .. } => match (*granularity, width) {
                (1, _) => Some(avx512(AVX512VBMI, width)),
                (2, _) => Some(avx512(AVX512BW, width)),
                (4, RegisterWidth::Ymm) => Some(AVX2),
                (4 | 8, RegisterWidth::Zmm) => Some(AVX512F),
                (8, RegisterWidth::Ymm) => Some(avx512(AVX512F, width)),
                _ => None,
            },
            Self::Unsupported => None,
        }
    }

    pub const fn is_supported_by(&self, features: &TargetFeatures, width: RegisterWidth) -> bool {
        match self.requires(width) {
            Some(needed) => needed.is_subset_of(&features.with_implied()),
            None => false,
        }
    }

    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported)
    }

    /// A single instruction with no control vector.
    pub const fn is_single_shuffle(&self) -> bool {
        matches!(
            self,
            Self::Identity | Self::ShuffleDwords { .. } | Self::ShuffleWords { .. }
        )
    }

    /// Moves data across 128-bit sub-lanes.
    pub const fn is_cross_lane(&self) -> bool {
        matches!(
            self,
            Self::SplitLaneBytes { .. } | Self::PermuteQwords { .. } | Self::PermuteVar { .. }
        )
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::ShuffleDwords { .. } => "pshufd",
            Self::ShuffleWords { .. } => "pshuflw+pshufhw",
            Self::ShuffleBytes { .. } => "pshufb",
            Self::SplitLaneBytes { .. } => "split-lane pshufb",
            Self::PermuteQwords { .. } => "vpermq",
            Self::PermuteVar { granularity: 1, .. } => "vpermb",
            Self::PermuteVar { granularity: 2, .. } => "vpermw",
            Self::PermuteVar { granularity: 4, .. } => "vpermd",
            Self::PermuteVar { .. } => "vpermq",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for PermuteLowering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShuffleDwords { imm } => write!(f, "{} {imm:#04x}", self.name()),
            Self::ShuffleWords { lo, hi } => write!(f, "{} {lo:#04x},{hi:#04x}", self.name()),
            Self::SplitLaneBytes { rotations, .. } => {
                write!(f, "{} x{}", self.name(), rotations.count_ones())
            }
            Self::PermuteQwords { imm } => write!(f, "{} {imm:#04x}", self.name()),
            _ => f.write_str(self.name()),
        }
    }
}

/// How `v_min` lanes are merged into `v_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendLowering {
    /// AVX-512 `vmovdqu{8,16,32,64}` under a k-mask, one bit per unit.
    MaskMove { granularity: usize, mask: u64 },
    /// `vpblendd`
    BlendDwords { imm: u8 },
    /// `pblendw`, the immediate repeats for every sub-lane.
    BlendWords { imm: u8 },
    /// `pblendvb`, the sign bit of every control byte selects `v_min`.
    BlendBytes { control: [u8; MAX_BYTES] },
    Unsupported,
}

impl BlendLowering {
    pub const fn requires(&self, width: RegisterWidth) -> Option<TargetFeatures> {
        match self {
            Self::MaskMove { granularity, .. } => match *granularity {
                1 | 2 => Some(avx512(AVX512BW, width)),
                _ => Some(avx512(AVX512F, width)),
            },
            Self::BlendDwords { .. } => match width {
                RegisterWidth::Zmm => None,
                _ => Some(AVX2),
            },
            Self::BlendWords { .. } | Self::BlendBytes { .. } => match width {
                RegisterWidth::Xmm => Some(SSE4_1),
                RegisterWidth::Ymm => Some(AVX2),
                RegisterWidth::Zmm => None,
            },
            Self::Unsupported => None,
        }
    }

    pub const fn is_supported_by(&self, features: &TargetFeatures, width: RegisterWidth) -> bool {
        match self.requires(width) {
            Some(needed) => needed.is_subset_of(&features.with_implied()),
            None => false,
        }
    }

    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::MaskMove { .. } => "mask mov",
            Self::BlendDwords { .. } => "vpblendd",
            Self::BlendWords { .. } => "pblendw",
            Self::BlendBytes { .. } => "pblendvb",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for BlendLowering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaskMove { granularity, mask } => {
                write!(f, "{} epi{} {mask:#x}", self.name(), granularity * 8)
            }
            Self::BlendDwords { imm } | Self::BlendWords { imm } => {
                write!(f, "{} {imm:#04x}", self.name())
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// Picks the cheapest permute for `perm`.
///
/// A single in-lane shuffle wins when one pattern fits every sub-lane, then a
/// general permute. Targets without a general permute for the element size
/// fall back to a per-lane byte shuffle, and finally to the split-lane
/// sequence when data crosses sub-lanes.
pub const fn plan_permute(
    features: TargetFeatures,
    elem_bytes: usize,
    width: RegisterWidth,
    perm: &LanePerm,
) -> PermuteLowering {
    if perm.is_identity() {
        return PermuteLowering::Identity;
    }

    let shuffle = build_shuffle_mask(perm, elem_bytes);
    if shuffle != 0 {
        let candidate = match elem_bytes {
            1 => PermuteLowering::ShuffleBytes {
                control: build_across_lanes_vec_initializer(perm, elem_bytes, 0),
            },
            2 => PermuteLowering::ShuffleWords {
                lo: shuffle as u8,
                hi: (shuffle >> 32) as u8,
            },
            _ => PermuteLowering::ShuffleDwords { imm: shuffle as u8 },
        };
        if candidate.is_supported_by(&features, width) {
            return candidate;
        }
    }

    if elem_bytes == 8 {
        let mut imm = 0u8;
        let mut i = 0;
        while i < 4 {
            imm |= ((perm.get(i) & 3) as u8) << (2 * i);
            i += 1;
        }
        let candidate = PermuteLowering::PermuteQwords { imm };
        if candidate.is_supported_by(&features, width) {
            return candidate;
        }
    }

    let mut granularity = elem_bytes;
    while granularity >= 1 {
        let units = width.bytes() / granularity;
        let index = permute_index(perm, elem_bytes, granularity);
        let candidate = PermuteLowering::PermuteVar {
            granularity,
            control: encode_index(&index, units, granularity),
        };
        if candidate.is_supported_by(&features, width) {
            return candidate;
        }
        // vpermd stands in for vpermq on AVX2; byte and word permutes only at
        // their own size
        if granularity <= 4 {
            break;
        }
        granularity /= 2;
    }

    if in_same_lanes(perm, elem_bytes) {
        let candidate = PermuteLowering::ShuffleBytes {
            control: build_across_lanes_vec_initializer(perm, elem_bytes, 0),
        };
        if candidate.is_supported_by(&features, width) {
            return candidate;
        }
    }

    let rotations = rotations_used(perm, elem_bytes);
    let mut controls = [[0u8; MAX_BYTES]; 4];
    let mut r = 0;
    while r < width.sub_lanes() {
        controls[r] = build_across_lanes_vec_initializer(perm, elem_bytes, r);
        r += 1;
    }
    let candidate = PermuteLowering::SplitLaneBytes {
        rotations,
        controls,
    };
    if candidate.is_supported_by(&features, width) {
        return candidate;
    }

    PermuteLowering::Unsupported
}

/// Word-granularity immediate for `pblendw`, if every sub-lane agrees.
const fn blend_words_imm(mask: u64, elem_bytes: usize, width: RegisterWidth) -> Option<u8> {
    let lanes = width.lanes(elem_bytes);
    let words = widen_mask(mask, elem_bytes / 2, lanes);
    let imm = words as u8;
    let mut lane = 1;
    while lane < width.sub_lanes() {
        if (words >> (8 * lane)) as u8 != imm {
            return None;
        }
        lane += 1;
    }
    Some(imm)
}

/// Picks the blend for a selection mask (one bit per lane).
pub const fn plan_blend(
    features: TargetFeatures,
    elem_bytes: usize,
    width: RegisterWidth,
    mask: u64,
) -> BlendLowering {
    let lanes = width.lanes(elem_bytes);
    let mask_move = BlendLowering::MaskMove {
        granularity: elem_bytes,
        mask,
    };
    let bytes = BlendLowering::BlendBytes {
        control: build_blend_vec_initializer(mask, elem_bytes, lanes),
    };
    let dwords = if elem_bytes >= 4 {
        BlendLowering::BlendDwords {
            imm: build_blend_mask(mask, elem_bytes, width) as u8,
        }
    } else {
        BlendLowering::Unsupported
    };
    let words = if elem_bytes >= 2 {
        match blend_words_imm(mask, elem_bytes, width) {
            Some(imm) => BlendLowering::BlendWords { imm },
            None => BlendLowering::Unsupported,
        }
    } else {
        BlendLowering::Unsupported
    };

    let candidates = match elem_bytes {
        1 => [mask_move, bytes, BlendLowering::Unsupported, BlendLowering::Unsupported],
        2 => [words, mask_move, bytes, BlendLowering::Unsupported],
        _ => [dwords, mask_move, words, bytes],
    };
    let mut i = 0;
    while i < candidates.len() {
        if candidates[i].is_supported_by(&features, width) {
            return candidates[i];
        }
        i += 1;
    }
    BlendLowering::Unsupported
}

/// Compile-time verdicts for one compare-exchange stage of permutation `P`
/// over `N` lanes of `T` held in register `R`.
///
/// Each constant is evaluated when first named from a monomorphized
/// function, so a bad permutation or a lowering the target cannot execute is
/// a build error.
pub struct Stage<T, R, P, const N: usize>(PhantomData<(T, R, P)>);

impl<T, R, P, const N: usize> Stage<T, R, P, N>
where
    T: SortElement,
    R: SimdRegister<T>,
    P: Permutation<N>,
{
    pub const LANES: usize = R::WIDTH.lanes(T::BYTES);

    pub const PERM: LanePerm = {
        assert!(N <= Self::LANES, "more lanes than the register holds");
        LanePerm::new(P::INDEX.as_slice(), Self::LANES)
    };

    pub const IN_RANGE: () = assert!(
        Self::PERM.out_of_range().is_none(),
        "permutation index out of range"
    );

    pub const CHECKED: () = {
        let () = Self::IN_RANGE;
        assert!(
            Self::PERM.unpaired().is_none(),
            "permutation is not a self-inverse matching"
        );
    };

    pub const PERMUTE: PermuteLowering = {
        let () = Self::IN_RANGE;
        let lowering = plan_permute(R::FEATURES, T::BYTES, R::WIDTH, &Self::PERM);
        assert!(
            !lowering.is_unsupported(),
            "no permute instruction for this permutation on the target"
        );
        lowering
    };

    pub const MASK: u64 = selection_mask(&Self::PERM);

    pub const BLEND: BlendLowering = {
        let lowering = plan_blend(R::FEATURES, T::BYTES, R::WIDTH, Self::MASK);
        assert!(!lowering.is_unsupported(), "no blend instruction on the target");
        lowering
    };
}

/// Blend of a caller supplied selection mask.
pub struct MaskedBlend<T, R, const MASK: u64>(PhantomData<(T, R)>);

impl<T, R, const MASK: u64> MaskedBlend<T, R, MASK>
where
    T: SortElement,
    R: SimdRegister<T>,
{
    pub const BLEND: BlendLowering = {
        let lowering = plan_blend(R::FEATURES, T::BYTES, R::WIDTH, MASK);
        assert!(!lowering.is_unsupported(), "no blend instruction on the target");
        lowering
    };
}
