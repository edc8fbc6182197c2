use core::arch::x86_64::*;

use crate::{
    features::TargetFeatures,
    plan::{BlendLowering, PermuteLowering},
    register::RegisterWidth,
    sealed::Lowered,
    SimdRegister,
};

#[inline(always)]
unsafe fn load_control(control: &[u8]) -> __m512i {
    _mm512_loadu_si512(control.as_ptr().cast())
}

/// Sub-lane `l` of the result is sub-lane `l + rotation` of `v`.
#[cfg(target_feature = "avx512bw")]
#[inline(always)]
unsafe fn rotate_lanes(v: __m512i, rotation: usize) -> __m512i {
    match rotation {
        0 => v,
        1 => _mm512_shuffle_i32x4::<0x39>(v, v),
        2 => _mm512_shuffle_i32x4::<0x4E>(v, v),
        _ => _mm512_shuffle_i32x4::<0x93>(v, v),
    }
}

#[inline(always)]
fn permute(v: __m512i, lowering: &PermuteLowering) -> __m512i {
    unsafe {
        match lowering {
            PermuteLowering::Identity => v,
            PermuteLowering::ShuffleDwords { imm } => {
                macro_rules! call {
                    ($imm:literal) => {
                        _mm512_shuffle_epi32::<$imm>(v)
                    };
                }
                constify_imm8!(*imm, call)
            }
            #[cfg(target_feature = "avx512bw")]
            PermuteLowering::ShuffleWords { lo, hi } => {
                macro_rules! call_lo {
                    ($imm:literal) => {
                        _mm512_shufflelo_epi16::<$imm>(v)
                    };
                }
                let low = constify_imm8!(*lo, call_lo);
                macro_rules! call_hi {
                    ($imm:literal) => {
                        _mm512_shufflehi_epi16::<$imm>(low)
                    };
                }
                constify_imm8!(*hi, call_hi)
            }
            #[cfg(target_feature = "avx512bw")]
            PermuteLowering::ShuffleBytes { control } => {
                _mm512_shuffle_epi8(v, load_control(control))
            }
            #[cfg(target_feature = "avx512bw")]
            PermuteLowering::SplitLaneBytes {
                rotations,
                controls,
            } => {
                let mut out = _mm512_setzero_si512();
                for (r, control) in controls.iter().enumerate() {
                    if rotations & (1 << r) != 0 {
                        let part = _mm512_shuffle_epi8(rotate_lanes(v, r), load_control(control));
                        out = _mm512_or_si512(out, part);
                    }
                }
                out
            }
            PermuteLowering::PermuteVar {
                granularity: 8,
                control,
            } => _mm512_permutexvar_epi64(load_control(control), v),
            PermuteLowering::PermuteVar {
                granularity: 4,
                control,
            } => _mm512_permutexvar_epi32(load_control(control), v),
            #[cfg(target_feature = "avx512bw")]
            PermuteLowering::PermuteVar {
                granularity: 2,
                control,
            } => _mm512_permutexvar_epi16(load_control(control), v),
            #[cfg(target_feature = "avx512vbmi")]
            PermuteLowering::PermuteVar {
                granularity: 1,
                control,
            } => _mm512_permutexvar_epi8(load_control(control), v),
            _ => unreachable!("{lowering} was not planned for zmm"),
        }
    }
}

#[inline(always)]
fn blend(v_max: __m512i, v_min: __m512i, lowering: &BlendLowering) -> __m512i {
    unsafe {
        match lowering {
            BlendLowering::MaskMove { granularity, mask } => match *granularity {
                #[cfg(target_feature = "avx512bw")]
                1 => _mm512_mask_mov_epi8(v_max, *mask, v_min),
                #[cfg(target_feature = "avx512bw")]
                2 => _mm512_mask_mov_epi16(v_max, *mask as __mmask32, v_min),
                4 => _mm512_mask_mov_epi32(v_max, *mask as __mmask16, v_min),
                8 => _mm512_mask_mov_epi64(v_max, *mask as __mmask8, v_min),
                _ => unreachable!("{lowering} was not planned for zmm"),
            },
            _ => unreachable!("{lowering} was not planned for zmm"),
        }
    }
}

macro_rules! impl_zmm {
    ($($t:ty => $min:path, $max:path);* $(;)?) => {
        $(
            impl SimdRegister<$t> for __m512i {
                const WIDTH: RegisterWidth = RegisterWidth::Zmm;
                const FEATURES: TargetFeatures = TargetFeatures::COMPILED;

                #[inline]
                unsafe fn load(ptr: *const $t) -> Self {
                    _mm512_load_si512(ptr.cast())
                }

                #[inline]
                unsafe fn store(ptr: *mut $t, v: Self) {
                    _mm512_store_si512(ptr.cast(), v)
                }

                #[inline]
                fn min(a: Self, b: Self) -> Self {
                    unsafe { $min(a, b) }
                }

                #[inline]
                fn max(a: Self, b: Self) -> Self {
                    unsafe { $max(a, b) }
                }
            }

            impl Lowered<$t> for __m512i {
                #[inline]
                fn permute(v: Self, lowering: &PermuteLowering) -> Self {
                    permute(v, lowering)
                }

                #[inline]
                fn blend(v_max: Self, v_min: Self, lowering: &BlendLowering) -> Self {
                    blend(v_max, v_min, lowering)
                }
            }
        )*
    };
}

impl_zmm!(
    i32 => _mm512_min_epi32, _mm512_max_epi32;
    u32 => _mm512_min_epu32, _mm512_max_epu32;
    i64 => _mm512_min_epi64, _mm512_max_epi64;
    u64 => _mm512_min_epu64, _mm512_max_epu64;
);

#[cfg(target_feature = "avx512bw")]
impl_zmm!(
    i8 => _mm512_min_epi8, _mm512_max_epi8;
    u8 => _mm512_min_epu8, _mm512_max_epu8;
    i16 => _mm512_min_epi16, _mm512_max_epi16;
    u16 => _mm512_min_epu16, _mm512_max_epu16;
);

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        analysis::LanePerm,
        network::SortBuffer,
        plan::{plan_blend, plan_permute},
        test::{random_matching, random_permutation, random_values, structured_permutations},
        SortElement,
    };
    use rand::{rngs::StdRng, Rng, SeedableRng};

    test_native_register!(__m512i;
        i32 => 16, u32 => 16,
        i64 => 8, u64 => 8,
    );

    #[cfg(target_feature = "avx512bw")]
    mod bw {
        use super::*;

        test_native_register!(__m512i;
            i8 => 64, u8 => 64,
            i16 => 32, u16 => 32,
        );

        #[test]
        fn test_split_lane_rotations() {
            // bytes 3 and 60 trade places, three sub-lanes apart
            let values: Vec<u8> = (0..64).collect();
            let mut index: Vec<usize> = (0..64).collect();
            index.swap(3, 60);
            let perm = LanePerm::new(&index, 64);
            let lowering = plan_permute(TargetFeatures::AVX512, 1, RegisterWidth::Zmm, &perm);
            assert!(matches!(
                lowering,
                PermuteLowering::SplitLaneBytes {
                    rotations: 0b1011,
                    ..
                }
            ));

            let mut buffer = SortBuffer::new(&values).unwrap();
            let v = buffer.load_in::<__m512i>();
            buffer.store_in(<__m512i as Lowered<u8>>::permute(v, &lowering));
            assert_eq!(buffer.as_slice()[3], 60);
            assert_eq!(buffer.as_slice()[60], 3);
            assert_eq!(&buffer.as_slice()[4..60], &values[4..60]);
        }
    }
}
