use core::arch::x86_64::*;

use crate::{
    features::TargetFeatures,
    plan::{BlendLowering, PermuteLowering},
    register::RegisterWidth,
    sealed::Lowered,
    SimdRegister,
};

#[inline(always)]
unsafe fn load_control(control: &[u8]) -> __m256i {
    _mm256_loadu_si256(control.as_ptr().cast())
}

#[inline(always)]
fn permute(v: __m256i, lowering: &PermuteLowering) -> __m256i {
    unsafe {
        match lowering {
            PermuteLowering::Identity => v,
            PermuteLowering::ShuffleDwords { imm } => {
                macro_rules! call {
                    ($imm:literal) => {
                        _mm256_shuffle_epi32::<$imm>(v)
                    };
                }
                constify_imm8!(*imm, call)
            }
            PermuteLowering::ShuffleWords { lo, hi } => {
                macro_rules! call_lo {
                    ($imm:literal) => {
                        _mm256_shufflelo_epi16::<$imm>(v)
                    };
                }
                let low = constify_imm8!(*lo, call_lo);
                macro_rules! call_hi {
                    ($imm:literal) => {
                        _mm256_shufflehi_epi16::<$imm>(low)
                    };
                }
                constify_imm8!(*hi, call_hi)
            }
            PermuteLowering::ShuffleBytes { control } => {
                _mm256_shuffle_epi8(v, load_control(control))
            }
            PermuteLowering::SplitLaneBytes { controls, .. } => {
                // a missing rotation has an all-zeroing control
                let swapped = _mm256_permute4x64_epi64::<0x4E>(v);
                _mm256_or_si256(
                    _mm256_shuffle_epi8(v, load_control(&controls[0])),
                    _mm256_shuffle_epi8(swapped, load_control(&controls[1])),
                )
            }
            PermuteLowering::PermuteQwords { imm } => {
                macro_rules! call {
                    ($imm:literal) => {
                        _mm256_permute4x64_epi64::<$imm>(v)
                    };
                }
                constify_imm8!(*imm, call)
            }
            PermuteLowering::PermuteVar {
                granularity: 4,
                control,
            } => _mm256_permutevar8x32_epi32(v, load_control(control)),
            #[cfg(all(target_feature = "avx512f", target_feature = "avx512vl"))]
            PermuteLowering::PermuteVar {
                granularity: 8,
                control,
            } => _mm256_permutexvar_epi64(load_control(control), v),
            #[cfg(all(target_feature = "avx512bw", target_feature = "avx512vl"))]
            PermuteLowering::PermuteVar {
                granularity: 2,
                control,
            } => _mm256_permutexvar_epi16(load_control(control), v),
            #[cfg(all(target_feature = "avx512vbmi", target_feature = "avx512vl"))]
            PermuteLowering::PermuteVar {
                granularity: 1,
                control,
            } => _mm256_permutexvar_epi8(load_control(control), v),
            _ => unreachable!("{lowering} was not planned for ymm"),
        }
    }
}

#[inline(always)]
fn blend(v_max: __m256i, v_min: __m256i, lowering: &BlendLowering) -> __m256i {
    unsafe {
        match lowering {
            BlendLowering::BlendDwords { imm } => {
                macro_rules! call {
                    ($imm:literal) => {
                        _mm256_blend_epi32::<$imm>(v_max, v_min)
                    };
                }
                constify_imm8!(*imm, call)
            }
            BlendLowering::BlendWords { imm } => {
                macro_rules! call {
                    ($imm:literal) => {
                        _mm256_blend_epi16::<$imm>(v_max, v_min)
                    };
                }
                constify_imm8!(*imm, call)
            }
            BlendLowering::BlendBytes { control } => {
                _mm256_blendv_epi8(v_max, v_min, load_control(control))
            }
            #[cfg(target_feature = "avx512vl")]
            BlendLowering::MaskMove { granularity, mask } => match *granularity {
                #[cfg(target_feature = "avx512bw")]
                1 => _mm256_mask_mov_epi8(v_max, *mask as __mmask32, v_min),
                #[cfg(target_feature = "avx512bw")]
                2 => _mm256_mask_mov_epi16(v_max, *mask as __mmask16, v_min),
                4 => _mm256_mask_mov_epi32(v_max, *mask as __mmask8, v_min),
                8 => _mm256_mask_mov_epi64(v_max, *mask as __mmask8, v_min),
                _ => unreachable!("{lowering} was not planned for ymm"),
            },
            _ => unreachable!("{lowering} was not planned for ymm"),
        }
    }
}

#[cfg(not(target_feature = "avx512vl"))]
#[inline(always)]
unsafe fn flip_sign_epi64(a: __m256i) -> __m256i {
    _mm256_xor_si256(a, _mm256_set1_epi64x(i64::MIN))
}

#[inline(always)]
unsafe fn min_epi64(a: __m256i, b: __m256i) -> __m256i {
    #[cfg(target_feature = "avx512vl")]
    {
        _mm256_min_epi64(a, b)
    }
    #[cfg(not(target_feature = "avx512vl"))]
    {
        _mm256_blendv_epi8(a, b, _mm256_cmpgt_epi64(a, b))
    }
}

#[inline(always)]
unsafe fn max_epi64(a: __m256i, b: __m256i) -> __m256i {
    #[cfg(target_feature = "avx512vl")]
    {
        _mm256_max_epi64(a, b)
    }
    #[cfg(not(target_feature = "avx512vl"))]
    {
        _mm256_blendv_epi8(b, a, _mm256_cmpgt_epi64(a, b))
    }
}

#[inline(always)]
unsafe fn min_epu64(a: __m256i, b: __m256i) -> __m256i {
    #[cfg(target_feature = "avx512vl")]
    {
        _mm256_min_epu64(a, b)
    }
    #[cfg(not(target_feature = "avx512vl"))]
    {
        let gt = _mm256_cmpgt_epi64(flip_sign_epi64(a), flip_sign_epi64(b));
        _mm256_blendv_epi8(a, b, gt)
    }
}

#[inline(always)]
unsafe fn max_epu64(a: __m256i, b: __m256i) -> __m256i {
    #[cfg(target_feature = "avx512vl")]
    {
        _mm256_max_epu64(a, b)
    }
    #[cfg(not(target_feature = "avx512vl"))]
    {
        let gt = _mm256_cmpgt_epi64(flip_sign_epi64(a), flip_sign_epi64(b));
        _mm256_blendv_epi8(b, a, gt)
    }
}

macro_rules! impl_ymm {
    ($($t:ty => $min:path, $max:path);* $(;)?) => {
        $(
            impl SimdRegister<$t> for __m256i {
                const WIDTH: RegisterWidth = RegisterWidth::Ymm;
                const FEATURES: TargetFeatures = TargetFeatures::COMPILED;

                #[inline]
                unsafe fn load(ptr: *const $t) -> Self {
                    _mm256_load_si256(ptr.cast())
                }

                #[inline]
                unsafe fn store(ptr: *mut $t, v: Self) {
                    _mm256_store_si256(ptr.cast(), v)
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

            impl Lowered<$t> for __m256i {
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

impl_ymm!(
    i8 => _mm256_min_epi8, _mm256_max_epi8;
    u8 => _mm256_min_epu8, _mm256_max_epu8;
    i16 => _mm256_min_epi16, _mm256_max_epi16;
    u16 => _mm256_min_epu16, _mm256_max_epu16;
    i32 => _mm256_min_epi32, _mm256_max_epi32;
    u32 => _mm256_min_epu32, _mm256_max_epu32;
    i64 => min_epi64, max_epi64;
    u64 => min_epu64, max_epu64;
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

    test_native_register!(__m256i;
        i8 => 32, u8 => 32,
        i16 => 16, u16 => 16,
        i32 => 8, u32 => 8,
        i64 => 4, u64 => 4,
    );

    #[test]
    fn test_split_lane_swap() {
        // bytes 0 and 16 trade places across the 128-bit halves
        let values: Vec<u8> = (0..32).collect();
        let mut index: Vec<usize> = (0..32).collect();
        index.swap(0, 16);
        let perm = LanePerm::new(&index, 32);
        let lowering = plan_permute(TargetFeatures::AVX2, 1, RegisterWidth::Ymm, &perm);
        assert!(matches!(lowering, PermuteLowering::SplitLaneBytes { rotations: 0b11, .. }));

        let mut buffer = SortBuffer::new(&values).unwrap();
        let v = buffer.load_in::<__m256i>();
        buffer.store_in(<__m256i as Lowered<u8>>::permute(v, &lowering));
        assert_eq!(buffer.as_slice()[0], 16);
        assert_eq!(buffer.as_slice()[16], 0);
        assert_eq!(&buffer.as_slice()[1..16], &values[1..16]);
    }
}
