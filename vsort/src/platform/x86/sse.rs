use core::arch::x86_64::*;

use crate::{
    features::TargetFeatures,
    plan::{BlendLowering, PermuteLowering},
    register::RegisterWidth,
    sealed::Lowered,
    SimdRegister,
};

#[inline(always)]
unsafe fn load_control(control: &[u8]) -> __m128i {
    _mm_loadu_si128(control.as_ptr().cast())
}

#[inline(always)]
fn permute(v: __m128i, lowering: &PermuteLowering) -> __m128i {
    unsafe {
        match lowering {
            PermuteLowering::Identity => v,
            PermuteLowering::ShuffleDwords { imm } => {
                macro_rules! call {
                    ($imm:literal) => {
                        _mm_shuffle_epi32::<$imm>(v)
                    };
                }
                constify_imm8!(*imm, call)
            }
            PermuteLowering::ShuffleWords { lo, hi } => {
                macro_rules! call_lo {
                    ($imm:literal) => {
                        _mm_shufflelo_epi16::<$imm>(v)
                    };
                }
                let low = constify_imm8!(*lo, call_lo);
                macro_rules! call_hi {
                    ($imm:literal) => {
                        _mm_shufflehi_epi16::<$imm>(low)
                    };
                }
                constify_imm8!(*hi, call_hi)
            }
            PermuteLowering::ShuffleBytes { control } => _mm_shuffle_epi8(v, load_control(control)),
            #[cfg(all(target_feature = "avx512bw", target_feature = "avx512vl"))]
            PermuteLowering::PermuteVar {
                granularity: 2,
                control,
            } => _mm_permutexvar_epi16(load_control(control), v),
            #[cfg(all(target_feature = "avx512vbmi", target_feature = "avx512vl"))]
            PermuteLowering::PermuteVar {
                granularity: 1,
                control,
            } => _mm_permutexvar_epi8(load_control(control), v),
            _ => unreachable!("{lowering} was not planned for xmm"),
        }
    }
}

#[inline(always)]
fn blend(v_max: __m128i, v_min: __m128i, lowering: &BlendLowering) -> __m128i {
    unsafe {
        match lowering {
            BlendLowering::BlendWords { imm } => {
                macro_rules! call {
                    ($imm:literal) => {
                        _mm_blend_epi16::<$imm>(v_max, v_min)
                    };
                }
                constify_imm8!(*imm, call)
            }
            #[cfg(target_feature = "avx2")]
            BlendLowering::BlendDwords { imm } => {
                macro_rules! call {
                    ($imm:literal) => {
                        _mm_blend_epi32::<$imm>(v_max, v_min)
                    };
                }
                constify_imm4!(*imm, call)
            }
            BlendLowering::BlendBytes { control } => {
                _mm_blendv_epi8(v_max, v_min, load_control(control))
            }
            #[cfg(target_feature = "avx512vl")]
            BlendLowering::MaskMove { granularity, mask } => match *granularity {
                #[cfg(target_feature = "avx512bw")]
                1 => _mm_mask_mov_epi8(v_max, *mask as __mmask16, v_min),
                #[cfg(target_feature = "avx512bw")]
                2 => _mm_mask_mov_epi16(v_max, *mask as __mmask8, v_min),
                4 => _mm_mask_mov_epi32(v_max, *mask as __mmask8, v_min),
                8 => _mm_mask_mov_epi64(v_max, *mask as __mmask8, v_min),
                _ => unreachable!("{lowering} was not planned for xmm"),
            },
            _ => unreachable!("{lowering} was not planned for xmm"),
        }
    }
}

/// Flips the sign bit so signed compares order unsigned values.
#[cfg(all(target_feature = "sse4.2", not(target_feature = "avx512vl")))]
#[inline(always)]
unsafe fn flip_sign_epi64(a: __m128i) -> __m128i {
    _mm_xor_si128(a, _mm_set1_epi64x(i64::MIN))
}

#[cfg(target_feature = "sse4.2")]
#[inline(always)]
unsafe fn min_epi64(a: __m128i, b: __m128i) -> __m128i {
    #[cfg(target_feature = "avx512vl")]
    {
        _mm_min_epi64(a, b)
    }
    #[cfg(not(target_feature = "avx512vl"))]
    {
        _mm_blendv_epi8(a, b, _mm_cmpgt_epi64(a, b))
    }
}

#[cfg(target_feature = "sse4.2")]
#[inline(always)]
unsafe fn max_epi64(a: __m128i, b: __m128i) -> __m128i {
    #[cfg(target_feature = "avx512vl")]
    {
        _mm_max_epi64(a, b)
    }
    #[cfg(not(target_feature = "avx512vl"))]
    {
        _mm_blendv_epi8(b, a, _mm_cmpgt_epi64(a, b))
    }
}

#[cfg(target_feature = "sse4.2")]
#[inline(always)]
unsafe fn min_epu64(a: __m128i, b: __m128i) -> __m128i {
    #[cfg(target_feature = "avx512vl")]
    {
        _mm_min_epu64(a, b)
    }
    #[cfg(not(target_feature = "avx512vl"))]
    {
        _mm_blendv_epi8(a, b, _mm_cmpgt_epi64(flip_sign_epi64(a), flip_sign_epi64(b)))
    }
}

#[cfg(target_feature = "sse4.2")]
#[inline(always)]
unsafe fn max_epu64(a: __m128i, b: __m128i) -> __m128i {
    #[cfg(target_feature = "avx512vl")]
    {
        _mm_max_epu64(a, b)
    }
    #[cfg(not(target_feature = "avx512vl"))]
    {
        _mm_blendv_epi8(b, a, _mm_cmpgt_epi64(flip_sign_epi64(a), flip_sign_epi64(b)))
    }
}

macro_rules! impl_xmm {
    ($t:ty, $min:path, $max:path) => {
        impl SimdRegister<$t> for __m128i {
            const WIDTH: RegisterWidth = RegisterWidth::Xmm;
            const FEATURES: TargetFeatures = TargetFeatures::COMPILED;

            #[inline]
            unsafe fn load(ptr: *const $t) -> Self {
                _mm_load_si128(ptr.cast())
            }

            #[inline]
            unsafe fn store(ptr: *mut $t, v: Self) {
                _mm_store_si128(ptr.cast(), v)
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

        impl Lowered<$t> for __m128i {
            #[inline]
            fn permute(v: Self, lowering: &PermuteLowering) -> Self {
                permute(v, lowering)
            }

            #[inline]
            fn blend(v_max: Self, v_min: Self, lowering: &BlendLowering) -> Self {
                blend(v_max, v_min, lowering)
            }
        }
    };
}

impl_xmm!(i8, _mm_min_epi8, _mm_max_epi8);
impl_xmm!(u8, _mm_min_epu8, _mm_max_epu8);
impl_xmm!(i16, _mm_min_epi16, _mm_max_epi16);
impl_xmm!(u16, _mm_min_epu16, _mm_max_epu16);
impl_xmm!(i32, _mm_min_epi32, _mm_max_epi32);
impl_xmm!(u32, _mm_min_epu32, _mm_max_epu32);
#[cfg(target_feature = "sse4.2")]
impl_xmm!(i64, min_epi64, max_epi64);
#[cfg(target_feature = "sse4.2")]
impl_xmm!(u64, min_epu64, max_epu64);

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

    test_native_register!(__m128i;
        i8 => 16, u8 => 16,
        i16 => 8, u16 => 8,
        i32 => 4, u32 => 4,
    );

    #[cfg(target_feature = "sse4.2")]
    mod bit_64 {
        use super::*;

        test_native_register!(__m128i; i64 => 2, u64 => 2);

        #[test]
        fn test_unsigned_compare() {
            let a = SortBuffer::new(&[u64::MAX, 1]).unwrap().load_in::<__m128i>();
            let b = SortBuffer::new(&[0u64, 1 << 63]).unwrap().load_in::<__m128i>();
            let mut out = SortBuffer::new(&[0u64, 0]).unwrap();
            out.store_in(<__m128i as SimdRegister<u64>>::min(a, b));
            assert_eq!(out.as_slice(), [0, 1]);
            out.store_in(<__m128i as SimdRegister<u64>>::max(a, b));
            assert_eq!(out.as_slice(), [u64::MAX, 1 << 63]);
        }
    }
}
