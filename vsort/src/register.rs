use std::{fmt, marker::PhantomData};

use crate::{SimdRegister, SortElement};

/// Hardware register sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterWidth {
    /// 128-bit
    Xmm,
    /// 256-bit
    Ymm,
    /// 512-bit
    Zmm,
}

impl RegisterWidth {
    /// Smallest register that holds `lanes` elements of `elem_bytes` each.
    pub const fn select(elem_bytes: usize, lanes: usize) -> Option<Self> {
        match elem_bytes * lanes {
            0..=16 => Some(Self::Xmm),
            17..=32 => Some(Self::Ymm),
            33..=64 => Some(Self::Zmm),
            _ => None,
        }
    }

    pub const fn bytes(self) -> usize {
        match self {
            Self::Xmm => 16,
            Self::Ymm => 32,
            Self::Zmm => 64,
        }
    }

    /// Elements of `elem_bytes` the register holds.
    pub const fn lanes(self, elem_bytes: usize) -> usize {
        self.bytes() / elem_bytes
    }

    /// Number of 128-bit sub-lanes.
    pub const fn sub_lanes(self) -> usize {
        self.bytes() / 16
    }
}

impl fmt::Display for RegisterWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xmm => f.write_str("xmm"),
            Self::Ymm => f.write_str("ymm"),
            Self::Zmm => f.write_str("zmm"),
        }
    }
}

/// `N` lanes of `T`, used only to pick a register type.
pub struct Lanes<T, const N: usize>(PhantomData<T>);

/// Maps an element type and lane count to the register that holds them.
///
/// The native register is used when the crate is compiled with the target
/// features it needs, otherwise the scalar [`Emulated`](crate::Emulated) register stands in.
pub trait SelectVec<T: SortElement> {
    type Vec: SimdRegister<T>;
}

/// Register type for `N` lanes of `T`.
pub type VecT<T, const N: usize> = <Lanes<T, N> as SelectVec<T>>::Vec;

macro_rules! select_vec {
    ($t:ty, $native:ty, $gate:meta, $lanes:literal, [$($n:literal)*]) => {
        $(
            impl SelectVec<$t> for Lanes<$t, $n> {
                #[cfg($gate)]
                type Vec = $native;
                #[cfg(not($gate))]
                type Vec = crate::emulated::Emulated<$t, $lanes>;
            }
        )*
    };
}

macro_rules! select_vec_1 {
    ($($t:ty),*) => {
        $(
            select_vec!($t, core::arch::x86_64::__m128i,
                all(target_arch = "x86_64", target_feature = "sse4.1"), 16,
                [1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16]);
            select_vec!($t, core::arch::x86_64::__m256i,
                all(target_arch = "x86_64", target_feature = "avx2"), 32,
                [17 18 19 20 21 22 23 24 25 26 27 28 29 30 31 32]);
            select_vec!($t, core::arch::x86_64::__m512i,
                all(target_arch = "x86_64", target_feature = "avx512bw"), 64,
                [33 34 35 36 37 38 39 40 41 42 43 44 45 46 47 48
                 49 50 51 52 53 54 55 56 57 58 59 60 61 62 63 64]);
        )*
    };
}

macro_rules! select_vec_2 {
    ($($t:ty),*) => {
        $(
            select_vec!($t, core::arch::x86_64::__m128i,
                all(target_arch = "x86_64", target_feature = "sse4.1"), 8,
                [1 2 3 4 5 6 7 8]);
            select_vec!($t, core::arch::x86_64::__m256i,
                all(target_arch = "x86_64", target_feature = "avx2"), 16,
                [9 10 11 12 13 14 15 16]);
            select_vec!($t, core::arch::x86_64::__m512i,
                all(target_arch = "x86_64", target_feature = "avx512bw"), 32,
                [17 18 19 20 21 22 23 24 25 26 27 28 29 30 31 32]);
        )*
    };
}

macro_rules! select_vec_4 {
    ($($t:ty),*) => {
        $(
            select_vec!($t, core::arch::x86_64::__m128i,
                all(target_arch = "x86_64", target_feature = "sse4.1"), 4,
                [1 2 3 4]);
            select_vec!($t, core::arch::x86_64::__m256i,
                all(target_arch = "x86_64", target_feature = "avx2"), 8,
                [5 6 7 8]);
            select_vec!($t, core::arch::x86_64::__m512i,
                all(target_arch = "x86_64", target_feature = "avx512f"), 16,
                [9 10 11 12 13 14 15 16]);
        )*
    };
}

macro_rules! select_vec_8 {
    ($($t:ty),*) => {
        $(
            // pcmpgtq is SSE4.2
            select_vec!($t, core::arch::x86_64::__m128i,
                all(target_arch = "x86_64", target_feature = "sse4.2"), 2,
                [1 2]);
            select_vec!($t, core::arch::x86_64::__m256i,
                all(target_arch = "x86_64", target_feature = "avx2"), 4,
                [3 4]);
            select_vec!($t, core::arch::x86_64::__m512i,
                all(target_arch = "x86_64", target_feature = "avx512f"), 8,
                [5 6 7 8]);
        )*
    };
}

select_vec_1!(i8, u8);
select_vec_2!(i16, u16);
select_vec_4!(i32, u32);
select_vec_8!(i64, u64);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_select() {
        assert_eq!(RegisterWidth::select(1, 16), Some(RegisterWidth::Xmm));
        assert_eq!(RegisterWidth::select(1, 17), Some(RegisterWidth::Ymm));
        assert_eq!(RegisterWidth::select(4, 9), Some(RegisterWidth::Zmm));
        assert_eq!(RegisterWidth::select(8, 3), Some(RegisterWidth::Ymm));
        assert_eq!(RegisterWidth::select(8, 9), None);
        assert_eq!(RegisterWidth::select(2, 33), None);
    }

    #[test]
    fn test_selected_width_matches() {
        assert_eq!(<VecT<u8, 19> as SimdRegister<u8>>::WIDTH, RegisterWidth::Ymm);
        assert_eq!(<VecT<i16, 8> as SimdRegister<i16>>::WIDTH, RegisterWidth::Xmm);
        assert_eq!(<VecT<u32, 16> as SimdRegister<u32>>::WIDTH, RegisterWidth::Zmm);
        assert_eq!(<VecT<i64, 3> as SimdRegister<i64>>::WIDTH, RegisterWidth::Ymm);
    }
}
