use std::{fmt, marker::PhantomData};

use crate::{
    analysis::{MAX_BYTES, SUB_LANE_BYTES, ZERO_BYTE},
    features::TargetFeatures,
    plan::{BlendLowering, PermuteLowering},
    register::RegisterWidth,
    sealed::Lowered,
    SimdRegister, SortElement,
};

/// A register of `W` lanes held in memory.
///
/// Executes every lowering with the semantics of the instruction it stands
/// for, byte for byte, so plans for any target can be checked on any CPU.
/// It is also the register [`crate::VecT`] falls back to when the crate is
/// built without the native target features.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Emulated<T, const W: usize> {
    bytes: [u8; MAX_BYTES],
    _marker: PhantomData<T>,
}

impl<T: SortElement, const W: usize> Emulated<T, W> {
    const REG_BYTES: usize = W * T::BYTES;

    fn zeroed() -> Self {
        Self {
            bytes: [0; MAX_BYTES],
            _marker: PhantomData,
        }
    }

    pub fn splat(value: T) -> Self {
        let mut v = Self::zeroed();
        for i in 0..W {
            v.set_lane(i, value);
        }
        v
    }

    /// Lanes past the end of `values` are padded with `T::MAX_VALUE`.
    pub fn from_slice(values: &[T]) -> Self {
        let mut v = Self::splat(T::MAX_VALUE);
        for (i, value) in values.iter().take(W).enumerate() {
            v.set_lane(i, *value);
        }
        v
    }

    #[inline]
    pub fn lane(&self, i: usize) -> T {
        T::from_le_slice(&self.bytes[i * T::BYTES..])
    }

    #[inline]
    pub fn set_lane(&mut self, i: usize, value: T) {
        value.write_le_slice(&mut self.bytes[i * T::BYTES..]);
    }

    pub fn to_vec(&self) -> Vec<T> {
        (0..W).map(|i| self.lane(i)).collect()
    }

    fn zip_lanes(a: Self, b: Self, f: impl Fn(T, T) -> T) -> Self {
        let mut out = a;
        for i in 0..W {
            out.set_lane(i, f(a.lane(i), b.lane(i)));
        }
        out
    }

    fn unit(&self, i: usize, granularity: usize) -> u64 {
        let mut value = 0u64;
        for k in 0..granularity {
            value |= (self.bytes[i * granularity + k] as u64) << (8 * k);
        }
        value
    }

    fn copy_unit(&mut self, dst: usize, src: &Self, from: usize, granularity: usize) {
        self.bytes[dst * granularity..(dst + 1) * granularity]
            .copy_from_slice(&src.bytes[from * granularity..(from + 1) * granularity]);
    }

    /// In-lane gather of `granularity`-byte units, `select(unit)` naming the
    /// source unit relative to the start of its sub-lane.
    fn in_lane(v: Self, granularity: usize, select: impl Fn(usize) -> usize) -> Self {
        let per_lane = SUB_LANE_BYTES / granularity;
        let mut out = v;
        for i in 0..Self::REG_BYTES / granularity {
            let base = i - i % per_lane;
            out.copy_unit(i, &v, base + select(i % per_lane), granularity);
        }
        out
    }

    fn shuffle_bytes(v: Self, control: &[u8; MAX_BYTES]) -> Self {
        let mut out = v;
        for j in 0..Self::REG_BYTES {
            let c = control[j];
            out.bytes[j] = if c & ZERO_BYTE != 0 {
                0
            } else {
                v.bytes[j - j % SUB_LANE_BYTES + (c as usize & 0x0f)]
            };
        }
        out
    }

    /// Sub-lane `l` of the result is sub-lane `l + rotation` of `v`.
    fn rotate_lanes(v: Self, rotation: usize) -> Self {
        let lanes = (Self::REG_BYTES / SUB_LANE_BYTES).max(1);
        let mut out = v;
        for l in 0..lanes {
            let from = (l + rotation) % lanes;
            out.bytes[l * SUB_LANE_BYTES..(l + 1) * SUB_LANE_BYTES]
                .copy_from_slice(&v.bytes[from * SUB_LANE_BYTES..(from + 1) * SUB_LANE_BYTES]);
        }
        out
    }
}

impl<T: SortElement, const W: usize> fmt::Debug for Emulated<T, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries((0..W).map(|i| self.lane(i))).finish()
    }
}

impl<T: SortElement, const W: usize> SimdRegister<T> for Emulated<T, W> {
    const WIDTH: RegisterWidth = match RegisterWidth::select(T::BYTES, W) {
        Some(width) if width.bytes() == W * T::BYTES => width,
        _ => panic!("emulated lanes must exactly fill a 128, 256 or 512-bit register"),
    };
    const FEATURES: TargetFeatures = TargetFeatures::ALL;

    #[inline]
    unsafe fn load(ptr: *const T) -> Self {
        let mut v = Self::zeroed();
        for i in 0..W {
            v.set_lane(i, ptr.add(i).read());
        }
        v
    }

    #[inline]
    unsafe fn store(ptr: *mut T, v: Self) {
        for i in 0..W {
            ptr.add(i).write(v.lane(i));
        }
    }

    fn min(a: Self, b: Self) -> Self {
        Self::zip_lanes(a, b, Ord::min)
    }

    fn max(a: Self, b: Self) -> Self {
        Self::zip_lanes(a, b, Ord::max)
    }
}

impl<T: SortElement, const W: usize> Lowered<T> for Emulated<T, W> {
    fn permute(v: Self, lowering: &PermuteLowering) -> Self {
        match lowering {
            PermuteLowering::Identity => v,
            PermuteLowering::ShuffleDwords { imm } => {
                Self::in_lane(v, 4, |d| (*imm as usize >> (2 * d)) & 3)
            }
            PermuteLowering::ShuffleWords { lo, hi } => Self::in_lane(v, 2, |w| {
                if w < 4 {
                    (*lo as usize >> (2 * w)) & 3
                } else {
                    4 + ((*hi as usize >> (2 * (w - 4))) & 3)
                }
            }),
            PermuteLowering::ShuffleBytes { control } => Self::shuffle_bytes(v, control),
            PermuteLowering::SplitLaneBytes {
                rotations,
                controls,
            } => {
                let mut out = Self::zeroed();
                for (r, control) in controls.iter().enumerate() {
                    if rotations & (1 << r) == 0 {
                        continue;
                    }
                    let part = Self::shuffle_bytes(Self::rotate_lanes(v, r), control);
                    for j in 0..Self::REG_BYTES {
                        out.bytes[j] |= part.bytes[j];
                    }
                }
                out
            }
            PermuteLowering::PermuteQwords { imm } => {
                let mut out = v;
                for i in 0..Self::REG_BYTES / 8 {
                    out.copy_unit(i, &v, (*imm as usize >> (2 * (i % 4))) & 3, 8);
                }
                out
            }
            PermuteLowering::PermuteVar {
                granularity,
                control,
            } => {
                let units = Self::REG_BYTES / granularity;
                let index = Self {
                    bytes: *control,
                    _marker: PhantomData,
                };
                let mut out = v;
                for i in 0..units {
                    // only the low bits of each index are used
                    let from = index.unit(i, *granularity) as usize & (units - 1);
                    out.copy_unit(i, &v, from, *granularity);
                }
                out
            }
            PermuteLowering::Unsupported => panic!("permute lowering is unsupported"),
        }
    }

    fn blend(v_max: Self, v_min: Self, lowering: &BlendLowering) -> Self {
        let (granularity, mask) = match lowering {
            BlendLowering::MaskMove { granularity, mask } => (*granularity, *mask),
            BlendLowering::BlendDwords { imm } => (4, *imm as u64),
            BlendLowering::BlendWords { imm } => (2, u64::from_le_bytes([*imm; 8])),
            BlendLowering::BlendBytes { control } => {
                let mut mask = 0u64;
                for (j, c) in control.iter().enumerate() {
                    if c & ZERO_BYTE != 0 {
                        mask |= 1 << j;
                    }
                }
                (1, mask)
            }
            BlendLowering::Unsupported => panic!("blend lowering is unsupported"),
        };
        let mut out = v_max;
        for i in 0..Self::REG_BYTES / granularity {
            if mask & (1 << i) != 0 {
                out.copy_unit(i, &v_min, i, granularity);
            }
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        analysis::LanePerm,
        plan::{plan_blend, plan_permute},
        test::{random_matching, random_permutation, random_values, structured_permutations},
    };
    use paste::paste;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const PRESETS: [TargetFeatures; 4] = [
        TargetFeatures::SSE4_2,
        TargetFeatures::AVX2,
        TargetFeatures::AVX512,
        TargetFeatures::AVX512_VBMI,
    ];

    macro_rules! test_plans {
        ($($t:ident => $w:literal),* $(,)?) => {
            paste! {
                $(
                    #[test]
                    fn [<test_planned_permutes_ $t _ $w>]() {
                        type Reg = Emulated<$t, $w>;
                        let width = <Reg as SimdRegister<$t>>::WIDTH;
                        let mut rng = StdRng::seed_from_u64(42);
                        let mut perms = structured_permutations($w);
                        for _ in 0..100 {
                            perms.push(random_permutation(&mut rng, $w));
                            perms.push(random_matching(&mut rng, $w));
                        }
                        for features in PRESETS {
                            for index in &perms {
                                let perm = LanePerm::new(index, $w);
                                let lowering = plan_permute(features, <$t>::BYTES, width, &perm);
                                if lowering.is_unsupported() {
                                    continue;
                                }
                                assert!(lowering.is_supported_by(&features, width));
                                let values: Vec<$t> = random_values(&mut rng, $w);
                                let out = Reg::permute(Reg::from_slice(&values), &lowering);
                                assert_eq!(out.to_vec(), perm.gather(&values), "{features}: {lowering}");
                            }
                        }
                    }

                    #[test]
                    fn [<test_planned_blends_ $t _ $w>]() {
                        type Reg = Emulated<$t, $w>;
                        let width = <Reg as SimdRegister<$t>>::WIDTH;
                        let mut rng = StdRng::seed_from_u64(42);
                        for features in PRESETS {
                            for _ in 0..100 {
                                let mask = rng.gen::<u64>() & (u64::MAX >> (64 - $w));
                                let lowering = plan_blend(features, <$t>::BYTES, width, mask);
                                if lowering.is_unsupported() {
                                    continue;
                                }
                                let v_max: Vec<$t> = random_values(&mut rng, $w);
                                let v_min: Vec<$t> = random_values(&mut rng, $w);
                                let out = Reg::blend(Reg::from_slice(&v_max), Reg::from_slice(&v_min), &lowering);
                                for i in 0..$w {
                                    let expected = if mask & (1 << i) != 0 { v_min[i] } else { v_max[i] };
                                    assert_eq!(out.lane(i), expected, "{features}: {lowering}");
                                }
                            }
                        }
                    }
                )*
            }
        };
    }

    test_plans!(
        u8 => 16, u8 => 32, u8 => 64,
        i16 => 8, i16 => 16, i16 => 32,
        u32 => 4, u32 => 8, u32 => 16,
        i64 => 2, i64 => 4, i64 => 8,
    );

    #[test]
    fn test_min_max() {
        let first = Emulated::<i64, 4>::from_slice(&[1, -20, 3, 40]);
        let second = Emulated::<i64, 4>::from_slice(&[10, 2, -30, 4]);
        assert_eq!(
            <Emulated<i64, 4> as SimdRegister<i64>>::min(first, second).to_vec(),
            [1, -20, -30, 4]
        );
        assert_eq!(
            <Emulated<i64, 4> as SimdRegister<i64>>::max(first, second).to_vec(),
            [10, 2, 3, 40]
        );
    }

    #[test]
    fn test_load_store() {
        let input = [1u16, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let v = unsafe { <Emulated<u16, 8> as SimdRegister<u16>>::load(input.as_ptr()) };
        assert_eq!(v.to_vec(), [1, 2, 3, 4, 5, 6, 7, 8]);
        let mut output = [0u16; 10];
        unsafe { <Emulated<u16, 8> as SimdRegister<u16>>::store(output[2..].as_mut_ptr(), v) };
        assert_eq!(output, [0, 0, 1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_padding() {
        let v = Emulated::<i8, 16>::from_slice(&[-1, 2]);
        assert_eq!(v.lane(1), 2);
        assert_eq!(v.lane(2), i8::MAX);
        assert_eq!(v.lane(15), i8::MAX);
    }

    #[test]
    fn test_shuffle_dwords() {
        let v = Emulated::<u32, 8>::from_slice(&[0, 1, 2, 3, 4, 5, 6, 7]);
        // [1, 0, 3, 2] in both sub-lanes
        let out = Emulated::permute(v, &PermuteLowering::ShuffleDwords { imm: 0b10_11_00_01 });
        assert_eq!(out.to_vec(), [1, 0, 3, 2, 5, 4, 7, 6]);
    }

    #[test]
    fn test_shuffle_bytes_zeroes() {
        let v = Emulated::<u8, 16>::from_slice(&[10; 16]);
        let mut control = [0u8; MAX_BYTES];
        control[3] = ZERO_BYTE;
        let out = Emulated::permute(v, &PermuteLowering::ShuffleBytes { control });
        assert_eq!(out.lane(3), 0);
        assert_eq!(out.lane(4), 10);
    }

    #[test]
    fn test_rotate_lanes() {
        let values: Vec<u8> = (0..64).collect();
        let v = Emulated::<u8, 64>::from_slice(&values);
        let out = Emulated::rotate_lanes(v, 3);
        assert_eq!(out.lane(0), 48);
        assert_eq!(out.lane(16), 0);
        assert_eq!(out.lane(63), 47);
    }

    #[test]
    fn test_blend_words_repeat() {
        let v_max = Emulated::<u16, 16>::splat(2);
        let v_min = Emulated::<u16, 16>::splat(1);
        let out = Emulated::blend(v_max, v_min, &BlendLowering::BlendWords { imm: 0b0000_0101 });
        assert_eq!(
            out.to_vec(),
            [1, 2, 1, 2, 2, 2, 2, 2, 1, 2, 1, 2, 2, 2, 2, 2]
        );
    }
}
