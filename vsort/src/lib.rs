pub mod analysis;
pub mod emulated;
pub mod error;
pub mod features;
pub mod network;
pub mod plan;
pub mod platform;
pub mod register;

use std::fmt::Debug;

pub use analysis::{from_set_order, perm_from_pairs, LanePerm, Permutation};
pub use emulated::Emulated;
pub use features::TargetFeatures;
pub use network::{SortBuffer, SortingNetwork};
pub use plan::{BlendLowering, PermuteLowering, Stage};
pub use register::{Lanes, RegisterWidth, SelectVec, VecT};

use plan::MaskedBlend;

pub trait SortElement: Copy + Ord + Debug + Default + Send + Sync + 'static {
    const BYTES: usize;
    const SIGNED: bool;
    /// Sentinel for padding lanes, sorts after every real value.
    const MAX_VALUE: Self;
    const MIN_VALUE: Self;

    /// One 512-bit register worth of values.
    type Block: Copy + Debug + AsRef<[Self]> + AsMut<[Self]>;
    const PADDED: Self::Block;

    fn from_le_slice(bytes: &[u8]) -> Self;
    fn write_le_slice(self, out: &mut [u8]);
}

macro_rules! impl_sort_element {
    ($($t:ty => $signed:literal),*) => {
        $(
            impl SortElement for $t {
                const BYTES: usize = core::mem::size_of::<$t>();
                const SIGNED: bool = $signed;
                const MAX_VALUE: Self = <$t>::MAX;
                const MIN_VALUE: Self = <$t>::MIN;

                type Block = [$t; 64 / core::mem::size_of::<$t>()];
                const PADDED: Self::Block = [<$t>::MAX; 64 / core::mem::size_of::<$t>()];

                #[inline]
                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; core::mem::size_of::<$t>()];
                    raw.copy_from_slice(&bytes[..core::mem::size_of::<$t>()]);
                    <$t>::from_le_bytes(raw)
                }

                #[inline]
                fn write_le_slice(self, out: &mut [u8]) {
                    out[..Self::BYTES].copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_sort_element!(
    i8 => true, u8 => false,
    i16 => true, u16 => false,
    i32 => true, u32 => false,
    i64 => true, u64 => false
);

mod sealed {
    use crate::{
        plan::{BlendLowering, PermuteLowering},
        SortElement,
    };

    /// Runs a lowering. Only [`Stage`](crate::Stage) and `MaskedBlend` hand
    /// lowerings to it, and only ones planned for the register's own `WIDTH`
    /// and `FEATURES`.
    pub trait Lowered<T: SortElement>: Sized {
        fn permute(v: Self, lowering: &PermuteLowering) -> Self;

        /// Takes `v_min` in every unit the lowering selects, `v_max` elsewhere.
        fn blend(v_max: Self, v_min: Self, lowering: &BlendLowering) -> Self;
    }
}

/// A register of `T` lanes and the primitives a compare-exchange stage is
/// built from.
///
/// Sealed: the permute and blend primitives only run lowerings planned by
/// [`Stage`] for the register itself, and are not callable from outside this
/// crate.
///
/// ```compile_fail
/// use vsort::{Emulated, PermuteLowering};
///
/// let v = Emulated::<u32, 4>::from_slice(&[1, 2, 3, 4]);
/// Emulated::<u32, 4>::permute(v, &PermuteLowering::Identity);
/// ```
pub trait SimdRegister<T: SortElement>: Copy + Debug + sealed::Lowered<T> {
    const WIDTH: RegisterWidth;
    /// Instruction-set extensions the implementation may use. Lowerings are
    /// planned against this set.
    const FEATURES: TargetFeatures;

    /// # Safety
    /// `ptr` must be aligned to `WIDTH` and valid for reads of a whole register.
    unsafe fn load(ptr: *const T) -> Self;

    /// # Safety
    /// `ptr` must be aligned to `WIDTH` and valid for writes of a whole register.
    unsafe fn store(ptr: *mut T, v: Self);

    fn min(a: Self, b: Self) -> Self;
    fn max(a: Self, b: Self) -> Self;
}

/// Aligned load of `N` values into the smallest register that holds them.
///
/// # Safety
/// `ptr` must be aligned to the register width and the allocation behind it
/// must cover the whole register, not just `N` values. [`SortBuffer`] meets
/// both.
#[inline]
pub unsafe fn vec_load<T, const N: usize>(ptr: *const T) -> VecT<T, N>
where
    T: SortElement,
    Lanes<T, N>: SelectVec<T>,
{
    <VecT<T, N> as SimdRegister<T>>::load(ptr)
}

/// # Safety
/// Same contract as [`vec_load`], for writes.
#[inline]
pub unsafe fn vec_store<T, const N: usize>(ptr: *mut T, v: VecT<T, N>)
where
    T: SortElement,
    Lanes<T, N>: SelectVec<T>,
{
    <VecT<T, N> as SimdRegister<T>>::store(ptr, v)
}

#[inline]
pub fn vec_min<T, const N: usize>(a: VecT<T, N>, b: VecT<T, N>) -> VecT<T, N>
where
    T: SortElement,
    Lanes<T, N>: SelectVec<T>,
{
    <VecT<T, N> as SimdRegister<T>>::min(a, b)
}

#[inline]
pub fn vec_max<T, const N: usize>(a: VecT<T, N>, b: VecT<T, N>) -> VecT<T, N>
where
    T: SortElement,
    Lanes<T, N>: SelectVec<T>,
{
    <VecT<T, N> as SimdRegister<T>>::max(a, b)
}

/// Takes `v_min` in every lane whose bit is set in `MASK`, `v_max` elsewhere.
#[inline]
pub fn vec_blend<T, const N: usize, const MASK: u64>(v_max: VecT<T, N>, v_min: VecT<T, N>) -> VecT<T, N>
where
    T: SortElement,
    Lanes<T, N>: SelectVec<T>,
{
    vec_blend_in::<T, VecT<T, N>, MASK>(v_max, v_min)
}

#[inline]
pub fn vec_blend_in<T, R, const MASK: u64>(v_max: R, v_min: R) -> R
where
    T: SortElement,
    R: SimdRegister<T>,
{
    R::blend(v_max, v_min, &MaskedBlend::<T, R, MASK>::BLEND)
}

/// `out[i] = v[P::INDEX[i]]`, with the instruction sequence picked at compile time.
#[inline]
pub fn vec_set_perm<T, const N: usize, P>(v: VecT<T, N>) -> VecT<T, N>
where
    T: SortElement,
    P: Permutation<N>,
    Lanes<T, N>: SelectVec<T>,
{
    vec_set_perm_in::<T, N, P, VecT<T, N>>(v)
}

#[inline]
pub fn vec_set_perm_in<T, const N: usize, P, R>(v: R) -> R
where
    T: SortElement,
    P: Permutation<N>,
    R: SimdRegister<T>,
{
    R::permute(v, &Stage::<T, R, P, N>::PERMUTE)
}

/// One round of a sorting network: every lane is compared with its partner
/// in `P` and the lower lane of each pair keeps the minimum.
///
/// `P` must be a self-inverse matching, checked when this is instantiated.
#[inline]
pub fn compare_exchange<T, const N: usize, P>(v: VecT<T, N>) -> VecT<T, N>
where
    T: SortElement,
    P: Permutation<N>,
    Lanes<T, N>: SelectVec<T>,
{
    compare_exchange_in::<T, N, P, VecT<T, N>>(v)
}

/// [`compare_exchange`] on an explicit register type.
///
/// ```
/// use vsort::{compare_exchange_in, Emulated, Permutation};
///
/// struct Pairs;
/// impl Permutation<4> for Pairs {
///     const INDEX: [usize; 4] = [1, 0, 3, 2];
/// }
///
/// let v = Emulated::<u32, 4>::from_slice(&[4, 3, 2, 1]);
/// assert_eq!(compare_exchange_in::<u32, 4, Pairs, _>(v).to_vec(), [3, 4, 1, 2]);
/// ```
///
/// A permutation that is not its own inverse does not build:
///
/// ```compile_fail
/// use vsort::{compare_exchange_in, Emulated, Permutation};
///
/// struct Rotate;
/// impl Permutation<4> for Rotate {
///     const INDEX: [usize; 4] = [1, 2, 3, 0];
/// }
///
/// let v = Emulated::<u32, 4>::from_slice(&[4, 3, 2, 1]);
/// compare_exchange_in::<u32, 4, Rotate, _>(v);
/// ```
///
/// Neither does one naming a lane past `N`:
///
/// ```compile_fail
/// use vsort::{compare_exchange_in, Emulated, Permutation};
///
/// struct Outside;
/// impl Permutation<4> for Outside {
///     const INDEX: [usize; 4] = [4, 1, 2, 3];
/// }
///
/// let v = Emulated::<u32, 4>::from_slice(&[4, 3, 2, 1]);
/// compare_exchange_in::<u32, 4, Outside, _>(v);
/// ```
///
/// Or one over more lanes than the register holds:
///
/// ```compile_fail
/// use vsort::{compare_exchange_in, Emulated, Permutation};
///
/// struct Pairs8;
/// impl Permutation<8> for Pairs8 {
///     const INDEX: [usize; 8] = [1, 0, 3, 2, 5, 4, 7, 6];
/// }
///
/// let v = Emulated::<u32, 4>::from_slice(&[4, 3, 2, 1]);
/// compare_exchange_in::<u32, 8, Pairs8, _>(v);
/// ```
#[inline]
pub fn compare_exchange_in<T, const N: usize, P, R>(v: R) -> R
where
    T: SortElement,
    P: Permutation<N>,
    R: SimdRegister<T>,
{
    let () = Stage::<T, R, P, N>::CHECKED;
    let cmp = vec_set_perm_in::<T, N, P, R>(v);
    let lo = R::min(v, cmp);
    let hi = R::max(v, cmp);
    R::blend(hi, lo, &Stage::<T, R, P, N>::BLEND)
}

/// [`compare_exchange`] with the min/max selection given explicitly, one bit
/// per lane, instead of derived from `P`.
#[inline]
pub fn compare_exchange_with_mask<T, const N: usize, P, const MASK: u64>(v: VecT<T, N>) -> VecT<T, N>
where
    T: SortElement,
    P: Permutation<N>,
    Lanes<T, N>: SelectVec<T>,
{
    compare_exchange_with_mask_in::<T, N, P, VecT<T, N>, MASK>(v)
}

#[inline]
pub fn compare_exchange_with_mask_in<T, const N: usize, P, R, const MASK: u64>(v: R) -> R
where
    T: SortElement,
    P: Permutation<N>,
    R: SimdRegister<T>,
{
    let () = Stage::<T, R, P, N>::IN_RANGE;
    let cmp = vec_set_perm_in::<T, N, P, R>(v);
    let lo = R::min(v, cmp);
    let hi = R::max(v, cmp);
    vec_blend_in::<T, R, MASK>(hi, lo)
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

    pub(crate) fn random_values<T: SortElement>(rng: &mut StdRng, len: usize) -> Vec<T>
    where
        rand::distributions::Standard: rand::distributions::Distribution<T>,
    {
        (0..len).map(|_| rng.gen::<T>()).collect()
    }

    pub(crate) fn random_permutation(rng: &mut StdRng, lanes: usize) -> Vec<usize> {
        let mut index: Vec<usize> = (0..lanes).collect();
        index.shuffle(rng);
        index
    }

    /// Random pairs of lanes, an odd lane out stays in place.
    pub(crate) fn random_matching(rng: &mut StdRng, lanes: usize) -> Vec<usize> {
        let order = random_permutation(rng, lanes);
        let mut index: Vec<usize> = (0..lanes).collect();
        for pair in order.chunks_exact(2) {
            index[pair[0]] = pair[1];
            index[pair[1]] = pair[0];
        }
        index
    }

    /// The strides of bitonic and odd-even networks: every `i ^ d` and every
    /// mirror within blocks of `b`, for powers of two up to `lanes`.
    pub(crate) fn structured_permutations(lanes: usize) -> Vec<Vec<usize>> {
        let mut perms = Vec::new();
        let mut d = 1;
        while d < lanes {
            perms.push((0..lanes).map(|i| i ^ d).collect());
            let block = 2 * d;
            perms.push(
                (0..lanes)
                    .map(|i| {
                        let start = i - i % block;
                        start + block - 1 - (i - start)
                    })
                    .collect(),
            );
            d *= 2;
        }
        perms
    }

    struct SwapHalves;
    impl Permutation<4> for SwapHalves {
        const INDEX: [usize; 4] = [2, 3, 0, 1];
    }

    struct Adjacent;
    impl Permutation<8> for Adjacent {
        const INDEX: [usize; 8] = from_set_order([6, 7, 4, 5, 2, 3, 0, 1]);
    }

    struct Reverse;
    impl Permutation<8> for Reverse {
        const INDEX: [usize; 8] = [7, 6, 5, 4, 3, 2, 1, 0];
    }

    /// Bytes 0 and 16 trade places across the 128-bit halves.
    struct AcrossHalves;
    impl Permutation<32> for AcrossHalves {
        const INDEX: [usize; 32] = {
            let mut index = [0; 32];
            let mut i = 0;
            while i < 32 {
                index[i] = i;
                i += 1;
            }
            index[0] = 16;
            index[16] = 0;
            index
        };
    }

    #[test]
    fn test_sort_element() {
        assert_eq!(<i16 as SortElement>::BYTES, 2);
        assert!(<i64 as SortElement>::SIGNED);
        assert!(!<u8 as SortElement>::SIGNED);
        assert_eq!(<u32 as SortElement>::PADDED.as_ref().len(), 16);
        let mut out = [0u8; 4];
        (-2i32).write_le_slice(&mut out);
        assert_eq!(i32::from_le_slice(&out), -2);
    }

    #[test]
    fn test_vec_set_perm() {
        let v = Emulated::<u32, 4>::from_slice(&[10, 20, 30, 40]);
        let out = vec_set_perm_in::<u32, 4, SwapHalves, _>(v);
        assert_eq!(out.to_vec(), [30, 40, 10, 20]);
    }

    #[test]
    fn test_compare_exchange_min_max_placement() {
        let v = Emulated::<i32, 4>::from_slice(&[5, -1, 3, 7]);
        let out = compare_exchange_in::<i32, 4, SwapHalves, _>(v);
        assert_eq!(out.to_vec(), [3, -1, 5, 7]);

        let v = Emulated::<u16, 8>::from_slice(&[2, 1, 4, 3, 6, 5, 8, 7]);
        let out = compare_exchange_in::<u16, 8, Adjacent, _>(v);
        assert_eq!(out.to_vec(), [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_compare_exchange_with_mask() {
        let v = Emulated::<u16, 8>::from_slice(&[2, 1, 4, 3, 6, 5, 8, 7]);
        // 0xaa puts the maximum in the lower lane of every pair
        let out = compare_exchange_with_mask_in::<u16, 8, Adjacent, _, 0xaa>(v);
        assert_eq!(out.to_vec(), [2, 1, 4, 3, 6, 5, 8, 7]);
        let out = compare_exchange_with_mask_in::<u16, 8, Adjacent, _, 0x55>(v);
        assert_eq!(out.to_vec(), [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_compare_exchange_randomized() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let values: Vec<i64> = random_values(&mut rng, 8);
            let v = Emulated::<i64, 8>::from_slice(&values);
            let out = compare_exchange_in::<i64, 8, Reverse, _>(v).to_vec();
            for i in 0..4 {
                let (a, b) = (values[i], values[7 - i]);
                assert_eq!(out[i], a.min(b));
                assert_eq!(out[7 - i], a.max(b));
            }
        }
    }

    #[test]
    fn test_vec_ops_selected_register() {
        let mut buffer = SortBuffer::new(&[9u8, 3, 7, 1]).unwrap();
        let a = buffer.load::<4>();
        let b = vec_set_perm::<u8, 4, SwapHalves>(a);
        let lo = vec_min::<u8, 4>(a, b);
        let hi = vec_max::<u8, 4>(a, b);
        buffer.store::<4>(vec_blend::<u8, 4, 0b0011>(hi, lo));
        assert_eq!(buffer.as_slice(), [7, 1, 9, 3]);
    }

    #[test]
    fn test_stage_plans_for_own_register() {
        type R = VecT<u8, 32>;
        let features = <R as SimdRegister<u8>>::FEATURES;
        let width = <R as SimdRegister<u8>>::WIDTH;
        let permute = Stage::<u8, R, AcrossHalves, 32>::PERMUTE;
        assert!(permute.is_supported_by(&features, width), "{permute}");
        let blend = Stage::<u8, R, AcrossHalves, 32>::BLEND;
        assert!(blend.is_supported_by(&features, width), "{blend}");

        let values: Vec<u8> = (0..32).rev().collect();
        let mut buffer = SortBuffer::new(&values).unwrap();
        let v = buffer.load::<32>();
        buffer.store::<32>(vec_set_perm::<u8, 32, AcrossHalves>(v));
        assert_eq!(buffer.as_slice()[0], 15);
        assert_eq!(buffer.as_slice()[16], 31);
        assert_eq!(&buffer.as_slice()[1..16], &values[1..16]);

        let v = buffer.load::<32>();
        buffer.store::<32>(compare_exchange::<u8, 32, AcrossHalves>(v));
        assert_eq!(buffer.as_slice()[0], 15);
        assert_eq!(buffer.as_slice()[16], 31);
    }

    #[test]
    fn test_raw_load_store_selected_register() {
        #[repr(C, align(64))]
        struct Block([i64; 8]);

        let mut block = Block([40, -7, 3, 12, 0, 9, -1, 5]);
        let v = unsafe { vec_load::<i64, 8>(block.0.as_ptr()) };
        let v = compare_exchange::<i64, 8, Reverse>(v);
        // 0xf0 sends every minimum to the upper lane instead
        let v = compare_exchange_with_mask::<i64, 8, Reverse, 0xf0>(v);
        unsafe { vec_store::<i64, 8>(block.0.as_mut_ptr(), v) };
        assert_eq!(block.0, [40, -1, 9, 12, 0, 3, -7, 5]);
    }
}
