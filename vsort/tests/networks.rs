use rand::{distributions::Standard, prelude::Distribution, rngs::StdRng, Rng, SeedableRng};
use vsort::{
    error::NetworkError,
    network::{sort, validate_rounds, NetworkSummary, SortingNetwork},
    RegisterWidth, SortElement, TargetFeatures,
};

const fn flip<const N: usize>(block: usize) -> [usize; N] {
    let mut out = [0; N];
    let mut i = 0;
    while i < N {
        let start = i - i % block;
        let partner = start + block - 1 - (i - start);
        out[i] = if partner < N { partner } else { i };
        i += 1;
    }
    out
}

const fn half<const N: usize>(dist: usize) -> [usize; N] {
    let mut out = [0; N];
    let mut i = 0;
    while i < N {
        let partner = i ^ dist;
        out[i] = if partner < N { partner } else { i };
        i += 1;
    }
    out
}

vsort::sorting_network! {
    /// Bitonic sort of 8 lanes.
    pub struct Bitonic8<8> {
        flip::<8>(2),
        flip::<8>(4), half::<8>(1),
        flip::<8>(8), half::<8>(2), half::<8>(1),
    }
}

vsort::sorting_network! {
    pub struct Bitonic32<32> {
        flip::<32>(2),
        flip::<32>(4), half::<32>(1),
        flip::<32>(8), half::<32>(2), half::<32>(1),
        flip::<32>(16), half::<32>(4), half::<32>(2), half::<32>(1),
        flip::<32>(32), half::<32>(8), half::<32>(4), half::<32>(2), half::<32>(1),
    }
}

vsort::sorting_network! {
    pub struct Bitonic64<64> {
        flip::<64>(2),
        flip::<64>(4), half::<64>(1),
        flip::<64>(8), half::<64>(2), half::<64>(1),
        flip::<64>(16), half::<64>(4), half::<64>(2), half::<64>(1),
        flip::<64>(32), half::<64>(8), half::<64>(4), half::<64>(2), half::<64>(1),
        flip::<64>(64), half::<64>(16), half::<64>(8), half::<64>(4), half::<64>(2), half::<64>(1),
    }
}

vsort::sorting_network! {
    /// Batcher's odd-even merge sort of 8 lanes.
    pub struct OddEvenMerge8<8> pairs {
        [(0, 1), (2, 3), (4, 5), (6, 7)],
        [(0, 2), (1, 3), (4, 6), (5, 7)],
        [(1, 2), (5, 6)],
        [(0, 4), (1, 5), (2, 6), (3, 7)],
        [(2, 4), (3, 5)],
        [(1, 2), (3, 4), (5, 6)],
    }
}

fn check_sort<T, const N: usize, S>(seed: u64)
where
    T: SortElement,
    S: SortingNetwork<N>,
    Standard: Distribution<T>,
    vsort::Lanes<T, N>: vsort::SelectVec<T>,
{
    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..500 {
        let mut data: Vec<T> = (0..N).map(|_| rng.gen::<T>()).collect();
        let mut expected = data.clone();
        expected.sort_unstable();
        sort::<T, N, S>(&mut data).unwrap();
        assert_eq!(data, expected);
    }

    // few distinct values, and the sentinel itself as data
    let mut data: Vec<T> = (0..N)
        .map(|i| if i % 3 == 0 { T::MAX_VALUE } else { T::MIN_VALUE })
        .collect();
    let mut expected = data.clone();
    expected.sort_unstable();
    sort::<T, N, S>(&mut data).unwrap();
    assert_eq!(data, expected);
}

#[test]
fn test_bitonic_8() {
    check_sort::<i8, 8, Bitonic8>(1);
    check_sort::<u16, 8, Bitonic8>(2);
    check_sort::<i32, 8, Bitonic8>(3);
    check_sort::<u64, 8, Bitonic8>(4);
}

#[test]
fn test_odd_even_merge_8() {
    check_sort::<u8, 8, OddEvenMerge8>(5);
    check_sort::<i64, 8, OddEvenMerge8>(6);
}

#[test]
fn test_bitonic_32() {
    check_sort::<u8, 32, Bitonic32>(7);
    check_sort::<i16, 32, Bitonic32>(8);
}

#[test]
fn test_bitonic_64() {
    check_sort::<i8, 64, Bitonic64>(9);
}

#[test]
fn test_summaries_per_target() {
    let sse = NetworkSummary::of::<u32, 8, Bitonic8>(TargetFeatures::SSE4_2);
    // 8 x 32-bit needs a 256-bit register
    assert!(matches!(sse, Err(NetworkError::Unsupported { .. })));

    let avx2 = NetworkSummary::of::<u32, 8, Bitonic8>(TargetFeatures::AVX2).unwrap();
    assert_eq!(avx2.width, RegisterWidth::Ymm);
    assert_eq!(avx2.depth(), Bitonic8::ROUNDS.len());
    assert!(avx2.required.is_subset_of(&TargetFeatures::AVX2));

    let avx512 = NetworkSummary::of::<u8, 64, Bitonic64>(TargetFeatures::AVX512).unwrap();
    assert_eq!(avx512.width, RegisterWidth::Zmm);
    assert!(avx512.required.avx512bw);
    assert!(!avx512.required.avx512vbmi);

    let vbmi = NetworkSummary::of::<u8, 64, Bitonic64>(TargetFeatures::AVX512_VBMI).unwrap();
    assert!(vbmi.required.avx512vbmi);
    assert_eq!(vbmi.depth(), avx512.depth());
    assert!(vbmi.to_string().starts_with("64 x 8-bit in zmm"));
}

#[test]
fn test_rejects_bad_rounds() {
    let err = validate_rounds(&[[1, 0, 3, 2], [1, 2, 3, 0]], 4, TargetFeatures::ALL).unwrap_err();
    assert_eq!(err, NetworkError::NotAMatching { round: 1, lane: 0 });
    assert_eq!(
        err.to_string(),
        "round 1: lane 0 is not paired symmetrically"
    );
}

#[test]
fn test_length_mismatch() {
    let mut data = vec![0u32; 7];
    assert_eq!(
        sort::<u32, 8, Bitonic8>(&mut data),
        Err(NetworkError::LengthMismatch {
            expected: 8,
            actual: 7
        })
    );
}
