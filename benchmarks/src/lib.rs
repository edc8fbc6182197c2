//! Sorting networks shared by the benchmarks.

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
    pub struct Bitonic8<8> {
        flip::<8>(2),
        flip::<8>(4), half::<8>(1),
        flip::<8>(8), half::<8>(2), half::<8>(1),
    }
}

vsort::sorting_network! {
    pub struct Bitonic16<16> {
        flip::<16>(2),
        flip::<16>(4), half::<16>(1),
        flip::<16>(8), half::<16>(2), half::<16>(1),
        flip::<16>(16), half::<16>(4), half::<16>(2), half::<16>(1),
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
