//! Running externally generated sorting networks one register at a time.

use std::fmt;

use crate::{
    analysis::{selection_mask, LanePerm},
    error::{BufferError, NetworkError},
    features::TargetFeatures,
    plan::{plan_blend, plan_permute, BlendLowering, PermuteLowering},
    register::{Lanes, RegisterWidth, SelectVec, VecT},
    SimdRegister, SortElement,
};

/// A fixed sequence of compare-exchange rounds over `N` lanes.
///
/// Implement it with [`sorting_network!`](crate::sorting_network), which
/// plans every round at compile time.
pub trait SortingNetwork<const N: usize> {
    /// Each round as a permutation: lane `i` is compared with `round[i]`.
    const ROUNDS: &'static [[usize; N]];

    fn apply<T: SortElement, R: SimdRegister<T>>(v: R) -> R;
}

/// Declares a [`SortingNetwork`] from its rounds.
///
/// Rounds are either permutations or, after `pairs`, lists of comparator
/// index pairs.
///
/// ```
/// vsort::sorting_network! {
///     pub struct Sort4<4> {
///         [1, 0, 3, 2],
///         [3, 2, 1, 0],
///         [1, 0, 3, 2],
///     }
/// }
///
/// vsort::sorting_network! {
///     pub struct Sort3<3> pairs {
///         [(0, 1)],
///         [(1, 2)],
///         [(0, 1)],
///     }
/// }
///
/// let mut data = [3u32, 1, 4, 2];
/// vsort::network::sort::<u32, 4, Sort4>(&mut data).unwrap();
/// assert_eq!(data, [1, 2, 3, 4]);
/// ```
#[macro_export]
macro_rules! sorting_network {
    ($(#[$meta:meta])* $vis:vis struct $name:ident<$n:literal> pairs {
        $([$(($a:expr, $b:expr)),* $(,)?]),* $(,)?
    }) => {
        $crate::sorting_network! {
            $(#[$meta])*
            $vis struct $name<$n> {
                $($crate::perm_from_pairs::<$n>(&[$(($a, $b)),*])),*
            }
        }
    };
    ($(#[$meta:meta])* $vis:vis struct $name:ident<$n:literal> {
        $($round:expr),* $(,)?
    }) => {
        $(#[$meta])*
        $vis struct $name;

        impl $crate::network::SortingNetwork<$n> for $name {
            const ROUNDS: &'static [[usize; $n]] = &[$($round),*];

            #[inline]
            fn apply<T: $crate::SortElement, R: $crate::SimdRegister<T>>(v: R) -> R {
                $(
                    let v = {
                        struct Round;
                        impl $crate::Permutation<$n> for Round {
                            const INDEX: [usize; $n] = $round;
                        }
                        $crate::compare_exchange_in::<T, $n, Round, R>(v)
                    };
                )*
                v
            }
        }
    };
}

#[repr(C, align(64))]
#[derive(Debug, Clone, Copy)]
struct Aligned<B>(B);

/// One 512-bit, 64-byte aligned register worth of values.
///
/// Lanes after the first `len` hold `T::MAX_VALUE`, so they stay at the end
/// whatever network runs over the buffer.
#[derive(Debug, Clone, Copy)]
pub struct SortBuffer<T: SortElement> {
    block: Aligned<T::Block>,
    len: usize,
}

impl<T: SortElement> SortBuffer<T> {
    pub const CAPACITY: usize = 64 / T::BYTES;

    pub fn new(values: &[T]) -> Result<Self, BufferError> {
        if values.len() > Self::CAPACITY {
            return Err(BufferError::TooManyValues {
                len: values.len(),
                elem_bytes: T::BYTES,
            });
        }
        let mut block = T::PADDED;
        block.as_mut()[..values.len()].copy_from_slice(values);
        Ok(Self {
            block: Aligned(block),
            len: values.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[T] {
        &self.block.0.as_ref()[..self.len]
    }

    /// Every lane, padding included.
    pub fn lanes(&self) -> &[T] {
        self.block.0.as_ref()
    }

    #[inline]
    pub fn load<const N: usize>(&self) -> VecT<T, N>
    where
        Lanes<T, N>: SelectVec<T>,
    {
        self.load_in::<VecT<T, N>>()
    }

    #[inline]
    pub fn store<const N: usize>(&mut self, v: VecT<T, N>)
    where
        Lanes<T, N>: SelectVec<T>,
    {
        self.store_in(v)
    }

    #[inline]
    pub fn load_in<R: SimdRegister<T>>(&self) -> R {
        // 64-byte aligned and 64 bytes long, enough for any register
        unsafe { R::load(self.block.0.as_ref().as_ptr()) }
    }

    #[inline]
    pub fn store_in<R: SimdRegister<T>>(&mut self, v: R) {
        unsafe { R::store(self.block.0.as_mut().as_mut_ptr(), v) }
    }
}

/// Sorts exactly `N` values with network `S` in the register picked for them.
pub fn sort<T, const N: usize, S>(data: &mut [T]) -> Result<(), NetworkError>
where
    T: SortElement,
    S: SortingNetwork<N>,
    Lanes<T, N>: SelectVec<T>,
{
    sort_with::<T, N, S, VecT<T, N>>(data)
}

pub fn sort_with<T, const N: usize, S, R>(data: &mut [T]) -> Result<(), NetworkError>
where
    T: SortElement,
    S: SortingNetwork<N>,
    R: SimdRegister<T>,
{
    if data.len() != N {
        return Err(NetworkError::LengthMismatch {
            expected: N,
            actual: data.len(),
        });
    }
    let mut buffer = SortBuffer::new(data)?;
    let v = S::apply::<T, R>(buffer.load_in::<R>());
    buffer.store_in(v);
    data.copy_from_slice(buffer.as_slice());
    Ok(())
}

/// The instructions chosen for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundPlan {
    pub permute: PermuteLowering,
    pub blend: BlendLowering,
    pub mask: u64,
}

/// What a network compiles to on a given target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSummary {
    pub lanes: usize,
    pub elem_bytes: usize,
    pub width: RegisterWidth,
    pub rounds: Vec<RoundPlan>,
    /// Union of the extensions the chosen instructions need.
    pub required: TargetFeatures,
}

impl NetworkSummary {
    pub fn of<T: SortElement, const N: usize, S: SortingNetwork<N>>(
        features: TargetFeatures,
    ) -> Result<Self, NetworkError> {
        validate_rounds(S::ROUNDS, T::BYTES, features)
    }

    /// What [`sort::<T, N, S>`](sort) runs in this build: the plan for the
    /// features of the selected register, which is [`TargetFeatures::ALL`]
    /// when the scalar register stands in.
    pub fn compiled<T, const N: usize, S>() -> Result<Self, NetworkError>
    where
        T: SortElement,
        S: SortingNetwork<N>,
        Lanes<T, N>: SelectVec<T>,
    {
        Self::of::<T, N, S>(<VecT<T, N> as SimdRegister<T>>::FEATURES)
    }

    pub fn depth(&self) -> usize {
        self.rounds.len()
    }

    /// Rounds done with one immediate shuffle.
    pub fn shuffles(&self) -> usize {
        self.rounds
            .iter()
            .filter(|r| r.permute.is_single_shuffle())
            .count()
    }

    /// Rounds that move data between 128-bit sub-lanes.
    pub fn cross_lane(&self) -> usize {
        self.rounds
            .iter()
            .filter(|r| r.permute.is_cross_lane())
            .count()
    }
}

impl fmt::Display for NetworkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} x {}-bit in {}: depth {}, {} shuffles, {} cross-lane, needs {}",
            self.lanes,
            self.elem_bytes * 8,
            self.width,
            self.depth(),
            self.shuffles(),
            self.cross_lane(),
            self.required
        )
    }
}

/// Checks every round of a network and plans it for `features`.
///
/// This is the runtime counterpart of the compile-time checks done by
/// [`crate::compare_exchange`], usable for targets other than the current one.
pub fn validate_rounds<const N: usize>(
    rounds: &[[usize; N]],
    elem_bytes: usize,
    features: TargetFeatures,
) -> Result<NetworkSummary, NetworkError> {
    let width = RegisterWidth::select(elem_bytes, N).ok_or(NetworkError::TooWide {
        lanes: N,
        elem_bytes,
    })?;
    let lanes = width.lanes(elem_bytes);

    let mut summary = NetworkSummary {
        lanes: N,
        elem_bytes,
        width,
        rounds: Vec::with_capacity(rounds.len()),
        required: TargetFeatures::NONE,
    };

    for (round, index) in rounds.iter().enumerate() {
        let perm = LanePerm::new(index, lanes);
        if let Some(lane) = perm.out_of_range() {
            return Err(NetworkError::OutOfRange {
                round,
                lane,
                target: perm.get(lane),
                lanes: N,
            });
        }
        if let Some(lane) = perm.unpaired() {
            return Err(NetworkError::NotAMatching { round, lane });
        }

        let permute = plan_permute(features, elem_bytes, width, &perm);
        let mask = selection_mask(&perm);
        let blend = plan_blend(features, elem_bytes, width, mask);
        let unsupported = |kind| NetworkError::Unsupported {
            round,
            kind,
            width,
            features: features.to_string(),
        };
        let needs_permute = permute.requires(width).ok_or_else(|| unsupported("permute"))?;
        let needs_blend = blend.requires(width).ok_or_else(|| unsupported("blend"))?;
        summary.required = summary.required.union(needs_permute).union(needs_blend);

        log::trace!("round {round}: {index:?} mask {mask:#x}");
        log::debug!("round {round}: {permute}, {blend}");
        summary.rounds.push(RoundPlan {
            permute,
            blend,
            mask,
        });
    }

    log::debug!("{summary}");
    Ok(summary)
}
