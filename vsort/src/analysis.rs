//! Compile-time analysis of a single compare-exchange permutation.
//!
//! Everything here is a `const fn` over a [`LanePerm`], so the results can be
//! bound to associated consts and folded away during monomorphization.
//! Indices are in natural lane order: `index[i]` is the partner of lane `i`
//! and lane 0 is the least significant element of the register.

use crate::register::RegisterWidth;

/// Widest register, in bytes. Also the longest byte-level control vector.
pub const MAX_BYTES: usize = 64;
/// Most lanes a register can have (64 one-byte elements).
pub const MAX_LANES: usize = 64;
/// Bytes in one independently shuffled sub-lane.
pub const SUB_LANE_BYTES: usize = 16;

/// Control byte that makes `pshufb` write a zero.
pub const ZERO_BYTE: u8 = 0x80;

/// Source of each element in a compare-exchange stage.
pub trait Permutation<const N: usize> {
    const INDEX: [usize; N];
}

/// A permutation padded out to the full register.
///
/// Lanes `used..lanes` are padding and always map to themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanePerm {
    index: [usize; MAX_LANES],
    lanes: usize,
    used: usize,
}

impl LanePerm {
    pub const fn new(index: &[usize], lanes: usize) -> Self {
        let mut padded = [0; MAX_LANES];
        let mut i = 0;
        while i < MAX_LANES {
            padded[i] = if i < index.len() { index[i] } else { i };
            i += 1;
        }
        let used = if index.len() < MAX_LANES {
            index.len()
        } else {
            MAX_LANES
        };
        let lanes = if lanes < MAX_LANES { lanes } else { MAX_LANES };
        Self {
            index: padded,
            lanes,
            used,
        }
    }

    /// Lanes in the register.
    pub const fn lanes(&self) -> usize {
        self.lanes
    }

    /// Lanes that hold real data.
    pub const fn used(&self) -> usize {
        self.used
    }

    pub const fn get(&self, lane: usize) -> usize {
        self.index[lane]
    }

    pub const fn is_identity(&self) -> bool {
        let mut i = 0;
        while i < self.lanes {
            if self.index[i] != i {
                return false;
            }
            i += 1;
        }
        true
    }

    /// First lane whose source is not one of the used lanes.
    pub const fn out_of_range(&self) -> Option<usize> {
        let mut i = 0;
        while i < self.lanes {
            let limit = if i < self.used { self.used } else { self.lanes };
            if self.index[i] >= limit {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    /// First lane that breaks `index[index[i]] == i`.
    pub const fn unpaired(&self) -> Option<usize> {
        if let Some(lane) = self.out_of_range() {
            return Some(lane);
        }
        let mut i = 0;
        while i < self.lanes {
            if self.index[self.index[i]] != i {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    /// Applies the permutation to plain values: `out[i] = values[index[i]]`.
    pub fn gather<T: Copy>(&self, values: &[T]) -> Vec<T> {
        (0..values.len().min(self.lanes))
            .map(|i| values[self.index[i]])
            .collect()
    }
}

/// Converts a list written most-significant lane first, as `_mm*_set_epi*`
/// arguments are, into natural lane order.
pub const fn from_set_order<const N: usize>(set: [usize; N]) -> [usize; N] {
    let mut out = [0; N];
    let mut i = 0;
    while i < N {
        out[i] = set[N - 1 - i];
        i += 1;
    }
    out
}

/// Builds a permutation from one round of comparator pairs.
/// Lanes not named by any pair compare against themselves.
pub const fn perm_from_pairs<const N: usize>(pairs: &[(usize, usize)]) -> [usize; N] {
    let mut out = [0; N];
    let mut i = 0;
    while i < N {
        out[i] = i;
        i += 1;
    }
    let mut p = 0;
    while p < pairs.len() {
        let (a, b) = pairs[p];
        assert!(a < N && b < N, "comparator pair names a lane outside the network");
        out[a] = b;
        out[b] = a;
        p += 1;
    }
    out
}

pub const fn ulog2(mut x: usize) -> usize {
    let mut r = 0;
    while x > 1 {
        x >>= 1;
        r += 1;
    }
    r
}

/// One bit per lane, set where the lane keeps the minimum of its pair.
///
/// The lower of the two indices ends up holding the smaller value, so a lane
/// keeps the minimum exactly when its partner sits above it.
pub const fn selection_mask(perm: &LanePerm) -> u64 {
    let mut mask = 0u64;
    let mut i = 0;
    while i < perm.used {
        if perm.index[i] > i {
            mask |= 1 << i;
        }
        i += 1;
    }
    mask
}

/// Repeats every bit of `mask` `factor` times.
pub const fn widen_mask(mask: u64, factor: usize, lanes: usize) -> u64 {
    let mut out = 0u64;
    let mut i = 0;
    while i < lanes && i * factor < 64 {
        if mask & (1 << i) != 0 {
            let mut k = 0;
            while k < factor && i * factor + k < 64 {
                out |= 1 << (i * factor + k);
                k += 1;
            }
        }
        i += 1;
    }
    out
}

/// Selection mask (from [`selection_mask`]) at the granularity of the
/// immediate blend.
///
/// 64-bit lanes in registers of 256 bits or less are blended with `vpblendd`,
/// which wants two mask bits per lane.
pub const fn build_blend_mask(mask: u64, elem_bytes: usize, width: RegisterWidth) -> u64 {
    if elem_bytes == 8 && !matches!(width, RegisterWidth::Zmm) {
        widen_mask(mask, 2, width.lanes(elem_bytes))
    } else {
        mask
    }
}

/// `pblendvb` control: `0x80` in every byte of a lane whose mask bit is set.
pub const fn build_blend_vec_initializer(mask: u64, elem_bytes: usize, lanes: usize) -> [u8; MAX_BYTES] {
    let mut out = [0u8; MAX_BYTES];
    let mut i = 0;
    while i < lanes && (i + 1) * elem_bytes <= MAX_BYTES {
        if mask & (1 << i) != 0 {
            let mut k = 0;
            while k < elem_bytes {
                out[i * elem_bytes + k] = ZERO_BYTE;
                k += 1;
            }
        }
        i += 1;
    }
    out
}

/// Source of each `granularity`-byte unit of the register.
pub const fn permute_index(perm: &LanePerm, elem_bytes: usize, granularity: usize) -> [u8; MAX_LANES] {
    let factor = elem_bytes / granularity;
    let units = perm.lanes * factor;
    let mut out = [0u8; MAX_LANES];
    let mut j = 0;
    while j < units && j < MAX_LANES {
        out[j] = (perm.index[j / factor] * factor + j % factor) as u8;
        j += 1;
    }
    out
}

/// Byte-granularity form of an element permutation: byte `k` of element `e`
/// comes from byte `k` of element `perm[e]`.
pub const fn expand_seq(perm: &LanePerm, elem_bytes: usize) -> [u8; MAX_BYTES] {
    permute_index(perm, elem_bytes, 1)
}

/// Little-endian image of an index vector with `granularity`-byte entries,
/// ready to be loaded as a `permutexvar` control register.
pub const fn encode_index(index: &[u8; MAX_LANES], units: usize, granularity: usize) -> [u8; MAX_BYTES] {
    let mut out = [0u8; MAX_BYTES];
    let mut j = 0;
    while j < units && j * granularity < MAX_BYTES {
        out[j * granularity] = index[j];
        j += 1;
    }
    out
}

/// Packs the relative source of `group` consecutive elements starting at
/// `offset` inside every sub-lane (`stride` elements apart).
///
/// Returns 0 if an element leaves its group or if the sub-lanes disagree on
/// the pattern.
pub const fn build_shuffle_mask_impl(perm: &LanePerm, offset: usize, group: usize, stride: usize) -> u64 {
    let bits = ulog2(group);
    let mut pattern = 0u64;
    let mut lane_start = 0;
    while lane_start < perm.lanes {
        let start = lane_start + offset;
        let mut current = 0u64;
        let mut j = 0;
        while j < group {
            let src = perm.index[start + j];
            if src < start || src >= start + group {
                return 0;
            }
            current |= ((src - start) as u64) << (j * bits);
            j += 1;
        }
        if lane_start == 0 {
            pattern = current;
        } else if current != pattern {
            return 0;
        }
        lane_start += stride;
    }
    pattern
}

/// Control for the single native shuffle that realizes `perm`, or 0.
///
/// * 1 byte: sixteen nibbles, the `pshufb` pattern of every sub-lane
/// * 2 bytes: `pshuflw` immediate in the low word, `pshufhw` in bits 32..
/// * 4 bytes: `pshufd` immediate
/// * 8 bytes: `pshufd` immediate moving dword pairs
pub const fn build_shuffle_mask(perm: &LanePerm, elem_bytes: usize) -> u64 {
    let per_lane = SUB_LANE_BYTES / elem_bytes;
    match elem_bytes {
        1 | 4 => build_shuffle_mask_impl(perm, 0, per_lane, per_lane),
        2 => {
            let lo = build_shuffle_mask_impl(perm, 0, 4, per_lane);
            let hi = build_shuffle_mask_impl(perm, 4, 4, per_lane);
            if lo == 0 || hi == 0 {
                0
            } else {
                lo | hi << 32
            }
        }
        8 => {
            let qwords = build_shuffle_mask_impl(perm, 0, 2, per_lane);
            if qwords == 0 {
                return 0;
            }
            let mut imm = 0u64;
            let mut j = 0;
            while j < 2 {
                let src = (qwords >> j) & 1;
                imm |= (2 * src) << (4 * j);
                imm |= (2 * src + 1) << (4 * j + 2);
                j += 1;
            }
            imm
        }
        _ => 0,
    }
}

const fn sub_lane_of(elem: usize, elem_bytes: usize) -> usize {
    elem * elem_bytes / SUB_LANE_BYTES
}

/// Every element is sourced from its own 128-bit sub-lane.
pub const fn in_same_lanes(perm: &LanePerm, elem_bytes: usize) -> bool {
    across_lanes_mask(perm, elem_bytes) == 0
}

/// One bit per element that is sourced from a different sub-lane.
pub const fn across_lanes_mask(perm: &LanePerm, elem_bytes: usize) -> u64 {
    let mut mask = 0u64;
    let mut i = 0;
    while i < perm.lanes {
        if sub_lane_of(i, elem_bytes) != sub_lane_of(perm.index[i], elem_bytes) {
            mask |= 1 << i;
        }
        i += 1;
    }
    mask
}

/// Number of 128-bit sub-lanes in the register.
pub const fn sub_lanes(perm: &LanePerm, elem_bytes: usize) -> usize {
    let bytes = perm.lanes * elem_bytes;
    if bytes < SUB_LANE_BYTES {
        1
    } else {
        bytes / SUB_LANE_BYTES
    }
}

/// `pshufb` control for the bytes each sub-lane takes from the sub-lane
/// `rotation` places above it (wrapping). Every other byte is zeroed.
///
/// Rotation 0 gives the in-lane part of the permutation; on a 256-bit
/// register rotation 1 gives the part that has to come from the swapped
/// halves.
pub const fn build_across_lanes_vec_initializer(perm: &LanePerm, elem_bytes: usize, rotation: usize) -> [u8; MAX_BYTES] {
    let seq = expand_seq(perm, elem_bytes);
    let lanes = sub_lanes(perm, elem_bytes);
    let bytes = perm.lanes * elem_bytes;
    let mut out = [0u8; MAX_BYTES];
    let mut j = 0;
    while j < bytes && j < MAX_BYTES {
        let src = seq[j] as usize;
        let wanted = (j / SUB_LANE_BYTES + rotation) % lanes;
        out[j] = if src / SUB_LANE_BYTES == wanted {
            (src % SUB_LANE_BYTES) as u8
        } else {
            ZERO_BYTE
        };
        j += 1;
    }
    out
}

/// Bit `r` set when some byte comes from the sub-lane `r` places above.
pub const fn rotations_used(perm: &LanePerm, elem_bytes: usize) -> u8 {
    let seq = expand_seq(perm, elem_bytes);
    let lanes = sub_lanes(perm, elem_bytes);
    let bytes = perm.lanes * elem_bytes;
    let mut used = 0u8;
    let mut j = 0;
    while j < bytes && j < MAX_BYTES {
        let here = j / SUB_LANE_BYTES;
        let there = seq[j] as usize / SUB_LANE_BYTES;
        used |= 1 << ((there + lanes - here) % lanes);
        j += 1;
    }
    used
}
