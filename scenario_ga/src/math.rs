// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub(crate) fn wide_mul(a: u64, b: u64) -> (u64, u64) {
    let m = u128::from(a).wrapping_mul(u128::from(b));
    (m as u64, (m >> 64) as u64)
}

pub(crate) fn fast_reduce_u64(r: u64, n: u64) -> u64 {
    debug_assert_ne!(n, 0);
    let (_, hi) = wide_mul(n, r);
    hi
}

// NaN-safe clamp that tolerates `lo > hi` by collapsing to `lo`.
pub(crate) fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    if hi <= lo || v.is_nan() {
        lo
    } else {
        v.clamp(lo, hi)
    }
}

// Length of the longest common subsequence, in O(min(a, b)) memory.
pub(crate) fn lcs_len<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    let (a, b) = if a.len() < b.len() { (b, a) } else { (a, b) };
    let mut prev = vec![0_usize; b.len() + 1];
    let mut cur = vec![0_usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            cur[j + 1] = if x == y {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        core::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}
