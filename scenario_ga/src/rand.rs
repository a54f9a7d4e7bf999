// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::math::{fast_reduce_u64, wide_mul};

/// Seedable pseudo-random source shared by every stochastic component.
///
/// The search is fully reproducible given the seed: every operator draws from
/// the `Rand` passed to it explicitly, and nothing reaches for global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rand<R: RandCore> {
    rng: R,
}

/// Default random source used throughout the crate.
pub type DefaultRand = Rand<Wyrand>;

const STRING_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

impl<R: RandCore> Rand<R> {
    /// Create a new random source from the seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self { rng: R::new(seed) }
    }

    /// Derive an independent random source, e.g. for a worker thread.
    #[must_use]
    pub fn fork(&mut self) -> Self {
        Self::new(self.next())
    }

    pub(crate) fn next(&mut self) -> u64 {
        self.rng.next()
    }

    /// Uniform float in `[0, 1)`.
    pub fn next_float(&mut self) -> f64 {
        low_53_to_float(self.next())
    }

    /// Uniform float in `[lo, hi]`. Degenerate or inverted ranges collapse to `lo`.
    pub fn next_float_in(&mut self, lo: f64, hi: f64) -> f64 {
        if hi <= lo {
            return lo;
        }
        self.next_float().mul_add(hi - lo, lo).min(hi)
    }

    /// Uniform integer in `[0, n)`.
    pub fn next_below(&mut self, n: usize) -> usize {
        self.next_below_u64(n as u64) as usize
    }

    pub(crate) fn next_below_u64(&mut self, n: u64) -> u64 {
        fast_reduce_u64(self.next(), n)
    }

    /// Uniform integer in `[lo, hi)`. Empty ranges collapse to `lo`.
    pub fn next_int(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            return lo;
        }
        let span = hi.abs_diff(lo);
        lo.wrapping_add(self.next_below_u64(span) as i64)
    }

    /// Uniform integer in `[lo, hi]`.
    pub fn next_int_inclusive(&mut self, lo: i64, hi: i64) -> i64 {
        self.next_int(lo, hi.saturating_add(1))
    }

    /// Uniform `usize` in `[lo, hi]`.
    pub fn next_usize_inclusive(&mut self, lo: usize, hi: usize) -> usize {
        if hi <= lo {
            return lo;
        }
        lo + self.next_below(hi - lo + 1)
    }

    /// Uniformly chosen element of a slice, `None` when it is empty.
    pub fn choose<'a, T>(&mut self, values: &'a [T]) -> Option<&'a T> {
        if values.is_empty() {
            None
        } else {
            Some(&values[self.next_below(values.len())])
        }
    }

    /// Fisher-Yates shuffle.
    pub fn shuffle<T>(&mut self, values: &mut [T]) {
        for i in (1..values.len()).rev() {
            let j = self.next_below(i + 1);
            values.swap(i, j);
        }
    }

    /// Random permutation of `[0, n)`.
    pub fn permutation(&mut self, n: usize) -> Vec<usize> {
        let mut p: Vec<usize> = (0..n).collect();
        self.shuffle(&mut p);
        p
    }

    /// Random alphanumeric string of the given length.
    pub fn next_string(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| char::from(STRING_ALPHABET[self.next_below(STRING_ALPHABET.len())]))
            .collect()
    }

    /// Fair coin.
    pub fn coinflip_fair(&mut self) -> bool {
        self.coinflip(0.5)
    }

    /// `true` with probability `p`.
    pub fn coinflip(&mut self, p: f64) -> bool {
        self.next_float() < p
    }
}

/// Core pseudo-random number generator behind [`Rand`].
pub trait RandCore {
    /// Create the generator from a seed.
    fn new(seed: u64) -> Self;
    /// Next 64 random bits.
    fn next(&mut self) -> u64;
}

/// [wyrand](https://github.com/wangyi-fudan/wyhash) generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wyrand {
    seed: u64,
}

impl RandCore for Wyrand {
    fn new(mut seed: u64) -> Self {
        Self {
            seed: splitmix64(&mut seed),
        }
    }

    fn next(&mut self) -> u64 {
        self.seed = self.seed.wrapping_add(0x2d358dccaa6c78a5);
        let (lo, hi) = wide_mul(self.seed, self.seed ^ 0x8bb84b93962eacc9);
        lo ^ hi
    }
}

/// Return a pseudo-random 64-bit seed.
#[must_use]
pub fn random_seed() -> u64 {
    use core::hash::{BuildHasher as _, Hasher as _};
    use std::collections::hash_map::RandomState;
    RandomState::new().build_hasher().finish()
}

// https://prng.di.unimi.it/splitmix64.c
fn splitmix64(x: &mut u64) -> u64 {
    *x = x.wrapping_add(0x9e3779b97f4a7c15);
    let mut z = *x;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

fn low_53_to_float(n: u64) -> f64 {
    const MAX: u64 = 1u64 << 53;
    const MAX_DIV: f64 = 1.0 / (MAX as f64);
    let u = n & MAX.wrapping_sub(1);
    u as f64 * MAX_DIV
}
