// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::fmt::{Debug, Display};

/// Closed `[min, max]` interval of a scenario parameter.
#[derive(Clone, Copy, PartialEq)]
pub struct Bounds<T> {
    /// Inclusive lower bound.
    pub min: T,
    /// Inclusive upper bound.
    pub max: T,
}

impl<T: PartialOrd + Copy> Bounds<T> {
    /// Create bounds; see [`Bounds::is_valid`].
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    /// Check that `min <= max`.
    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }

    /// Check that `v` lies within the bounds.
    pub fn contains(&self, v: T) -> bool {
        self.min <= v && v <= self.max
    }
}

impl Bounds<f64> {
    /// `max - min`.
    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    /// Clamp `v` into the bounds.
    pub fn clamp(&self, v: f64) -> f64 {
        crate::math::clamp(v, self.min, self.max)
    }
}

impl Bounds<i64> {
    /// Convert integer bounds to float ones.
    pub fn to_f64(self) -> Bounds<f64> {
        Bounds::new(self.min as f64, self.max as f64)
    }
}

impl<T: Debug> Debug for Bounds<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{:?}, {:?}]", self.min, self.max)
    }
}

impl<T: Display> Display for Bounds<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}
