// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{config::GaConfig, rand::DefaultRand, range::Bounds};

/// Bounded polynomial mutation of real vectors.
///
/// Each coordinate is perturbed with probability `prob`; if none is picked
/// (and `prob` is positive) one random coordinate is forced. The perturbation
/// follows a polynomial distribution with index `eta`, so results always stay
/// inside the coordinate bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolynomialMutation {
    /// Distribution index; larger values keep offspring closer to the parent.
    pub eta: f64,
    /// Per-coordinate mutation probability.
    pub prob: f64,
}

impl PolynomialMutation {
    /// Mutation parameters from the GA configuration.
    #[must_use]
    pub fn from_config(ga: &GaConfig) -> Self {
        Self {
            eta: ga.polynomial_distribution,
            prob: ga.polynomial_prob,
        }
    }

    /// Mutate `var` in place. `bounds` must have the same length as `var`;
    /// extra entries on either side are ignored.
    pub fn mutate(&self, var: &mut [f64], bounds: &[Bounds<f64>], rng: &mut DefaultRand) {
        let n = var.len().min(bounds.len());
        if n == 0 || self.prob <= 0.0 {
            return;
        }
        let mut chosen: Vec<bool> = (0..n).map(|_| rng.coinflip(self.prob)).collect();
        if !chosen.iter().any(|&c| c) {
            chosen[rng.next_below(n)] = true;
        }
        for (i, _) in chosen.iter().enumerate().filter(|&(_, &c)| c) {
            var[i] = self.perturb(var[i], bounds[i], rng);
        }
    }

    /// Mutate a single value (always perturbed unless `prob` is zero).
    pub fn mutate_one(&self, v: f64, bounds: Bounds<f64>, rng: &mut DefaultRand) -> f64 {
        let mut var = [v];
        self.mutate(&mut var, &[bounds], rng);
        var[0]
    }

    fn perturb(&self, v: f64, b: Bounds<f64>, rng: &mut DefaultRand) -> f64 {
        let span = b.width();
        if span.is_nan() || span <= 0.0 {
            return b.min;
        }
        let v = b.clamp(v);
        let d1 = (v - b.min) / span;
        let d2 = (b.max - v) / span;
        let exp = self.eta + 1.0;
        let u = rng.next_float();
        let dq = if u <= 0.5 {
            let q = (1.0 - 2.0 * u).mul_add((1.0 - d1).powf(exp), 2.0 * u);
            q.powf(1.0 / exp) - 1.0
        } else {
            let q = (2.0 * (u - 0.5)).mul_add((1.0 - d2).powf(exp), 2.0 * (1.0 - u));
            1.0 - q.powf(1.0 / exp)
        };
        b.clamp(dq.mul_add(span, v))
    }
}

#[cfg(test)]
mod tests {
    use chaos_theory::{check, make};

    use super::*;

    #[test]
    fn stays_in_bounds() {
        check(|src| {
            let mut rng = DefaultRand::new(src.any("seed"));
            let eta = src.any_of("eta", make::float_in_range(0.0..30.0));
            let prob = src.any_of("prob", make::float_in_range(0.0..1.0));
            let m = PolynomialMutation { eta, prob };
            let bounds: Vec<Bounds<f64>> = (0..4)
                .map(|i| {
                    let lo = f64::from(i) * -3.0;
                    Bounds::new(lo, lo + f64::from(i + 1))
                })
                .collect();
            let mut var: Vec<f64> = bounds.iter().map(|b| rng.next_float_in(b.min, b.max)).collect();
            m.mutate(&mut var, &bounds, &mut rng);
            for (v, b) in var.iter().zip(&bounds) {
                assert!(b.contains(*v), "{v} not in {b}");
            }
        });
    }

    #[test]
    fn zero_prob_is_identity() {
        check(|src| {
            let mut rng = DefaultRand::new(src.any("seed"));
            let m = PolynomialMutation { eta: 5.0, prob: 0.0 };
            let orig = vec![0.5, -1.0, 7.0];
            let mut var = orig.clone();
            m.mutate(&mut var, &[Bounds::new(0.0, 1.0); 3], &mut rng);
            assert_eq!(var, orig);
        });
    }

    #[test]
    fn at_least_one_coordinate_moves() {
        let mut rng = DefaultRand::new(3);
        // Probability so small that the forced pick is what mutates.
        let m = PolynomialMutation {
            eta: 1.0,
            prob: 1e-12,
        };
        let orig = vec![0.5; 8];
        let mut moved = 0;
        for _ in 0..32 {
            let mut var = orig.clone();
            m.mutate(&mut var, &[Bounds::new(0.0, 1.0); 8], &mut rng);
            let changed = var.iter().zip(&orig).filter(|(a, b)| a != b).count();
            assert!(changed <= 1);
            moved += changed;
        }
        assert!(moved > 0);
    }

    #[test]
    fn degenerate_bounds_collapse() {
        let mut rng = DefaultRand::new(0);
        let m = PolynomialMutation { eta: 5.0, prob: 1.0 };
        assert_eq!(m.mutate_one(12.0, Bounds::new(3.0, 3.0), &mut rng), 3.0);
        assert_eq!(m.mutate_one(12.0, Bounds::new(5.0, 1.0), &mut rng), 5.0);
    }
}
