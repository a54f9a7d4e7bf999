// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{
    chromosome::{Chromosome, Mode},
    rand::DefaultRand,
};

/// Tournament selection, minimizing [`Chromosome::selection_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TournamentSelection {
    size: usize,
}

impl TournamentSelection {
    /// Tournament of `size` contestants; zero is treated as one.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    /// Number of contestants.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Index of the tournament winner, or `None` for an empty population.
    ///
    /// Contestants are drawn uniformly with replacement and a later draw only
    /// wins if it is strictly better. A tournament at least as large as the
    /// population is held among everyone, which always yields the best
    /// individual (the first one on ties).
    pub fn select_index(&self, population: &[Chromosome], mode: Mode, rng: &mut DefaultRand) -> Option<usize> {
        if population.is_empty() {
            return None;
        }
        if self.size >= population.len() {
            return best_index(population, mode);
        }
        let mut winner = rng.next_below(population.len());
        for _ in 1..self.size {
            let contestant = rng.next_below(population.len());
            if population[contestant].selection_key(mode) < population[winner].selection_key(mode) {
                winner = contestant;
            }
        }
        Some(winner)
    }

    /// Tournament winner, or `None` for an empty population.
    pub fn select<'a>(
        &self,
        population: &'a [Chromosome],
        mode: Mode,
        rng: &mut DefaultRand,
    ) -> Option<&'a Chromosome> {
        self.select_index(population, mode, rng).map(|i| &population[i])
    }
}

fn best_index(population: &[Chromosome], mode: Mode) -> Option<usize> {
    population
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, c)| {
            let key = c.selection_key(mode);
            match best {
                Some((_, b)) if b <= key => best,
                _ => Some((i, key)),
            }
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use chaos_theory::{check, make};

    use super::*;
    use crate::testcase::tests::sample;

    fn population(keys: &[f64]) -> Vec<Chromosome> {
        keys.iter()
            .map(|&k| {
                let mut c = Chromosome::new(sample());
                c.set_fitness(vec![k, 1.0]);
                c
            })
            .collect()
    }

    #[test]
    fn empty_population() {
        let mut rng = DefaultRand::new(0);
        assert_eq!(TournamentSelection::new(3).select_index(&[], Mode::Primary, &mut rng), None);
    }

    #[test]
    fn full_tournament_returns_best() {
        check(|src| {
            let mut rng = DefaultRand::new(src.any("seed"));
            let keys: Vec<f64> = src.any_of("keys", make::vec(make::float_in_range(-100.0..100.0)));
            if keys.is_empty() {
                return;
            }
            let pop = population(&keys);
            for mode in [Mode::Primary, Mode::AvFuzzer] {
                // Primary keys are sums, so distinct raw values may tie.
                let mode_keys: Vec<f64> = pop.iter().map(|c| c.selection_key(mode)).collect();
                let best = mode_keys.iter().copied().fold(f64::INFINITY, f64::min);
                let first_best = mode_keys.iter().position(|&k| k == best);
                let t = TournamentSelection::new(keys.len());
                assert_eq!(t.select_index(&pop, mode, &mut rng), first_best);
            }
        });
    }

    #[test]
    fn tied_sums_pick_the_first() {
        let mut rng = DefaultRand::new(0);
        // Both sums round to 1.0.
        let pop = population(&[1.11e-16, 5.55e-17]);
        let t = TournamentSelection::new(2);
        assert_eq!(t.select_index(&pop, Mode::Primary, &mut rng), Some(0));
        assert_eq!(t.select_index(&pop, Mode::AvFuzzer, &mut rng), Some(1));
    }

    #[test]
    fn size_one_is_uniform() {
        let mut rng = DefaultRand::new(7);
        // Strongly skewed keys must not matter with a single contestant.
        let pop = population(&[0.0, 10.0, 20.0, 30.0]);
        let t = TournamentSelection::new(1);
        let mut counts = [0usize; 4];
        let n = 8000;
        for _ in 0..n {
            let i = t.select_index(&pop, Mode::Primary, &mut rng).unwrap();
            counts[i] += 1;
        }
        for c in counts {
            assert!((1700..=2300).contains(&c), "{counts:?}");
        }
    }

    #[test]
    fn larger_tournament_prefers_better() {
        let mut rng = DefaultRand::new(1);
        let pop = population(&[0.0, 10.0, 20.0, 30.0, 40.0, 50.0]);
        let t = TournamentSelection::new(3);
        let n = 3000;
        let best = (0..n)
            .filter(|_| t.select_index(&pop, Mode::AvFuzzer, &mut rng) == Some(0))
            .count();
        // 1 - (5/6)^3 of the draws contain the best individual.
        assert!(best > n / 3, "{best}");
    }

    #[test]
    fn unevaluated_loses() {
        let mut rng = DefaultRand::new(0);
        let mut pop = population(&[5.0]);
        pop.insert(0, Chromosome::new(sample()));
        let t = TournamentSelection::new(2);
        assert_eq!(t.select_index(&pop, Mode::Primary, &mut rng), Some(1));
    }
}
