// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Two-offspring crossover over a pair of chromosomes.

use crate::{chromosome::Chromosome, factory::TestFactory, rand::DefaultRand};

// NPC indices an AVFuzzer crossover may pick.
const AVFUZZER_NPC_INDICES: [usize; 3] = [1, 2, 3];

/// Road boundaries where both parents can take the other's road.
#[must_use]
pub fn road_swap_positions(a: &Chromosome, b: &Chromosome, factory: &TestFactory) -> Vec<usize> {
    let (ta, tb) = (a.test_case(), b.test_case());
    (1..ta.road_size().min(tb.road_size()))
        .filter(|&i| {
            factory.check_road_change_validity(ta, tb, i) && factory.check_road_change_validity(tb, ta, i)
        })
        .collect()
}

/// Cross two chromosomes in place: both exchange the same road (if a legal
/// boundary exists) and the maneuvers of the same NPC.
pub fn crossover(a: &mut Chromosome, b: &mut Chromosome, factory: &TestFactory, rng: &mut DefaultRand) {
    let road = rng.choose(&road_swap_positions(a, b, factory)).copied().unwrap_or(0);
    let shared = a.test_case().npc_count().min(b.test_case().npc_count());
    let npc = if shared == 0 {
        0
    } else {
        rng.next_usize_inclusive(1, shared)
    };
    log::debug!("crossover: road position {road}, npc position {npc}");

    let (donor_a, donor_b) = (a.clone(), b.clone());
    a.crossover(&donor_b, road, npc, factory, rng);
    b.crossover(&donor_a, road, npc, factory, rng);
}

/// AVFuzzer crossover: both chromosomes swap the maneuvers of one random NPC.
pub fn avfuzzer_crossover(a: &mut Chromosome, b: &mut Chromosome, rng: &mut DefaultRand) {
    let Some(&npc) = rng.choose(&AVFUZZER_NPC_INDICES) else {
        return;
    };
    log::debug!("AVFuzzer crossover position {npc}");
    let donor_a = a.clone();
    a.avfuzzer_crossover(b, npc);
    b.avfuzzer_crossover(&donor_a, npc);
}

#[cfg(test)]
mod tests {
    use chaos_theory::check;

    use super::*;
    use crate::{config::Config, factory::tests::assert_roads_legal, statement::VehicleId};

    #[test]
    fn offspring_stay_legal() {
        check(|src| {
            let mut rng = DefaultRand::new(src.any("seed"));
            let f = TestFactory::new(Config::default());
            let ga = &f.config().ga;
            let mut a = f.generate_chromosome(&mut rng);
            let mut b = f.generate_chromosome(&mut rng);
            crossover(&mut a, &mut b, &f, &mut rng);
            for c in [&a, &b] {
                let tc = c.test_case();
                tc.validate().unwrap();
                assert_roads_legal(tc);
                assert!(tc.npc_count() > 0);
                assert!((ga.min_testcase_size..=ga.max_testcase_size).contains(&tc.size()));
                assert!((ga.min_road_num..=ga.max_road_num).contains(&tc.road_size()));
            }
        });
    }

    #[test]
    fn swap_positions_are_symmetric() {
        check(|src| {
            let mut rng = DefaultRand::new(src.any("seed"));
            let f = TestFactory::new(Config::default());
            let a = f.generate_chromosome(&mut rng);
            let b = f.generate_chromosome(&mut rng);
            let ab = road_swap_positions(&a, &b, &f);
            assert_eq!(ab, road_swap_positions(&b, &a, &f));
            assert!(!ab.contains(&0));
        });
    }

    #[test]
    fn avfuzzer_offspring_exchange_one_npc() {
        check(|src| {
            let mut rng = DefaultRand::new(src.any("seed"));
            let f = TestFactory::new(Config::default());
            let a0 = f.generate_avfuzzer_chromosome(&mut rng).unwrap();
            let b0 = f.generate_avfuzzer_chromosome(&mut rng).unwrap();
            let (mut a, mut b) = (a0.clone(), b0.clone());
            avfuzzer_crossover(&mut a, &mut b, &mut rng);
            assert_eq!(a.size(), a0.size());
            assert_eq!(b.size(), b0.size());
            let swapped: Vec<usize> = [1, 2]
                .into_iter()
                .filter(|&k| {
                    let id = VehicleId::Npc(k);
                    a.test_case().actions_of(id) == b0.test_case().actions_of(id)
                        && b.test_case().actions_of(id) == a0.test_case().actions_of(id)
                        && a0.test_case().actions_of(id) != b0.test_case().actions_of(id)
                })
                .collect();
            assert!(swapped.len() <= 1);
            // The untouched NPC keeps its own maneuvers.
            for k in [1, 2] {
                if !swapped.contains(&k) {
                    let id = VehicleId::Npc(k);
                    let kept = a.test_case().actions_of(id) == a0.test_case().actions_of(id);
                    let took = a.test_case().actions_of(id) == b0.test_case().actions_of(id);
                    assert!(kept || took);
                }
            }
        });
    }
}
