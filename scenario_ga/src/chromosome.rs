// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;

use crate::{
    factory::TestFactory,
    rand::DefaultRand,
    statement::{Statement, VehicleId},
    testcase::TestCase,
};

/// Search mode, which decides how fitness vectors are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Multi-objective NSGA-II search over the full fitness vector.
    Primary,
    /// Single-objective search over one scalar with local intensification.
    AvFuzzer,
}

/// Candidate scenario with its evaluation metadata.
///
/// Cloning produces a fully independent copy: no statement or argument is
/// shared between a chromosome and its clone.
#[derive(Debug, Clone, PartialEq)]
pub struct Chromosome {
    test_case: TestCase,
    fitness: Vec<f64>,
    rank: Option<usize>,
    crowding: Option<f64>,
    complexity: f64,
}

impl Chromosome {
    /// Wrap a test case; fitness is empty until evaluated.
    #[must_use]
    pub fn new(test_case: TestCase) -> Self {
        let complexity = complexity(&test_case);
        Self {
            test_case,
            fitness: Vec::new(),
            rank: None,
            crowding: None,
            complexity,
        }
    }

    /// Scenario program.
    #[must_use]
    pub fn test_case(&self) -> &TestCase {
        &self.test_case
    }

    /// Statement count.
    #[must_use]
    pub fn size(&self) -> usize {
        self.test_case.size()
    }

    /// Deterministic textual form of the scenario.
    #[must_use]
    pub fn render(&self) -> String {
        self.test_case.render()
    }

    /// Fitness vector; lower is better on every objective.
    #[must_use]
    pub fn fitness(&self) -> &[f64] {
        &self.fitness
    }

    /// Set the fitness vector.
    pub fn set_fitness(&mut self, fitness: Vec<f64>) {
        self.fitness = fitness;
    }

    /// Index of the non-dominated front, once survival selection ran.
    #[must_use]
    pub fn rank(&self) -> Option<usize> {
        self.rank
    }

    /// Crowding distance inside the front, once survival selection ran.
    #[must_use]
    pub fn crowding(&self) -> Option<f64> {
        self.crowding
    }

    pub(crate) fn set_rank(&mut self, rank: usize, crowding: f64) {
        self.rank = Some(rank);
        self.crowding = Some(crowding);
    }

    /// Structural complexity of the scenario.
    #[must_use]
    pub fn complexity(&self) -> f64 {
        self.complexity
    }

    /// Selection key, lower is better: the fitness sum in primary mode, the
    /// stored scalar in AVFuzzer mode. Unevaluated chromosomes lose to all.
    #[must_use]
    pub fn selection_key(&self, mode: Mode) -> f64 {
        let key = match mode {
            Mode::Primary => self.fitness.iter().sum(),
            Mode::AvFuzzer => self.fitness.first().copied().unwrap_or(f64::INFINITY),
        };
        if self.fitness.is_empty() || key.is_nan() {
            f64::INFINITY
        } else {
            key
        }
    }

    fn structure_changed(&mut self) {
        self.complexity = complexity(&self.test_case);
    }

    /// Apply the insert, change and delete passes, each with its configured probability.
    pub fn mutate(&mut self, factory: &TestFactory, rng: &mut DefaultRand) {
        let ga = factory.ga();
        if rng.coinflip(ga.test_insert_probability) {
            self.mutation_insert(factory, rng);
        }
        if rng.coinflip(ga.test_change_probability) {
            self.mutation_change(factory, rng);
        }
        if rng.coinflip(ga.test_delete_probability) {
            self.mutation_delete(factory, rng);
        }
        self.structure_changed();
    }

    pub(crate) fn mutation_insert(&mut self, factory: &TestFactory, rng: &mut DefaultRand) {
        let ga = factory.ga();
        let tc = &mut self.test_case;
        if tc.road_size() < ga.max_road_num {
            let index = rng.next_usize_inclusive(0, tc.road_size());
            factory.mutation_insert_road(tc, index, rng);
        }
        if tc.size() < ga.max_testcase_size {
            factory.insert_random_action(tc, None, None, rng);
        }
    }

    pub(crate) fn mutation_change(&mut self, factory: &TestFactory, rng: &mut DefaultRand) {
        let tc = &mut self.test_case;
        if tc.road_size() > 0 {
            let index = rng.next_below(tc.road_size());
            log::trace!("changing road{index}");
            factory.mutation_change_road(tc, index, rng);
        }

        // Sweep everything after the ego constructor.
        let first = tc.size() - tc.vehicle_statements().len() + 1;
        if first >= tc.size() {
            return;
        }
        let p = 1.0 / (tc.size() - first + 1) as f64;
        for position in first..tc.size() {
            if !rng.coinflip(p) {
                continue;
            }
            match tc.statements()[position] {
                Statement::VehicleConstructor { vehicle, .. } => {
                    factory.mutate_vehicle(tc, vehicle, rng);
                }
                Statement::VehicleAction { .. } => {
                    factory.mutate_action(tc, position, true, rng);
                }
                Statement::RoadConstructor { .. } | Statement::RoadAction { .. } => {}
            }
        }
    }

    pub(crate) fn mutation_delete(&mut self, factory: &TestFactory, rng: &mut DefaultRand) {
        let ga = factory.ga();
        let tc = &mut self.test_case;
        if tc.road_size() > ga.min_road_num {
            let index = rng.next_below(tc.road_size());
            log::trace!("deleting road{index}");
            factory.mutation_delete_road(tc, index);
        }

        let suffix = tc.vehicle_statements().len();
        if suffix == 0 {
            return;
        }
        let p = 1.0 / suffix as f64;
        for position in tc.vehicle_action_range().rev() {
            if rng.coinflip(p) {
                tc.remove_action(position, ga.min_testcase_size);
            }
        }
    }

    /// Exchange material with `donor`: optionally swap road `road_index`
    /// (0 means no road swap) with the NPCs on it, then replace the maneuvers
    /// of NPC `npc_index` with the donor's.
    pub fn crossover(
        &mut self,
        donor: &Self,
        road_index: usize,
        npc_index: usize,
        factory: &TestFactory,
        rng: &mut DefaultRand,
    ) {
        let mut offspring = self.test_case.clone();
        if road_index != 0
            && let Some(swapped) = swap_road(&offspring, &donor.test_case, road_index, factory)
        {
            offspring = swapped;
        }

        let shared = offspring.npc_count().min(donor.test_case.npc_count());
        if shared > 0 {
            let k = if (1..=shared).contains(&npc_index) {
                npc_index
            } else {
                rng.next_usize_inclusive(1, shared)
            };
            swap_actions(&mut offspring, &donor.test_case, VehicleId::Npc(k));
        }

        factory.repair_size(&mut offspring, rng);
        self.test_case = offspring;
        self.structure_changed();
    }

    /// Replace the maneuvers of NPC `npc_index` with the donor's. A no-op
    /// unless both sides have that NPC.
    pub fn avfuzzer_crossover(&mut self, donor: &Self, npc_index: usize) {
        let id = VehicleId::Npc(npc_index);
        if self.test_case.vehicle(id).is_none() || donor.test_case.vehicle(id).is_none() {
            return;
        }
        swap_actions(&mut self.test_case, &donor.test_case, id);
        self.structure_changed();
    }

    /// Re-sample one random vehicle action.
    pub fn avfuzzer_mutation(&mut self, factory: &TestFactory, rng: &mut DefaultRand) {
        let range = self.test_case.vehicle_action_range();
        if range.is_empty() {
            return;
        }
        let position = range.start + rng.next_below(range.len());
        log::trace!("AVFuzzer mutation at {position}");
        factory.mutate_action(&mut self.test_case, position, false, rng);
    }
}

// Recipient with road `index` replaced by the donor's, the recipient's NPCs
// on that road dropped and the donor's NPCs on it carried over.
// `None` when no NPC would be left.
fn swap_road(recipient: &TestCase, donor: &TestCase, index: usize, factory: &TestFactory) -> Option<TestCase> {
    let seg = donor.segment(index)?;
    let mut tc = recipient.clone();
    if !tc.replace_road(index, seg.road.clone(), seg.shape.cloned()) {
        return None;
    }
    // Removing an NPC renumbers later ones, so go from the back.
    let doomed: Vec<VehicleId> = tc
        .vehicles()
        .filter(|(id, v)| id.is_npc() && v.road_id == index)
        .map(|(id, _)| id)
        .collect();
    for id in doomed.into_iter().rev() {
        tc.remove_vehicle(id);
    }
    let max_vehicles = factory.ga().max_vehicle_num;
    for (id, v) in donor.vehicles() {
        if !id.is_npc() || v.road_id != index || tc.vehicle_count() >= max_vehicles {
            continue;
        }
        let new_id = tc.push_vehicle(v.clone());
        for m in donor.actions_of(id) {
            tc.push_action(new_id, m.clone());
        }
    }
    tc.fit_vehicles();
    (tc.npc_count() > 0).then_some(tc)
}

fn swap_actions(recipient: &mut TestCase, donor: &TestCase, id: VehicleId) {
    recipient.remove_actions_of(id);
    for m in donor.actions_of(id) {
        recipient.push_action(id, m.clone());
    }
}

/// `actions / 10 + 2 * constructors / 5 + distinct action targets / 3`.
#[must_use]
pub fn complexity(tc: &TestCase) -> f64 {
    let constructors = tc.statements().iter().filter(|s| s.is_constructor()).count();
    let actions = tc.size() - constructors;
    let targets: HashSet<String> = tc
        .statements()
        .iter()
        .filter(|s| s.is_action())
        .map(Statement::target_name)
        .collect();
    actions as f64 / 10.0 + 2.0 * constructors as f64 / 5.0 + targets.len() as f64 / 3.0
}

#[cfg(test)]
mod tests {
    use chaos_theory::check;

    use super::*;
    use crate::{
        config::Config,
        factory::tests::assert_roads_legal,
        testcase::tests::{road, sample, speed, vehicle},
    };

    fn factory() -> TestFactory {
        TestFactory::new(Config::default())
    }

    #[test]
    fn complexity_formula() {
        let c = Chromosome::new(sample());
        // 5 constructors, 5 actions (one road action), 3 distinct targets.
        let expected = 5.0 / 10.0 + 2.0 * 5.0 / 5.0 + 3.0 / 3.0;
        assert!((c.complexity() - expected).abs() < 1e-12);
    }

    #[test]
    fn clone_isolation() {
        check(|src| {
            let mut rng = DefaultRand::new(src.any("seed"));
            let f = factory();
            let mut orig = f.generate_chromosome(&mut rng);
            orig.set_fitness(vec![1.0, 2.0, 3.0]);
            let snapshot = orig.render();
            let statements = orig.test_case().statements().to_vec();
            let mut copy = orig.clone();
            for _ in 0..4 {
                copy.mutate(&f, &mut rng);
            }
            copy.set_fitness(vec![0.0]);
            assert_eq!(orig.render(), snapshot);
            assert_eq!(orig.test_case().statements(), statements.as_slice());
            assert_eq!(orig.fitness(), &[1.0, 2.0, 3.0]);
        });
    }

    #[test]
    fn mutation_keeps_invariants() {
        check(|src| {
            let mut rng = DefaultRand::new(src.any("seed"));
            let f = factory();
            let ga = &f.config().ga;
            let mut c = f.generate_chromosome(&mut rng);
            for _ in 0..8 {
                c.mutate(&f, &mut rng);
                let tc = c.test_case();
                tc.validate().unwrap();
                assert_roads_legal(tc);
                assert!((ga.min_road_num..=ga.max_road_num).contains(&tc.road_size()));
                assert!((ga.min_testcase_size..=ga.max_testcase_size).contains(&tc.size()));
                assert!((c.complexity() - complexity(tc)).abs() < 1e-12);
            }
        });
    }

    #[test]
    fn crossover_keeps_invariants() {
        check(|src| {
            let mut rng = DefaultRand::new(src.any("seed"));
            let f = factory();
            let ga = &f.config().ga;
            let a = f.generate_chromosome(&mut rng);
            let b = f.generate_chromosome(&mut rng);
            let roads = a.test_case().road_size().min(b.test_case().road_size());
            let road_index = rng.next_below(roads);
            let npc_index = rng.next_usize_inclusive(1, 5);
            let mut child = a.clone();
            child.crossover(&b, road_index, npc_index, &f, &mut rng);
            let tc = child.test_case();
            tc.validate().unwrap();
            assert!(tc.npc_count() > 0);
            assert!(tc.vehicle_count() <= ga.max_vehicle_num);
            assert!(tc.size() <= ga.max_testcase_size);
        });
    }

    #[test]
    fn crossover_swaps_npc_actions() {
        let mut rng = DefaultRand::new(0);
        let f = factory();
        let a = Chromosome::new(sample());
        let mut other = sample();
        other.remove_actions_of(VehicleId::Npc(1));
        for s in [1.0, 2.0, 3.0] {
            other.push_action(VehicleId::Npc(1), speed(s));
        }
        let b = Chromosome::new(other);
        let mut child = a.clone();
        child.crossover(&b, 0, 1, &f, &mut rng);
        let got: Vec<_> = child.test_case().actions_of(VehicleId::Npc(1)).into_iter().cloned().collect();
        assert_eq!(got, vec![speed(1.0), speed(2.0), speed(3.0)]);
        assert_eq!(child.test_case().actions_of(VehicleId::Npc(2)).len(), 2);
    }

    #[test]
    fn road_swap_moves_npcs() {
        let f = factory();
        let recipient = sample();
        // Donor: same roads, but road 1 has 3 lanes and carries two NPCs.
        let mut donor = TestCase::new();
        donor.push_road(road(3), None);
        donor.push_road(road(3), None);
        donor.push_vehicle(vehicle(0, 30.0));
        let x = donor.push_vehicle(vehicle(1, 5.0));
        let y = donor.push_vehicle(vehicle(1, 50.0));
        donor.push_action(x, speed(7.0));
        donor.push_action(y, speed(8.0));

        let tc = swap_road(&recipient, &donor, 1, &f).unwrap();
        tc.validate().unwrap();
        assert_eq!(tc.road(1).map(|r| r.lane_num), Some(3));
        // npc2 of the recipient was on road 1 and is gone; npc1 stays, donor's two join.
        assert_eq!(tc.npc_count(), 3);
        assert_eq!(tc.vehicle(VehicleId::Npc(1)).map(|v| v.road_id), Some(0));
        assert_eq!(tc.actions_of(VehicleId::Npc(2)), vec![&speed(7.0)]);
        assert_eq!(tc.actions_of(VehicleId::Npc(3)), vec![&speed(8.0)]);
    }

    #[test]
    fn road_swap_needs_an_npc() {
        let f = factory();
        let mut recipient = TestCase::new();
        recipient.push_road(road(3), None);
        recipient.push_road(road(3), None);
        recipient.push_vehicle(vehicle(0, 30.0));
        recipient.push_vehicle(vehicle(1, 30.0));
        let mut donor = recipient.clone();
        donor.remove_vehicle(VehicleId::Npc(1));
        assert!(swap_road(&recipient, &donor, 1, &f).is_none());
    }

    #[test]
    fn avfuzzer_operators() {
        check(|src| {
            let mut rng = DefaultRand::new(src.any("seed"));
            let f = factory();
            let a = f.generate_avfuzzer_chromosome(&mut rng).unwrap();
            let b = f.generate_avfuzzer_chromosome(&mut rng).unwrap();
            let mut child = a.clone();
            child.avfuzzer_crossover(&b, 2);
            assert_eq!(
                child.test_case().actions_of(VehicleId::Npc(2)),
                b.test_case().actions_of(VehicleId::Npc(2))
            );
            assert_eq!(
                child.test_case().actions_of(VehicleId::Npc(1)),
                a.test_case().actions_of(VehicleId::Npc(1))
            );
            let before = child.clone();
            child.avfuzzer_crossover(&b, 3);
            assert_eq!(child, before);

            child.avfuzzer_mutation(&f, &mut rng);
            child.test_case().validate().unwrap();
            assert_eq!(child.size(), before.size());
        });
    }

    #[test]
    fn selection_key() {
        let mut c = Chromosome::new(sample());
        assert_eq!(c.selection_key(Mode::Primary), f64::INFINITY);
        c.set_fitness(vec![1.0, 2.0, 0.5]);
        assert_eq!(c.selection_key(Mode::Primary), 3.5);
        assert_eq!(c.selection_key(Mode::AvFuzzer), 1.0);
    }
}
