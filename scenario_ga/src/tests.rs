// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;

use chaos_theory::check;

use crate::{
    Chromosome, Config, DefaultRand, MemorySink, Mode, SearchAlgorithm, SearchError, SimulatorError,
    TestCase, TestFactory, crossover, factory::tests::assert_roads_legal, survivors,
};

// Scores a scenario by the gap between the ego and its closest NPC on the same road.
fn synthetic(c: &Chromosome, mode: Mode) -> Result<Vec<f64>, SimulatorError> {
    let tc = c.test_case();
    let ego = tc.ego().ok_or_else(|| SimulatorError::new("no ego"))?;
    let gap = tc
        .vehicles()
        .filter(|(id, v)| id.is_npc() && v.road_id == ego.road_id)
        .map(|(_, v)| (v.init_s - ego.init_s).abs())
        .fold(100.0, f64::min);
    let flag = if gap < 10.0 { 0.0 } else { 1.0 };
    Ok(match mode {
        Mode::Primary => vec![
            flag,
            gap,
            (tc.road_size() as f64).mul_add(-0.05, 1.0),
            c.complexity(),
        ],
        Mode::AvFuzzer => vec![flag, gap],
    })
}

fn small_config(seed: u64) -> Config {
    Config::default()
        .with_rng_seed(seed)
        .with_population(6)
        .with_iteration(4)
}

fn assert_invariants(f: &TestFactory, tc: &TestCase) {
    let ga = &f.config().ga;
    tc.validate().unwrap();
    assert_roads_legal(tc);
    assert!((ga.min_road_num..=ga.max_road_num).contains(&tc.road_size()));
    assert!((ga.min_testcase_size..=ga.max_testcase_size).contains(&tc.size()));
}

// Every entity acted upon in the text is declared in it.
fn assert_text_references_declared(text: &str) {
    let declared: HashSet<&str> = text
        .lines()
        .filter_map(|l| l.split_once(" = ").map(|(name, _)| name))
        .collect();
    for line in text.lines().filter(|l| !l.contains(" = ")) {
        let (target, _) = line.split_once('.').unwrap();
        assert!(declared.contains(target), "{target} is not declared in\n{text}");
    }
}

fn two_roads_three_vehicles(f: &TestFactory, rng: &mut DefaultRand) -> TestCase {
    let mut tc = TestCase::new();
    for _ in 0..2 {
        let i = f.insert_random_road(&mut tc, rng);
        f.insert_random_road_shape(&mut tc, i, rng);
    }
    for _ in 0..3 {
        f.insert_random_vehicle(&mut tc, rng);
    }
    while tc.size() < f.config().ga.min_testcase_size + 2 {
        assert!(f.insert_random_action(&mut tc, None, None, rng));
    }
    tc
}

#[test]
fn full_cycle_keeps_invariants() {
    check(|src| {
        let mut rng = DefaultRand::new(src.any("seed"));
        let f = TestFactory::new(Config::default());
        let mut a = Chromosome::new(two_roads_three_vehicles(&f, &mut rng));
        let mut b = Chromosome::new(two_roads_three_vehicles(&f, &mut rng));
        assert_eq!(a.test_case().road_size(), 2);
        assert_eq!(a.test_case().vehicle_count(), 3);
        let parents = [a.clone(), b.clone()];

        crossover(&mut a, &mut b, &f, &mut rng);
        a.mutate(&f, &mut rng);
        b.mutate(&f, &mut rng);

        let mut population: Vec<Chromosome> = parents.into_iter().chain([a, b]).collect();
        for c in &mut population {
            c.set_fitness(synthetic(c, Mode::Primary).unwrap());
        }
        let kept = survivors(population, 2, &mut rng);
        assert_eq!(kept.len(), 2);
        for c in &kept {
            assert_invariants(&f, c.test_case());
            assert_text_references_declared(&c.render());
        }
    });
}

#[test]
fn primary_search_runs() {
    let mut search = SearchAlgorithm::new(small_config(1), synthetic, MemorySink::default()).unwrap();
    let outcome = search.run(Mode::Primary).unwrap();
    assert_eq!(search.iteration(), 4);
    assert_eq!(search.population().len(), 6);
    assert_eq!(outcome.history.len(), 4);
    assert_eq!(outcome.stats.unique_bug_history.len(), 4);
    assert_eq!(outcome.best.rank(), Some(0));
    for c in search.population() {
        assert_eq!(c.fitness().len(), 4);
        assert_invariants(search.factory(), c.test_case());
    }
    let sink = search.sink();
    assert!(sink.results.len() >= 6 * 5);
    assert_eq!(sink.results.len(), sink.metrics.len());
    assert_eq!(sink.best.len(), 4);
    let last = sink.metrics.last().unwrap();
    assert_eq!(
        *last,
        (
            outcome.stats.collisions,
            outcome.stats.boundary_violations,
            outcome.stats.unique_bugs
        )
    );
    assert_eq!(outcome.stats.unique_bugs, search.tracker().unique_bugs().len());
}

#[test]
fn avfuzzer_search_runs() {
    let config = small_config(2).with_iteration(8);
    let mut search = SearchAlgorithm::new(config, synthetic, MemorySink::default()).unwrap();
    let outcome = search.run(Mode::AvFuzzer).unwrap();
    assert_eq!(search.iteration(), 8);
    assert_eq!(outcome.history.len(), 8);
    let keys: Vec<f64> = search
        .population()
        .iter()
        .map(|c| c.selection_key(Mode::AvFuzzer))
        .collect();
    assert!(keys.is_sorted());
    assert_eq!(outcome.best.fitness().len(), 1);
    for c in search.population() {
        let tc = c.test_case();
        tc.validate().unwrap();
        assert_eq!(tc.road_size(), 2);
        assert_eq!(tc.vehicle_count(), 3);
    }
}

#[test]
fn same_seed_same_search() {
    let run = |threads: usize| {
        let config = small_config(3).with_eval_threads(threads);
        let mut search = SearchAlgorithm::new(config, synthetic, MemorySink::default()).unwrap();
        let outcome = search.run(Mode::Primary).unwrap();
        (outcome.best.render(), outcome.history)
    };
    let first = run(1);
    assert_eq!(first, run(1));
    assert_eq!(first, run(3));
}

#[test]
fn random_generation_baseline() {
    let mut search = SearchAlgorithm::new(small_config(4), synthetic, MemorySink::default()).unwrap();
    let outcome = search.random_generation().unwrap();
    assert_eq!(search.sink().results.len(), 6 * 4);
    let best = outcome.best.selection_key(Mode::Primary);
    for (fitness, _) in &search.sink().results {
        assert!(best <= fitness.iter().sum());
    }
}

#[test]
fn elitism_keeps_population_size() {
    let config = small_config(5).with_elite(2, true);
    let mut search = SearchAlgorithm::new(config, synthetic, MemorySink::default()).unwrap();
    search.run(Mode::Primary).unwrap();
    assert_eq!(search.population().len(), 6);
    let elite = search.elitism();
    assert_eq!(elite.as_slice(), &search.population()[..2]);
}

#[test]
fn simulator_failure_propagates() {
    let failing = |_: &Chromosome, _: Mode| -> Result<Vec<f64>, SimulatorError> {
        Err(SimulatorError::new("crashed"))
    };
    let mut search = SearchAlgorithm::new(small_config(6), failing, MemorySink::default()).unwrap();
    let err = search.run(Mode::Primary).unwrap_err();
    assert!(matches!(err, SearchError::Simulator(_)));
    assert!(search.sink().results.is_empty());
}

#[test]
fn short_fitness_rejected() {
    let short = |_: &Chromosome, _: Mode| -> Result<Vec<f64>, SimulatorError> { Ok(vec![1.0]) };
    let mut search = SearchAlgorithm::new(small_config(7), short, MemorySink::default()).unwrap();
    let err = search.run(Mode::AvFuzzer).unwrap_err();
    assert!(matches!(err, SearchError::Fitness { expected: 2, got: 1 }));
}

#[test]
fn invalid_config_rejected() {
    let config = small_config(8).with_population(1);
    let err = SearchAlgorithm::new(config, synthetic, MemorySink::default()).unwrap_err();
    assert!(matches!(err, SearchError::Config(_)));
}

#[test]
fn logging_does_not_disturb_search() {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = small_config(9).with_iteration(2);
    let mut search = SearchAlgorithm::new(config, synthetic, MemorySink::default()).unwrap();
    assert!(search.run(Mode::Primary).is_ok());
}
