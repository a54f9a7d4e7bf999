// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::fmt::{Debug, Display};
use std::sync::Once;

use crate::{
    range::Bounds,
    rand::{DefaultRand, random_seed},
};

const VAR_PREFIX: &str = "SCENARIO_GA_";

const SEED_VAR: &str = "SCENARIO_GA_SEED";
const POPULATION_VAR: &str = "SCENARIO_GA_POPULATION";
const ITERATION_VAR: &str = "SCENARIO_GA_ITERATION";
const ELITE_VAR: &str = "SCENARIO_GA_ELITE";
const TOURNAMENT_SIZE_VAR: &str = "SCENARIO_GA_TOURNAMENT_SIZE";
const CROSSOVER_RATE_VAR: &str = "SCENARIO_GA_CROSSOVER_RATE";
const AVFUZZER_MUTATION_RATE_VAR: &str = "SCENARIO_GA_AVFUZZER_MUTATION_RATE";
const EVAL_THREADS_VAR: &str = "SCENARIO_GA_EVAL_THREADS";

const KNOWN_CONFIG_VARS: &[&str] = &[
    SEED_VAR,
    POPULATION_VAR,
    ITERATION_VAR,
    ELITE_VAR,
    TOURNAMENT_SIZE_VAR,
    CROSSOVER_RATE_VAR,
    AVFUZZER_MUTATION_RATE_VAR,
    EVAL_THREADS_VAR,
];

/// Value ranges of every named scenario parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    /// Road curvature at the start of the segment.
    pub curv_start: Bounds<f64>,
    /// Road curvature at the end of the segment.
    pub curv_end: Bounds<f64>,
    /// Road segment length.
    pub length: Bounds<f64>,
    /// Lane count of a road segment (inclusive).
    pub lane_num: Bounds<i64>,
    /// Width of a single lane.
    pub lane_width: Bounds<f64>,
    /// Longitudinal spawn offset.
    pub init_s: Bounds<f64>,
    /// Lateral spawn offset.
    pub init_t: Bounds<f64>,
    /// Initial vehicle speed.
    pub init_speed: Bounds<f64>,
    /// Minimum spawn distance between an NPC and the ego.
    pub min_d_to_ego: f64,
    /// Maximum spawn distance between an NPC and the ego.
    pub max_d_to_ego: f64,
    /// Action trigger time.
    pub trigger_time: Bounds<f64>,
    /// Target speed of a speed action.
    pub target_speed: Bounds<f64>,
    /// Acceleration rate of a speed action.
    pub rate: Bounds<f64>,
    /// Relative lane of a lane change (only the extremes are used).
    pub relative_target_lane: Bounds<i64>,
    /// Lateral offset within the target lane.
    pub target_lane_offset: Bounds<f64>,
    /// Duration of a lane change.
    pub lane_change_time: Bounds<f64>,
    /// Lateral distance of a lane offset action.
    pub offset_distance: Bounds<f64>,
    /// Maximum lateral acceleration of a lane offset action.
    pub max_lateral_acc: Bounds<f64>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            curv_start: Bounds::new(-0.02, 0.02),
            curv_end: Bounds::new(-0.02, 0.02),
            length: Bounds::new(50.0, 100.0),
            lane_num: Bounds::new(2, 4),
            lane_width: Bounds::new(3.0, 4.0),
            init_s: Bounds::new(100.0, 200.0),
            init_t: Bounds::new(-10.0, -0.1),
            init_speed: Bounds::new(0.0, 15.0),
            min_d_to_ego: 20.0,
            max_d_to_ego: 50.0,
            trigger_time: Bounds::new(0.0, 10.0),
            target_speed: Bounds::new(0.0, 20.0),
            rate: Bounds::new(0.0, 5.0),
            relative_target_lane: Bounds::new(-1, 1),
            target_lane_offset: Bounds::new(-0.5, 0.5),
            lane_change_time: Bounds::new(3.0, 6.0),
            offset_distance: Bounds::new(-1.5, 1.5),
            max_lateral_acc: Bounds::new(0.0, 1.0),
        }
    }
}

impl ScenarioConfig {
    /// Look up the range of a parameter by its catalog name.
    #[must_use]
    pub fn range(&self, name: &str) -> Option<Bounds<f64>> {
        let r = match name {
            "curv_start" => self.curv_start,
            "curv_end" => self.curv_end,
            "length" => self.length,
            "lane_num" => self.lane_num.to_f64(),
            "lane_width" => self.lane_width,
            "init_s" => self.init_s,
            "init_t" => self.init_t,
            "init_speed" => self.init_speed,
            "trigger_time" => self.trigger_time,
            "target_speed" => self.target_speed,
            "rate" => self.rate,
            "relative_target_lane" => self.relative_target_lane.to_f64(),
            "target_lane_offset" => self.target_lane_offset,
            "lane_change_time" => self.lane_change_time,
            "offset_distance" => self.offset_distance,
            "max_lateral_acc" => self.max_lateral_acc,
            _ => return None,
        };
        Some(r)
    }

    fn validate(&self) -> Result<(), &'static str> {
        let floats = [
            self.curv_start,
            self.curv_end,
            self.length,
            self.lane_width,
            self.init_s,
            self.init_t,
            self.init_speed,
            self.trigger_time,
            self.target_speed,
            self.rate,
            self.target_lane_offset,
            self.lane_change_time,
            self.offset_distance,
            self.max_lateral_acc,
        ];
        if !floats.iter().all(Bounds::is_valid) {
            return Err("inverted scenario parameter range");
        }
        if !self.lane_num.is_valid() || !self.relative_target_lane.is_valid() {
            return Err("inverted integer scenario parameter range");
        }
        if self.lane_num.min < 1 {
            return Err("roads need at least one lane");
        }
        if self.length.min <= 0.0 || self.lane_width.min <= 0.0 {
            return Err("road length and lane width must be positive");
        }
        if !self.min_d_to_ego.is_finite()
            || !self.max_d_to_ego.is_finite()
            || self.min_d_to_ego <= 0.0
            || self.min_d_to_ego > self.max_d_to_ego
        {
            return Err("NPC distances to the ego must satisfy 0 < min <= max");
        }
        Ok(())
    }
}

/// Genetic algorithm control parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GaConfig {
    /// Minimum number of road segments per test case.
    pub min_road_num: usize,
    /// Maximum number of road segments per test case.
    pub max_road_num: usize,
    /// Probability of attaching a shape-change action to a generated road.
    pub shape_change_prob: f64,
    /// Maximum number of vehicles (ego included) per test case.
    pub max_vehicle_num: usize,
    /// Minimum number of NPC actions in a generated test case.
    pub min_action_length: usize,
    /// Maximum number of NPC actions in a generated test case.
    pub max_action_length: usize,
    /// Maximum total statement count.
    pub max_testcase_size: usize,
    /// Minimum total statement count.
    pub min_testcase_size: usize,
    /// Tournament size for parent selection.
    pub tournament_size: usize,
    /// Probability of the mutation delete pass.
    pub test_delete_probability: f64,
    /// Probability of the mutation change pass.
    pub test_change_probability: f64,
    /// Probability of the mutation insert pass.
    pub test_insert_probability: f64,
    /// Polynomial mutation distribution index (eta).
    pub polynomial_distribution: f64,
    /// Per-coordinate polynomial mutation probability.
    pub polynomial_prob: f64,
    /// Mutation probability in AVFuzzer mode.
    pub avfuzzer_mutation_rate: f64,
    /// Crossover probability.
    pub crossover_rate: f64,
    /// Crossover probability in AVFuzzer mode.
    pub avfuzzer_crossover_rate: f64,
    /// Number of generations.
    pub iteration: usize,
    /// Number of individuals carried over by [`elitism`](crate::SearchAlgorithm::elitism).
    pub elite: usize,
    /// Inject elites into every offspring generation.
    pub use_elitism: bool,
    /// Population size.
    pub population: usize,
    /// Number of threads used to evaluate one generation.
    pub eval_threads: usize,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            min_road_num: 2,
            max_road_num: 4,
            shape_change_prob: 1.0,
            max_vehicle_num: 6,
            min_action_length: 5,
            max_action_length: 20,
            max_testcase_size: 30,
            min_testcase_size: 8,
            tournament_size: 5,
            test_delete_probability: 1.0 / 3.0,
            test_change_probability: 1.0 / 3.0,
            test_insert_probability: 1.0 / 3.0,
            polynomial_distribution: 5.0,
            polynomial_prob: 0.5,
            avfuzzer_mutation_rate: 0.4,
            crossover_rate: 0.8,
            avfuzzer_crossover_rate: 0.4,
            iteration: 20,
            elite: 2,
            use_elitism: false,
            population: 40,
            eval_threads: 1,
        }
    }
}

impl GaConfig {
    fn validate(&self) -> Result<(), &'static str> {
        if self.min_road_num == 0 || self.min_road_num > self.max_road_num {
            return Err("invalid road count bounds");
        }
        if self.min_testcase_size > self.max_testcase_size {
            return Err("invalid test case size bounds");
        }
        if self.min_action_length > self.max_action_length {
            return Err("invalid action length bounds");
        }
        if self.max_vehicle_num < 2 {
            return Err("need room for the ego and at least one NPC");
        }
        // Smallest generated test case: roads, ego, one NPC, minimum actions.
        if self.min_road_num + 2 + self.min_action_length > self.max_testcase_size {
            return Err("maximum test case size too small for generated test cases");
        }
        if self.population < 2 {
            return Err("population must be at least 2");
        }
        if self.tournament_size == 0 {
            return Err("tournament size must be positive");
        }
        if self.eval_threads == 0 {
            return Err("need at least one evaluation thread");
        }
        if self.polynomial_distribution < 0.0 {
            return Err("polynomial distribution index must be non-negative");
        }
        let probs = [
            self.shape_change_prob,
            self.test_delete_probability,
            self.test_change_probability,
            self.test_insert_probability,
            self.polynomial_prob,
            self.avfuzzer_mutation_rate,
            self.crossover_rate,
            self.avfuzzer_crossover_rate,
        ];
        if !probs.iter().all(|p| (0.0..=1.0).contains(p)) {
            return Err("probability out of [0, 1]");
        }
        Ok(())
    }
}

/// Immutable configuration handle passed to every component.
///
/// Create with [`Config::default`], customize with the `with_*` methods and
/// optionally [`Config::with_env_overrides`].
#[must_use]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Scenario parameter ranges.
    pub scenario: ScenarioConfig,
    /// Genetic algorithm parameters.
    pub ga: GaConfig,
    seed: Option<u64>,
}

impl Config {
    /// Override the random seed.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Override the population size.
    pub fn with_population(mut self, population: usize) -> Self {
        self.ga.population = population;
        self
    }

    /// Override the number of generations.
    pub fn with_iteration(mut self, iteration: usize) -> Self {
        self.ga.iteration = iteration;
        self
    }

    /// Override the elite count.
    pub fn with_elite(mut self, elite: usize, enabled: bool) -> Self {
        self.ga.elite = elite;
        self.ga.use_elitism = enabled;
        self
    }

    /// Override the tournament size.
    pub fn with_tournament_size(mut self, tournament_size: usize) -> Self {
        self.ga.tournament_size = tournament_size;
        self
    }

    /// Override the crossover rate.
    pub fn with_crossover_rate(mut self, rate: f64) -> Self {
        self.ga.crossover_rate = rate;
        self
    }

    /// Override the insert/change/delete pass probabilities.
    pub fn with_mutation_probabilities(mut self, insert: f64, change: f64, delete: f64) -> Self {
        self.ga.test_insert_probability = insert;
        self.ga.test_change_probability = change;
        self.ga.test_delete_probability = delete;
        self
    }

    /// Override the number of evaluation threads.
    pub fn with_eval_threads(mut self, threads: usize) -> Self {
        self.ga.eval_threads = threads;
        self
    }

    /// Override the scenario parameter ranges.
    pub fn with_scenario(mut self, scenario: ScenarioConfig) -> Self {
        self.scenario = scenario;
        self
    }

    /// Apply overrides from the environment. Values set explicitly with
    /// `with_*` before this call are replaced by the environment ones.
    ///
    /// Recognized variables:
    /// - `SCENARIO_GA_SEED`,
    /// - `SCENARIO_GA_POPULATION`,
    /// - `SCENARIO_GA_ITERATION`,
    /// - `SCENARIO_GA_ELITE`,
    /// - `SCENARIO_GA_TOURNAMENT_SIZE`,
    /// - `SCENARIO_GA_CROSSOVER_RATE`,
    /// - `SCENARIO_GA_AVFUZZER_MUTATION_RATE`,
    /// - `SCENARIO_GA_EVAL_THREADS`.
    pub fn with_env_overrides(mut self) -> Self {
        static CHECK_ENV_ONCE: Once = Once::new();
        CHECK_ENV_ONCE.call_once(|| {
            for (var, _) in std::env::vars_os() {
                if let Some(var) = var.to_str()
                    && var.starts_with(VAR_PREFIX)
                    && !KNOWN_CONFIG_VARS.contains(&var)
                {
                    log::warn!("unknown environment variable {var}, ignoring");
                }
            }
        });

        self.seed = param_fallback(SEED_VAR, self.seed, |s| s.parse::<u64>().map(Some));
        let ga = &mut self.ga;
        ga.population = param_fallback(POPULATION_VAR, ga.population, parse_usize);
        ga.iteration = param_fallback(ITERATION_VAR, ga.iteration, parse_usize);
        ga.elite = param_fallback(ELITE_VAR, ga.elite, parse_usize);
        ga.tournament_size = param_fallback(TOURNAMENT_SIZE_VAR, ga.tournament_size, parse_usize);
        ga.crossover_rate = param_fallback(CROSSOVER_RATE_VAR, ga.crossover_rate, str::parse);
        ga.avfuzzer_mutation_rate = param_fallback(
            AVFUZZER_MUTATION_RATE_VAR,
            ga.avfuzzer_mutation_rate,
            str::parse,
        );
        ga.eval_threads = param_fallback(EVAL_THREADS_VAR, ga.eval_threads, parse_usize);
        self
    }

    /// Seed override, if any.
    #[must_use]
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Random source seeded with the configured seed, or a random one.
    #[must_use]
    pub fn rng(&self) -> DefaultRand {
        DefaultRand::new(self.seed.unwrap_or_else(random_seed))
    }

    /// Check internal consistency of the configuration.
    ///
    /// # Errors
    ///
    /// `validate` fails on inverted ranges and contradictory size bounds.
    pub fn validate(&self) -> Result<(), &'static str> {
        self.scenario.validate()?;
        self.ga.validate()
    }
}

fn parse_usize(s: &str) -> Result<usize, core::num::ParseIntError> {
    let mut s = s.to_owned();
    s.retain(|c| c != '_');
    s.parse()
}

// Debug bound on T should really be a Display one.
fn param_fallback<T: Debug, E: Display>(
    name: &'static str,
    default_: T,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> T {
    let s = std::env::var(name).unwrap_or_default();
    if s.is_empty() {
        return default_;
    }
    parse(&s).unwrap_or_else(|e| {
        log::warn!("failed to parse {name} value {s:?}, using default {default_:?} ({e})");
        default_
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn validate_rejects() {
        let mut c = Config::default();
        c.scenario.length = Bounds::new(10.0, 5.0);
        assert!(c.validate().is_err());

        let c = Config::default().with_population(1);
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.ga.min_road_num = 5;
        assert!(c.validate().is_err());

        let c = Config::default().with_crossover_rate(1.5);
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.scenario.min_d_to_ego = 60.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn range_lookup() {
        let s = ScenarioConfig::default();
        assert_eq!(s.range("lane_num"), Some(Bounds::new(2.0, 4.0)));
        assert_eq!(s.range("rate"), Some(Bounds::new(0.0, 5.0)));
        assert_eq!(s.range("no_such_param"), None);
    }

    #[test]
    fn builder_overrides() {
        let c = Config::default()
            .with_rng_seed(42)
            .with_population(10)
            .with_iteration(3)
            .with_elite(4, true);
        assert_eq!(c.seed(), Some(42));
        assert_eq!(c.ga.population, 10);
        assert_eq!(c.ga.iteration, 3);
        assert!(c.ga.use_elitism);
        assert_eq!(c.rng(), DefaultRand::new(42));
    }

    #[test]
    fn parse_usize_underscores() {
        assert_eq!(parse_usize("1_000").unwrap(), 1000);
        assert!(parse_usize("x").is_err());
    }
}
