// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::fmt::{self, Display};
use std::io;

use crate::{
    catalog::CatalogError,
    chromosome::{Chromosome, Mode},
    config::Config,
    crossover::{avfuzzer_crossover, crossover},
    factory::{FactoryError, TestFactory},
    rand::DefaultRand,
    render::similarity_ratio,
    selection::TournamentSelection,
    survival::survivors,
};

// An NPC collision counts as a bug below this distance score.
const NPC_COLLISION_DISTANCE: f64 = 6.0;
// Lane-keeping scores below this are boundary violations.
const BOUNDARY_THRESHOLD: f64 = 0.89;
// Bugs whose scenario texts are more similar than this are the same bug.
const UNIQUE_BUG_SIMILARITY: f64 = 0.8;
// Minimum fitness vector length in either mode.
const MIN_FITNESS_LEN: usize = 2;
// AVFuzzer restarts when the best has not beaten the mean of this many generations.
const AVFUZZER_RESTART_WINDOW: usize = 5;
// Primary mode restarts only after this many generations.
const PRIMARY_RESTART_AFTER: usize = 2;

/// External evaluator of scenarios.
///
/// The returned vector is minimized. In [`Mode::Primary`] its first element
/// is zero for an NPC collision, the second is the distance score of that
/// collision and the last but one is the lane-keeping score. In
/// [`Mode::AvFuzzer`] the second element is the scalar fitness.
///
/// Evaluations of one generation may run concurrently.
pub trait Simulator: Sync {
    /// Run one scenario.
    ///
    /// # Errors
    ///
    /// Failures are not retried and abort the search.
    fn evaluate(&self, chromosome: &Chromosome, mode: Mode) -> Result<Vec<f64>, SimulatorError>;
}

impl<F> Simulator for F
where
    F: Fn(&Chromosome, Mode) -> Result<Vec<f64>, SimulatorError> + Sync,
{
    fn evaluate(&self, chromosome: &Chromosome, mode: Mode) -> Result<Vec<f64>, SimulatorError> {
        self(chromosome, mode)
    }
}

/// Failed simulator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatorError {
    message: String,
}

impl SimulatorError {
    /// Error with a human-readable reason.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for SimulatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "simulation failed: {}", self.message)
    }
}

impl core::error::Error for SimulatorError {}

/// Reason a search could not run to completion.
#[derive(Debug)]
pub enum SearchError {
    /// Invalid configuration.
    Config(&'static str),
    /// Capability catalog does not fit the statement model.
    Catalog(CatalogError),
    /// Simulator failure; the generation being evaluated is lost.
    Simulator(SimulatorError),
    /// Simulator returned a fitness vector that is too short.
    Fitness {
        /// Minimum length.
        expected: usize,
        /// Returned length.
        got: usize,
    },
    /// Result sink failure.
    Sink(io::Error),
}

impl Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid configuration: {e}"),
            Self::Catalog(e) => write!(f, "invalid catalog: {e}"),
            Self::Simulator(e) => e.fmt(f),
            Self::Fitness { expected, got } => {
                write!(f, "fitness vector has {got} elements, need at least {expected}")
            }
            Self::Sink(e) => write!(f, "failed to record results: {e}"),
        }
    }
}

impl core::error::Error for SearchError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Config(_) | Self::Fitness { .. } => None,
            Self::Catalog(e) => Some(e),
            Self::Simulator(e) => Some(e),
            Self::Sink(e) => Some(e),
        }
    }
}

impl From<FactoryError> for SearchError {
    fn from(e: FactoryError) -> Self {
        match e {
            FactoryError::Config(e) => Self::Config(e),
            FactoryError::Catalog(e) => Self::Catalog(e),
        }
    }
}

impl From<CatalogError> for SearchError {
    fn from(e: CatalogError) -> Self {
        Self::Catalog(e)
    }
}

impl From<SimulatorError> for SearchError {
    fn from(e: SimulatorError) -> Self {
        Self::Simulator(e)
    }
}

impl From<io::Error> for SearchError {
    fn from(e: io::Error) -> Self {
        Self::Sink(e)
    }
}

/// Running bug counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BugStats {
    /// Evaluations that ended in an NPC collision.
    pub collisions: usize,
    /// Evaluations that left the road boundary.
    pub boundary_violations: usize,
    /// Distinct NPC collisions.
    pub unique_bugs: usize,
    /// Unique bug count at the end of every generation.
    pub unique_bug_history: Vec<usize>,
}

/// Classifies evaluation results and de-duplicates collisions by scenario text.
#[derive(Debug, Clone, Default)]
pub struct BugTracker {
    stats: BugStats,
    bugs: Vec<String>,
}

impl BugTracker {
    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> &BugStats {
        &self.stats
    }

    /// Scenario texts of the distinct collisions, in discovery order.
    #[must_use]
    pub fn unique_bugs(&self) -> &[String] {
        &self.bugs
    }

    /// Account for one raw fitness vector. Returns `true` if it is a new
    /// unique bug.
    pub fn record(&mut self, fitness: &[f64], scenario: &str, mode: Mode) -> bool {
        let mut unique = false;
        if let [flag, distance, ..] = *fitness
            && flag == 0.0
            && distance < NPC_COLLISION_DISTANCE
        {
            self.stats.collisions += 1;
            unique = self
                .bugs
                .iter()
                .all(|bug| similarity_ratio(bug, scenario) <= UNIQUE_BUG_SIMILARITY);
            if unique {
                self.bugs.push(scenario.to_owned());
                self.stats.unique_bugs = self.bugs.len();
            }
        }
        if mode == Mode::Primary
            && let Some(&lane) = fitness.len().checked_sub(2).and_then(|i| fitness.get(i))
            && lane < BOUNDARY_THRESHOLD
        {
            self.stats.boundary_violations += 1;
        }
        unique
    }

    fn end_generation(&mut self) {
        self.stats.unique_bug_history.push(self.bugs.len());
    }
}

/// Append-only record of a search.
pub trait ResultSink {
    /// Counters after one evaluation.
    ///
    /// # Errors
    ///
    /// I/O failures abort the search.
    fn record_metric(&mut self, stats: &BugStats) -> io::Result<()>;

    /// Raw fitness and scenario text of one evaluation.
    ///
    /// # Errors
    ///
    /// I/O failures abort the search.
    fn record_result(&mut self, fitness: &[f64], scenario: &str) -> io::Result<()>;

    /// Best individual at the end of a generation.
    ///
    /// # Errors
    ///
    /// I/O failures abort the search.
    fn record_best(&mut self, iteration: usize, fitness: &[f64], scenario: &str) -> io::Result<()>;
}

/// In-memory [`ResultSink`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySink {
    /// `(collisions, boundary violations, unique bugs)` after every evaluation.
    pub metrics: Vec<(usize, usize, usize)>,
    /// Raw fitness and scenario of every evaluation.
    pub results: Vec<(Vec<f64>, String)>,
    /// Generation, fitness and scenario of every generation's best.
    pub best: Vec<(usize, Vec<f64>, String)>,
}

impl ResultSink for MemorySink {
    fn record_metric(&mut self, stats: &BugStats) -> io::Result<()> {
        self.metrics
            .push((stats.collisions, stats.boundary_violations, stats.unique_bugs));
        Ok(())
    }

    fn record_result(&mut self, fitness: &[f64], scenario: &str) -> io::Result<()> {
        self.results.push((fitness.to_vec(), scenario.to_owned()));
        Ok(())
    }

    fn record_best(&mut self, iteration: usize, fitness: &[f64], scenario: &str) -> io::Result<()> {
        self.best.push((iteration, fitness.to_vec(), scenario.to_owned()));
        Ok(())
    }
}

/// [`ResultSink`] writing text lines: `collisions boundary unique` to the
/// metric stream, `{fitness: [...], scenario: "..."}` to the result stream.
#[derive(Debug)]
pub struct WriterSink<M, R> {
    metrics: M,
    results: R,
}

impl<M: io::Write, R: io::Write> WriterSink<M, R> {
    /// Sink over a metric and a result stream.
    #[must_use]
    pub fn new(metrics: M, results: R) -> Self {
        Self { metrics, results }
    }

    /// Flush and return the streams.
    ///
    /// # Errors
    ///
    /// `into_inner` fails if flushing does.
    pub fn into_inner(mut self) -> io::Result<(M, R)> {
        self.metrics.flush()?;
        self.results.flush()?;
        Ok((self.metrics, self.results))
    }
}

impl<M: io::Write, R: io::Write> ResultSink for WriterSink<M, R> {
    fn record_metric(&mut self, stats: &BugStats) -> io::Result<()> {
        writeln!(
            self.metrics,
            "{} {} {}",
            stats.collisions, stats.boundary_violations, stats.unique_bugs
        )
    }

    fn record_result(&mut self, fitness: &[f64], scenario: &str) -> io::Result<()> {
        writeln!(self.results, "{{fitness: {fitness:?}, scenario: {scenario:?}}}")
    }

    fn record_best(&mut self, iteration: usize, fitness: &[f64], scenario: &str) -> io::Result<()> {
        writeln!(
            self.results,
            "{{iteration: {iteration}, fitness: {fitness:?}, scenario: {scenario:?}}}"
        )
    }
}

/// Where a search currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Generating the first population.
    Init,
    /// Running the simulator.
    Evaluating,
    /// Truncating to the population size.
    Surviving,
    /// Building offspring.
    Evolving,
    /// Replacing a stagnant population.
    Restarting,
    /// AVFuzzer intensification around the best individual.
    LocalFuzz,
    /// Done.
    Terminated,
}

/// Result of a finished search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Best individual of the final population.
    pub best: Chromosome,
    /// Bug counters.
    pub stats: BugStats,
    /// Fitness of the best individual at the end of every generation.
    pub history: Vec<Vec<f64>>,
}

/// Genetic search driving a [`Simulator`].
pub struct SearchAlgorithm<S, K = MemorySink> {
    factory: TestFactory,
    simulator: S,
    sink: K,
    selection: TournamentSelection,
    rng: DefaultRand,
    population: Vec<Chromosome>,
    tracker: BugTracker,
    history: Vec<Vec<f64>>,
    iteration: usize,
    phase: Phase,
    avfuzzer_best: f64,
}

impl<S, K: fmt::Debug> fmt::Debug for SearchAlgorithm<S, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchAlgorithm")
            .field("factory", &self.factory)
            .field("sink", &self.sink)
            .field("selection", &self.selection)
            .field("population", &self.population)
            .field("tracker", &self.tracker)
            .field("history", &self.history)
            .field("iteration", &self.iteration)
            .field("phase", &self.phase)
            .field("avfuzzer_best", &self.avfuzzer_best)
            .finish_non_exhaustive()
    }
}

impl<S: Simulator, K: ResultSink> SearchAlgorithm<S, K> {
    /// Search with the standard factory for `config`.
    ///
    /// # Errors
    ///
    /// `new` fails on an invalid configuration.
    pub fn new(config: Config, simulator: S, sink: K) -> Result<Self, SearchError> {
        Self::with_factory(TestFactory::new(config), simulator, sink)
    }

    /// Search with a custom factory (catalog or spatial sampler).
    ///
    /// # Errors
    ///
    /// `with_factory` fails if the factory does not validate.
    pub fn with_factory(factory: TestFactory, simulator: S, sink: K) -> Result<Self, SearchError> {
        factory.validate()?;
        let config = factory.config();
        let seed = config.seed().unwrap_or_else(crate::rand::random_seed);
        log::info!("scenario search seed: {seed}");
        let selection = TournamentSelection::new(config.ga.tournament_size);
        Ok(Self {
            factory,
            simulator,
            sink,
            selection,
            rng: DefaultRand::new(seed),
            population: Vec::new(),
            tracker: BugTracker::default(),
            history: Vec::new(),
            iteration: 0,
            phase: Phase::Init,
            avfuzzer_best: f64::INFINITY,
        })
    }

    /// Test factory in use.
    #[must_use]
    pub fn factory(&self) -> &TestFactory {
        &self.factory
    }

    /// Current population.
    #[must_use]
    pub fn population(&self) -> &[Chromosome] {
        &self.population
    }

    /// Completed generations.
    #[must_use]
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Bug counters so far.
    #[must_use]
    pub fn stats(&self) -> &BugStats {
        self.tracker.stats()
    }

    /// Bug tracker, with the texts of the distinct collisions.
    #[must_use]
    pub fn tracker(&self) -> &BugTracker {
        &self.tracker
    }

    /// Best fitness at the end of every generation.
    #[must_use]
    pub fn history(&self) -> &[Vec<f64>] {
        &self.history
    }

    /// Result sink.
    #[must_use]
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Give up the search and keep the result sink.
    pub fn into_sink(self) -> K {
        self.sink
    }

    fn enter(&mut self, phase: Phase) {
        log::trace!("{:?} -> {phase:?}", self.phase);
        self.phase = phase;
    }

    fn ga_population(&self) -> usize {
        self.factory.config().ga.population
    }

    fn ga_iteration(&self) -> usize {
        self.factory.config().ga.iteration
    }

    /// Run the search loop of `mode`.
    ///
    /// # Errors
    ///
    /// See [`SearchAlgorithm::generate_tests`].
    pub fn run(&mut self, mode: Mode) -> Result<SearchOutcome, SearchError> {
        match mode {
            Mode::Primary => self.generate_tests(),
            Mode::AvFuzzer => self.avfuzzer_generate_tests(),
        }
    }

    /// NSGA-II search. The population restarts from scratch whenever a
    /// generation finds no new unique bug.
    ///
    /// # Errors
    ///
    /// `generate_tests` fails on simulator, fitness shape or sink errors.
    pub fn generate_tests(&mut self) -> Result<SearchOutcome, SearchError> {
        self.enter(Phase::Init);
        let mut population = self.random_population();
        self.evaluate(&mut population, Mode::Primary)?;
        self.population = self.survive(population, self.ga_population());

        while self.iteration < self.ga_iteration() {
            log::info!("generation {} of {}", self.iteration + 1, self.ga_iteration());
            self.evolve()?;
            self.end_generation(Mode::Primary)?;

            let counts = &self.tracker.stats().unique_bug_history;
            if self.iteration > PRIMARY_RESTART_AFTER
                && let [.., prev, last] = counts[..]
                && prev == last
            {
                self.restart(Mode::Primary)?;
            }
            self.iteration += 1;
        }
        self.finish()
    }

    /// AVFuzzer search: single objective, restarts on stagnation and local
    /// fuzzing around every new best.
    ///
    /// # Errors
    ///
    /// See [`SearchAlgorithm::generate_tests`]; also fails if the catalog
    /// cannot describe the AVFuzzer roads.
    pub fn avfuzzer_generate_tests(&mut self) -> Result<SearchOutcome, SearchError> {
        self.enter(Phase::Init);
        let mut population = self.avfuzzer_random_population()?;
        self.evaluate(&mut population, Mode::AvFuzzer)?;
        sort_by_key(&mut population, Mode::AvFuzzer);
        self.population = population;

        while self.iteration < self.ga_iteration() {
            log::info!("AVFuzzer generation {} of {}", self.iteration + 1, self.ga_iteration());
            self.avfuzzer_evolve()?;
            self.iteration += 1;
            self.end_generation(Mode::AvFuzzer)?;

            let best = self.best_key(Mode::AvFuzzer);
            if self.iteration > AVFUZZER_RESTART_WINDOW {
                let recent = &self.history[self.history.len().saturating_sub(AVFUZZER_RESTART_WINDOW)..];
                let mean =
                    recent.iter().filter_map(|f| f.first()).sum::<f64>() / recent.len().max(1) as f64;
                if best >= mean {
                    self.restart(Mode::AvFuzzer)?;
                }
            }

            let best = self.best_key(Mode::AvFuzzer);
            if best < self.avfuzzer_best {
                self.avfuzzer_best = best;
                if self.iteration > 1 {
                    let local_best = self.local_fuzz()?;
                    let n = self.ga_population();
                    self.population.push(local_best);
                    sort_by_key(&mut self.population, Mode::AvFuzzer);
                    self.population.truncate(n);
                }
            }
        }
        self.finish()
    }

    /// Baseline without evolution: a fresh random population every
    /// generation. The outcome holds the best individual seen.
    ///
    /// # Errors
    ///
    /// See [`SearchAlgorithm::generate_tests`].
    pub fn random_generation(&mut self) -> Result<SearchOutcome, SearchError> {
        let mut best: Option<Chromosome> = None;
        while self.iteration < self.ga_iteration() {
            self.enter(Phase::Init);
            let mut population = self.random_population();
            self.evaluate(&mut population, Mode::Primary)?;
            sort_by_key(&mut population, Mode::Primary);
            self.population = population;
            if let Some(top) = self.population.first()
                && best
                    .as_ref()
                    .is_none_or(|b| top.selection_key(Mode::Primary) < b.selection_key(Mode::Primary))
            {
                best = Some(top.clone());
            }
            self.end_generation(Mode::Primary)?;
            self.iteration += 1;
        }
        self.enter(Phase::Terminated);
        let best = best.ok_or(SearchError::Config("no generation was run"))?;
        Ok(SearchOutcome {
            best,
            stats: self.tracker.stats().clone(),
            history: self.history.clone(),
        })
    }

    /// Clones of the `elite` best individuals of the current population.
    #[must_use]
    pub fn elitism(&self) -> Vec<Chromosome> {
        let elite = self.factory.config().ga.elite;
        self.population.iter().take(elite).cloned().collect()
    }

    fn random_population(&mut self) -> Vec<Chromosome> {
        let n = self.ga_population();
        (0..n)
            .map(|_| self.factory.generate_chromosome(&mut self.rng))
            .collect()
    }

    fn avfuzzer_random_population(&mut self) -> Result<Vec<Chromosome>, SearchError> {
        let n = self.ga_population();
        let mut population = Vec::with_capacity(n);
        for _ in 0..n {
            population.push(self.factory.generate_avfuzzer_chromosome(&mut self.rng)?);
        }
        Ok(population)
    }

    fn survive(&mut self, population: Vec<Chromosome>, capacity: usize) -> Vec<Chromosome> {
        self.enter(Phase::Surviving);
        survivors(population, capacity, &mut self.rng)
    }

    fn evolve(&mut self) -> Result<(), SearchError> {
        self.enter(Phase::Evolving);
        let n = self.ga_population();
        let elite = if self.factory.config().ga.use_elitism {
            self.elitism()
        } else {
            Vec::new()
        };
        let mut offspring = breed(
            &self.population,
            n,
            Mode::Primary,
            &self.factory,
            self.selection,
            &mut self.rng,
        );
        self.evaluate(&mut offspring, Mode::Primary)?;

        let mut merged = core::mem::take(&mut self.population);
        merged.append(&mut offspring);
        let mut next = elite;
        let kept = self.survive(merged, n.saturating_sub(next.len()));
        next.extend(kept);
        self.population = next;
        if let Some(best) = self.population.first() {
            log::info!("best individual: {:?}", best.fitness());
            log::debug!("best scenario:\n{}", best.render());
        }
        Ok(())
    }

    fn avfuzzer_evolve(&mut self) -> Result<(), SearchError> {
        self.enter(Phase::Evolving);
        let n = self.ga_population();
        let mut offspring = breed(
            &self.population,
            n,
            Mode::AvFuzzer,
            &self.factory,
            self.selection,
            &mut self.rng,
        );
        self.evaluate(&mut offspring, Mode::AvFuzzer)?;
        self.population.append(&mut offspring);
        sort_by_key(&mut self.population, Mode::AvFuzzer);
        self.population.truncate(n);
        Ok(())
    }

    // One generation confined to clones of the current best.
    fn local_fuzz(&mut self) -> Result<Chromosome, SearchError> {
        self.enter(Phase::LocalFuzz);
        log::info!("start local fuzz around {:?}", self.avfuzzer_best);
        let n = self.ga_population();
        let Some(seed) = self.population.first() else {
            return Err(SearchError::Config("empty population"));
        };
        let mut local = vec![seed.clone(); n];
        let mut offspring = breed(
            &local,
            n,
            Mode::AvFuzzer,
            &self.factory,
            self.selection,
            &mut self.rng,
        );
        self.evaluate(&mut offspring, Mode::AvFuzzer)?;
        local.append(&mut offspring);
        sort_by_key(&mut local, Mode::AvFuzzer);
        local.truncate(1);
        local
            .pop()
            .ok_or(SearchError::Config("empty local population"))
    }

    fn restart(&mut self, mode: Mode) -> Result<(), SearchError> {
        self.enter(Phase::Restarting);
        log::info!("restart after generation {}", self.iteration + 1);
        let mut population = match mode {
            Mode::Primary => self.random_population(),
            Mode::AvFuzzer => self.avfuzzer_random_population()?,
        };
        self.evaluate(&mut population, mode)?;
        self.population = match mode {
            Mode::Primary => self.survive(population, self.ga_population()),
            Mode::AvFuzzer => {
                sort_by_key(&mut population, mode);
                population
            }
        };
        Ok(())
    }

    fn best_key(&self, mode: Mode) -> f64 {
        self.population
            .first()
            .map_or(f64::INFINITY, |c| c.selection_key(mode))
    }

    fn end_generation(&mut self, mode: Mode) -> Result<(), SearchError> {
        self.tracker.end_generation();
        let Some(best) = self.population.first() else {
            return Ok(());
        };
        self.history.push(best.fitness().to_vec());
        self.sink
            .record_best(self.iteration, best.fitness(), &best.render())?;
        log::debug!(
            "{mode:?} generation {} done, {} unique bugs",
            self.iteration,
            self.tracker.stats().unique_bugs
        );
        Ok(())
    }

    fn finish(&mut self) -> Result<SearchOutcome, SearchError> {
        self.enter(Phase::Terminated);
        let best = self
            .population
            .first()
            .cloned()
            .ok_or(SearchError::Config("empty population"))?;
        Ok(SearchOutcome {
            best,
            stats: self.tracker.stats().clone(),
            history: self.history.clone(),
        })
    }

    /// Evaluate `population` and store the fitness of every member. In
    /// AVFuzzer mode the stored fitness is the scalar objective only.
    fn evaluate(&mut self, population: &mut [Chromosome], mode: Mode) -> Result<(), SearchError> {
        self.enter(Phase::Evaluating);
        let threads = self.factory.config().ga.eval_threads;
        let results = simulate(&self.simulator, population, mode, threads);
        for (chromosome, result) in population.iter_mut().zip(results) {
            let raw = result?;
            if raw.len() < MIN_FITNESS_LEN {
                return Err(SearchError::Fitness {
                    expected: MIN_FITNESS_LEN,
                    got: raw.len(),
                });
            }
            let scenario = chromosome.render();
            log::debug!("evaluated individual, fitness {raw:?}:\n{scenario}");
            if self.tracker.record(&raw, &scenario, mode) {
                log::info!(
                    "new unique bug #{}, fitness {raw:?}",
                    self.tracker.stats().unique_bugs
                );
            }
            self.sink.record_metric(self.tracker.stats())?;
            self.sink.record_result(&raw, &scenario)?;
            let fitness = match mode {
                Mode::Primary => raw,
                Mode::AvFuzzer => vec![raw[1]],
            };
            chromosome.set_fitness(fitness);
        }
        Ok(())
    }
}

// Results in population order; chunks run on scoped threads when asked to.
fn simulate<S: Simulator>(
    simulator: &S,
    population: &[Chromosome],
    mode: Mode,
    threads: usize,
) -> Vec<Result<Vec<f64>, SimulatorError>> {
    if threads <= 1 || population.len() < 2 {
        return population.iter().map(|c| simulator.evaluate(c, mode)).collect();
    }
    let chunk = population.len().div_ceil(threads);
    std::thread::scope(|s| {
        let handles: Vec<_> = population
            .chunks(chunk)
            .map(|part| {
                s.spawn(move || {
                    part.iter()
                        .map(|c| simulator.evaluate(c, mode))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    })
}

// At least `n` offspring bred from `parents` by tournament selection,
// crossover and mutation.
fn breed(
    parents: &[Chromosome],
    n: usize,
    mode: Mode,
    factory: &TestFactory,
    selection: TournamentSelection,
    rng: &mut DefaultRand,
) -> Vec<Chromosome> {
    let ga = factory.ga();
    let mut offspring = Vec::with_capacity(n + 1);
    while offspring.len() < n {
        let (Some(i), Some(j)) = (
            selection.select_index(parents, mode, rng),
            selection.select_index(parents, mode, rng),
        ) else {
            break;
        };
        let mut a = parents[i].clone();
        let mut b = parents[j].clone();
        log::trace!("parents {i} and {j}");
        match mode {
            Mode::Primary => {
                if rng.coinflip(ga.crossover_rate) {
                    crossover(&mut a, &mut b, factory, rng);
                }
                a.mutate(factory, rng);
                b.mutate(factory, rng);
            }
            Mode::AvFuzzer => {
                if rng.coinflip(ga.avfuzzer_crossover_rate) {
                    avfuzzer_crossover(&mut a, &mut b, rng);
                }
                for c in [&mut a, &mut b] {
                    if rng.coinflip(ga.avfuzzer_mutation_rate) {
                        c.avfuzzer_mutation(factory, rng);
                    }
                }
            }
        }
        offspring.push(a);
        offspring.push(b);
    }
    offspring
}

fn sort_by_key(population: &mut [Chromosome], mode: Mode) {
    population.sort_by(|a, b| a.selection_key(mode).total_cmp(&b.selection_key(mode)));
}
