// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*!
`scenario_ga` is a search-based generator of driving-simulation test scenarios.

A scenario is a [`TestCase`]: a straight-line program that builds a chain of
road segments (optionally reshaped by contract, expand, merge or split
actions), places an ego vehicle and NPCs on them and gives the NPCs timed
maneuvers. A [`TestFactory`] produces random scenarios that respect the lane
topology of neighbouring roads, and [`SearchAlgorithm`] evolves populations of
them against an external [`Simulator`], either with NSGA-II over a fitness
vector or with an AVFuzzer-style single-objective loop.

```no_run
use scenario_ga::{Chromosome, Config, MemorySink, Mode, SearchAlgorithm, SimulatorError};

let simulator = |c: &Chromosome, _mode: Mode| -> Result<Vec<f64>, SimulatorError> {
    // Run the scenario in a simulator and score it; lower is better.
    Ok(vec![1.0, c.complexity(), 1.0, 1.0])
};
let config = Config::default().with_population(10).with_iteration(3);
let mut search = SearchAlgorithm::new(config, simulator, MemorySink::default())?;
let outcome = search.run(Mode::Primary)?;
println!("{}", outcome.best.render());
# Ok::<(), scenario_ga::SearchError>(())
```

The library logs through the [`log`](https://docs.rs/log) facade and never
installs a logger itself.
*/

mod catalog;
mod chromosome;
mod config;
mod crossover;
mod factory;
mod math;
mod polynomial;
mod rand;
mod range;
mod render;
mod search;
mod selection;
mod spawn;
mod statement;
mod survival;
mod testcase;
#[cfg(test)]
mod tests;
mod topology;

pub use catalog::*;
pub use chromosome::*;
pub use config::*;
pub use crossover::*;
pub use factory::*;
pub use polynomial::*;
pub use rand::*;
pub use range::*;
pub use render::*;
pub use search::*;
pub use selection::*;
pub use spawn::*;
pub use statement::*;
pub use survival::*;
pub use testcase::*;
pub use topology::*;
