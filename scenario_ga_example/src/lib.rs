// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Toy longitudinal simulator for driving `scenario_ga` searches end to end.

use scenario_ga::{Chromosome, Maneuver, Mode, Simulator, SimulatorError, VehicleArgs, VehicleId};

const VEHICLE_LENGTH: f64 = 4.5;
const GAP_CAP: f64 = 100.0;

/// Integrates vehicle speeds along their roads and scores the closest
/// approach between the ego and any NPC sharing its road.
#[derive(Debug, Clone, Copy)]
pub struct KinematicSimulator {
    /// Simulated time.
    pub duration: f64,
    /// Integration step.
    pub step: f64,
}

impl Default for KinematicSimulator {
    fn default() -> Self {
        Self {
            duration: 10.0,
            step: 0.1,
        }
    }
}

struct Track<'a> {
    args: &'a VehicleArgs,
    maneuvers: Vec<&'a Maneuver>,
    s: f64,
    t: f64,
    speed: f64,
}

impl Track<'_> {
    fn advance(&mut self, now: f64, dt: f64) {
        for m in &self.maneuvers {
            match **m {
                Maneuver::Speed {
                    target_speed,
                    rate,
                    trigger_time,
                } if now >= trigger_time => {
                    let delta = (target_speed - self.speed).clamp(-rate * dt, rate * dt);
                    self.speed += delta;
                }
                Maneuver::LaneChange {
                    relative_target_lane,
                    lane_change_time,
                    trigger_time,
                    ..
                } if now >= trigger_time && now < trigger_time + lane_change_time => {
                    self.t += relative_target_lane as f64 * dt / lane_change_time;
                }
                Maneuver::LaneOffset {
                    offset_distance,
                    trigger_time,
                    ..
                } if now >= trigger_time => {
                    self.t += offset_distance.signum() * dt;
                }
                _ => {}
            }
        }
        self.s += self.speed * dt;
    }
}

impl KinematicSimulator {
    fn closest_gap(&self, chromosome: &Chromosome) -> Result<f64, SimulatorError> {
        let tc = chromosome.test_case();
        let ego = tc
            .ego()
            .ok_or_else(|| SimulatorError::new("scenario has no ego vehicle"))?;
        let mut tracks: Vec<Track<'_>> = tc
            .vehicles()
            .filter(|(id, v)| id.is_npc() && v.road_id == ego.road_id)
            .map(|(id, args)| Track {
                args,
                maneuvers: tc.actions_of(id),
                s: args.init_s,
                t: args.init_t,
                speed: args.init_speed,
            })
            .collect();
        let mut ego_track = Track {
            args: ego,
            maneuvers: tc.actions_of(VehicleId::Ego),
            s: ego.init_s,
            t: ego.init_t,
            speed: ego.init_speed,
        };

        let mut gap = GAP_CAP;
        let mut now = 0.0;
        while now < self.duration {
            ego_track.advance(now, self.step);
            for track in &mut tracks {
                track.advance(now, self.step);
                // Lateral separation of a lane width keeps the two apart.
                if (track.t - ego_track.t).abs() < 2.0 {
                    gap = gap.min((track.s - ego_track.s).abs());
                }
            }
            now += self.step;
        }
        log::trace!(
            "ego on road {} closest gap {gap:.2} over {} NPCs",
            ego_track.args.road_id,
            tracks.len()
        );
        Ok(gap)
    }
}

impl Simulator for KinematicSimulator {
    fn evaluate(&self, chromosome: &Chromosome, mode: Mode) -> Result<Vec<f64>, SimulatorError> {
        let gap = self.closest_gap(chromosome)?;
        let collision = if gap < VEHICLE_LENGTH { 0.0 } else { 1.0 };
        Ok(match mode {
            Mode::Primary => {
                let roads = chromosome.test_case().road_size() as f64;
                vec![collision, gap, 1.0 / roads, chromosome.complexity()]
            }
            Mode::AvFuzzer => vec![collision, gap],
        })
    }
}

#[cfg(test)]
mod tests {
    use chaos_theory::{check, make};
    use scenario_ga::{
        Chromosome, Config, MemorySink, Mode, RoadArgs, SearchAlgorithm, Simulator as _, TestCase,
        VehicleArgs, WriterSink,
    };

    use crate::{GAP_CAP, KinematicSimulator};

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn primary_search() {
        init_logging();
        let config = Config::default()
            .with_population(8)
            .with_iteration(5)
            .with_rng_seed(17);
        let sink = WriterSink::new(Vec::new(), Vec::new());
        let mut search = SearchAlgorithm::new(config, KinematicSimulator::default(), sink).unwrap();
        let outcome = search.run(Mode::Primary).unwrap();
        log::info!("best scenario:\n{}", outcome.best.render());

        let (metrics, results) = search.into_sink().into_inner().unwrap();
        let metrics = String::from_utf8(metrics).unwrap();
        let results = String::from_utf8(results).unwrap();
        let last = metrics.lines().last().unwrap();
        assert_eq!(
            last,
            format!(
                "{} {} {}",
                outcome.stats.collisions, outcome.stats.boundary_violations, outcome.stats.unique_bugs
            )
        );
        assert_eq!(results.lines().filter(|l| l.starts_with("{iteration: ")).count(), 5);
    }

    #[test]
    fn avfuzzer_search() {
        init_logging();
        let config = Config::default()
            .with_population(6)
            .with_iteration(8)
            .with_rng_seed(23);
        let mut search =
            SearchAlgorithm::new(config, KinematicSimulator::default(), MemorySink::default())
                .unwrap();
        let outcome = search.run(Mode::AvFuzzer).unwrap();
        log::info!("best scenario:\n{}", outcome.best.render());
        assert_eq!(outcome.history.len(), 8);
        assert!(outcome.best.fitness()[0] <= GAP_CAP);
    }

    #[test]
    fn constant_speeds_keep_initial_gap() {
        check(|src| {
            let mut tc = TestCase::new();
            tc.push_road(
                RoadArgs {
                    curv_start: 0.0,
                    curv_end: 0.0,
                    length: 200.0,
                    lane_num: 2,
                    lane_width: 3.5,
                },
                None,
            );
            let ego_s = src.any_of("ego_s", make::float_in_range(0.0..=200.0));
            let npc_s = src.any_of("npc_s", make::float_in_range(0.0..=200.0));
            for init_s in [ego_s, npc_s] {
                tc.push_vehicle(VehicleArgs {
                    road_id: 0,
                    init_s,
                    init_t: -1.75,
                    init_speed: 5.0,
                });
            }
            let c = Chromosome::new(tc);
            let fitness = KinematicSimulator::default()
                .evaluate(&c, Mode::AvFuzzer)
                .unwrap();
            let expected = (npc_s - ego_s).abs().min(GAP_CAP);
            assert!((fitness[1] - expected).abs() < 1e-6);
            assert_eq!(fitness[0] == 0.0, fitness[1] < 4.5);
        });
    }

    #[test]
    fn missing_ego_is_an_error() {
        let c = Chromosome::new(TestCase::new());
        assert!(KinematicSimulator::default().evaluate(&c, Mode::Primary).is_err());
    }
}
