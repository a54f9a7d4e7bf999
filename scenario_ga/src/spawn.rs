// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Spawn point sampling.

use crate::{
    config::ScenarioConfig,
    rand::DefaultRand,
    statement::{RoadShape, VehicleArgs},
    testcase::TestCase,
};

// Lateral margin from the road edges.
const EDGE_MARGIN: f64 = 1.0;
// Lateral offset of pattern NPCs from the outer road edge.
const PATTERN_LANE_OFFSET: f64 = 1.75;
const PATTERN_PROB: f64 = 0.5;
const AHEAD_PROB: f64 = 0.6;

/// Position of a vehicle on a road.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPoint {
    /// Road index.
    pub road_id: usize,
    /// Longitudinal position.
    pub s: f64,
    /// Lateral position.
    pub t: f64,
}

impl SpawnPoint {
    /// Vehicle constructor arguments placed at this point.
    #[must_use]
    pub fn vehicle(self, init_speed: f64) -> VehicleArgs {
        VehicleArgs {
            road_id: self.road_id,
            init_s: self.s,
            init_t: self.t,
            init_speed,
        }
    }
}

/// Source of spawn points for generated vehicles.
///
/// Implementations must only return points on roads that exist in the test
/// case, and may assume it has at least one road.
pub trait SpatialSampler: core::fmt::Debug + Send + Sync {
    /// Random point on the given road, or on a random road when `road` is `None`.
    fn random_spawn_point(
        &self,
        test_case: &TestCase,
        road: Option<usize>,
        rng: &mut DefaultRand,
    ) -> SpawnPoint;

    /// Random point in the neighbourhood of the ego vehicle.
    fn surrounding_point(&self, test_case: &TestCase, rng: &mut DefaultRand) -> SpawnPoint;
}

/// Default sampler: places vehicles inside the lanes, respecting lanes that
/// appear or disappear because of a shape change.
///
/// NPCs around the ego are kept `[min_d_to_ego, max_d_to_ego]` away from it
/// along the road, as far as the roads allow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneSampler {
    min_gap: f64,
    max_gap: f64,
}

impl Default for LaneSampler {
    fn default() -> Self {
        Self::from_config(&ScenarioConfig::default())
    }
}

impl LaneSampler {
    /// Sampler using the NPC distances of `scenario`.
    #[must_use]
    pub fn from_config(scenario: &ScenarioConfig) -> Self {
        Self {
            min_gap: scenario.min_d_to_ego,
            max_gap: scenario.max_d_to_ego.max(scenario.min_d_to_ego),
        }
    }

    // Longitudinal point in `[lo, hi]` on a road of `length`, if that
    // interval overlaps the road.
    fn along(lo: f64, hi: f64, length: f64, rng: &mut DefaultRand) -> Option<f64> {
        let (lo, hi) = (lo.max(0.0), hi.min(length));
        (lo <= hi).then(|| rng.next_float_in(lo, hi))
    }

    fn lateral(width: f64, rng: &mut DefaultRand) -> f64 {
        rng.next_float_in(-width + EDGE_MARGIN, -EDGE_MARGIN)
    }

    // NPC placed right next to the ego, in a lane likely to interact with it.
    fn spawn_with_pattern(&self, test_case: &TestCase, ego: &VehicleArgs, rng: &mut DefaultRand) -> SpawnPoint {
        let road_id = ego.road_id;
        let Some(seg) = test_case.segment(road_id) else {
            return SpawnPoint {
                road_id: 0,
                s: ego.init_s,
                t: ego.init_t,
            };
        };
        let length = seg.road.length;
        let width = seg.road.width();
        let ego_s = crate::math::clamp(ego.init_s, 0.0, length);
        let mut s = rng.next_float_in(
            (ego_s - self.min_gap).max(0.0),
            (ego_s + self.min_gap).min(length),
        );
        let mut t = -width + PATTERN_LANE_OFFSET;
        match seg.shape {
            Some(&RoadShape::Contract { start_position, .. }) => {
                s = rng.next_float_in(ego_s.min(start_position), ego_s.max(start_position));
            }
            Some(RoadShape::Expand { .. }) => t = -width / 2.0,
            _ => {}
        }
        SpawnPoint { road_id, s, t }
    }
}

impl SpatialSampler for LaneSampler {
    fn random_spawn_point(
        &self,
        test_case: &TestCase,
        road: Option<usize>,
        rng: &mut DefaultRand,
    ) -> SpawnPoint {
        let roads = test_case.road_size().max(1);
        let road_id = road.unwrap_or_else(|| rng.next_below(roads)).min(roads - 1);
        let Some(seg) = test_case.segment(road_id) else {
            return SpawnPoint {
                road_id,
                s: 0.0,
                t: -EDGE_MARGIN,
            };
        };
        let length = seg.road.length;
        let width = seg.road.width();
        let outer_lane = -(width - seg.road.lane_width);
        let t = Self::lateral(width, rng);
        let mut s = length / 2.0;
        if t < outer_lane {
            // The outer lane only exists past an expansion and before a contraction.
            match seg.shape {
                Some(&RoadShape::Expand { start_position, .. }) => {
                    s = rng.next_float_in(start_position, length);
                }
                Some(&RoadShape::Contract { start_position, .. }) => {
                    s = rng.next_float_in(0.0, start_position);
                }
                _ => {}
            }
        }
        SpawnPoint { road_id, s, t }
    }

    fn surrounding_point(&self, test_case: &TestCase, rng: &mut DefaultRand) -> SpawnPoint {
        let Some(ego) = test_case.ego() else {
            return self.random_spawn_point(test_case, Some(0), rng);
        };
        if rng.coinflip(PATTERN_PROB) {
            return self.spawn_with_pattern(test_case, ego, rng);
        }
        let Some(ego_road) = test_case.road(ego.road_id) else {
            return self.random_spawn_point(test_case, None, rng);
        };
        let length = ego_road.length;
        let s = ego.init_s;
        let (near, far) = (self.min_gap, self.max_gap);

        let ahead = if s + near > length {
            test_case.road(ego.road_id + 1).and_then(|next| {
                let s = Self::along(s + near - length, s + far - length, next.length, rng)?;
                Some(SpawnPoint {
                    road_id: ego.road_id + 1,
                    s,
                    t: Self::lateral(next.width(), rng),
                })
            })
        } else {
            Self::along(s + near, s + far, length, rng).map(|s| SpawnPoint {
                road_id: ego.road_id,
                s,
                t: Self::lateral(ego_road.width(), rng),
            })
        };
        let behind = if s - near > 0.0 {
            Self::along(s - far, s - near, length, rng).map(|s| SpawnPoint {
                road_id: ego.road_id,
                s,
                t: Self::lateral(ego_road.width(), rng),
            })
        } else {
            None
        };

        match (ahead, behind) {
            (Some(a), Some(b)) => {
                if rng.coinflip(AHEAD_PROB) {
                    a
                } else {
                    b
                }
            }
            (Some(p), None) | (None, Some(p)) => p,
            (None, None) => self.random_spawn_point(test_case, Some(ego.road_id), rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use chaos_theory::{check, make};

    use super::*;
    use crate::testcase::tests::{road, sample, vehicle};

    fn on_road(tc: &TestCase, p: SpawnPoint) -> bool {
        let Some(r) = tc.road(p.road_id) else {
            return false;
        };
        (0.0..=r.length).contains(&p.s) && (-r.width()..=0.0).contains(&p.t)
    }

    #[test]
    fn random_point_on_road() {
        check(|src| {
            let mut rng = DefaultRand::new(src.any("seed"));
            let tc = sample();
            let p = LaneSampler::default().random_spawn_point(&tc, None, &mut rng);
            assert!(on_road(&tc, p));
            let p = LaneSampler::default().random_spawn_point(&tc, Some(1), &mut rng);
            assert_eq!(p.road_id, 1);
        });
    }

    #[test]
    fn surrounding_point_on_road() {
        check(|src| {
            let mut rng = DefaultRand::new(src.any("seed"));
            let tc = sample();
            let p = LaneSampler::default().surrounding_point(&tc, &mut rng);
            assert!(on_road(&tc, p));
        });
    }

    #[test]
    fn surrounding_point_without_next_road() {
        check(|src| {
            let mut rng = DefaultRand::new(src.any("seed"));
            let mut tc = TestCase::new();
            tc.push_road(road(3), None);
            // Ego close to the end of the only road.
            tc.push_vehicle(vehicle(0, 75.0));
            let p = LaneSampler::default().surrounding_point(&tc, &mut rng);
            assert_eq!(p.road_id, 0);
            assert!(on_road(&tc, p));
        });
    }

    #[test]
    fn surrounding_point_on_short_roads() {
        check(|src| {
            let mut rng = DefaultRand::new(src.any("seed"));
            let mut tc = TestCase::new();
            let mut lengths = [0.0; 2];
            for l in &mut lengths {
                *l = src.any_of("length", make::float_in_range(10.0..=40.0));
                let mut r = road(3);
                r.length = *l;
                tc.push_road(r, None);
            }
            let ego_s = src.any_of("ego_s", make::float_in_range(0.0..=lengths[0]));
            tc.push_vehicle(vehicle(0, ego_s));
            let p = LaneSampler::default().surrounding_point(&tc, &mut rng);
            assert!(on_road(&tc, p), "{p:?} off roads of {lengths:?}");
        });
    }

    #[test]
    fn configured_distances_to_ego() {
        check(|src| {
            let mut rng = DefaultRand::new(src.any("seed"));
            let scenario = ScenarioConfig {
                min_d_to_ego: 5.0,
                max_d_to_ego: 10.0,
                ..ScenarioConfig::default()
            };
            let mut tc = TestCase::new();
            let mut r = road(3);
            r.length = 200.0;
            tc.push_road(r, None);
            tc.push_vehicle(vehicle(0, 100.0));
            let p = LaneSampler::from_config(&scenario).surrounding_point(&tc, &mut rng);
            assert_eq!(p.road_id, 0);
            assert!((p.s - 100.0).abs() <= 10.0, "{p:?}");
        });
    }

    #[test]
    fn contract_restricts_outer_lane() {
        check(|src| {
            let mut rng = DefaultRand::new(src.any("seed"));
            let mut tc = TestCase::new();
            tc.push_road(
                road(3),
                Some(RoadShape::Contract {
                    start_position: 45.0,
                    deformation_length: 20.0,
                }),
            );
            let p = LaneSampler::default().random_spawn_point(&tc, Some(0), &mut rng);
            if p.t < -7.0 {
                assert!(p.s <= 45.0);
            } else {
                assert_eq!(p.s, 40.0);
            }
        });
    }
}
