// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Generation of random legal statements, and constrained structural edits.
//!
//! Every operation here either leaves the test case valid or leaves it
//! untouched: illegal or over-capacity edits are skipped and reported as
//! `false`, never as errors.

use crate::{
    catalog::{Catalog, CatalogError},
    chromosome::Chromosome,
    config::{Config, GaConfig, ScenarioConfig},
    polynomial::PolynomialMutation,
    rand::DefaultRand,
    range::Bounds,
    spawn::{LaneSampler, SpatialSampler, SpawnPoint},
    statement::{Maneuver, ManeuverKind, RoadArgs, RoadShape, RoadShapeKind, VehicleId},
    testcase::TestCase,
    topology::{Segment, check_neighbors, check_validity, legal_lane_range, shape_applicable},
};

// Contractions end at least this far from the road end.
const CONTRACT_TAIL: f64 = 20.0;
const MIN_DEFORMATION: f64 = 20.0;
const MIN_MUTATED_EXPAND_DEFORMATION: f64 = 10.0;
// Merges start at least this far from the road end.
const MERGE_TAIL: f64 = 10.0;
const SPLIT_HEAD: f64 = 10.0;
const MIN_MUTATED_SPLIT_HEAD: f64 = 5.0;

// Whether the position windows of a shape kind are non-empty on a road of
// length `l`. Contractions need `CONTRACT_TAIL >= MIN_DEFORMATION` on top.
fn shape_fits_length(kind: RoadShapeKind, l: f64) -> bool {
    match kind {
        RoadShapeKind::Contract => 0.5 * l <= l - CONTRACT_TAIL,
        RoadShapeKind::Expand => MIN_DEFORMATION <= 0.5 * l,
        RoadShapeKind::Merge => 0.5 * l <= l - MERGE_TAIL,
        RoadShapeKind::Split => SPLIT_HEAD <= 0.5 * l,
    }
}

const AVFUZZER_ROAD: [f64; 5] = [-0.0000000019615, 0.000000088191864, 200.0, 6.0, 3.5];
const AVFUZZER_ROADS: usize = 2;
const AVFUZZER_NPCS: usize = 2;
const AVFUZZER_ACTIONS_PER_NPC: usize = 5;
const AVFUZZER_EGO: SpawnPoint = SpawnPoint {
    road_id: 0,
    s: 30.0,
    t: -11.5,
};
const AVFUZZER_NPC_S: Bounds<f64> = Bounds::new(60.0, 80.0);
const AVFUZZER_NPC_T: Bounds<f64> = Bounds::new(-14.5, -6.5);

/// Source of random legal statements and test cases.
#[derive(Debug)]
pub struct TestFactory {
    config: Config,
    catalog: Catalog,
    sampler: Box<dyn SpatialSampler>,
    mutation: PolynomialMutation,
}

impl TestFactory {
    /// Factory with the standard catalog and the default [`LaneSampler`].
    #[must_use]
    pub fn new(config: Config) -> Self {
        let mutation = PolynomialMutation::from_config(&config.ga);
        let sampler = LaneSampler::from_config(&config.scenario);
        Self {
            config,
            catalog: Catalog::standard(),
            sampler: Box::new(sampler),
            mutation,
        }
    }

    /// Replace the capability catalog.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the spawn point sampler.
    #[must_use]
    pub fn with_sampler(mut self, sampler: impl SpatialSampler + 'static) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Capability catalog in use.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub(crate) fn ga(&self) -> &GaConfig {
        &self.config.ga
    }

    fn scenario(&self) -> &ScenarioConfig {
        &self.config.scenario
    }

    /// Check the configuration and the catalog.
    ///
    /// # Errors
    ///
    /// `validate` fails when either is inconsistent.
    pub fn validate(&self) -> Result<(), FactoryError> {
        self.config.validate().map_err(FactoryError::Config)?;
        self.catalog.validate().map_err(FactoryError::Catalog)
    }

    // Roads.

    fn random_road_args(&self, lanes: Bounds<i64>, rng: &mut DefaultRand) -> RoadArgs {
        let sc = self.scenario();
        RoadArgs {
            curv_start: rng.next_float_in(sc.curv_start.min, sc.curv_start.max),
            curv_end: rng.next_float_in(sc.curv_end.min, sc.curv_end.max),
            length: rng.next_float_in(sc.length.min, sc.length.max),
            lane_num: rng.next_int_inclusive(lanes.min, lanes.max),
            lane_width: rng.next_float_in(sc.lane_width.min, sc.lane_width.max),
        }
    }

    /// Random shape change applicable to `road`, ignoring its neighbours.
    pub fn random_shape(&self, road: &RoadArgs, rng: &mut DefaultRand) -> Option<RoadShape> {
        let kinds = self.catalog.road_shapes();
        let kind = *rng.choose(&kinds)?;
        if !shape_applicable(kind, road.lane_num, self.scenario().lane_num)
            || !shape_fits_length(kind, road.length)
        {
            return None;
        }
        let l = road.length;
        let shape = match kind {
            RoadShapeKind::Contract => {
                let start_position = rng.next_float_in(0.5 * l, l - CONTRACT_TAIL);
                RoadShape::Contract {
                    start_position,
                    deformation_length: rng.next_float_in(MIN_DEFORMATION, l - start_position),
                }
            }
            RoadShapeKind::Expand => RoadShape::Expand {
                start_position: rng.next_float_in(0.0, 0.5 * l),
                deformation_length: rng.next_float_in(MIN_DEFORMATION, 0.5 * l),
            },
            RoadShapeKind::Merge => RoadShape::Merge {
                start_position: rng.next_float_in(0.5 * l, l - MERGE_TAIL),
                curvature: rng.next_float_in(self.scenario().curv_start.min, road.curv_start),
                lanes: rng.next_int_inclusive(1, road.lane_num / 2),
            },
            RoadShapeKind::Split => RoadShape::Split {
                start_position: rng.next_float_in(SPLIT_HEAD, 0.5 * l),
                curvature: rng.next_float_in(self.scenario().curv_end.min, road.curv_end),
                lanes: rng.next_int_inclusive(1, road.lane_num / 2),
            },
        };
        Some(shape)
    }

    // Mutate shape arguments against the (possibly mutated) road geometry.
    // Returns `false` when the shape no longer applies to the road.
    fn mutate_shape(&self, shape: &mut RoadShape, road: &RoadArgs, rng: &mut DefaultRand) -> bool {
        if !shape_applicable(shape.kind(), road.lane_num, self.scenario().lane_num)
            || !shape_fits_length(shape.kind(), road.length)
        {
            return false;
        }
        let m = &self.mutation;
        let l = road.length;
        match shape {
            RoadShape::Contract {
                start_position,
                deformation_length,
            } => {
                *start_position = m.mutate_one(*start_position, Bounds::new(0.5 * l, l - CONTRACT_TAIL), rng);
                *deformation_length = m.mutate_one(
                    *deformation_length,
                    Bounds::new(MIN_DEFORMATION, l - *start_position),
                    rng,
                );
            }
            RoadShape::Expand {
                start_position,
                deformation_length,
            } => {
                *start_position = m.mutate_one(*start_position, Bounds::new(0.0, 0.5 * l), rng);
                *deformation_length = m.mutate_one(
                    *deformation_length,
                    Bounds::new(MIN_MUTATED_EXPAND_DEFORMATION, 0.5 * l),
                    rng,
                );
            }
            RoadShape::Merge {
                start_position,
                curvature,
                lanes,
            } => {
                *start_position = m.mutate_one(*start_position, Bounds::new(0.5 * l, l - MERGE_TAIL), rng);
                *curvature = m.mutate_one(
                    *curvature,
                    Bounds::new(self.scenario().curv_start.min, road.curv_start),
                    rng,
                );
                *lanes = rng.next_int_inclusive(1, road.lane_num / 2);
            }
            RoadShape::Split {
                start_position,
                curvature,
                lanes,
            } => {
                *start_position =
                    m.mutate_one(*start_position, Bounds::new(MIN_MUTATED_SPLIT_HEAD, 0.5 * l), rng);
                *curvature = m.mutate_one(
                    *curvature,
                    Bounds::new(self.scenario().curv_end.min, road.curv_end),
                    rng,
                );
                *lanes = rng.next_int_inclusive(1, road.lane_num / 2);
            }
        }
        true
    }

    fn mutate_road_args(&self, road: &mut RoadArgs, rng: &mut DefaultRand) {
        let sc = self.scenario();
        let mut var = [road.curv_start, road.curv_end, road.length, road.lane_width];
        let bounds = [sc.curv_start, sc.curv_end, sc.length, sc.lane_width];
        self.mutation.mutate(&mut var, &bounds, rng);
        [road.curv_start, road.curv_end, road.length, road.lane_width] = var;
        road.lane_num = rng.next_int_inclusive(sc.lane_num.min, sc.lane_num.max);
    }

    /// Append a random road that fits after the current last road.
    pub fn insert_random_road(&self, tc: &mut TestCase, rng: &mut DefaultRand) -> usize {
        let lanes = self.scenario().lane_num;
        let last = tc.road_size().checked_sub(1).and_then(|i| tc.segment(i));
        let mut range = legal_lane_range(last, None, lanes).unwrap_or(lanes);
        if let Some(seg) = last
            && seg.shape.is_some_and(RoadShape::is_junction)
        {
            range.max = range.max.min(seg.lanes().exit).max(range.min);
        }
        let args = self.random_road_args(range, rng);
        tc.push_road(args, None).0
    }

    /// Attach a random shape change to road `index` if it has none and the
    /// result stays legal against both neighbours.
    pub fn insert_random_road_shape(&self, tc: &mut TestCase, index: usize, rng: &mut DefaultRand) -> bool {
        let Some(cur) = tc.segment(index) else {
            return false;
        };
        if cur.shape.is_some() {
            return false;
        }
        let Some(shape) = self.random_shape(cur.road, rng) else {
            return false;
        };
        let pre = index.checked_sub(1).and_then(|i| tc.segment(i));
        let succ = tc.segment(index + 1);
        if !check_neighbors(pre, Segment::new(cur.road, Some(&shape)), succ) {
            log::trace!("dropping illegal {:?} on road{index}", shape.kind());
            return false;
        }
        tc.set_road_shape(index, Some(shape))
    }

    /// Insert a random road so that it becomes road `index`.
    pub fn mutation_insert_road(&self, tc: &mut TestCase, index: usize, rng: &mut DefaultRand) -> bool {
        let ga = self.ga();
        if tc.road_size() >= ga.max_road_num || tc.size() >= ga.max_testcase_size {
            return false;
        }
        let index = index.min(tc.road_size());
        let pre = index.checked_sub(1).and_then(|i| tc.segment(i));
        let succ = tc.segment(index);
        let Some(lanes) = legal_lane_range(pre, succ, self.scenario().lane_num) else {
            log::trace!("no legal lane count for a road at {index}");
            return false;
        };
        let args = self.random_road_args(lanes, rng);
        let shape = if tc.size() + 2 <= ga.max_testcase_size && rng.coinflip(ga.shape_change_prob) {
            self.random_shape(&args, rng)
                .filter(|s| check_neighbors(pre, Segment::new(&args, Some(s)), succ))
        } else {
            None
        };
        tc.insert_road(index, args, shape);
        true
    }

    /// Delete road `index` if the road and size floors allow it and its
    /// former neighbours stay legal next to each other.
    pub fn mutation_delete_road(&self, tc: &mut TestCase, index: usize) -> bool {
        let ga = self.ga();
        let Some(cur) = tc.segment(index) else {
            return false;
        };
        let removed = 1 + usize::from(cur.shape.is_some());
        if tc.road_size() <= ga.min_road_num || tc.size() < ga.min_testcase_size + removed {
            return false;
        }
        let pre = index.checked_sub(1).and_then(|i| tc.segment(i));
        let succ = tc.segment(index + 1);
        if let (Some(p), Some(s)) = (pre, succ)
            && !check_validity(p, s)
        {
            return false;
        }
        tc.remove_road(index).is_some()
    }

    /// Whether road `index` of `other` (with its shape) can replace road
    /// `index` of `tc` without breaking legality against `tc`'s neighbours.
    #[must_use]
    pub fn check_road_change_validity(&self, tc: &TestCase, other: &TestCase, index: usize) -> bool {
        let (Some(_), Some(donor)) = (tc.segment(index), other.segment(index)) else {
            return false;
        };
        let pre = index.checked_sub(1).and_then(|i| tc.segment(i));
        let succ = tc.segment(index + 1);
        check_neighbors(pre, donor, succ)
    }

    /// Re-sample road `index` via polynomial mutation. The lane count is only
    /// adopted if legal; a shape that no longer fits is dropped. If no legal
    /// variant exists the road is left unchanged.
    pub fn mutation_change_road(&self, tc: &mut TestCase, index: usize, rng: &mut DefaultRand) -> bool {
        let Some(cur) = tc.segment(index) else {
            return false;
        };
        let old_lanes = cur.road.lane_num;
        let old_shape = cur.shape.cloned();
        let mut mutated = cur.road.clone();
        self.mutate_road_args(&mut mutated, rng);
        let keep_lanes = RoadArgs {
            lane_num: old_lanes,
            ..mutated.clone()
        };
        let can_drop_shape = tc.size() > self.ga().min_testcase_size;
        let pre = index.checked_sub(1).and_then(|i| tc.segment(i));
        let succ = tc.segment(index + 1);

        let mut chosen = None;
        for road in [mutated, keep_lanes] {
            let shape = old_shape
                .clone()
                .and_then(|mut s| self.mutate_shape(&mut s, &road, rng).then_some(s));
            let dropped = old_shape.is_some() && shape.is_none();
            if (!dropped || can_drop_shape) && check_neighbors(pre, Segment::new(&road, shape.as_ref()), succ) {
                chosen = Some((road, shape));
                break;
            }
            if shape.is_some() && can_drop_shape && check_neighbors(pre, Segment::new(&road, None), succ) {
                chosen = Some((road, None));
                break;
            }
        }
        let Some((road, shape)) = chosen else {
            log::trace!("no legal variant of road{index}, keeping it");
            return false;
        };
        tc.replace_road(index, road, shape);
        tc.fit_vehicles();
        true
    }

    // Vehicles.

    fn random_speed(&self, rng: &mut DefaultRand) -> f64 {
        let b = self.scenario().init_speed;
        rng.next_float_in(b.min, b.max)
    }

    /// Append a vehicle: the ego on road 0 if there is none yet, otherwise an
    /// NPC near the ego.
    pub fn insert_random_vehicle(&self, tc: &mut TestCase, rng: &mut DefaultRand) -> VehicleId {
        let point = if tc.vehicle_count() == 0 {
            self.sampler.random_spawn_point(tc, Some(0), rng)
        } else {
            self.sampler.surrounding_point(tc, rng)
        };
        let speed = self.random_speed(rng);
        tc.push_vehicle(point.vehicle(speed))
    }

    /// Append a vehicle using the fixed AVFuzzer spawn pattern.
    pub fn avfuzzer_insert_random_vehicle(&self, tc: &mut TestCase, rng: &mut DefaultRand) -> VehicleId {
        let point = if tc.vehicle_count() == 0 {
            AVFUZZER_EGO
        } else {
            SpawnPoint {
                road_id: 0,
                s: rng.next_float_in(AVFUZZER_NPC_S.min, AVFUZZER_NPC_S.max),
                t: rng.next_float_in(AVFUZZER_NPC_T.min, AVFUZZER_NPC_T.max),
            }
        };
        let speed = self.random_speed(rng);
        tc.push_vehicle(point.vehicle(speed))
    }

    /// Re-sample an NPC's speed and place it near the ego again.
    pub fn mutate_vehicle(&self, tc: &mut TestCase, id: VehicleId, rng: &mut DefaultRand) -> bool {
        let point = self.sampler.surrounding_point(tc, rng);
        let speed_bounds = self.scenario().init_speed;
        let Some(v) = tc.vehicle_mut(id) else {
            return false;
        };
        v.init_speed = self.mutation.mutate_one(v.init_speed, speed_bounds, rng);
        v.road_id = point.road_id;
        v.init_s = point.s;
        v.init_t = point.t;
        true
    }

    /// Random maneuver of the given kind with arguments from the global bounds.
    pub fn random_maneuver(&self, kind: ManeuverKind, rng: &mut DefaultRand) -> Maneuver {
        let sc = self.scenario();
        let mut draw = |b: Bounds<f64>| rng.next_float_in(b.min, b.max);
        let mut maneuver = match kind {
            ManeuverKind::Speed => Maneuver::Speed {
                target_speed: draw(sc.target_speed),
                rate: draw(sc.rate),
                trigger_time: draw(sc.trigger_time),
            },
            ManeuverKind::LaneChange => Maneuver::LaneChange {
                relative_target_lane: 0,
                target_lane_offset: draw(sc.target_lane_offset),
                lane_change_time: draw(sc.lane_change_time),
                trigger_time: draw(sc.trigger_time),
            },
            ManeuverKind::LaneOffset => Maneuver::LaneOffset {
                offset_distance: draw(sc.offset_distance),
                max_lateral_acc: draw(sc.max_lateral_acc),
                trigger_time: draw(sc.trigger_time),
            },
        };
        redraw_directions(&mut maneuver, sc, rng);
        maneuver
    }

    /// Add a random maneuver, appended or at `position`. The callee is drawn
    /// among the NPCs unless given. Returns `false` if there is no NPC.
    pub fn insert_random_action(
        &self,
        tc: &mut TestCase,
        callee: Option<VehicleId>,
        position: Option<usize>,
        rng: &mut DefaultRand,
    ) -> bool {
        let callee = match callee {
            Some(c) => c,
            None => match rng.choose(&tc.npc_ids()) {
                Some(&c) => c,
                None => return false,
            },
        };
        let kinds = self.catalog.maneuvers();
        let Some(&kind) = rng.choose(&kinds) else {
            return false;
        };
        let maneuver = self.random_maneuver(kind, rng);
        match position {
            Some(p) => tc.insert_action(p, callee, maneuver),
            None => tc.push_action(callee, maneuver),
        }
    }

    fn mutate_maneuver(&self, maneuver: &mut Maneuver, rng: &mut DefaultRand) {
        let sc = self.scenario();
        {
            let mut params = maneuver.float_params_mut();
            let bounds: Vec<Bounds<f64>> = params
                .iter()
                .map(|(name, v)| sc.range(name).unwrap_or(Bounds::new(**v, **v)))
                .collect();
            let mut var: Vec<f64> = params.iter().map(|(_, v)| **v).collect();
            self.mutation.mutate(&mut var, &bounds, rng);
            for ((_, slot), v) in params.iter_mut().zip(var) {
                **slot = v;
            }
        }
        redraw_directions(maneuver, sc, rng);
    }

    /// Mutate the vehicle action at statement `position`; with `reassign`
    /// its callee is also re-drawn among the NPCs.
    pub fn mutate_action(&self, tc: &mut TestCase, position: usize, reassign: bool, rng: &mut DefaultRand) -> bool {
        let npcs = tc.npc_ids();
        let Some((callee, maneuver)) = tc.action_mut(position) else {
            return false;
        };
        self.mutate_maneuver(maneuver, rng);
        if reassign && let Some(&c) = rng.choose(&npcs) {
            *callee = c;
        }
        true
    }

    /// Drop vehicle actions from the end while over the size cap, and add
    /// random ones while under the size floor.
    pub fn repair_size(&self, tc: &mut TestCase, rng: &mut DefaultRand) {
        let ga = self.ga();
        while tc.size() > ga.max_testcase_size && !tc.vehicle_action_range().is_empty() {
            let last = tc.size() - 1;
            if !tc.remove_action(last, 0) {
                break;
            }
        }
        while tc.size() < ga.min_testcase_size {
            if !self.insert_random_action(tc, None, None, rng) {
                break;
            }
        }
    }

    // Whole test cases.

    /// Random test case within the configured road, vehicle and size bounds.
    pub fn generate_test_case(&self, rng: &mut DefaultRand) -> TestCase {
        let ga = self.ga();
        let mut tc = TestCase::new();

        let roads = rng.next_usize_inclusive(ga.min_road_num, ga.max_road_num);
        for _ in 0..roads {
            let index = self.insert_random_road(&mut tc, rng);
            if rng.coinflip(ga.shape_change_prob) {
                self.insert_random_road_shape(&mut tc, index, rng);
            }
        }

        let room = ga.max_testcase_size.saturating_sub(tc.size() + ga.min_action_length);
        let max_vehicles = ga.max_vehicle_num.min(room).max(2);
        let min_vehicles = tc.road_size().clamp(2, max_vehicles);
        let vehicles = rng.next_usize_inclusive(min_vehicles, max_vehicles);
        for _ in 0..vehicles {
            self.insert_random_vehicle(&mut tc, rng);
        }

        let cap = ga.max_testcase_size.saturating_sub(tc.size());
        let lo = ga
            .min_action_length
            .max(ga.min_testcase_size.saturating_sub(tc.size()))
            .min(cap);
        let hi = ga.max_action_length.min(cap).max(lo);
        let actions = rng.next_usize_inclusive(lo, hi);
        for _ in 0..actions {
            self.insert_random_action(&mut tc, None, None, rng);
        }
        log::trace!(
            "generated test case: {} roads, {} vehicles, {} statements",
            tc.road_size(),
            tc.vehicle_count(),
            tc.size()
        );
        tc
    }

    /// Fixed-layout AVFuzzer test case: two straight six-lane roads, the ego
    /// and two NPCs with five random maneuvers each.
    ///
    /// # Errors
    ///
    /// `generate_avfuzzer_test_case` fails if the catalog's road constructor
    /// does not take the standard road arguments.
    pub fn generate_avfuzzer_test_case(&self, rng: &mut DefaultRand) -> Result<TestCase, CatalogError> {
        let mut tc = TestCase::new();
        for _ in 0..AVFUZZER_ROADS {
            tc.push_road(self.catalog.road_args(&AVFUZZER_ROAD)?, None);
        }
        for _ in 0..=AVFUZZER_NPCS {
            self.avfuzzer_insert_random_vehicle(&mut tc, rng);
        }
        for npc in 1..=AVFUZZER_NPCS {
            for _ in 0..AVFUZZER_ACTIONS_PER_NPC {
                self.insert_random_action(&mut tc, Some(VehicleId::Npc(npc)), None, rng);
            }
        }
        Ok(tc)
    }

    /// Fresh chromosome around a random test case.
    pub fn generate_chromosome(&self, rng: &mut DefaultRand) -> Chromosome {
        Chromosome::new(self.generate_test_case(rng))
    }

    /// Fresh chromosome around an AVFuzzer test case.
    ///
    /// # Errors
    ///
    /// See [`TestFactory::generate_avfuzzer_test_case`].
    pub fn generate_avfuzzer_chromosome(&self, rng: &mut DefaultRand) -> Result<Chromosome, CatalogError> {
        self.generate_avfuzzer_test_case(rng).map(Chromosome::new)
    }
}

// Lane directions are categorical: only the extremes of the range are drawn.
fn redraw_directions(maneuver: &mut Maneuver, sc: &ScenarioConfig, rng: &mut DefaultRand) {
    for (name, v) in maneuver.int_params_mut() {
        if name == "relative_target_lane" {
            let b = sc.relative_target_lane;
            *v = if rng.coinflip_fair() { b.min } else { b.max };
        }
    }
}

/// Inconsistent factory setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactoryError {
    /// Invalid configuration.
    Config(&'static str),
    /// Invalid capability catalog.
    Catalog(CatalogError),
}

impl core::fmt::Display for FactoryError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid configuration: {e}"),
            Self::Catalog(e) => write!(f, "invalid catalog: {e}"),
        }
    }
}

impl core::error::Error for FactoryError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Config(_) => None,
            Self::Catalog(e) => Some(e),
        }
    }
}
