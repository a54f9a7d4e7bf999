// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::{fmt, ops::Range};

use crate::{
    render,
    statement::{Maneuver, RoadArgs, RoadId, RoadShape, Statement, VehicleArgs, VehicleId},
    topology::Segment,
};

/// Ordered program describing one driving scenario.
///
/// Statements are laid out in three blocks:
/// - roads: `roadI = Road(...)` for `I = 0, 1, ...`, each optionally
///   followed by its single shape-change action;
/// - vehicle constructors: `Ego` first, then `npc1..npcK`;
/// - vehicle actions, each naming a vehicle constructed above.
///
/// Every mutating method keeps this layout; [`TestCase::validate`] checks it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestCase {
    statements: Vec<Statement>,
}

impl TestCase {
    /// Create an empty test case.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All statements, in program order.
    #[must_use]
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Total statement count.
    #[must_use]
    pub fn size(&self) -> usize {
        self.statements.len()
    }

    /// Road constructors and road actions, a prefix of [`TestCase::statements`].
    #[must_use]
    pub fn road_statements(&self) -> &[Statement] {
        &self.statements[..self.road_statement_count()]
    }

    /// Everything after the road prefix.
    #[must_use]
    pub fn vehicle_statements(&self) -> &[Statement] {
        &self.statements[self.road_statement_count()..]
    }

    fn road_statement_count(&self) -> usize {
        self.statements.iter().take_while(|s| s.is_road()).count()
    }

    /// Number of road segments.
    #[must_use]
    pub fn road_size(&self) -> usize {
        self.road_statements()
            .iter()
            .filter(|s| s.is_constructor())
            .count()
    }

    fn road_position(&self, index: usize) -> Option<usize> {
        self.road_statements().iter().position(
            |s| matches!(s, Statement::RoadConstructor { road, .. } if road.0 == index),
        )
    }

    /// Constructor arguments of road `index`.
    #[must_use]
    pub fn road(&self, index: usize) -> Option<&RoadArgs> {
        match self.statements.get(self.road_position(index)?) {
            Some(Statement::RoadConstructor { args, .. }) => Some(args),
            _ => None,
        }
    }

    pub(crate) fn road_mut(&mut self, index: usize) -> Option<&mut RoadArgs> {
        let p = self.road_position(index)?;
        match self.statements.get_mut(p) {
            Some(Statement::RoadConstructor { args, .. }) => Some(args),
            _ => None,
        }
    }

    /// Shape-change action of road `index`, if it has one.
    #[must_use]
    pub fn road_shape(&self, index: usize) -> Option<&RoadShape> {
        match self.statements.get(self.road_position(index)? + 1) {
            Some(Statement::RoadAction { shape, .. }) => Some(shape),
            _ => None,
        }
    }

    /// Road `index` together with its shape.
    #[must_use]
    pub fn segment(&self, index: usize) -> Option<Segment<'_>> {
        Some(Segment::new(self.road(index)?, self.road_shape(index)))
    }

    /// All road segments in order.
    pub fn segments(&self) -> impl Iterator<Item = Segment<'_>> {
        (0..self.road_size()).filter_map(|i| self.segment(i))
    }

    /// Replace, add or remove the shape-change action of road `index`.
    /// Returns `false` when there is no such road.
    pub fn set_road_shape(&mut self, index: usize, shape: Option<RoadShape>) -> bool {
        let Some(p) = self.road_position(index) else {
            return false;
        };
        let has_shape = matches!(
            self.statements.get(p + 1),
            Some(Statement::RoadAction { .. })
        );
        match (has_shape, shape) {
            (true, Some(shape)) => {
                self.statements[p + 1] = Statement::RoadAction {
                    callee: RoadId(index),
                    shape,
                };
            }
            (true, None) => {
                self.statements.remove(p + 1);
            }
            (false, Some(shape)) => self.statements.insert(
                p + 1,
                Statement::RoadAction {
                    callee: RoadId(index),
                    shape,
                },
            ),
            (false, None) => {}
        }
        true
    }

    /// Replace road `index` with new arguments and shape.
    pub fn replace_road(&mut self, index: usize, args: RoadArgs, shape: Option<RoadShape>) -> bool {
        let Some(road) = self.road_mut(index) else {
            return false;
        };
        *road = args;
        self.set_road_shape(index, shape)
    }

    /// Append a road after the existing ones.
    pub fn push_road(&mut self, args: RoadArgs, shape: Option<RoadShape>) -> RoadId {
        let index = self.road_size();
        self.insert_road(index, args, shape);
        RoadId(index)
    }

    /// Insert a road so that it becomes road `index` (clamped to the road
    /// count). Later roads, and vehicles placed on them, shift up by one.
    ///
    /// Returns the statement position of the new road constructor.
    pub fn insert_road(&mut self, index: usize, args: RoadArgs, shape: Option<RoadShape>) -> usize {
        let index = index.min(self.road_size());
        let position = self
            .road_position(index)
            .unwrap_or_else(|| self.road_statement_count());
        for s in &mut self.statements {
            match s {
                Statement::RoadConstructor { road: id, .. } | Statement::RoadAction { callee: id, .. }
                    if id.0 >= index =>
                {
                    id.0 += 1;
                }
                Statement::VehicleConstructor { args, .. } if args.road_id >= index => {
                    args.road_id += 1;
                }
                _ => {}
            }
        }
        self.statements.insert(
            position,
            Statement::RoadConstructor {
                road: RoadId(index),
                args,
            },
        );
        if let Some(shape) = shape {
            self.statements.insert(
                position + 1,
                Statement::RoadAction {
                    callee: RoadId(index),
                    shape,
                },
            );
        }
        position
    }

    /// Remove road `index` and its shape. Later roads shift down by one;
    /// vehicles are moved to the nearest surviving road and clamped into it.
    ///
    /// The last remaining road cannot be removed.
    pub fn remove_road(&mut self, index: usize) -> Option<(RoadArgs, Option<RoadShape>)> {
        if self.road_size() <= 1 {
            return None;
        }
        let p = self.road_position(index)?;
        let shape = match self.statements.get(p + 1) {
            Some(Statement::RoadAction { .. }) => match self.statements.remove(p + 1) {
                Statement::RoadAction { shape, .. } => Some(shape),
                _ => None,
            },
            _ => None,
        };
        let Statement::RoadConstructor { args, .. } = self.statements.remove(p) else {
            return None;
        };
        let last = self.road_size() - 1;
        for s in &mut self.statements {
            match s {
                Statement::RoadConstructor { road: id, .. } | Statement::RoadAction { callee: id, .. }
                    if id.0 > index =>
                {
                    id.0 -= 1;
                }
                Statement::VehicleConstructor { args, .. } => {
                    if args.road_id > index {
                        args.road_id -= 1;
                    }
                    args.road_id = args.road_id.min(last);
                }
                _ => {}
            }
        }
        self.fit_vehicles();
        Some((args, shape))
    }

    /// Clamp every vehicle spawn point into the bounds of its road.
    pub(crate) fn fit_vehicles(&mut self) {
        let roads: Vec<(f64, f64)> = self
            .segments()
            .map(|s| (s.road.length, s.road.width()))
            .collect();
        for s in &mut self.statements {
            if let Statement::VehicleConstructor { args, .. } = s
                && let Some(&(length, width)) = roads.get(args.road_id)
            {
                args.init_s = crate::math::clamp(args.init_s, 0.0, length);
                args.init_t = crate::math::clamp(args.init_t, -width, 0.0);
            }
        }
    }

    fn vehicle_constructor_range(&self) -> Range<usize> {
        let start = self.road_statement_count();
        let len = self.statements[start..]
            .iter()
            .take_while(|s| matches!(s, Statement::VehicleConstructor { .. }))
            .count();
        start..start + len
    }

    /// Statement positions of vehicle actions.
    #[must_use]
    pub fn vehicle_action_range(&self) -> Range<usize> {
        self.vehicle_constructor_range().end..self.statements.len()
    }

    /// Number of vehicles, ego included.
    #[must_use]
    pub fn vehicle_count(&self) -> usize {
        self.vehicle_constructor_range().len()
    }

    /// Number of NPC vehicles.
    #[must_use]
    pub fn npc_count(&self) -> usize {
        self.vehicle_count().saturating_sub(1)
    }

    /// Number of vehicle actions.
    #[must_use]
    pub fn action_count(&self) -> usize {
        self.vehicle_action_range().len()
    }

    /// Vehicles in construction order.
    pub fn vehicles(&self) -> impl Iterator<Item = (VehicleId, &VehicleArgs)> {
        self.statements[self.vehicle_constructor_range()]
            .iter()
            .filter_map(|s| match s {
                Statement::VehicleConstructor { vehicle, args } => Some((*vehicle, args)),
                _ => None,
            })
    }

    /// Constructor arguments of a vehicle.
    #[must_use]
    pub fn vehicle(&self, id: VehicleId) -> Option<&VehicleArgs> {
        self.vehicles().find(|&(v, _)| v == id).map(|(_, a)| a)
    }

    pub(crate) fn vehicle_mut(&mut self, id: VehicleId) -> Option<&mut VehicleArgs> {
        let range = self.vehicle_constructor_range();
        self.statements[range].iter_mut().find_map(|s| match s {
            Statement::VehicleConstructor { vehicle, args } if *vehicle == id => Some(args),
            _ => None,
        })
    }

    /// The vehicle under test.
    #[must_use]
    pub fn ego(&self) -> Option<&VehicleArgs> {
        self.vehicle(VehicleId::Ego)
    }

    /// Identities of all NPCs.
    #[must_use]
    pub fn npc_ids(&self) -> Vec<VehicleId> {
        (1..=self.npc_count()).map(VehicleId::Npc).collect()
    }

    /// Append a vehicle constructor. The first vehicle becomes the ego.
    pub fn push_vehicle(&mut self, args: VehicleArgs) -> VehicleId {
        let id = match self.vehicle_count() {
            0 => VehicleId::Ego,
            n => VehicleId::Npc(n),
        };
        let end = self.vehicle_constructor_range().end;
        self.statements
            .insert(end, Statement::VehicleConstructor { vehicle: id, args });
        id
    }

    /// Remove an NPC together with all its actions. Later NPCs are renumbered
    /// so that names stay contiguous. The ego cannot be removed.
    pub fn remove_vehicle(&mut self, id: VehicleId) -> bool {
        let VehicleId::Npc(k) = id else {
            return false;
        };
        if k == 0 || k > self.npc_count() {
            return false;
        }
        self.statements.retain(|s| match s {
            Statement::VehicleConstructor { vehicle, .. } => *vehicle != id,
            Statement::VehicleAction { callee, .. } => *callee != id,
            _ => true,
        });
        for s in &mut self.statements {
            if let Statement::VehicleConstructor { vehicle: v, .. }
            | Statement::VehicleAction { callee: v, .. } = s
                && let VehicleId::Npc(n) = v
                && *n > k
            {
                *n -= 1;
            }
        }
        true
    }

    /// Append an action. Returns `false` when the callee does not exist.
    pub fn push_action(&mut self, callee: VehicleId, maneuver: Maneuver) -> bool {
        let end = self.statements.len();
        self.insert_action(end, callee, maneuver)
    }

    /// Insert an action at a statement position (clamped into the action block).
    /// Returns `false` when the callee does not exist.
    pub fn insert_action(&mut self, position: usize, callee: VehicleId, maneuver: Maneuver) -> bool {
        if self.vehicle(callee).is_none() {
            return false;
        }
        let range = self.vehicle_action_range();
        let position = position.clamp(range.start, range.end);
        self.statements
            .insert(position, Statement::VehicleAction { callee, maneuver });
        true
    }

    /// Maneuvers performed by a vehicle, in order.
    #[must_use]
    pub fn actions_of(&self, id: VehicleId) -> Vec<&Maneuver> {
        self.statements[self.vehicle_action_range()]
            .iter()
            .filter_map(|s| match s {
                Statement::VehicleAction { callee, maneuver } if *callee == id => Some(maneuver),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn action_mut(&mut self, position: usize) -> Option<(&mut VehicleId, &mut Maneuver)> {
        match self.statements.get_mut(position) {
            Some(Statement::VehicleAction { callee, maneuver }) => Some((callee, maneuver)),
            _ => None,
        }
    }

    pub(crate) fn remove_actions_of(&mut self, id: VehicleId) -> usize {
        let before = self.statements.len();
        self.statements.retain(
            |s| !matches!(s, Statement::VehicleAction { callee, .. } if *callee == id),
        );
        before - self.statements.len()
    }

    /// Remove the vehicle action at `position`, unless that would shrink the
    /// test case below `min_size`.
    pub fn remove_action(&mut self, position: usize, min_size: usize) -> bool {
        if self.size() <= min_size || !self.vehicle_action_range().contains(&position) {
            return false;
        }
        self.statements.remove(position);
        true
    }

    /// Delete the statement at `position` with its dependents, unless that
    /// would shrink the test case below `min_size`. The ego and the last road
    /// are never deleted.
    pub fn delete_statement(&mut self, position: usize, min_size: usize) -> bool {
        let removed = match self.statements.get(position) {
            None => return false,
            Some(Statement::RoadConstructor { road, .. }) => {
                1 + usize::from(self.road_shape(road.0).is_some())
            }
            Some(Statement::VehicleConstructor { vehicle, .. }) => {
                1 + self.actions_of(*vehicle).len()
            }
            Some(Statement::RoadAction { .. } | Statement::VehicleAction { .. }) => 1,
        };
        if self.size() < min_size + removed {
            return false;
        }
        match self.statements[position].clone() {
            Statement::RoadConstructor { road, .. } => self.remove_road(road.0).is_some(),
            Statement::RoadAction { callee, .. } => self.set_road_shape(callee.0, None),
            Statement::VehicleConstructor { vehicle, .. } => self.remove_vehicle(vehicle),
            Statement::VehicleAction { .. } => {
                self.statements.remove(position);
                true
            }
        }
    }

    /// Check the statement layout and that every reference resolves.
    ///
    /// # Errors
    ///
    /// `validate` describes the first violated invariant.
    pub fn validate(&self) -> Result<(), &'static str> {
        let mut roads = 0;
        let mut shaped = false;
        for s in self.road_statements() {
            match s {
                Statement::RoadConstructor { road, .. } => {
                    if road.0 != roads {
                        return Err("road constructors out of order");
                    }
                    roads += 1;
                    shaped = false;
                }
                Statement::RoadAction { callee, .. } => {
                    if roads == 0 || callee.0 != roads - 1 || shaped {
                        return Err("road action does not follow its road");
                    }
                    shaped = true;
                }
                _ => unreachable!(),
            }
        }
        let mut vehicles = 0;
        let mut in_actions = false;
        for s in self.vehicle_statements() {
            match s {
                Statement::VehicleConstructor { vehicle, args } => {
                    let expected = match vehicles {
                        0 => VehicleId::Ego,
                        n => VehicleId::Npc(n),
                    };
                    if in_actions || *vehicle != expected {
                        return Err("vehicle constructors out of order");
                    }
                    if args.road_id >= roads {
                        return Err("vehicle placed on a missing road");
                    }
                    vehicles += 1;
                }
                Statement::VehicleAction { callee, .. } => {
                    in_actions = true;
                    let known = match *callee {
                        VehicleId::Ego => vehicles > 0,
                        VehicleId::Npc(n) => n >= 1 && n < vehicles,
                    };
                    if !known {
                        return Err("action on an unknown vehicle");
                    }
                }
                Statement::RoadConstructor { .. } | Statement::RoadAction { .. } => {
                    return Err("road statement after vehicles");
                }
            }
        }
        Ok(())
    }

    /// Deterministic textual form; see [`render::render_test_case`].
    #[must_use]
    pub fn render(&self) -> String {
        render::render_test_case(self)
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn road(lane_num: i64) -> RoadArgs {
        RoadArgs {
            curv_start: 0.0,
            curv_end: 0.0,
            length: 80.0,
            lane_num,
            lane_width: 3.5,
        }
    }

    pub(crate) fn vehicle(road_id: usize, init_s: f64) -> VehicleArgs {
        VehicleArgs {
            road_id,
            init_s,
            init_t: -2.0,
            init_speed: 5.0,
        }
    }

    pub(crate) fn speed(target_speed: f64) -> Maneuver {
        Maneuver::Speed {
            target_speed,
            rate: 1.0,
            trigger_time: 2.0,
        }
    }

    fn contract() -> RoadShape {
        RoadShape::Contract {
            start_position: 50.0,
            deformation_length: 20.0,
        }
    }

    // Two roads, ego plus two NPCs, two actions each.
    pub(crate) fn sample() -> TestCase {
        let mut tc = TestCase::new();
        tc.push_road(road(3), Some(contract()));
        tc.push_road(road(2), None);
        tc.push_vehicle(vehicle(0, 30.0));
        let a = tc.push_vehicle(vehicle(0, 60.0));
        let b = tc.push_vehicle(vehicle(1, 10.0));
        for id in [a, b] {
            assert!(tc.push_action(id, speed(5.0)));
            assert!(tc.push_action(id, speed(10.0)));
        }
        tc.validate().unwrap();
        tc
    }

    #[test]
    fn layout() {
        let tc = sample();
        assert_eq!(tc.size(), 10);
        assert_eq!(tc.road_size(), 2);
        assert_eq!(tc.road_statements().len(), 3);
        assert_eq!(tc.vehicle_count(), 3);
        assert_eq!(tc.npc_ids(), vec![VehicleId::Npc(1), VehicleId::Npc(2)]);
        assert_eq!(tc.action_count(), 4);
        assert_eq!(tc.road_shape(0), Some(&contract()));
        assert_eq!(tc.road_shape(1), None);
        assert_eq!(tc.ego().map(|e| e.init_s), Some(30.0));
    }

    #[test]
    fn insert_road_shifts() {
        let mut tc = sample();
        let p = tc.insert_road(1, road(3), None);
        assert_eq!(p, 2);
        tc.validate().unwrap();
        assert_eq!(tc.road_size(), 3);
        assert_eq!(tc.road(2).map(|r| r.lane_num), Some(2));
        assert_eq!(tc.vehicle(VehicleId::Npc(2)).map(|v| v.road_id), Some(2));
        assert_eq!(tc.vehicle(VehicleId::Ego).map(|v| v.road_id), Some(0));
    }

    #[test]
    fn remove_road_cascades() {
        let mut tc = sample();
        let (args, shape) = tc.remove_road(0).unwrap();
        assert_eq!(args.lane_num, 3);
        assert_eq!(shape, Some(contract()));
        tc.validate().unwrap();
        assert_eq!(tc.road_size(), 1);
        assert_eq!(tc.road_statements().len(), 1);
        for (_, v) in tc.vehicles() {
            assert_eq!(v.road_id, 0);
        }
        assert!(tc.remove_road(0).is_none());
    }

    #[test]
    fn remove_last_road_moves_vehicles_back() {
        let mut tc = sample();
        tc.remove_road(1).unwrap();
        tc.validate().unwrap();
        assert_eq!(tc.vehicle(VehicleId::Npc(2)).map(|v| v.road_id), Some(0));
    }

    #[test]
    fn remove_vehicle_renumbers() {
        let mut tc = sample();
        assert!(!tc.remove_vehicle(VehicleId::Ego));
        assert!(tc.remove_vehicle(VehicleId::Npc(1)));
        tc.validate().unwrap();
        assert_eq!(tc.npc_count(), 1);
        assert_eq!(tc.action_count(), 2);
        assert_eq!(tc.vehicle(VehicleId::Npc(1)).map(|v| v.road_id), Some(1));
    }

    #[test]
    fn delete_respects_min_size() {
        let mut tc = sample();
        let last = tc.size() - 1;
        assert!(!tc.delete_statement(last, tc.size()));
        assert!(tc.delete_statement(last, tc.size() - 1));
        assert_eq!(tc.size(), 9);
        // npc2 still has one action: deleting it removes two statements.
        let npc2 = tc
            .statements()
            .iter()
            .position(|s| matches!(s, Statement::VehicleConstructor { vehicle: VehicleId::Npc(2), .. }))
            .unwrap();
        assert!(!tc.delete_statement(npc2, 8));
        assert!(tc.delete_statement(npc2, 7));
        tc.validate().unwrap();
        assert!(!tc.remove_action(tc.size() - 1, tc.size()));
    }

    #[test]
    fn shape_replace_and_drop() {
        let mut tc = sample();
        assert!(tc.set_road_shape(1, Some(contract())));
        tc.validate().unwrap();
        assert_eq!(tc.road_statements().len(), 4);
        assert!(tc.set_road_shape(0, None));
        tc.validate().unwrap();
        assert_eq!(tc.road_statements().len(), 3);
        assert!(!tc.set_road_shape(5, None));
    }

    #[test]
    fn action_on_missing_vehicle_rejected() {
        let mut tc = sample();
        assert!(!tc.push_action(VehicleId::Npc(7), speed(1.0)));
        assert_eq!(tc.actions_of(VehicleId::Npc(1)).len(), 2);
    }

    #[test]
    fn clone_isolation() {
        let tc = sample();
        let mut copy = tc.clone();
        copy.road_mut(0).unwrap().length = 99.0;
        copy.remove_vehicle(VehicleId::Npc(2));
        assert_eq!(tc.road(0).map(|r| r.length), Some(80.0));
        assert_eq!(tc.npc_count(), 2);
    }

    #[test]
    fn fit_vehicles_clamps() {
        let mut tc = sample();
        tc.road_mut(0).unwrap().length = 40.0;
        tc.fit_vehicles();
        assert_eq!(tc.vehicle(VehicleId::Npc(1)).map(|v| v.init_s), Some(40.0));
    }
}
