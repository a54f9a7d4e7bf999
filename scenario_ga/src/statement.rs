// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::fmt::{self, Display};

use crate::catalog::{CatalogError, NPC_CLASS, ROAD_CLASS, lookup};

/// Scalar argument value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgValue {
    /// Integer value.
    Int(i64),
    /// Real value.
    Float(f64),
}

impl ArgValue {
    /// Value as a float.
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    /// Value as an integer, rounding floats.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Int(v) => v,
            Self::Float(v) => v.round() as i64,
        }
    }
}

impl Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Vehicle identity. The ego is always the first vehicle constructed;
/// NPCs are numbered `1..=k` in construction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VehicleId {
    /// Vehicle under test.
    Ego,
    /// Non-player vehicle with its 1-based number.
    Npc(usize),
}

impl VehicleId {
    /// Whether this is an NPC.
    #[must_use]
    pub fn is_npc(self) -> bool {
        matches!(self, Self::Npc(_))
    }
}

impl Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ego => f.write_str("Ego"),
            Self::Npc(n) => write!(f, "npc{n}"),
        }
    }
}

/// Road segment identity; rendered as `road{index}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoadId(pub usize);

impl Display for RoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "road{}", self.0)
    }
}

/// Road constructor arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadArgs {
    /// Curvature at the start of the segment.
    pub curv_start: f64,
    /// Curvature at the end of the segment.
    pub curv_end: f64,
    /// Segment length.
    pub length: f64,
    /// Lane count.
    pub lane_num: i64,
    /// Width of one lane.
    pub lane_width: f64,
}

impl RoadArgs {
    /// Total drivable width.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.lane_num as f64 * self.lane_width
    }

    pub(crate) fn from_named(named: &[(&str, ArgValue)]) -> Result<Self, CatalogError> {
        Ok(Self {
            curv_start: lookup(named, "curv_start")?.as_f64(),
            curv_end: lookup(named, "curv_end")?.as_f64(),
            length: lookup(named, "length")?.as_f64(),
            lane_num: lookup(named, "lane_num")?.as_i64(),
            lane_width: lookup(named, "lane_width")?.as_f64(),
        })
    }

    /// Named arguments, in declaration order.
    #[must_use]
    pub fn values(&self) -> Vec<(&'static str, ArgValue)> {
        vec![
            ("curv_start", ArgValue::Float(self.curv_start)),
            ("curv_end", ArgValue::Float(self.curv_end)),
            ("length", ArgValue::Float(self.length)),
            ("lane_num", ArgValue::Int(self.lane_num)),
            ("lane_width", ArgValue::Float(self.lane_width)),
        ]
    }
}

/// Kind of a road shape-change action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoadShapeKind {
    /// Drop one lane.
    Contract,
    /// Add one lane.
    Expand,
    /// Lanes join from the side; the road carries fewer lanes on entry.
    Merge,
    /// Lanes branch off; the road carries fewer lanes on exit.
    Split,
}

impl RoadShapeKind {
    /// Catalog name of the action.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Contract => "contract",
            Self::Expand => "expand",
            Self::Merge => "merge",
            Self::Split => "split",
        }
    }

    /// Look up the action by catalog name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "contract" => Some(Self::Contract),
            "expand" => Some(Self::Expand),
            "merge" => Some(Self::Merge),
            "split" => Some(Self::Split),
            _ => None,
        }
    }
}

/// Road shape-change action with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum RoadShape {
    /// Drop one lane over `deformation_length` starting at `start_position`.
    Contract {
        /// Longitudinal start of the deformation.
        start_position: f64,
        /// Length of the deformation.
        deformation_length: f64,
    },
    /// Add one lane over `deformation_length` starting at `start_position`.
    Expand {
        /// Longitudinal start of the deformation.
        start_position: f64,
        /// Length of the deformation.
        deformation_length: f64,
    },
    /// Join `lanes` lanes from a side road.
    Merge {
        /// Longitudinal position of the junction.
        start_position: f64,
        /// Curvature of the joining road.
        curvature: f64,
        /// Number of joining lanes.
        lanes: i64,
    },
    /// Branch `lanes` lanes off to a side road.
    Split {
        /// Longitudinal position of the junction.
        start_position: f64,
        /// Curvature of the branching road.
        curvature: f64,
        /// Number of branching lanes.
        lanes: i64,
    },
}

impl RoadShape {
    /// Action kind.
    #[must_use]
    pub fn kind(&self) -> RoadShapeKind {
        match self {
            Self::Contract { .. } => RoadShapeKind::Contract,
            Self::Expand { .. } => RoadShapeKind::Expand,
            Self::Merge { .. } => RoadShapeKind::Merge,
            Self::Split { .. } => RoadShapeKind::Split,
        }
    }

    /// Whether this is a merge or a split.
    #[must_use]
    pub fn is_junction(&self) -> bool {
        matches!(self, Self::Merge { .. } | Self::Split { .. })
    }

    /// Longitudinal start of the shape change.
    #[must_use]
    pub fn start_position(&self) -> f64 {
        match *self {
            Self::Contract { start_position, .. }
            | Self::Expand { start_position, .. }
            | Self::Merge { start_position, .. }
            | Self::Split { start_position, .. } => start_position,
        }
    }

    /// Named arguments, in declaration order.
    #[must_use]
    pub fn values(&self) -> Vec<(&'static str, ArgValue)> {
        match *self {
            Self::Contract {
                start_position,
                deformation_length,
            }
            | Self::Expand {
                start_position,
                deformation_length,
            } => vec![
                ("start_position", ArgValue::Float(start_position)),
                ("deformation_length", ArgValue::Float(deformation_length)),
            ],
            Self::Merge {
                start_position,
                curvature,
                lanes,
            }
            | Self::Split {
                start_position,
                curvature,
                lanes,
            } => vec![
                ("start_position", ArgValue::Float(start_position)),
                ("curvature", ArgValue::Float(curvature)),
                ("lanes", ArgValue::Int(lanes)),
            ],
        }
    }
}

/// Vehicle constructor arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleArgs {
    /// Index of the road the vehicle spawns on.
    pub road_id: usize,
    /// Longitudinal spawn position.
    pub init_s: f64,
    /// Lateral spawn position (negative is to the right of the reference line).
    pub init_t: f64,
    /// Initial speed.
    pub init_speed: f64,
}

impl VehicleArgs {
    pub(crate) fn from_named(named: &[(&str, ArgValue)]) -> Result<Self, CatalogError> {
        Ok(Self {
            road_id: lookup(named, "road_id")?.as_i64().max(0) as usize,
            init_s: lookup(named, "init_s")?.as_f64(),
            init_t: lookup(named, "init_t")?.as_f64(),
            init_speed: lookup(named, "init_speed")?.as_f64(),
        })
    }

    /// Named arguments, in declaration order.
    #[must_use]
    pub fn values(&self) -> Vec<(&'static str, ArgValue)> {
        vec![
            ("road_id", ArgValue::Int(self.road_id as i64)),
            ("init_s", ArgValue::Float(self.init_s)),
            ("init_t", ArgValue::Float(self.init_t)),
            ("init_speed", ArgValue::Float(self.init_speed)),
        ]
    }
}

/// Kind of a vehicle maneuver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManeuverKind {
    /// Change speed.
    Speed,
    /// Change lane.
    LaneChange,
    /// Drift laterally within the lane.
    LaneOffset,
}

impl ManeuverKind {
    /// Catalog name of the action.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Speed => "speedAction",
            Self::LaneChange => "laneChangeAction",
            Self::LaneOffset => "laneOffsetAction",
        }
    }

    /// Look up the action by catalog name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "speedAction" => Some(Self::Speed),
            "laneChangeAction" => Some(Self::LaneChange),
            "laneOffsetAction" => Some(Self::LaneOffset),
            _ => None,
        }
    }
}

/// Vehicle maneuver with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Maneuver {
    /// Accelerate towards `target_speed`.
    Speed {
        /// Speed to reach.
        target_speed: f64,
        /// Acceleration rate.
        rate: f64,
        /// Simulation time of the trigger.
        trigger_time: f64,
    },
    /// Move to the adjacent lane.
    LaneChange {
        /// `-1` or `1`.
        relative_target_lane: i64,
        /// Lateral offset inside the target lane.
        target_lane_offset: f64,
        /// Duration of the change.
        lane_change_time: f64,
        /// Simulation time of the trigger.
        trigger_time: f64,
    },
    /// Drift laterally.
    LaneOffset {
        /// Lateral distance.
        offset_distance: f64,
        /// Lateral acceleration cap.
        max_lateral_acc: f64,
        /// Simulation time of the trigger.
        trigger_time: f64,
    },
}

impl Maneuver {
    /// Maneuver kind.
    #[must_use]
    pub fn kind(&self) -> ManeuverKind {
        match self {
            Self::Speed { .. } => ManeuverKind::Speed,
            Self::LaneChange { .. } => ManeuverKind::LaneChange,
            Self::LaneOffset { .. } => ManeuverKind::LaneOffset,
        }
    }

    /// Named arguments, in declaration order.
    #[must_use]
    pub fn values(&self) -> Vec<(&'static str, ArgValue)> {
        match *self {
            Self::Speed {
                target_speed,
                rate,
                trigger_time,
            } => vec![
                ("target_speed", ArgValue::Float(target_speed)),
                ("rate", ArgValue::Float(rate)),
                ("trigger_time", ArgValue::Float(trigger_time)),
            ],
            Self::LaneChange {
                relative_target_lane,
                target_lane_offset,
                lane_change_time,
                trigger_time,
            } => vec![
                ("relative_target_lane", ArgValue::Int(relative_target_lane)),
                ("target_lane_offset", ArgValue::Float(target_lane_offset)),
                ("lane_change_time", ArgValue::Float(lane_change_time)),
                ("trigger_time", ArgValue::Float(trigger_time)),
            ],
            Self::LaneOffset {
                offset_distance,
                max_lateral_acc,
                trigger_time,
            } => vec![
                ("offset_distance", ArgValue::Float(offset_distance)),
                ("max_lateral_acc", ArgValue::Float(max_lateral_acc)),
                ("trigger_time", ArgValue::Float(trigger_time)),
            ],
        }
    }

    pub(crate) fn float_params_mut(&mut self) -> Vec<(&'static str, &mut f64)> {
        match self {
            Self::Speed {
                target_speed,
                rate,
                trigger_time,
            } => vec![
                ("target_speed", target_speed),
                ("rate", rate),
                ("trigger_time", trigger_time),
            ],
            Self::LaneChange {
                target_lane_offset,
                lane_change_time,
                trigger_time,
                ..
            } => vec![
                ("target_lane_offset", target_lane_offset),
                ("lane_change_time", lane_change_time),
                ("trigger_time", trigger_time),
            ],
            Self::LaneOffset {
                offset_distance,
                max_lateral_acc,
                trigger_time,
            } => vec![
                ("offset_distance", offset_distance),
                ("max_lateral_acc", max_lateral_acc),
                ("trigger_time", trigger_time),
            ],
        }
    }

    pub(crate) fn int_params_mut(&mut self) -> Vec<(&'static str, &mut i64)> {
        match self {
            Self::LaneChange {
                relative_target_lane,
                ..
            } => vec![("relative_target_lane", relative_target_lane)],
            Self::Speed { .. } | Self::LaneOffset { .. } => Vec::new(),
        }
    }
}

/// One line of a test case program.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `roadN = Road(...)`.
    RoadConstructor {
        /// Assigned road.
        road: RoadId,
        /// Constructor arguments.
        args: RoadArgs,
    },
    /// `roadN.<shape>(...)`.
    RoadAction {
        /// Road the action applies to.
        callee: RoadId,
        /// Shape change.
        shape: RoadShape,
    },
    /// `Ego = NPC(...)` or `npcN = NPC(...)`.
    VehicleConstructor {
        /// Assigned vehicle.
        vehicle: VehicleId,
        /// Constructor arguments.
        args: VehicleArgs,
    },
    /// `npcN.<maneuver>(...)`.
    VehicleAction {
        /// Vehicle performing the maneuver.
        callee: VehicleId,
        /// Maneuver.
        maneuver: Maneuver,
    },
}

impl Statement {
    /// Whether this statement belongs to the road prefix.
    #[must_use]
    pub fn is_road(&self) -> bool {
        matches!(self, Self::RoadConstructor { .. } | Self::RoadAction { .. })
    }

    /// Whether this statement constructs an entity.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        matches!(
            self,
            Self::RoadConstructor { .. } | Self::VehicleConstructor { .. }
        )
    }

    /// Whether this statement invokes an action.
    #[must_use]
    pub fn is_action(&self) -> bool {
        !self.is_constructor()
    }

    /// Class name for constructors, action name for actions.
    #[must_use]
    pub fn callable_name(&self) -> &'static str {
        match self {
            Self::RoadConstructor { .. } => ROAD_CLASS,
            Self::VehicleConstructor { .. } => NPC_CLASS,
            Self::RoadAction { shape, .. } => shape.kind().name(),
            Self::VehicleAction { maneuver, .. } => maneuver.kind().name(),
        }
    }

    /// Entity the statement assigns or acts upon, as rendered.
    #[must_use]
    pub fn target_name(&self) -> String {
        match self {
            Self::RoadConstructor { road: id, .. } | Self::RoadAction { callee: id, .. } => {
                id.to_string()
            }
            Self::VehicleConstructor { vehicle: id, .. }
            | Self::VehicleAction { callee: id, .. } => id.to_string(),
        }
    }

    /// Named arguments, in declaration order.
    #[must_use]
    pub fn values(&self) -> Vec<(&'static str, ArgValue)> {
        match self {
            Self::RoadConstructor { args, .. } => args.values(),
            Self::RoadAction { shape, .. } => shape.values(),
            Self::VehicleConstructor { args, .. } => args.values(),
            Self::VehicleAction { maneuver, .. } => maneuver.values(),
        }
    }
}
