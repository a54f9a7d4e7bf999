// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Catalog of constructible entities and their actions.
//!
//! The catalog is the only place that knows parameter *order*: argument
//! vectors coming from the outside are positional, and the catalog maps them
//! onto named, typed argument records.

use core::fmt::{self, Display};

use crate::statement::{ArgValue, ManeuverKind, RoadArgs, RoadShapeKind, VehicleArgs};

/// Class name of road entities.
pub const ROAD_CLASS: &str = "Road";
/// Class name of vehicle entities.
pub const NPC_CLASS: &str = "NPC";

/// Type of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Integer parameter (lane counts, road ids, lane directions).
    Int,
    /// Real-valued parameter.
    Float,
}

/// Named, typed parameter of a callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Parameter name, also used to look up its range in the configuration.
    pub name: String,
    /// Parameter type.
    pub kind: ParamKind,
}

/// Constructor or action signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callable {
    /// Callable name (`Road`, `contract`, `speedAction`, ...).
    pub name: String,
    /// Ordered parameter list.
    pub params: Vec<Param>,
}

impl Callable {
    fn new(name: &str, params: &[(&str, ParamKind)]) -> Self {
        Self {
            name: name.to_owned(),
            params: params
                .iter()
                .map(|&(name, kind)| Param {
                    name: name.to_owned(),
                    kind,
                })
                .collect(),
        }
    }

    fn bind(&self, values: &[f64]) -> Result<Vec<(&str, ArgValue)>, CatalogError> {
        if values.len() != self.params.len() {
            return Err(CatalogError::Arity {
                callable: self.name.clone(),
                expected: self.params.len(),
                got: values.len(),
            });
        }
        Ok(self
            .params
            .iter()
            .zip(values)
            .map(|(p, &v)| {
                let value = match p.kind {
                    ParamKind::Int => ArgValue::Int(v.round() as i64),
                    ParamKind::Float => ArgValue::Float(v),
                };
                (p.name.as_str(), value)
            })
            .collect())
    }
}

/// Constructor and actions of one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityCatalog {
    /// Entity class name.
    pub class_name: String,
    /// Constructor signature.
    pub constructor: Callable,
    /// Available actions, in declaration order.
    pub actions: Vec<Callable>,
}

/// Failure to type an argument vector or to accept a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Wrong number of positional arguments.
    Arity {
        /// Callable being bound.
        callable: String,
        /// Declared parameter count.
        expected: usize,
        /// Supplied argument count.
        got: usize,
    },
    /// Parameter required by the argument record is not declared.
    MissingParam(String),
    /// Action name the search does not know how to generate.
    UnknownAction(String),
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arity {
                callable,
                expected,
                got,
            } => write!(f, "{callable}: expected {expected} arguments, got {got}"),
            Self::MissingParam(name) => write!(f, "missing parameter {name:?}"),
            Self::UnknownAction(name) => write!(f, "unknown action {name:?}"),
        }
    }
}

impl core::error::Error for CatalogError {}

/// Available entities with their constructors and actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    /// Road segments.
    pub road: EntityCatalog,
    /// Vehicles (ego and NPCs).
    pub npc: EntityCatalog,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl Catalog {
    /// Catalog of the standard scenario description.
    #[must_use]
    pub fn standard() -> Self {
        use ParamKind::{Float, Int};
        Self {
            road: EntityCatalog {
                class_name: ROAD_CLASS.to_owned(),
                constructor: Callable::new(
                    ROAD_CLASS,
                    &[
                        ("curv_start", Float),
                        ("curv_end", Float),
                        ("length", Float),
                        ("lane_num", Int),
                        ("lane_width", Float),
                    ],
                ),
                actions: vec![
                    Callable::new(
                        "contract",
                        &[("start_position", Float), ("deformation_length", Float)],
                    ),
                    Callable::new(
                        "expand",
                        &[("start_position", Float), ("deformation_length", Float)],
                    ),
                    Callable::new(
                        "merge",
                        &[("start_position", Float), ("curvature", Float), ("lanes", Int)],
                    ),
                    Callable::new(
                        "split",
                        &[("start_position", Float), ("curvature", Float), ("lanes", Int)],
                    ),
                ],
            },
            npc: EntityCatalog {
                class_name: NPC_CLASS.to_owned(),
                constructor: Callable::new(
                    NPC_CLASS,
                    &[
                        ("road_id", Int),
                        ("init_s", Float),
                        ("init_t", Float),
                        ("init_speed", Float),
                    ],
                ),
                actions: vec![
                    Callable::new(
                        "speedAction",
                        &[("target_speed", Float), ("rate", Float), ("trigger_time", Float)],
                    ),
                    Callable::new(
                        "laneChangeAction",
                        &[
                            ("relative_target_lane", Int),
                            ("target_lane_offset", Float),
                            ("lane_change_time", Float),
                            ("trigger_time", Float),
                        ],
                    ),
                    Callable::new(
                        "laneOffsetAction",
                        &[
                            ("offset_distance", Float),
                            ("max_lateral_acc", Float),
                            ("trigger_time", Float),
                        ],
                    ),
                ],
            },
        }
    }

    /// Check that every declared action is one the search can generate.
    ///
    /// # Errors
    ///
    /// `validate` fails on unknown action names or when an entity declares no actions.
    pub fn validate(&self) -> Result<(), CatalogError> {
        for a in &self.road.actions {
            RoadShapeKind::from_name(&a.name)
                .ok_or_else(|| CatalogError::UnknownAction(a.name.clone()))?;
        }
        if self.npc.actions.is_empty() {
            return Err(CatalogError::MissingParam("NPC actions".to_owned()));
        }
        for a in &self.npc.actions {
            ManeuverKind::from_name(&a.name)
                .ok_or_else(|| CatalogError::UnknownAction(a.name.clone()))?;
        }
        Ok(())
    }

    /// Road shape-change actions available for generation.
    pub fn road_shapes(&self) -> Vec<RoadShapeKind> {
        self.road
            .actions
            .iter()
            .filter_map(|a| RoadShapeKind::from_name(&a.name))
            .collect()
    }

    /// Vehicle maneuvers available for generation.
    pub fn maneuvers(&self) -> Vec<ManeuverKind> {
        self.npc
            .actions
            .iter()
            .filter_map(|a| ManeuverKind::from_name(&a.name))
            .collect()
    }

    /// Type a positional road constructor argument vector.
    ///
    /// # Errors
    ///
    /// `road_args` fails on arity mismatch or when a road parameter is not declared.
    pub fn road_args(&self, values: &[f64]) -> Result<RoadArgs, CatalogError> {
        let bound = self.road.constructor.bind(values)?;
        RoadArgs::from_named(&bound)
    }

    /// Type a positional vehicle constructor argument vector.
    ///
    /// # Errors
    ///
    /// `vehicle_args` fails on arity mismatch or when a vehicle parameter is not declared.
    pub fn vehicle_args(&self, values: &[f64]) -> Result<VehicleArgs, CatalogError> {
        let bound = self.npc.constructor.bind(values)?;
        VehicleArgs::from_named(&bound)
    }
}

pub(crate) fn lookup(named: &[(&str, ArgValue)], name: &str) -> Result<ArgValue, CatalogError> {
    named
        .iter()
        .find(|(n, _)| *n == name)
        .map(|&(_, v)| v)
        .ok_or_else(|| CatalogError::MissingParam(name.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_is_valid() {
        let c = Catalog::standard();
        c.validate().unwrap();
        assert_eq!(c.road_shapes().len(), 4);
        assert_eq!(c.maneuvers().len(), 3);
    }

    #[test]
    fn typed_road_args() {
        let c = Catalog::standard();
        let r = c.road_args(&[-0.001, 0.002, 200.0, 6.0, 3.5]).unwrap();
        assert_eq!(r.lane_num, 6);
        assert_eq!(r.length, 200.0);
        assert_eq!(r.lane_width, 3.5);

        let err = c.road_args(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, CatalogError::Arity { expected: 5, got: 2, .. }));
    }

    #[test]
    fn typed_vehicle_args() {
        let c = Catalog::standard();
        let v = c.vehicle_args(&[1.0, 30.0, -11.5, 5.0]).unwrap();
        assert_eq!(v.road_id, 1);
        assert_eq!(v.init_t, -11.5);
    }

    #[test]
    fn unknown_action_rejected() {
        let mut c = Catalog::standard();
        c.npc.actions.push(Callable::new("teleport", &[]));
        assert_eq!(
            c.validate(),
            Err(CatalogError::UnknownAction("teleport".to_owned()))
        );
        // Unknown actions are never drawn.
        assert_eq!(c.maneuvers().len(), 3);
    }

    #[test]
    fn renamed_param_is_missing() {
        let mut c = Catalog::standard();
        c.road.constructor.params[2].name = "len".to_owned();
        let err = c.road_args(&[0.0, 0.0, 80.0, 3.0, 3.5]).unwrap_err();
        assert_eq!(err, CatalogError::MissingParam("length".to_owned()));
    }
}
