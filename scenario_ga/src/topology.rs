// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lane-count legality of adjacent road segments.

use crate::{
    range::Bounds,
    statement::{RoadArgs, RoadShape, RoadShapeKind},
};

/// Lane counts at the two ends of a road segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneSpan {
    /// Lanes at the start of the segment.
    pub entry: i64,
    /// Lanes at the end of the segment.
    pub exit: i64,
}

/// Road constructor together with its optional shape change.
#[derive(Debug, Clone, Copy)]
pub struct Segment<'a> {
    /// Constructor arguments.
    pub road: &'a RoadArgs,
    /// Shape-change action, if any.
    pub shape: Option<&'a RoadShape>,
}

impl<'a> Segment<'a> {
    /// Bundle a road with its shape.
    #[must_use]
    pub fn new(road: &'a RoadArgs, shape: Option<&'a RoadShape>) -> Self {
        Self { road, shape }
    }

    /// Lane counts at both ends.
    #[must_use]
    pub fn lanes(&self) -> LaneSpan {
        lane_span(self.road, self.shape)
    }

    fn kind(&self) -> Option<RoadShapeKind> {
        self.shape.map(RoadShape::kind)
    }
}

/// Entry and exit lane counts of a road with an optional shape change.
#[must_use]
pub fn lane_span(road: &RoadArgs, shape: Option<&RoadShape>) -> LaneSpan {
    let n = road.lane_num;
    match shape {
        None => LaneSpan { entry: n, exit: n },
        Some(RoadShape::Contract { .. }) => LaneSpan {
            entry: n,
            exit: n - 1,
        },
        Some(RoadShape::Expand { .. }) => LaneSpan {
            entry: n,
            exit: n + 1,
        },
        Some(&RoadShape::Merge { lanes, .. }) => LaneSpan {
            entry: n - lanes,
            exit: n,
        },
        Some(&RoadShape::Split { lanes, .. }) => LaneSpan {
            entry: n,
            exit: n - lanes,
        },
    }
}

/// Whether `succ` may directly follow `pre`.
#[must_use]
pub fn check_validity(pre: Segment<'_>, succ: Segment<'_>) -> bool {
    let p = pre.lanes();
    let s = succ.lanes();
    if (p.exit - s.entry).abs() >= 2 {
        return false;
    }
    match (pre.kind(), succ.kind()) {
        (
            Some(RoadShapeKind::Merge | RoadShapeKind::Split),
            Some(RoadShapeKind::Merge | RoadShapeKind::Split),
        ) => false,
        // Lanes joining the successor must not meet a deforming predecessor.
        (Some(_), Some(RoadShapeKind::Merge)) => false,
        (pre_kind, Some(RoadShapeKind::Split)) => {
            s.entry >= p.exit && !(s.entry == p.exit && pre_kind == Some(RoadShapeKind::Contract))
        }
        _ => true,
    }
}

/// Whether `cur` is legal between its optional neighbours.
#[must_use]
pub fn check_neighbors(
    pre: Option<Segment<'_>>,
    cur: Segment<'_>,
    succ: Option<Segment<'_>>,
) -> bool {
    pre.is_none_or(|p| check_validity(p, cur)) && succ.is_none_or(|s| check_validity(cur, s))
}

/// Whether a shape change of the given kind can be applied to a road
/// with `lane_num` lanes, given the global lane-count bounds.
#[must_use]
pub fn shape_applicable(kind: RoadShapeKind, lane_num: i64, lanes: Bounds<i64>) -> bool {
    match kind {
        RoadShapeKind::Contract => lane_num > lanes.min,
        RoadShapeKind::Expand => lane_num < lanes.max,
        RoadShapeKind::Merge | RoadShapeKind::Split => lane_num >= 3,
    }
}

/// Lane counts a shapeless road may take between its neighbours.
/// `None` when the neighbours leave no room.
#[must_use]
pub fn legal_lane_range(
    pre: Option<Segment<'_>>,
    succ: Option<Segment<'_>>,
    lanes: Bounds<i64>,
) -> Option<Bounds<i64>> {
    let mut lo = lanes.min;
    let mut hi = lanes.max;
    if let Some(p) = pre {
        let exit = p.lanes().exit;
        lo = lo.max(exit - 1);
        hi = hi.min(exit + 1);
    }
    if let Some(s) = succ {
        let entry = s.lanes().entry;
        lo = lo.max(entry - 1);
        hi = hi.min(entry + 1);
        if s.kind() == Some(RoadShapeKind::Split) {
            hi = hi.min(entry);
        }
    }
    (lo <= hi).then_some(Bounds::new(lo, hi))
}
