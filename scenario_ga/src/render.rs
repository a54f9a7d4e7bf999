// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Canonical scenario text, used for logging, result records and bug
//! de-duplication.
//!
//! One statement per line, arguments sorted by name:
//!
//! ```text
//! road0 = Road(curv_end=0, curv_start=0, lane_num=3, lane_width=3.5, length=80)
//! road0.contract(deformation_length=20, start_position=50)
//! Ego = NPC(init_s=30, init_speed=5, init_t=-2, road_id=0)
//! npc1.speedAction(rate=1, target_speed=5, trigger_time=2)
//! ```

use crate::{math::lcs_len, statement::Statement, testcase::TestCase};

/// Render a single statement.
#[must_use]
pub fn render_statement(s: &Statement) -> String {
    let mut values = s.values();
    values.sort_by_key(|&(name, _)| name);
    let args = values
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sep = if s.is_constructor() { " = " } else { "." };
    format!("{}{sep}{}({args})", s.target_name(), s.callable_name())
}

/// Render a whole test case, one statement per line.
#[must_use]
pub fn render_test_case(tc: &TestCase) -> String {
    tc.statements()
        .iter()
        .map(render_statement)
        .collect::<Vec<_>>()
        .join("\n")
}

/// `2 * lcs / (len(a) + len(b))` over bytes; two empty texts are identical.
#[must_use]
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * lcs_len(a.as_bytes(), b.as_bytes()) as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use chaos_theory::check;

    use super::*;
    use crate::testcase::tests::sample;

    #[test]
    fn sample_text() {
        let text = render_test_case(&sample());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(
            lines[0],
            "road0 = Road(curv_end=0, curv_start=0, lane_num=3, lane_width=3.5, length=80)"
        );
        assert_eq!(lines[1], "road0.contract(deformation_length=20, start_position=50)");
        assert!(lines[3].starts_with("Ego = NPC(init_s=30, "));
        assert!(lines[4].starts_with("npc1 = NPC("));
        assert!(lines[6].starts_with("npc1.speedAction("));
        assert!(lines[9].starts_with("npc2.speedAction("));
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = sample();
        assert_eq!(a.render(), a.clone().render());
        assert_eq!(a.to_string(), a.render());
    }

    #[test]
    fn similarity() {
        assert_eq!(similarity_ratio("", ""), 1.0);
        assert_eq!(similarity_ratio("abc", ""), 0.0);
        assert_eq!(similarity_ratio("abcd", "abcd"), 1.0);
        assert!((similarity_ratio("abcd", "abxd") - 0.75).abs() < 1e-12);
    }

    #[test]
    fn similarity_bounds() {
        check(|src| {
            let a: String = src.any("a");
            let b: String = src.any("b");
            let r = similarity_ratio(&a, &b);
            assert!((0.0..=1.0).contains(&r));
            assert!((r - similarity_ratio(&b, &a)).abs() < 1e-12);
            assert_eq!(similarity_ratio(&a, &a), 1.0);
        });
    }
}
