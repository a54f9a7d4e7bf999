// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! NSGA-II survival: non-dominated sorting and crowding distance.

use core::cmp::Ordering;

use crate::{chromosome::Chromosome, rand::DefaultRand};

/// Whether `a` Pareto-dominates `b` (minimization): no worse on every
/// objective and strictly better on at least one.
#[must_use]
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    let mut strictly = false;
    for (x, y) in a.iter().zip(b) {
        match x.total_cmp(y) {
            Ordering::Greater => return false,
            Ordering::Less => strictly = true,
            Ordering::Equal => {}
        }
    }
    strictly
}

/// Partition row indices into non-dominated fronts, best front first.
/// Indices inside a front are ascending.
#[must_use]
pub fn fast_non_dominated_sort<R: AsRef<[f64]>>(rows: &[R]) -> Vec<Vec<usize>> {
    let n = rows.len();
    let mut dominated_by = vec![0usize; n];
    let mut dominating: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        for j in i + 1..n {
            let (a, b) = (rows[i].as_ref(), rows[j].as_ref());
            if dominates(a, b) {
                dominating[i].push(j);
                dominated_by[j] += 1;
            } else if dominates(b, a) {
                dominating[j].push(i);
                dominated_by[i] += 1;
            }
        }
    }

    let mut fronts = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&i| dominated_by[i] == 0).collect();
    while !current.is_empty() {
        let mut next = Vec::new();
        for &i in &current {
            for &j in &dominating[i] {
                dominated_by[j] -= 1;
                if dominated_by[j] == 0 {
                    next.push(j);
                }
            }
        }
        next.sort_unstable();
        fronts.push(current);
        current = next;
    }
    fronts
}

/// Crowding distance of every row of one front.
///
/// On each objective the members holding the minimum or maximum value get
/// infinite distance, and every other member adds the normalized gap between
/// the nearest distinct values below and above its own. Objectives on which
/// the whole front is equal contribute nothing. The result does not depend on
/// row order.
#[must_use]
pub fn crowding_distance<R: AsRef<[f64]>>(front: &[R]) -> Vec<f64> {
    let n = front.len();
    let mut distance = vec![0.0; n];
    let objectives = front.iter().map(|r| r.as_ref().len()).min().unwrap_or(0);
    for m in 0..objectives {
        let mut values: Vec<f64> = front.iter().map(|r| r.as_ref()[m]).collect();
        values.sort_by(f64::total_cmp);
        values.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
        let (Some(&lo), Some(&hi)) = (values.first(), values.last()) else {
            continue;
        };
        let range = hi - lo;
        if !range.is_finite() || range <= 0.0 {
            continue;
        }
        for (d, row) in distance.iter_mut().zip(front) {
            let v = row.as_ref()[m];
            let rank = values.partition_point(|x| x.total_cmp(&v) == Ordering::Less);
            if rank == 0 || rank + 1 >= values.len() {
                *d = f64::INFINITY;
            } else {
                *d += (values[rank + 1] - values[rank - 1]) / range;
            }
        }
    }
    distance
}

/// Reduce `population` to at most `capacity` chromosomes, assigning rank and
/// crowding distance to every member of the fronts that were examined.
///
/// Fronts are taken whole while they fit; the first front that does not fit
/// contributes its most isolated members (largest crowding distance, ties in
/// random order) up to capacity, and later fronts are dropped.
pub fn survivors(population: Vec<Chromosome>, capacity: usize, rng: &mut DefaultRand) -> Vec<Chromosome> {
    let rows: Vec<&[f64]> = population.iter().map(Chromosome::fitness).collect();
    let fronts = fast_non_dominated_sort(&rows);
    log::debug!(
        "{} fronts, sizes {:?}",
        fronts.len(),
        fronts.iter().map(Vec::len).collect::<Vec<_>>()
    );

    let mut ranking: Vec<(usize, usize, f64)> = Vec::with_capacity(capacity);
    for (rank, front) in fronts.iter().enumerate() {
        if ranking.len() >= capacity {
            break;
        }
        let front_rows: Vec<&[f64]> = front.iter().map(|&i| rows[i]).collect();
        let crowding = crowding_distance(&front_rows);
        let mut members: Vec<(usize, f64)> = front.iter().copied().zip(crowding).collect();
        let room = capacity - ranking.len();
        if members.len() > room {
            rng.shuffle(&mut members);
            members.sort_by(|a, b| b.1.total_cmp(&a.1));
            members.truncate(room);
        }
        ranking.extend(members.into_iter().map(|(i, c)| (i, rank, c)));
    }

    let mut slots: Vec<Option<Chromosome>> = population.into_iter().map(Some).collect();
    ranking
        .into_iter()
        .filter_map(|(i, rank, crowding)| {
            let mut c = slots[i].take()?;
            c.set_rank(rank, crowding);
            Some(c)
        })
        .collect()
}
