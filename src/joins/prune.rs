// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Virtual cross join: enumerate the partition pairs whose value ranges
//! could contain at least one matching row, so the expensive kernel only
//! runs on pairs that might produce output.

use log::debug;

use crate::expr::InequalityPredicate;
use crate::joins::min_max::ColumnStats;

/// Value ranges of the two predicate columns within one partition
#[derive(Clone, Debug)]
pub struct PartitionStats {
    /// Index of the partition on its side of the join
    pub index: usize,
    pub x: ColumnStats,
    pub y: ColumnStats,
}

impl PartitionStats {
    pub fn new(index: usize, x: ColumnStats, y: ColumnStats) -> Self {
        Self { index, x, y }
    }
}

/// How a partition pair is tested against one predicate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PruneMode {
    /// Operator-agnostic interval intersection:
    /// `max_l >= min_r && max_r >= min_l`. Admits only overlapping
    /// ranges, which can discard pairs whose ranges are disjoint but
    /// ordered the way the operator wants.
    Symmetric,
    /// Keyed on the operator direction: ascending operators survive iff
    /// `min_l <= max_r`, descending iff `max_l >= min_r`. Never discards
    /// a pair containing a match.
    #[default]
    Directional,
}

fn ranges_may_match(
    predicate: &InequalityPredicate,
    left: &ColumnStats,
    right: &ColumnStats,
    mode: PruneMode,
) -> bool {
    match mode {
        PruneMode::Symmetric => left.max >= right.min && right.max >= left.min,
        PruneMode::Directional => {
            if predicate.op.is_descending() {
                left.max >= right.min
            } else {
                left.min <= right.max
            }
        }
    }
}

/// Enumerate the `(left index, right index)` partition pairs that
/// survive the range test on both predicates.
pub fn virtual_cross_join(
    left: &[PartitionStats],
    right: &[PartitionStats],
    predicates: &[InequalityPredicate; 2],
    mode: PruneMode,
) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for l in left {
        for r in right {
            if ranges_may_match(&predicates[0], &l.x, &r.x, mode)
                && ranges_may_match(&predicates[1], &l.y, &r.y, mode)
            {
                pairs.push((l.index, r.index));
            }
        }
    }
    debug!(
        "virtual cross join kept {} of {} partition pairs",
        pairs.len(),
        left.len() * right.len()
    );
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Operator;

    fn stats(index: usize, x: (i64, i64), y: (i64, i64)) -> PartitionStats {
        PartitionStats::new(
            index,
            ColumnStats::new("x", x.0, x.1),
            ColumnStats::new("y", y.0, y.1),
        )
    }

    fn predicates(op1: Operator, op2: Operator) -> [InequalityPredicate; 2] {
        [
            InequalityPredicate::try_new(op1, "x", "x").unwrap(),
            InequalityPredicate::try_new(op2, "y", "y").unwrap(),
        ]
    }

    #[test]
    fn directional_keeps_ordered_disjoint_ranges() {
        // left entirely below right on x: every pair satisfies x < x'
        let left = vec![stats(0, (0, 1), (0, 10))];
        let right = vec![stats(0, (5, 6), (0, 10))];
        let preds = predicates(Operator::Lt, Operator::Gt);
        assert_eq!(
            virtual_cross_join(&left, &right, &preds, PruneMode::Directional),
            vec![(0, 0)]
        );
        // the symmetric test requires intersecting ranges and drops it
        assert!(
            virtual_cross_join(&left, &right, &preds, PruneMode::Symmetric)
                .is_empty()
        );
    }

    #[test]
    fn directional_prunes_impossible_pairs() {
        // left entirely above right on x: x < x' can never hold
        let left = vec![stats(0, (10, 12), (0, 10))];
        let right = vec![stats(0, (1, 2), (0, 10))];
        let preds = predicates(Operator::Lt, Operator::Gt);
        assert!(
            virtual_cross_join(&left, &right, &preds, PruneMode::Directional)
                .is_empty()
        );

        // flipping the operator direction makes the pair viable again
        let preds = predicates(Operator::Gt, Operator::Gt);
        assert_eq!(
            virtual_cross_join(&left, &right, &preds, PruneMode::Directional),
            vec![(0, 0)]
        );
    }

    #[test]
    fn both_predicates_must_be_consistent() {
        let left = vec![stats(3, (0, 5), (100, 110))];
        let right = vec![stats(7, (3, 9), (200, 210))];
        // x < x' is possible, y > y' is not: 110 < 200
        let preds = predicates(Operator::Lt, Operator::Gt);
        assert!(
            virtual_cross_join(&left, &right, &preds, PruneMode::Directional)
                .is_empty()
        );
        // y < y' keeps the pair, and the reported indices are the
        // partition indices, not positions in the stats slices
        let preds = predicates(Operator::Lt, Operator::Lt);
        assert_eq!(
            virtual_cross_join(&left, &right, &preds, PruneMode::Directional),
            vec![(3, 7)]
        );
    }

    #[test]
    fn symmetric_matches_on_overlap() {
        let left = vec![stats(0, (0, 5), (0, 5))];
        let right = vec![stats(0, (5, 9), (4, 9))];
        let preds = predicates(Operator::Lt, Operator::Gt);
        assert_eq!(
            virtual_cross_join(&left, &right, &preds, PruneMode::Symmetric),
            vec![(0, 0)]
        );
    }
}
