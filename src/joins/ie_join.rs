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

//! Single-partition inequality join kernels.
//!
//! [`ie_join`] evaluates `l.x op1 r.x' AND l.y op2 r.y'` over two
//! relations without a nested loop. For more detail on the algorithm,
//! see <https://vldb.org/pvldb/vol8/p2074-khayyat.pdf>
//!
//! Take this query as an example:
//!
//! ```sql
//! SELECT l.id, r.id
//! FROM events l, events r
//! WHERE l.time > r.time AND l.cost < r.cost
//! ```
//!
//! Both sides are sorted on the first predicate column in the direction
//! that makes `op1` point "forward" in index space, and then on the
//! second column in the direction *opposite* to `op2`. A position column
//! attached between the two sorts yields the permutation between the two
//! orders, so the scan can move between first-key order (where the
//! offset array and the bitset live) and second-key order (the scan
//! index) in constant time.
//!
//! The scan walks the left side in second-key order. A moving frontier
//! deposits a bit for every right row whose second key has already
//! passed the `op2` test; the offset array gives, per left row, the
//! first right position that can pass the `op1` test. Every set bit at
//! or after that offset is a match. Output therefore costs one
//! `find_next` per emitted pair on top of the sorts.
//!
//! [`ie_self_join`] is the one-relation variant. It shares the skeleton
//! but cannot use a precomputed offset array: with duplicate first-key
//! values the equality offset is not a fixed 0 or 1, so the boundary is
//! found by scanning the neighbourhood of the current position instead.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, UInt64Array};
use arrow::compute::{lexsort_to_indices, take, SortColumn, SortOptions};
use arrow::datatypes::{Int64Type, UInt64Type};
use log::trace;

use crate::batch::Batch;
use crate::cancellation::CancellationToken;
use crate::error::{IEJoinError, Result};
use crate::expr::{InequalityPredicate, Operator};
use crate::joins::ROW_ID;

const ID_COL: usize = 0;
const X_COL: usize = 1;
const Y_COL: usize = 2;
const POS_COL: usize = 3;

/// Equal-length arrays sorted together by one of their columns.
#[derive(Debug)]
struct SortedBlock {
    arrays: Vec<ArrayRef>,
}

impl SortedBlock {
    fn new(arrays: Vec<ArrayRef>) -> Self {
        Self { arrays }
    }

    fn len(&self) -> usize {
        self.arrays[0].len()
    }

    /// Sort every array by the array at `key`. Stable: ties are broken
    /// by the pre-sort position, which the lexsort sees as a trailing
    /// key.
    fn sort_by(&mut self, key: usize, options: SortOptions) -> Result<()> {
        let positions: ArrayRef =
            Arc::new(UInt64Array::from_iter_values(0..self.len() as u64));
        let indices = lexsort_to_indices(
            &[
                SortColumn {
                    values: Arc::clone(&self.arrays[key]),
                    options: Some(options),
                },
                SortColumn {
                    values: positions,
                    options: None,
                },
            ],
            None,
        )?;
        self.arrays = self
            .arrays
            .iter()
            .map(|array| take(array.as_ref(), &indices, None))
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    fn push(&mut self, array: ArrayRef) {
        self.arrays.push(array);
    }

    fn int64_values(&self, index: usize) -> Vec<i64> {
        self.arrays[index].as_primitive::<Int64Type>().values().to_vec()
    }

    fn position_values(&self, index: usize) -> Vec<usize> {
        self.arrays[index]
            .as_primitive::<UInt64Type>()
            .values()
            .iter()
            .map(|p| *p as usize)
            .collect()
    }
}

/// Dense bit array with a word-skipping successor scan.
#[derive(Debug)]
pub(crate) struct BitArray {
    words: Vec<u64>,
    len: usize,
}

impl BitArray {
    /// Allocate `len` zeroed bits, surfacing allocation failure instead
    /// of aborting.
    pub(crate) fn try_new(len: usize) -> Result<Self> {
        let word_count = len.div_ceil(64);
        let mut words = Vec::new();
        words.try_reserve_exact(word_count).map_err(|_| {
            IEJoinError::ResourcesExhausted(format!(
                "cannot allocate bit array of {len} bits"
            ))
        })?;
        words.resize(word_count, 0);
        Ok(Self { words, len })
    }

    pub(crate) fn set(&mut self, index: usize) {
        debug_assert!(index < self.len);
        self.words[index >> 6] |= 1u64 << (index & 63);
    }

    pub(crate) fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len);
        self.words[index >> 6] & (1u64 << (index & 63)) != 0
    }

    /// Index of the first set bit at or after `from`, if any
    pub(crate) fn find_next(&self, from: usize) -> Option<usize> {
        if from >= self.len {
            return None;
        }
        let mut word_idx = from >> 6;
        let mut word = self.words[word_idx] & (u64::MAX << (from & 63));
        loop {
            if word != 0 {
                let index = (word_idx << 6) + word.trailing_zeros() as usize;
                return (index < self.len).then_some(index);
            }
            word_idx += 1;
            if word_idx == self.words.len() {
                return None;
            }
            word = self.words[word_idx];
        }
    }
}

/// For each left position `l`, the smallest right position whose first
/// key satisfies `op` against `l1[l]`, or `lr1.len()` if none does.
///
/// Both inputs are sorted in the direction given by `op`, so the
/// satisfying frontier only moves forward and one pass suffices.
fn offset_array(l1: &[i64], lr1: &[i64], op: Operator) -> Vec<usize> {
    let mut offsets = vec![lr1.len(); l1.len()];
    let mut r = 0;
    for (l, x) in l1.iter().enumerate() {
        while r < lr1.len() {
            if op.evaluate(*x, lr1[r]) {
                offsets[l] = r;
                break;
            }
            r += 1;
        }
    }
    offsets
}

fn validate_predicates(predicates: &[InequalityPredicate; 2]) -> Result<()> {
    for predicate in predicates {
        if !predicate.op.is_inequality() {
            return Err(IEJoinError::UnsupportedPredicate(format!(
                "join predicate must be an inequality, got {predicate}"
            )));
        }
    }
    Ok(())
}

/// Project a relation to its id and the two predicate columns, checking
/// the columns exist and are `Int64`.
fn project_block(batch: &Batch, x: &str, y: &str) -> Result<SortedBlock> {
    batch.int64_column_by_name(ROW_ID)?;
    let x_column = batch.int64_column_by_name(x)?;
    let y_column = batch.int64_column_by_name(y)?;
    debug_assert_eq!(x_column.null_count(), 0);
    debug_assert_eq!(y_column.null_count(), 0);
    Ok(SortedBlock::new(vec![
        Arc::clone(batch.column_by_name(ROW_ID)?),
        Arc::clone(batch.column_by_name(x)?),
        Arc::clone(batch.column_by_name(y)?),
    ]))
}

fn positions(n: usize) -> ArrayRef {
    Arc::new(UInt64Array::from_iter_values(0..n as u64))
}

/// Second-key sort direction: opposite to `op2`, so the deposit frontier
/// in the scan is monotone.
fn second_sort_options(op2: Operator) -> SortOptions {
    SortOptions {
        descending: !op2.is_descending(),
        nulls_first: false,
    }
}

/// Join two relations on a pair of inequality predicates, returning the
/// matching `(left id, right id)` pairs.
///
/// Rows must not be null in the predicate columns; the driver filters
/// them out beforehand.
pub fn ie_join(
    left: &Batch,
    right: &Batch,
    predicates: &[InequalityPredicate; 2],
    cancel: Option<&CancellationToken>,
) -> Result<Vec<(i64, i64)>> {
    validate_predicates(predicates)?;
    let m = left.row_count();
    let n = right.row_count();
    if m == 0 || n == 0 {
        return Ok(vec![]);
    }
    let op1 = predicates[0].op;
    let op2 = predicates[1].op;
    let sort1 = op1.to_sort_options();
    let sort2 = second_sort_options(op2);

    let mut l = project_block(left, &predicates[0].lhs, &predicates[1].lhs)?;
    let mut r = project_block(right, &predicates[0].rhs, &predicates[1].rhs)?;

    l.sort_by(X_COL, sort1)?;
    let l1 = l.int64_values(X_COL);
    l.push(positions(m));

    r.sort_by(X_COL, sort1)?;
    let lr1 = r.int64_values(X_COL);
    // right ids are reported in first-key order, where the bitset lives
    let lk = r.int64_values(ID_COL);
    r.push(positions(n));

    l.sort_by(Y_COL, sort2)?;
    let l2 = l.int64_values(Y_COL);
    let li = l.int64_values(ID_COL);
    let p = l.position_values(POS_COL);

    r.sort_by(Y_COL, sort2)?;
    let r2 = r.int64_values(Y_COL);
    let pr = r.position_values(POS_COL);

    let o1 = offset_array(&l1, &lr1, op1);
    let mut bits = BitArray::try_new(n)?;

    let mut matches = Vec::new();
    let mut off2 = 0;
    for i in 0..m {
        if let Some(token) = cancel {
            token.check()?;
        }
        // deposit every right row whose second key has passed the test
        while off2 < n && op2.evaluate(l2[i], r2[off2]) {
            bits.set(pr[off2]);
            off2 += 1;
        }
        let mut off1 = o1[p[i]];
        while let Some(k) = bits.find_next(off1) {
            matches.push((li[i], lk[k]));
            off1 = k + 1;
        }
    }
    trace!(
        "ie_join produced {} pairs from {m} x {n} rows",
        matches.len()
    );
    Ok(matches)
}

/// Join a relation with itself on a pair of inequality predicates.
///
/// Semantically identical to [`ie_join`] with both sides equal, but the
/// single relation needs only one pair of sorts and one id array.
pub fn ie_self_join(
    input: &Batch,
    predicates: &[InequalityPredicate; 2],
    cancel: Option<&CancellationToken>,
) -> Result<Vec<(i64, i64)>> {
    validate_predicates(predicates)?;
    let n = input.row_count();
    if n == 0 {
        return Ok(vec![]);
    }
    let op1 = predicates[0].op;
    let op2 = predicates[1].op;

    let mut block = project_block(input, &predicates[0].lhs, &predicates[1].lhs)?;
    block.sort_by(X_COL, op1.to_sort_options())?;
    let l1 = block.int64_values(X_COL);
    // ids in first-key order; both sides of a pair are reported from it
    let ids = block.int64_values(ID_COL);
    block.push(positions(n));

    block.sort_by(Y_COL, second_sort_options(op2))?;
    let l2 = block.int64_values(Y_COL);
    let p = block.position_values(POS_COL);

    let mut bits = BitArray::try_new(n)?;
    let mut matches = Vec::new();
    let mut off2 = 0;
    for i in 0..n {
        if let Some(token) = cancel {
            token.check()?;
        }
        while off2 < n && op2.evaluate(l2[i], l2[off2]) {
            bits.set(p[off2]);
            off2 += 1;
        }
        let pos = p[i];
        // runs of equal first-key values make the equality offset
        // variable; walk to the boundary where op1 starts to hold
        let mut off1 = pos;
        while off1 > 0 && op1.evaluate(l1[off1], l1[pos]) {
            off1 -= 1;
        }
        while off1 < n && !op1.evaluate(l1[pos], l1[off1]) {
            off1 += 1;
        }
        while let Some(k) = bits.find_next(off1) {
            matches.push((ids[pos], ids[k]));
            off1 = k + 1;
        }
    }
    trace!("ie_self_join produced {} pairs from {n} rows", matches.len());
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joins::loop_join;

    fn sort_pairs(mut pairs: Vec<(i64, i64)>) -> Vec<(i64, i64)> {
        pairs.sort_unstable();
        pairs
    }

    fn predicates(
        op1: Operator,
        op2: Operator,
    ) -> [InequalityPredicate; 2] {
        [
            InequalityPredicate::try_new(op1, "x", "x").unwrap(),
            InequalityPredicate::try_new(op2, "y", "y").unwrap(),
        ]
    }

    #[test]
    fn bit_array_set_and_find_next() {
        let mut bits = BitArray::try_new(150).unwrap();
        assert_eq!(bits.find_next(0), None);
        bits.set(0);
        bits.set(63);
        bits.set(64);
        bits.set(149);
        assert!(bits.get(63));
        assert!(!bits.get(62));
        assert_eq!(bits.find_next(0), Some(0));
        assert_eq!(bits.find_next(1), Some(63));
        assert_eq!(bits.find_next(64), Some(64));
        assert_eq!(bits.find_next(65), Some(149));
        assert_eq!(bits.find_next(150), None);
        assert_eq!(bits.find_next(9999), None);
    }

    #[test]
    fn offset_array_finds_first_satisfying_position() {
        // ascending inputs for <: first strictly greater element
        let l1 = vec![1, 2, 3, 5];
        let lr1 = vec![0, 1, 2, 3];
        assert_eq!(offset_array(&l1, &lr1, Operator::Lt), vec![2, 3, 4, 4]);
        assert_eq!(offset_array(&l1, &lr1, Operator::LtEq), vec![1, 2, 3, 4]);

        // descending inputs for >
        let l1 = vec![9, 5, 1];
        let lr1 = vec![8, 5, 2];
        assert_eq!(offset_array(&l1, &lr1, Operator::Gt), vec![0, 2, 3]);
        assert_eq!(offset_array(&l1, &lr1, Operator::GtEq), vec![0, 1, 3]);
    }

    #[test]
    fn self_join_matches_loop_join() {
        // time/cost rows with a mix of orders
        let table = Batch::from_rows(
            &["id", "x", "y"],
            &[
                vec![0, 100, 6],
                vec![1, 140, 11],
                vec![2, 80, 10],
                vec![3, 90, 5],
            ],
        )
        .unwrap();
        let preds = predicates(Operator::Gt, Operator::Lt);
        let expected = sort_pairs(loop_join(&table, &table, &preds).unwrap());
        let actual = sort_pairs(ie_self_join(&table, &preds, None).unwrap());
        assert_eq!(actual, expected);
        assert_eq!(actual, vec![(0, 2), (3, 2)]);
    }

    #[test]
    fn self_join_with_duplicate_keys_matches_loop_join() {
        let table = Batch::from_rows(
            &["id", "x", "y"],
            &[
                vec![0, 5, 1],
                vec![1, 5, 2],
                vec![2, 5, 3],
                vec![3, 4, 0],
                vec![4, 6, 4],
            ],
        )
        .unwrap();
        for op1 in [Operator::Lt, Operator::LtEq, Operator::Gt, Operator::GtEq] {
            for op2 in [Operator::Lt, Operator::LtEq, Operator::Gt, Operator::GtEq] {
                let preds = predicates(op1, op2);
                let expected =
                    sort_pairs(loop_join(&table, &table, &preds).unwrap());
                let actual =
                    sort_pairs(ie_self_join(&table, &preds, None).unwrap());
                assert_eq!(actual, expected, "operators {op1} {op2}");
            }
        }
    }

    #[test]
    fn two_relation_join_matches_loop_join() {
        let left = Batch::from_rows(
            &["id", "x", "y"],
            &[
                vec![0, 5, 0],
                vec![1, 6, 1],
                vec![2, 7, 2],
                vec![3, 1, 3],
                vec![4, 2, 4],
                vec![5, 3, 5],
            ],
        )
        .unwrap();
        let right = Batch::from_rows(
            &["id", "x", "y"],
            &[vec![0, 0, 0], vec![1, 2, 1], vec![2, 3, 7], vec![3, 1, 8]],
        )
        .unwrap();
        let preds = predicates(Operator::Lt, Operator::Gt);
        let expected = sort_pairs(loop_join(&left, &right, &preds).unwrap());
        let actual = sort_pairs(ie_join(&left, &right, &preds, None).unwrap());
        assert_eq!(actual, expected);
        assert_eq!(actual, vec![(3, 1)]);
    }

    #[test]
    fn all_operator_combinations_match_loop_join() {
        let left = Batch::from_rows(
            &["id", "x", "y"],
            &[
                vec![0, 2, 9],
                vec![1, 2, 1],
                vec![2, 7, 4],
                vec![3, 4, 4],
                vec![4, 0, 0],
            ],
        )
        .unwrap();
        let right = Batch::from_rows(
            &["id", "x", "y"],
            &[
                vec![0, 2, 4],
                vec![1, 5, 9],
                vec![2, 0, 4],
                vec![3, 7, 0],
            ],
        )
        .unwrap();
        for op1 in [Operator::Lt, Operator::LtEq, Operator::Gt, Operator::GtEq] {
            for op2 in [Operator::Lt, Operator::LtEq, Operator::Gt, Operator::GtEq] {
                let preds = predicates(op1, op2);
                let expected =
                    sort_pairs(loop_join(&left, &right, &preds).unwrap());
                let actual =
                    sort_pairs(ie_join(&left, &right, &preds, None).unwrap());
                assert_eq!(actual, expected, "operators {op1} {op2}");
            }
        }
    }

    #[test]
    fn empty_inputs_produce_no_pairs() {
        let table =
            Batch::from_rows(&["id", "x", "y"], &[vec![0, 1, 2]]).unwrap();
        let empty = Batch::from_rows(&["id", "x", "y"], &[]).unwrap();
        let preds = predicates(Operator::Lt, Operator::Gt);
        assert!(ie_join(&table, &empty, &preds, None).unwrap().is_empty());
        assert!(ie_join(&empty, &table, &preds, None).unwrap().is_empty());
        assert!(ie_self_join(&empty, &preds, None).unwrap().is_empty());
    }

    #[test]
    fn single_row_sides_match() {
        let left = Batch::from_rows(&["id", "x", "y"], &[vec![7, 1, 9]]).unwrap();
        let right = Batch::from_rows(&["id", "x", "y"], &[vec![8, 2, 3]]).unwrap();
        let preds = predicates(Operator::Lt, Operator::Gt);
        assert_eq!(
            ie_join(&left, &right, &preds, None).unwrap(),
            vec![(7, 8)]
        );
    }

    #[test]
    fn ties_on_first_key() {
        let rows: Vec<Vec<i64>> =
            (0..4).map(|i| vec![i, 42, i]).collect();
        let table = Batch::from_rows(&["id", "x", "y"], &rows).unwrap();
        // strict inequality on a constant column matches nothing
        let strict = predicates(Operator::Lt, Operator::Gt);
        assert!(ie_join(&table, &table, &strict, None).unwrap().is_empty());
        // loose inequality reduces the join to the second predicate
        let loose = predicates(Operator::LtEq, Operator::Gt);
        let expected = sort_pairs(loop_join(&table, &table, &loose).unwrap());
        let actual = sort_pairs(ie_join(&table, &table, &loose, None).unwrap());
        assert_eq!(actual, expected);
        assert_eq!(actual.len(), 6);
    }

    #[test]
    fn unsupported_predicate_is_rejected() {
        let table =
            Batch::from_rows(&["id", "x", "y"], &[vec![0, 1, 2]]).unwrap();
        let preds = [
            InequalityPredicate {
                op: Operator::And,
                lhs: "x".to_string(),
                rhs: "x".to_string(),
            },
            InequalityPredicate::try_new(Operator::Gt, "y", "y").unwrap(),
        ];
        let err = ie_join(&table, &table, &preds, None).unwrap_err();
        assert!(matches!(err, IEJoinError::UnsupportedPredicate(_)));
    }

    #[test]
    fn cancelled_token_stops_the_scan() {
        let rows: Vec<Vec<i64>> = (0..64).map(|i| vec![i, i, -i]).collect();
        let table = Batch::from_rows(&["id", "x", "y"], &rows).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let preds = predicates(Operator::Lt, Operator::Gt);
        let err = ie_join(&table, &table, &preds, Some(&token)).unwrap_err();
        assert!(matches!(err, IEJoinError::Cancelled));
    }

    #[test]
    fn random_inputs_match_loop_join() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(31);
        for _ in 0..8 {
            let m = rng.gen_range(1..60);
            let n = rng.gen_range(1..60);
            let left_rows: Vec<Vec<i64>> = (0..m as i64)
                .map(|i| vec![i, rng.gen_range(0..10), rng.gen_range(0..10)])
                .collect();
            let right_rows: Vec<Vec<i64>> = (0..n as i64)
                .map(|i| {
                    vec![1000 + i, rng.gen_range(0..10), rng.gen_range(0..10)]
                })
                .collect();
            let left = Batch::from_rows(&["id", "x", "y"], &left_rows).unwrap();
            let right = Batch::from_rows(&["id", "x", "y"], &right_rows).unwrap();
            // the narrow value range forces heavy ties on both keys
            for op1 in [Operator::Lt, Operator::LtEq, Operator::Gt, Operator::GtEq]
            {
                for op2 in
                    [Operator::Lt, Operator::LtEq, Operator::Gt, Operator::GtEq]
                {
                    let preds = predicates(op1, op2);
                    assert_eq!(
                        sort_pairs(ie_join(&left, &right, &preds, None).unwrap()),
                        sort_pairs(loop_join(&left, &right, &preds).unwrap()),
                        "operators {op1} {op2}"
                    );
                }
            }
        }
    }
}
