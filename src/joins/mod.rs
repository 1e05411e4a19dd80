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

//! Join implementations: the inequality join kernels, the partition
//! summariser and pruner, and the partitioned driver.

use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

use crate::batch::Batch;
use crate::error::Result;
use crate::expr::InequalityPredicate;

pub mod ie_join;
pub mod min_max;
pub mod partitioned;
pub mod prune;

pub use ie_join::{ie_join, ie_self_join};
pub use min_max::{min_max, min_max_on_sorted, ColumnStats};
pub use partitioned::{IEJoinOptions, PartitionedIEJoin};
pub use prune::{virtual_cross_join, PartitionStats, PruneMode};

/// Name of the row id column every join input carries. Ids are reported
/// in the join output and must be unique within a relation.
pub const ROW_ID: &str = "id";

/// Schema of the join output: one row per matching id pair
pub fn output_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("left_id", DataType::Int64, false),
        Field::new("right_id", DataType::Int64, false),
    ]))
}

/// Build an output batch from matched id pairs
pub fn output_batch(pairs: &[(i64, i64)]) -> Result<Batch> {
    let left: ArrayRef =
        Arc::new(Int64Array::from_iter_values(pairs.iter().map(|p| p.0)));
    let right: ArrayRef =
        Arc::new(Int64Array::from_iter_values(pairs.iter().map(|p| p.1)));
    Batch::try_new(output_schema(), vec![left, right])
}

/// Naive nested loop join over two relations.
///
/// Quadratic; retained as the reference the optimized kernels are
/// checked against and as the safety oracle for pruning tests.
pub fn loop_join(
    left: &Batch,
    right: &Batch,
    predicates: &[InequalityPredicate; 2],
) -> Result<Vec<(i64, i64)>> {
    let left_ids = left.int64_column_by_name(ROW_ID)?;
    let right_ids = right.int64_column_by_name(ROW_ID)?;
    let left_columns = [
        left.int64_column_by_name(&predicates[0].lhs)?,
        left.int64_column_by_name(&predicates[1].lhs)?,
    ];
    let right_columns = [
        right.int64_column_by_name(&predicates[0].rhs)?,
        right.int64_column_by_name(&predicates[1].rhs)?,
    ];
    let mut matches = Vec::new();
    for i in 0..left.row_count() {
        for j in 0..right.row_count() {
            let matching = predicates.iter().zip(left_columns).zip(right_columns).all(
                |((predicate, l), r)| predicate.op.evaluate(l.value(i), r.value(j)),
            );
            if matching {
                matches.push((left_ids.value(i), right_ids.value(j)));
            }
        }
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Operator;

    #[test]
    fn loop_join_applies_both_predicates() {
        let left = Batch::from_rows(
            &["id", "x", "y"],
            &[vec![0, 1, 10], vec![1, 2, 20], vec![2, 3, 30]],
        )
        .unwrap();
        let right = Batch::from_rows(
            &["id", "x", "y"],
            &[vec![0, 3, 15], vec![1, 0, 100]],
        )
        .unwrap();
        let predicates = [
            InequalityPredicate::try_new(Operator::Lt, "x", "x").unwrap(),
            InequalityPredicate::try_new(Operator::Gt, "y", "y").unwrap(),
        ];
        // only (id 1, id 0) satisfies x < x' and y > y'
        assert_eq!(
            loop_join(&left, &right, &predicates).unwrap(),
            vec![(1, 0)]
        );
    }

    #[test]
    fn output_batch_has_two_id_columns() {
        let batch = output_batch(&[(1, 2), (3, 4)]).unwrap();
        assert_eq!(batch.schema(), output_schema());
        assert_eq!(batch.row(1).unwrap(), vec![3, 4]);
    }
}
