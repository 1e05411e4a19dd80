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

//! Per-partition column summaries.

use arrow::array::Array;

use crate::batch::Batch;
use crate::error::Result;
use crate::exec_err;

/// Observed value range of one column within one partition
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnStats {
    pub column: String,
    pub min: i64,
    pub max: i64,
}

impl ColumnStats {
    pub fn new(column: impl Into<String>, min: i64, max: i64) -> Self {
        Self {
            column: column.into(),
            min,
            max,
        }
    }
}

/// Min and max of a column, by a full scan
pub fn min_max(batch: &Batch, column: &str) -> Result<ColumnStats> {
    let array = batch.int64_column_by_name(column)?;
    if array.is_empty() {
        return exec_err!("cannot summarise column {column} of an empty partition");
    }
    let min = arrow::compute::min(array);
    let max = arrow::compute::max(array);
    match (min, max) {
        (Some(min), Some(max)) => Ok(ColumnStats::new(column, min, max)),
        _ => exec_err!("cannot summarise all-null column {column}"),
    }
}

/// Min and max of a column already sorted ascending, read from its first
/// and last rows. The precondition is only checked in debug builds.
pub fn min_max_on_sorted(batch: &Batch, column: &str) -> Result<ColumnStats> {
    let array = batch.int64_column_by_name(column)?;
    if array.is_empty() {
        return exec_err!("cannot summarise column {column} of an empty partition");
    }
    debug_assert!(
        array.values().windows(2).all(|pair| pair[0] <= pair[1]),
        "column {column} is not sorted ascending"
    );
    Ok(ColumnStats::new(
        column,
        array.value(0),
        array.value(array.len() - 1),
    ))
}
