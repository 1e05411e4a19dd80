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

//! Helpers for building test tables.

use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};

use crate::batch::Batch;
use crate::datasource::{DataSource, MemTable};

/// Batch with three `Int64` columns
pub fn build_table_i64(
    a: (&str, &Vec<i64>),
    b: (&str, &Vec<i64>),
    c: (&str, &Vec<i64>),
) -> Batch {
    let schema = Schema::new(vec![
        Field::new(a.0, DataType::Int64, false),
        Field::new(b.0, DataType::Int64, false),
        Field::new(c.0, DataType::Int64, false),
    ]);
    Batch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(Int64Array::from(a.1.clone())),
            Arc::new(Int64Array::from(b.1.clone())),
            Arc::new(Int64Array::from(c.1.clone())),
        ],
    )
    .unwrap()
}

/// Batch with three nullable `Int64` columns
pub fn build_table_i64_with_nulls(
    a: (&str, &Vec<Option<i64>>),
    b: (&str, &Vec<Option<i64>>),
    c: (&str, &Vec<Option<i64>>),
) -> Batch {
    let schema = Schema::new(vec![
        Field::new(a.0, DataType::Int64, true),
        Field::new(b.0, DataType::Int64, true),
        Field::new(c.0, DataType::Int64, true),
    ]);
    Batch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(Int64Array::from(a.1.clone())) as ArrayRef,
            Arc::new(Int64Array::from(b.1.clone())),
            Arc::new(Int64Array::from(c.1.clone())),
        ],
    )
    .unwrap()
}

/// Memory table scan wrapped around a single batch
pub fn build_table_scan(batch: Batch) -> Arc<dyn DataSource> {
    Arc::new(MemTable::from_batch(batch))
}
