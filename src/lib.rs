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

//! Inequality join engine.
//!
//! Evaluates joins whose predicate is a conjunction of two column
//! inequalities (`l.x < r.x AND l.y > r.y`) in time proportional to the
//! sort cost plus the output size, instead of the quadratic nested
//! loop. Inputs are partitioned, partition pairs whose value ranges
//! cannot match are pruned, and the surviving pairs run through a
//! sort-and-bitset kernel concurrently.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use iejoin::batch::Batch;
//! use iejoin::datasource::{DataSource, MemTable};
//! use iejoin::expr::col;
//! use iejoin::joins::{IEJoinOptions, PartitionedIEJoin};
//! use iejoin::plan::IEJoinPlan;
//!
//! let events = Batch::from_rows(
//!     &["id", "time", "cost"],
//!     &[vec![0, 100, 6], vec![1, 140, 11], vec![2, 80, 10], vec![3, 90, 5]],
//! )?;
//! let table: Arc<dyn DataSource> = Arc::new(MemTable::from_batch(events));
//!
//! // pairs of events where the first started later but cost less
//! let predicate = col("time").gt(col("time")).and(col("cost").lt(col("cost")));
//! let plan = IEJoinPlan::try_new(Arc::clone(&table), table, predicate, None)?;
//! let join = PartitionedIEJoin::new(plan, IEJoinOptions::default());
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let batches = runtime.block_on(join.collect())?;
//! let matches: usize = batches.iter().map(|b| b.row_count()).sum();
//! assert_eq!(matches, 2);
//! # Ok::<(), iejoin::error::IEJoinError>(())
//! ```

pub mod batch;
pub mod cancellation;
pub mod datasource;
pub mod error;
pub mod expr;
pub mod joins;
pub mod plan;
pub mod test_util;

pub use error::{IEJoinError, Result};
