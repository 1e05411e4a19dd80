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

//! Partitioned inequality join driver.
//!
//! The driver materialises both inputs, splits them into partitions,
//! summarises the predicate columns of every partition and runs the
//! kernel only on the partition pairs whose value ranges could contain a
//! match. Partition pairs are independent pure computations, so they are
//! dispatched concurrently on the runtime; the result is the
//! concatenation of the per-pair id pairs.
//!
//! Two partitioning strategies exist. Global sort orders each side by
//! one predicate column and cuts equal-row chunks, so one summary per
//! chunk is free (first/last row of the sort key). Sample range draws a
//! small sample of the left side's first predicate column, derives split
//! points from it and routes left rows into the resulting ranges, which
//! bounds each left partition by plan construction. Global sort is the
//! default; sample range takes over for large inputs.
//!
//! Execution is a set of worker streams sharing a pair cursor: each
//! `IEJoinStream` claims the next unclaimed pair index and joins that
//! pair, so the workers drain the pair list without any further
//! coordination.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use log::debug;
use parking_lot::Mutex;
use tokio::task::JoinSet;

use crate::batch::Batch;
use crate::cancellation::CancellationToken;
use crate::error::{IEJoinError, Result};
use crate::expr::InequalityPredicate;
use crate::joins::ie_join::{ie_join, ie_self_join};
use crate::joins::min_max::{min_max, min_max_on_sorted, ColumnStats};
use crate::joins::prune::{virtual_cross_join, PartitionStats, PruneMode};
use crate::joins::{output_batch, ROW_ID};
use crate::plan::{IEJoinPlan, JoinStrategy};

/// Tunables of the partitioned driver
#[derive(Clone, Debug)]
pub struct IEJoinOptions {
    /// Target rows per partition when chunking by equal row counts
    pub bucket_size: usize,
    /// Lower bound on partitions per side
    pub partition_count_min: usize,
    /// Fraction of each chunk sampled when deriving range split points
    pub sample_ratio: f64,
    pub prune_mode: PruneMode,
    /// Sort output pairs lexicographically before returning
    pub deterministic_output: bool,
    /// Seed for all sampling
    pub seed: u64,
    /// Maximum partition pairs joined concurrently
    pub target_partitions: usize,
}

impl Default for IEJoinOptions {
    fn default() -> Self {
        Self {
            bucket_size: 10_000,
            partition_count_min: 2,
            sample_ratio: 0.10,
            prune_mode: PruneMode::default(),
            deterministic_output: false,
            seed: 0,
            target_partitions: std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(2),
        }
    }
}

/// Executes an [`IEJoinPlan`] over partitioned inputs.
pub struct PartitionedIEJoin {
    plan: IEJoinPlan,
    options: IEJoinOptions,
    cancel: CancellationToken,
}

impl PartitionedIEJoin {
    pub fn new(plan: IEJoinPlan, options: IEJoinOptions) -> Self {
        Self {
            plan,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that cancels this join from another task
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the join to completion and return the output batches, each
    /// with schema `(left_id, right_id)`. An empty join returns zero
    /// batches.
    pub async fn collect(&self) -> Result<Vec<Batch>> {
        self.cancel.check()?;
        let predicates = &self.plan.predicates;
        let left = materialize(
            self.plan.left.as_ref(),
            &predicates[0].lhs,
            &predicates[1].lhs,
        )?;
        let right = materialize(
            self.plan.right.as_ref(),
            &predicates[0].rhs,
            &predicates[1].rhs,
        )?;
        if left.row_count() == 0 || right.row_count() == 0 {
            return Ok(vec![]);
        }

        // a small self join needs neither partitioning nor the
        // two-relation kernel
        if self.is_self_join() && left.row_count() <= self.options.bucket_size {
            let pairs = ie_self_join(&left, predicates, Some(&self.cancel))?;
            return self.finish(vec![pairs]);
        }

        let strategy = self.plan.strategy.unwrap_or_else(|| {
            let rows = left.row_count().max(right.row_count());
            if rows > 10 * self.options.bucket_size {
                JoinStrategy::SampleRange
            } else {
                JoinStrategy::GlobalSort
            }
        });
        debug!(
            "inequality join: strategy {strategy:?}, {} x {} rows",
            left.row_count(),
            right.row_count()
        );

        let (left_parts, right_parts, left_stats, right_stats) = match strategy {
            JoinStrategy::GlobalSort => {
                self.global_sort_partitions(&left, &right, predicates)?
            }
            JoinStrategy::SampleRange => {
                self.sample_range_partitions(&left, &right, predicates)?
            }
        };
        let pairs = virtual_cross_join(
            &left_stats,
            &right_stats,
            predicates,
            self.options.prune_mode,
        );
        self.dispatch(left_parts, right_parts, pairs, predicates).await
    }

    fn is_self_join(&self) -> bool {
        Arc::ptr_eq(&self.plan.left, &self.plan.right)
            && self
                .plan
                .predicates
                .iter()
                .all(|p| p.lhs == p.rhs)
    }

    fn partition_count(&self, rows: usize) -> usize {
        (rows / self.options.bucket_size).max(self.options.partition_count_min)
    }

    /// Strategy A: sort left by the first predicate column and right by
    /// the second, cut equal-row chunks, summarise each chunk.
    #[allow(clippy::type_complexity)]
    fn global_sort_partitions(
        &self,
        left: &Batch,
        right: &Batch,
        predicates: &[InequalityPredicate; 2],
    ) -> Result<(Vec<Batch>, Vec<Batch>, Vec<PartitionStats>, Vec<PartitionStats>)>
    {
        let (lx, ly) = (&predicates[0].lhs, &predicates[1].lhs);
        let (rx, ry) = (&predicates[0].rhs, &predicates[1].rhs);

        let left = left.sort_by(lx, false)?;
        let right = right.sort_by(ry, false)?;
        let left_parts = left.partition(self.partition_count(left.row_count()))?;
        let right_parts =
            right.partition(self.partition_count(right.row_count()))?;

        let mut left_stats = Vec::with_capacity(left_parts.len());
        for (index, part) in left_parts.iter().enumerate() {
            if part.row_count() == 0 {
                continue;
            }
            left_stats.push(PartitionStats::new(
                index,
                min_max_on_sorted(part, lx)?,
                min_max(part, ly)?,
            ));
        }
        let mut right_stats = Vec::with_capacity(right_parts.len());
        for (index, part) in right_parts.iter().enumerate() {
            if part.row_count() == 0 {
                continue;
            }
            right_stats.push(PartitionStats::new(
                index,
                min_max(part, rx)?,
                min_max_on_sorted(part, ry)?,
            ));
        }
        Ok((left_parts, right_parts, left_stats, right_stats))
    }

    /// Strategy B: derive split points on the first predicate column
    /// from per-chunk samples and route left rows by range. The split
    /// points bound each left partition, so its first-key summary comes
    /// from the plan rather than a scan.
    #[allow(clippy::type_complexity)]
    fn sample_range_partitions(
        &self,
        left: &Batch,
        right: &Batch,
        predicates: &[InequalityPredicate; 2],
    ) -> Result<(Vec<Batch>, Vec<Batch>, Vec<PartitionStats>, Vec<PartitionStats>)>
    {
        let (lx, ly) = (&predicates[0].lhs, &predicates[1].lhs);
        let (rx, ry) = (&predicates[0].rhs, &predicates[1].rhs);

        let chunks = left.partition(self.partition_count(left.row_count()))?;
        let mut samples = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            if chunk.row_count() == 0 {
                continue;
            }
            let amount = ((chunk.row_count() as f64) * self.options.sample_ratio)
                .ceil() as usize;
            samples.push(chunk.project(&[lx])?.sample(
                amount.max(1),
                self.options.seed.wrapping_add(index as u64),
            )?);
        }
        let union = Batch::concat(&samples)?.sort_by(lx, false)?;
        let values = union.int64_column_by_name(lx)?;

        // evenly spaced quantiles of the sample become the interior
        // split points; duplicates collapse
        let target = chunks.len();
        let mut boundaries = vec![i64::MIN];
        for j in 1..target {
            let value = values.value(j * union.row_count() / target);
            if value > *boundaries.last().unwrap() {
                boundaries.push(value);
            }
        }
        boundaries.push(i64::MAX);

        let x_index = left.col_index(lx)?;
        let range_count = boundaries.len() - 1;
        let mut left_parts = Vec::with_capacity(range_count);
        let mut left_stats = Vec::with_capacity(range_count);
        for range in 0..range_count {
            let (lo, hi) = (boundaries[range], boundaries[range + 1]);
            let last = range + 1 == range_count;
            let part = left
                .filter(|row| row[x_index] >= lo && (last || row[x_index] < hi))?;
            if part.row_count() == 0 {
                continue;
            }
            let y_stats = min_max(&part, ly)?;
            left_stats.push(PartitionStats::new(
                left_parts.len(),
                ColumnStats::new(lx.clone(), lo, hi),
                y_stats,
            ));
            left_parts.push(part);
        }

        let right_parts =
            right.partition(self.partition_count(right.row_count()))?;
        let mut right_stats = Vec::with_capacity(right_parts.len());
        for (index, part) in right_parts.iter().enumerate() {
            if part.row_count() == 0 {
                continue;
            }
            right_stats.push(PartitionStats::new(
                index,
                min_max(part, rx)?,
                min_max(part, ry)?,
            ));
        }
        Ok((left_parts, right_parts, left_stats, right_stats))
    }

    /// Run the kernel on every surviving partition pair.
    ///
    /// Up to `target_partitions` worker streams run concurrently, each
    /// pulling pair indices from the shared cursor until the list is
    /// drained. Results keep their pair index so the output sequence
    /// does not depend on worker scheduling.
    async fn dispatch(
        &self,
        left_parts: Vec<Batch>,
        right_parts: Vec<Batch>,
        pairs: Vec<(usize, usize)>,
        predicates: &[InequalityPredicate; 2],
    ) -> Result<Vec<Batch>> {
        if pairs.is_empty() {
            return Ok(vec![]);
        }
        let total = pairs.len();
        let state = Arc::new(JoinState {
            left_parts,
            right_parts,
            pairs,
            predicates: predicates.clone(),
            cancel: self.cancel.clone(),
        });
        let cursor = Arc::new(Mutex::new(0));
        let workers = self.options.target_partitions.max(1).min(total);
        let mut tasks: JoinSet<Result<Vec<(usize, Vec<(i64, i64)>)>>> =
            JoinSet::new();
        for _ in 0..workers {
            let mut stream = IEJoinStream {
                state: Arc::clone(&state),
                cursor: Arc::clone(&cursor),
                finished: false,
            };
            tasks.spawn(async move {
                let mut produced = Vec::new();
                while let Some(item) = stream.next().await {
                    produced.push(item?);
                }
                Ok(produced)
            });
        }

        let mut results: Vec<Vec<(i64, i64)>> = vec![Vec::new(); total];
        while let Some(joined) = tasks.join_next().await {
            let produced = joined.map_err(|e| {
                IEJoinError::Execution(format!("join worker failed: {e}"))
            })??;
            for (slot, matches) in produced {
                results[slot] = matches;
            }
        }
        self.finish(results)
    }

    /// Turn per-pair match lists into output batches
    fn finish(&self, results: Vec<Vec<(i64, i64)>>) -> Result<Vec<Batch>> {
        if self.options.deterministic_output {
            let mut all: Vec<(i64, i64)> =
                results.into_iter().flatten().collect();
            all.sort_unstable();
            if all.is_empty() {
                return Ok(vec![]);
            }
            return Ok(vec![output_batch(&all)?]);
        }
        results
            .into_iter()
            .filter(|pairs| !pairs.is_empty())
            .map(|pairs| output_batch(&pairs))
            .collect()
    }
}

/// Work shared by the worker streams: the materialised partitions, the
/// surviving pair list and the predicates.
struct JoinState {
    left_parts: Vec<Batch>,
    right_parts: Vec<Batch>,
    pairs: Vec<(usize, usize)>,
    predicates: [InequalityPredicate; 2],
    cancel: CancellationToken,
}

/// A stream of per-pair match lists, tagged with the pair index.
///
/// Streams constructed over the same cursor hand out each pair exactly
/// once, so running one stream per output partition on its own task
/// parallelises the join without further coordination.
struct IEJoinStream {
    state: Arc<JoinState>,
    /// index of the next unclaimed pair, shared between the workers
    cursor: Arc<Mutex<usize>>,
    finished: bool,
}

impl Stream for IEJoinStream {
    type Item = Result<(usize, Vec<(i64, i64)>)>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        // claim the next pair
        let pair = {
            let mut cursor = self.cursor.lock();
            let claimed = *cursor;
            *cursor += 1;
            claimed
        };
        if pair >= self.state.pairs.len() {
            self.finished = true;
            return Poll::Ready(None);
        }
        if let Err(e) = self.state.cancel.check() {
            self.finished = true;
            return Poll::Ready(Some(Err(e)));
        }
        let (left_index, right_index) = self.state.pairs[pair];
        let result = ie_join(
            &self.state.left_parts[left_index],
            &self.state.right_parts[right_index],
            &self.state.predicates,
            Some(&self.state.cancel),
        );
        Poll::Ready(Some(result.map(|matches| (pair, matches))))
    }
}

/// Scan a side, concatenate its batches, attach row ids when the source
/// does not carry them, and drop rows null in a predicate column.
fn materialize(
    source: &dyn crate::datasource::DataSource,
    x: &str,
    y: &str,
) -> Result<Batch> {
    let schema = source.schema();
    let has_id = schema.index_of(ROW_ID).is_ok();
    let mut projection: Vec<String> = Vec::new();
    if has_id {
        projection.push(ROW_ID.to_string());
    }
    for name in [x, y] {
        if !projection.iter().any(|p| p == name) {
            projection.push(name.to_string());
        }
    }
    let batches = source.scan(Some(&projection))?;
    let batch = if batches.is_empty() {
        let indices = projection
            .iter()
            .map(|name| schema.index_of(name))
            .collect::<Result<Vec<_>, _>>()?;
        Batch::empty(Arc::new(schema.project(&indices)?))
    } else {
        Batch::concat(&batches)?
    };
    let batch = if has_id {
        batch
    } else {
        batch.with_row_index(ROW_ID)?
    };
    batch.drop_nulls(&[x, y])
}
