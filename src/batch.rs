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

//! [`Batch`]: an immutable columnar batch of rows.
//!
//! `Batch` wraps an Arrow [`RecordBatch`] and adds the operations the
//! join pipeline needs: stable sort by a column, row-predicate filter,
//! seeded sampling without replacement, equal-sized contiguous
//! partitioning and column projection. All operations return new
//! batches; column storage is shared, never copied, where Arrow allows.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Int64Array, UInt32Array, UInt64Array};
use arrow::compute::{
    concat_batches, filter_record_batch, lexsort_to_indices, take, SortColumn,
    SortOptions,
};
use arrow::datatypes::{DataType, Field, FieldRef, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{IEJoinError, Result};
use crate::{exec_err, plan_err};

/// An immutable, schema-carrying collection of equal-length columns.
#[derive(Clone, Debug)]
pub struct Batch {
    batch: RecordBatch,
}

impl Batch {
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    /// Create a batch from a schema and columns, validating that column
    /// names are unique and lengths agree.
    pub fn try_new(schema: SchemaRef, columns: Vec<ArrayRef>) -> Result<Self> {
        let mut seen = HashSet::new();
        for field in schema.fields() {
            if !seen.insert(field.name().as_str()) {
                return plan_err!("duplicate column name {}", field.name());
            }
        }
        Ok(Self {
            batch: RecordBatch::try_new(schema, columns)?,
        })
    }

    /// Create an empty batch with the given schema
    pub fn empty(schema: SchemaRef) -> Self {
        Self {
            batch: RecordBatch::new_empty(schema),
        }
    }

    /// Build an all-`Int64` batch row by row. Every row must have one
    /// value per column name.
    pub fn from_rows(names: &[&str], rows: &[Vec<i64>]) -> Result<Self> {
        let width = names.len();
        let mut columns: Vec<Vec<i64>> = vec![Vec::with_capacity(rows.len()); width];
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(IEJoinError::ArityMismatch(format!(
                    "row {row_idx} has {} values, schema has {width} columns",
                    row.len()
                )));
            }
            for (col, value) in row.iter().enumerate() {
                columns[col].push(*value);
            }
        }
        let fields: Vec<Field> = names
            .iter()
            .map(|name| Field::new(*name, DataType::Int64, false))
            .collect();
        let arrays: Vec<ArrayRef> = columns
            .into_iter()
            .map(|values| Arc::new(Int64Array::from(values)) as ArrayRef)
            .collect();
        Self::try_new(Arc::new(Schema::new(fields)), arrays)
    }

    pub fn record_batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn row_count(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    /// Resolve a column name to its index
    pub fn col_index(&self, name: &str) -> Result<usize> {
        self.batch.schema_ref().index_of(name).map_err(|_| {
            let valid = self
                .batch
                .schema_ref()
                .fields()
                .iter()
                .map(|f| f.name().clone())
                .collect::<Vec<_>>()
                .join(", ");
            IEJoinError::NoSuchColumn(format!("{name}; valid columns: {valid}"))
        })
    }

    pub fn column(&self, index: usize) -> &ArrayRef {
        self.batch.column(index)
    }

    pub fn column_by_name(&self, name: &str) -> Result<&ArrayRef> {
        Ok(self.batch.column(self.col_index(name)?))
    }

    /// Typed view of an `Int64` column
    pub fn int64_column(&self, index: usize) -> Result<&Int64Array> {
        let column = self.batch.column(index);
        column
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| {
                IEJoinError::TypeMismatch(format!(
                    "column {} has type {}, expected Int64",
                    self.batch.schema_ref().field(index).name(),
                    column.data_type()
                ))
            })
    }

    pub fn int64_column_by_name(&self, name: &str) -> Result<&Int64Array> {
        self.int64_column(self.col_index(name)?)
    }

    /// Materialise one row of an all-`Int64` batch
    pub fn row(&self, index: usize) -> Result<Vec<i64>> {
        if index >= self.row_count() {
            return exec_err!(
                "row index {index} out of bounds for batch of {} rows",
                self.row_count()
            );
        }
        (0..self.num_columns())
            .map(|col| Ok(self.int64_column(col)?.value(index)))
            .collect()
    }

    /// Sort by one column. The sort is stable: rows with equal keys keep
    /// their relative order, enforced by lexsorting on the key and the
    /// original row position.
    pub fn sort_by(&self, name: &str, descending: bool) -> Result<Batch> {
        let key = Arc::clone(self.column_by_name(name)?);
        let positions: ArrayRef = Arc::new(UInt64Array::from_iter_values(
            0..self.row_count() as u64,
        ));
        let indices = lexsort_to_indices(
            &[
                SortColumn {
                    values: key,
                    options: Some(SortOptions {
                        descending,
                        nulls_first: false,
                    }),
                },
                SortColumn {
                    values: positions,
                    options: None,
                },
            ],
            None,
        )?;
        self.take(&indices)
    }

    /// Keep the rows for which `predicate` returns true. Rows are
    /// presented as `Int64` value slices in schema order.
    pub fn filter<F>(&self, predicate: F) -> Result<Batch>
    where
        F: Fn(&[i64]) -> bool,
    {
        let columns = (0..self.num_columns())
            .map(|col| self.int64_column(col))
            .collect::<Result<Vec<_>>>()?;
        let mut row = vec![0i64; columns.len()];
        let mask: BooleanArray = (0..self.row_count())
            .map(|i| {
                for (slot, column) in row.iter_mut().zip(&columns) {
                    *slot = column.value(i);
                }
                Some(predicate(&row))
            })
            .collect();
        self.filter_by_mask(&mask)
    }

    /// Keep the rows selected by a boolean mask
    pub fn filter_by_mask(&self, mask: &BooleanArray) -> Result<Batch> {
        Ok(Batch::new(filter_record_batch(&self.batch, mask)?))
    }

    /// Uniform sample of `n` rows without replacement. The same seed
    /// always selects the same rows.
    pub fn sample(&self, n: usize, seed: u64) -> Result<Batch> {
        let rows = self.row_count();
        let amount = n.min(rows);
        let mut rng = StdRng::seed_from_u64(seed);
        let picked = rand::seq::index::sample(&mut rng, rows, amount);
        let indices =
            UInt32Array::from(picked.iter().map(|i| i as u32).collect::<Vec<_>>());
        self.take(&indices)
    }

    /// Split into `n` contiguous chunks whose sizes differ by at most one
    pub fn partition(&self, n: usize) -> Result<Vec<Batch>> {
        if n == 0 {
            return plan_err!("cannot partition a batch into 0 chunks");
        }
        let rows = self.row_count();
        let base = rows / n;
        let remainder = rows % n;
        let mut chunks = Vec::with_capacity(n);
        let mut offset = 0;
        for i in 0..n {
            let len = base + usize::from(i < remainder);
            chunks.push(self.slice(offset, len));
            offset += len;
        }
        Ok(chunks)
    }

    /// Project to a subset of columns, in the given order
    pub fn project(&self, names: &[&str]) -> Result<Batch> {
        let indices = names
            .iter()
            .map(|name| self.col_index(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(Batch::new(self.batch.project(&indices)?))
    }

    /// Prepend a sequential `Int64` row id column named `name`
    pub fn with_row_index(&self, name: &str) -> Result<Batch> {
        if self.col_index(name).is_ok() {
            return plan_err!("column {name} already exists");
        }
        let ids: ArrayRef =
            Arc::new(Int64Array::from_iter_values(0..self.row_count() as i64));
        let fields: Vec<FieldRef> =
            std::iter::once(Arc::new(Field::new(name, DataType::Int64, false)))
                .chain(self.batch.schema_ref().fields().iter().cloned())
                .collect();
        let columns: Vec<ArrayRef> = std::iter::once(ids)
            .chain(self.batch.columns().iter().cloned())
            .collect();
        Self::try_new(Arc::new(Schema::new(fields)), columns)
    }

    /// Drop the rows that are null in any of the named columns
    pub fn drop_nulls(&self, names: &[&str]) -> Result<Batch> {
        let mut mask: Option<BooleanArray> = None;
        for name in names {
            let not_null = arrow::compute::is_not_null(self.column_by_name(name)?)?;
            mask = Some(match mask {
                Some(mask) => arrow::compute::and(&mask, &not_null)?,
                None => not_null,
            });
        }
        match mask {
            Some(mask) => self.filter_by_mask(&mask),
            None => Ok(self.clone()),
        }
    }

    /// Zero-copy contiguous slice
    pub fn slice(&self, offset: usize, length: usize) -> Batch {
        Batch::new(self.batch.slice(offset, length))
    }

    /// Concatenate batches sharing one schema
    pub fn concat(batches: &[Batch]) -> Result<Batch> {
        let Some(first) = batches.first() else {
            return plan_err!("cannot concatenate an empty list of batches");
        };
        let inner = batches.iter().map(|b| &b.batch).collect::<Vec<_>>();
        Ok(Batch::new(concat_batches(&first.schema(), inner)?))
    }

    fn take(&self, indices: &UInt32Array) -> Result<Batch> {
        let columns = self
            .batch
            .columns()
            .iter()
            .map(|column| take(column.as_ref(), indices, None))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Batch::new(RecordBatch::try_new(self.schema(), columns)?))
    }
}

impl Display for Batch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match pretty_format_batches(std::slice::from_ref(&self.batch)) {
            Ok(table) => write!(f, "{table}"),
            Err(_) => write!(f, "Batch[{} rows]", self.row_count()),
        }
    }
}
