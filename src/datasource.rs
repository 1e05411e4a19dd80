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

//! Data sources feeding the join driver: an in-memory table and a CSV
//! file reader.

use std::fmt::Debug;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::SchemaRef;

use crate::batch::Batch;
use crate::error::{IEJoinError, Result};
use crate::plan_err;

/// A relation the driver can scan.
///
/// `scan` returns all batches eagerly; inputs are materialised before a
/// join runs.
pub trait DataSource: Debug + Send + Sync {
    fn schema(&self) -> SchemaRef;

    /// Read the relation, optionally projected to the named columns
    fn scan(&self, projection: Option<&[String]>) -> Result<Vec<Batch>>;
}

/// An in-memory table backed by a list of batches
#[derive(Debug)]
pub struct MemTable {
    schema: SchemaRef,
    batches: Vec<Batch>,
}

impl MemTable {
    pub fn try_new(schema: SchemaRef, batches: Vec<Batch>) -> Result<Self> {
        for batch in &batches {
            if batch.schema() != schema {
                return plan_err!(
                    "batch schema {} does not match table schema {}",
                    batch.schema(),
                    schema
                );
            }
        }
        Ok(Self { schema, batches })
    }

    pub fn from_batch(batch: Batch) -> Self {
        Self {
            schema: batch.schema(),
            batches: vec![batch],
        }
    }
}

impl DataSource for MemTable {
    fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    fn scan(&self, projection: Option<&[String]>) -> Result<Vec<Batch>> {
        match projection {
            Some(names) => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                self.batches.iter().map(|b| b.project(&names)).collect()
            }
            None => Ok(self.batches.clone()),
        }
    }
}

/// A CSV file on local disk. The schema is inferred from the file when
/// not supplied.
#[derive(Debug)]
pub struct CsvSource {
    path: PathBuf,
    schema: SchemaRef,
    has_header: bool,
    batch_size: usize,
}

impl CsvSource {
    pub fn try_new(path: impl Into<PathBuf>, schema: Option<SchemaRef>) -> Result<Self> {
        let path = path.into();
        let schema = match schema {
            Some(schema) => schema,
            None => {
                let mut file = File::open(&path)?;
                let format = Format::default().with_header(true);
                let (schema, _) = format.infer_schema(&mut file, Some(1000))?;
                Arc::new(schema)
            }
        };
        Ok(Self {
            path,
            schema,
            has_header: true,
            batch_size: 8192,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

impl DataSource for CsvSource {
    fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    fn scan(&self, projection: Option<&[String]>) -> Result<Vec<Batch>> {
        let file = File::open(&self.path)?;
        let mut builder = ReaderBuilder::new(Arc::clone(&self.schema))
            .with_header(self.has_header)
            .with_batch_size(self.batch_size);
        if let Some(names) = projection {
            let indices = names
                .iter()
                .map(|name| {
                    self.schema.index_of(name).map_err(|_| {
                        IEJoinError::NoSuchColumn(name.clone())
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            builder = builder.with_projection(indices);
        }
        let reader = builder.build(file)?;
        reader
            .map(|batch| Ok(Batch::new(batch?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn mem_table_scans_with_projection() {
        let batch = Batch::from_rows(
            &["id", "x", "y"],
            &[vec![0, 1, 2], vec![1, 3, 4]],
        )
        .unwrap();
        let table = MemTable::from_batch(batch);
        let full = table.scan(None).unwrap();
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].num_columns(), 3);

        let projected = table
            .scan(Some(&["y".to_string(), "id".to_string()]))
            .unwrap();
        assert_eq!(projected[0].num_columns(), 2);
        assert_eq!(projected[0].row(0).unwrap(), vec![2, 0]);
    }

    #[test]
    fn mem_table_rejects_mismatched_batches() {
        let a = Batch::from_rows(&["id"], &[vec![0]]).unwrap();
        let b = Batch::from_rows(&["other"], &[vec![0]]).unwrap();
        assert!(MemTable::try_new(a.schema(), vec![b]).is_err());
    }

    #[test]
    fn csv_source_infers_schema_and_projects() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,x,y").unwrap();
        writeln!(file, "0,5,7").unwrap();
        writeln!(file, "1,6,8").unwrap();
        file.flush().unwrap();

        let source = CsvSource::try_new(file.path(), None).unwrap();
        assert_eq!(source.schema().fields().len(), 3);

        let batches = source
            .scan(Some(&["id".to_string(), "y".to_string()]))
            .unwrap();
        let batch = Batch::concat(&batches).unwrap();
        assert_eq!(batch.num_columns(), 2);
        assert_eq!(batch.row_count(), 2);
    }
}
