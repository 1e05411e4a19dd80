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

//! The inequality join plan node and its validation.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use arrow::datatypes::{DataType, SchemaRef};

use crate::datasource::DataSource;
use crate::error::{IEJoinError, Result};
use crate::expr::{InequalityPredicate, LogicalExpr, Operator};

/// How the driver partitions the inputs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinStrategy {
    /// Sort each side globally, then chunk into equal row counts
    GlobalSort,
    /// Range-partition the left side by sampled split points on the
    /// first predicate column
    SampleRange,
}

/// A validated inequality join over two relations.
///
/// The predicate must be exactly `AND(ineq, ineq)` where each inequality
/// compares a left column with a right column using `<`, `<=`, `>` or
/// `>=`. Anything else is rejected at construction.
#[derive(Debug)]
pub struct IEJoinPlan {
    pub left: Arc<dyn DataSource>,
    pub right: Arc<dyn DataSource>,
    pub predicates: [InequalityPredicate; 2],
    /// Partitioning strategy; `None` lets the driver choose by input size
    pub strategy: Option<JoinStrategy>,
}

impl IEJoinPlan {
    pub fn try_new(
        left: Arc<dyn DataSource>,
        right: Arc<dyn DataSource>,
        predicate: LogicalExpr,
        strategy: Option<JoinStrategy>,
    ) -> Result<Self> {
        let predicates = match predicate {
            LogicalExpr::BinaryExpr {
                left: first,
                op: Operator::And,
                right: second,
            } => [as_inequality(*first)?, as_inequality(*second)?],
            other => {
                return Err(IEJoinError::UnsupportedPredicate(format!(
                    "join predicate must be a conjunction of two \
                     inequalities, got {other}"
                )))
            }
        };
        let left_schema = left.schema();
        let right_schema = right.schema();
        for predicate in &predicates {
            check_predicate_column(&left_schema, &predicate.lhs)?;
            check_predicate_column(&right_schema, &predicate.rhs)?;
        }
        Ok(Self {
            left,
            right,
            predicates,
            strategy,
        })
    }
}

impl Display for IEJoinPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "IEJoin: ({}) AND ({})",
            self.predicates[0], self.predicates[1]
        )
    }
}

fn as_inequality(expr: LogicalExpr) -> Result<InequalityPredicate> {
    match expr {
        LogicalExpr::BinaryExpr { left, op, right } if op.is_inequality() => {
            match (*left, *right) {
                (LogicalExpr::Column(lhs), LogicalExpr::Column(rhs)) => {
                    InequalityPredicate::try_new(op, lhs, rhs)
                }
                (left, right) => Err(IEJoinError::UnsupportedPredicate(format!(
                    "inequality operands must be column references, got \
                     {left} and {right}"
                ))),
            }
        }
        other => Err(IEJoinError::UnsupportedPredicate(format!(
            "expected an inequality comparison, got {other}"
        ))),
    }
}

fn check_predicate_column(schema: &SchemaRef, name: &str) -> Result<()> {
    let index = schema.index_of(name).map_err(|_| {
        let valid = schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect::<Vec<_>>()
            .join(", ");
        IEJoinError::NoSuchColumn(format!("{name}; valid columns: {valid}"))
    })?;
    let data_type = schema.field(index).data_type();
    if data_type != &DataType::Int64 {
        return Err(IEJoinError::TypeMismatch(format!(
            "predicate column {name} has type {data_type}, both sides must \
             be Int64"
        )));
    }
    Ok(())
}
