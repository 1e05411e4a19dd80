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

//! Operators, logical expressions and the inequality predicate records
//! consumed by the join kernels.

use std::fmt::{Display, Formatter};

use arrow::compute::SortOptions;

use crate::error::{IEJoinError, Result};

/// Binary operators understood by the engine.
///
/// The join kernels only evaluate the four inequalities; `And` exists so
/// a join predicate can be written as a single expression tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
}

impl Operator {
    /// True for the four comparison operators
    pub fn is_inequality(&self) -> bool {
        matches!(
            self,
            Operator::Lt | Operator::LtEq | Operator::Gt | Operator::GtEq
        )
    }

    /// True for `>` and `>=`, the operators satisfied by descending values
    pub fn is_descending(&self) -> bool {
        matches!(self, Operator::Gt | Operator::GtEq)
    }

    /// True for `<=` and `>=`
    pub fn is_loose(&self) -> bool {
        matches!(self, Operator::LtEq | Operator::GtEq)
    }

    /// Evaluate the operator on a pair of values.
    ///
    /// Panics if called on `And`; callers must validate predicates with
    /// [`Operator::is_inequality`] first.
    pub fn evaluate(&self, l: i64, r: i64) -> bool {
        match self {
            Operator::Lt => l < r,
            Operator::LtEq => l <= r,
            Operator::Gt => l > r,
            Operator::GtEq => l >= r,
            Operator::And => unreachable!("And is not a comparison operator"),
        }
    }

    /// Sort direction under which this operator is satisfied by increasing
    /// index distance: ascending for `<`/`<=`, descending for `>`/`>=`.
    pub fn to_sort_options(&self) -> SortOptions {
        SortOptions {
            descending: self.is_descending(),
            nulls_first: false,
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operator::Lt => "<",
            Operator::LtEq => "<=",
            Operator::Gt => ">",
            Operator::GtEq => ">=",
            Operator::And => "AND",
        };
        write!(f, "{s}")
    }
}

/// A logical expression tree.
///
/// Plans and expressions are plain sum types dispatched by matching on
/// the variant; the engine needs nothing deeper.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogicalExpr {
    /// Reference to a named column
    Column(String),
    /// Binary expression combining two sub-expressions
    BinaryExpr {
        left: Box<LogicalExpr>,
        op: Operator,
        right: Box<LogicalExpr>,
    },
}

impl LogicalExpr {
    fn binary(self, op: Operator, right: LogicalExpr) -> LogicalExpr {
        LogicalExpr::BinaryExpr {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    pub fn lt(self, right: LogicalExpr) -> LogicalExpr {
        self.binary(Operator::Lt, right)
    }

    pub fn lt_eq(self, right: LogicalExpr) -> LogicalExpr {
        self.binary(Operator::LtEq, right)
    }

    pub fn gt(self, right: LogicalExpr) -> LogicalExpr {
        self.binary(Operator::Gt, right)
    }

    pub fn gt_eq(self, right: LogicalExpr) -> LogicalExpr {
        self.binary(Operator::GtEq, right)
    }

    pub fn and(self, right: LogicalExpr) -> LogicalExpr {
        self.binary(Operator::And, right)
    }
}

impl Display for LogicalExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogicalExpr::Column(name) => write!(f, "{name}"),
            LogicalExpr::BinaryExpr { left, op, right } => {
                write!(f, "{left} {op} {right}")
            }
        }
    }
}

/// Create a column reference expression
pub fn col(name: impl Into<String>) -> LogicalExpr {
    LogicalExpr::Column(name.into())
}

/// One inequality of a join predicate: `left.lhs op right.rhs`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InequalityPredicate {
    pub op: Operator,
    /// Column name on the left relation
    pub lhs: String,
    /// Column name on the right relation
    pub rhs: String,
}

impl InequalityPredicate {
    pub fn try_new(
        op: Operator,
        lhs: impl Into<String>,
        rhs: impl Into<String>,
    ) -> Result<Self> {
        if !op.is_inequality() {
            return Err(IEJoinError::UnsupportedPredicate(format!(
                "expected one of <, <=, >, >=, got {op}"
            )));
        }
        Ok(Self {
            op,
            lhs: lhs.into(),
            rhs: rhs.into(),
        })
    }
}

impl Display for InequalityPredicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
    }
}
