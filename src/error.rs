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

//! Error types for the inequality join engine.
//!
//! Two kinds of errors are raised: expected errors caused by invalid
//! caller input (a missing column, an unsupported predicate shape), and
//! unexpected errors ([`IEJoinError::Internal`]) which indicate a broken
//! invariant and therefore a bug.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::result;

use arrow::error::ArrowError;

/// Result type for operations that could result in an [`IEJoinError`]
pub type Result<T, E = IEJoinError> = result::Result<T, E>;

/// Error type for generic operations that end up wrapped in
/// [`IEJoinError::External`]
pub type GenericError = Box<dyn Error + Send + Sync>;

/// Engine error
#[derive(Debug)]
pub enum IEJoinError {
    /// Error returned by arrow
    ArrowError(Box<ArrowError>),
    /// A referenced column does not exist in the schema
    NoSuchColumn(String),
    /// A row or column set does not match the schema width
    ArityMismatch(String),
    /// The join predicate is not a conjunction of two column inequalities
    UnsupportedPredicate(String),
    /// Predicate column types are incompatible across the two sides
    TypeMismatch(String),
    /// Error during planning, e.g. an invalid plan node configuration
    Plan(String),
    /// Error during execution caused by malformed input
    Execution(String),
    /// Error due to a broken internal invariant; most likely a bug
    Internal(String),
    /// Memory or another resource could not be acquired
    ResourcesExhausted(String),
    /// The join was cancelled through its cancellation token
    Cancelled,
    /// Error when an I/O operation fails
    IoError(io::Error),
    /// Errors originating outside of this crate
    External(GenericError),
}

impl IEJoinError {
    fn error_prefix(&self) -> &'static str {
        match self {
            IEJoinError::ArrowError(_) => "Arrow error: ",
            IEJoinError::NoSuchColumn(_) => "No such column: ",
            IEJoinError::ArityMismatch(_) => "Arity mismatch: ",
            IEJoinError::UnsupportedPredicate(_) => "Unsupported predicate: ",
            IEJoinError::TypeMismatch(_) => "Type mismatch: ",
            IEJoinError::Plan(_) => "Error during planning: ",
            IEJoinError::Execution(_) => "Execution error: ",
            IEJoinError::Internal(_) => "Internal error: ",
            IEJoinError::ResourcesExhausted(_) => "Resources exhausted: ",
            IEJoinError::Cancelled => "Join cancelled",
            IEJoinError::IoError(_) => "IO error: ",
            IEJoinError::External(_) => "External error: ",
        }
    }

    fn message(&self) -> String {
        match self {
            IEJoinError::ArrowError(e) => e.to_string(),
            IEJoinError::NoSuchColumn(s)
            | IEJoinError::ArityMismatch(s)
            | IEJoinError::UnsupportedPredicate(s)
            | IEJoinError::TypeMismatch(s)
            | IEJoinError::Plan(s)
            | IEJoinError::Execution(s)
            | IEJoinError::Internal(s)
            | IEJoinError::ResourcesExhausted(s) => s.clone(),
            IEJoinError::Cancelled => String::new(),
            IEJoinError::IoError(e) => e.to_string(),
            IEJoinError::External(e) => e.to_string(),
        }
    }
}

impl Display for IEJoinError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.error_prefix(), self.message())
    }
}

impl Error for IEJoinError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            IEJoinError::ArrowError(e) => Some(e.as_ref()),
            IEJoinError::IoError(e) => Some(e),
            IEJoinError::External(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<ArrowError> for IEJoinError {
    fn from(e: ArrowError) -> Self {
        IEJoinError::ArrowError(Box::new(e))
    }
}

impl From<io::Error> for IEJoinError {
    fn from(e: io::Error) -> Self {
        IEJoinError::IoError(e)
    }
}

impl From<GenericError> for IEJoinError {
    fn from(e: GenericError) -> Self {
        IEJoinError::External(e)
    }
}

/// Macro to create an `Err(IEJoinError::Plan)` with a formatted message
#[macro_export]
macro_rules! plan_err {
    ($($args:expr),*) => {
        Err($crate::error::IEJoinError::Plan(format!($($args),*)))
    };
}

/// Macro to create an `Err(IEJoinError::Execution)` with a formatted message
#[macro_export]
macro_rules! exec_err {
    ($($args:expr),*) => {
        Err($crate::error::IEJoinError::Execution(format!($($args),*)))
    };
}

/// Macro to create an `Err(IEJoinError::Internal)` with a formatted message
#[macro_export]
macro_rules! internal_err {
    ($($args:expr),*) => {
        Err($crate::error::IEJoinError::Internal(format!($($args),*)))
    };
}

/// Macro to create an `Err(IEJoinError::ResourcesExhausted)` with a
/// formatted message
#[macro_export]
macro_rules! resources_err {
    ($($args:expr),*) => {
        Err($crate::error::IEJoinError::ResourcesExhausted(format!(
            $($args),*
        )))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan_err;

    #[test]
    fn error_display_carries_prefix() {
        let err = IEJoinError::NoSuchColumn("salary".to_string());
        assert_eq!(err.to_string(), "No such column: salary");

        let err = IEJoinError::Cancelled;
        assert_eq!(err.to_string(), "Join cancelled");
    }

    #[test]
    fn arrow_error_is_wrapped() {
        let arrow = ArrowError::ComputeError("boom".to_string());
        let err: IEJoinError = arrow.into();
        assert!(matches!(err, IEJoinError::ArrowError(_)));
        assert!(err.source().is_some());
    }

    #[test]
    fn macros_format_messages() {
        fn fail() -> Result<()> {
            plan_err!("bad {} of {}", "shape", 2)
        }
        let err = fail().unwrap_err();
        assert_eq!(err.to_string(), "Error during planning: bad shape of 2");
    }
}
