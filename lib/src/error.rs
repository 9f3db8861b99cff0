// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for ycsync operations.
//!
//! Public entry points return `crate::error::Result<T>` with a structured
//! [`SyncError`], so callers can tell configuration, connection and execution
//! failures apart. Resolvers and other internal code use `anyhow::Result<T>`;
//! those errors reach callers through the `Scheduler` or `Internal` variants
//! with their chain intact.
//!
//! # Example
//!
//! ```ignore
//! use ycsync_lib::error::SyncError;
//!
//! match plugin.sync(options, tx).await {
//!     Err(SyncError::Filter(e)) => eprintln!("bad table selection: {e}"),
//!     Err(SyncError::Connection { target, .. }) => eprintln!("cannot reach {target}"),
//!     Err(e) => return Err(e.into()),
//!     Ok(()) => {}
//! }
//! ```

use thiserror::Error;

use crate::state::StateError;

/// Errors produced while selecting tables from the registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// An include or skip pattern matched no table in the registry.
    #[error("{option} include a pattern {pattern} with no matches")]
    NoMatch {
        /// Which option carried the pattern (`tables` or `skip_tables`)
        option: &'static str,
        /// The offending pattern
        pattern: String,
    },

    /// A pattern could not be compiled as a glob.
    #[error("invalid table pattern {pattern}: {reason}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Why the glob was rejected
        reason: String,
    },

    /// A requested table needs an ancestor that is not part of the selection.
    #[error("table {table} requires ancestor table {ancestor}, which is not selected; include it or set skip_dependent_tables")]
    MissingAncestor {
        /// The requested table
        table: String,
        /// The nearest ancestor missing from the selection
        ancestor: String,
    },
}

/// Main error type for connector operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The configuration could not be parsed or failed validation.
    #[error("Invalid configuration: {field}: {message}")]
    Config {
        /// The offending field, or `spec` when the document itself is malformed
        field: String,
        /// Description of the problem
        message: String,
    },

    /// Dialing an upstream API or the state backend failed.
    #[error("Failed to connect to {target}: {source}")]
    Connection {
        /// Address or API the connection was made to
        target: String,
        /// Underlying failure
        #[source]
        source: anyhow::Error,
    },

    /// The requested table selection is inconsistent.
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// The scheduler failed while running the sync.
    #[error(transparent)]
    Scheduler(anyhow::Error),

    /// Bookmarks could not be persisted after the run.
    #[error("Failed to flush bookmarks: {0}")]
    Flush(#[source] StateError),

    /// The state backend rejected a request outside of flushing.
    #[error("State backend error: {0}")]
    State(#[from] StateError),

    /// The operation is not available in the current mode.
    #[error("Unsupported operation: {message}")]
    Unsupported {
        /// Description of what was attempted
        message: String,
    },

    /// Internal error - wraps underlying errors while preserving the error chain.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SyncError {
    /// Create a configuration error for a named field.
    ///
    /// # Example
    /// ```ignore
    /// SyncError::config("concurrency", "must be greater than 0")
    /// ```
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a connection error for a target address.
    pub fn connection(target: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        SyncError::Connection {
            target: target.into(),
            source: source.into(),
        }
    }

    /// Create a scheduler error.
    pub fn scheduler(source: impl Into<anyhow::Error>) -> Self {
        SyncError::Scheduler(source.into())
    }

    /// Create an unsupported operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        SyncError::Unsupported {
            message: message.into(),
        }
    }

    /// Whether the error was raised before any network resource was touched.
    pub fn is_config(&self) -> bool {
        matches!(self, SyncError::Config { .. })
    }

    /// Whether the error came from dialing an API or backend.
    pub fn is_connection(&self) -> bool {
        matches!(self, SyncError::Connection { .. })
    }
}

/// Result type for connector operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_display() {
        let err = SyncError::config("concurrency", "must be greater than 0");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: concurrency: must be greater than 0"
        );
        assert!(err.is_config());
    }

    #[test]
    fn test_connection_display_names_target() {
        let err = SyncError::connection("localhost:7777", anyhow::anyhow!("connection refused"));
        assert_eq!(
            err.to_string(),
            "Failed to connect to localhost:7777: connection refused"
        );
        assert!(err.is_connection());
    }

    #[test]
    fn test_filter_error_is_transparent() {
        let err: SyncError = FilterError::MissingAncestor {
            table: "b".to_string(),
            ancestor: "a".to_string(),
        }
        .into();
        assert!(err.to_string().starts_with("table b requires ancestor table a"));
    }

    #[test]
    fn test_no_match_display() {
        let err = FilterError::NoMatch {
            option: "skip_tables",
            pattern: "nope_*".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "skip_tables include a pattern nope_* with no matches"
        );
    }

    #[test]
    fn test_internal_error_from_anyhow() {
        let err: SyncError = anyhow::anyhow!("Something went wrong").into();
        assert!(matches!(err, SyncError::Internal(_)));
        assert!(err.to_string().contains("Something went wrong"));
    }

    #[test]
    fn test_flush_error_keeps_source() {
        let err = SyncError::Flush(StateError::Rpc("unavailable".to_string()));
        assert_eq!(
            err.to_string(),
            "Failed to flush bookmarks: state backend call failed: unavailable"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
