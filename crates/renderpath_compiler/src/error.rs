// SPDX-License-Identifier: MIT OR Apache-2.0
//! Compiler error types.

use renderpath_graph::GraphError;

/// Resource allocation error.
///
/// Fatal to the current compile attempt only; compilation is safe to
/// retry once the missing runtime parameter (the screen size) is
/// supplied.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AllocError {
    /// Screen-relative size requested before a screen size is known
    #[error("target '{target}' has a screen-relative size but no screen size is known")]
    UnresolvedScale {
        /// Target slot ID
        target: String,
    },

    /// Two targets claim the same physical slot with incompatible formats
    #[error("target slot '{id}' declared with conflicting formats {first:?} and {second:?}")]
    FormatConflict {
        /// Target slot ID
        id: String,
        /// Format of the first declaration
        first: crate::alloc::TargetFormat,
        /// Format of the conflicting declaration
        second: crate::alloc::TargetFormat,
    },

    /// Format string outside the accepted vocabulary
    #[error("target '{target}' declares unknown format '{format}'")]
    UnknownFormat {
        /// Target slot ID
        target: String,
        /// The unrecognized format string
        format: String,
    },
}

/// Any failure while compiling a render path.
///
/// Compilation fails fast: the first error aborts the pipeline and is
/// reported as the single root cause.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// Structural graph error; fatal until the author fixes the graph
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Resource allocation error; retryable with new runtime parameters
    #[error(transparent)]
    Alloc(#[from] AllocError),
}
