//! Error types for dependency resolution.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions that abort a resolution run.
///
/// A dependency with no candidate is not an error: it is recorded by the
/// resolver and reported in the final [`Resolution`](crate::Resolution).
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The binary under repair does not exist.
    #[error("File does not exist: {}", .0.display())]
    BinaryNotFound(PathBuf),

    /// The linker inspection tool could not run or exited abnormally.
    #[error("{tool} failed on {}: {reason}", .binary.display())]
    IntrospectionFailed {
        tool: &'static str,
        binary: PathBuf,
        reason: String,
    },

    /// A resolved library could not be placed next to the binary.
    #[error("Failed to copy {} to {}", .from.display(), .to.display())]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ResolveError {
    pub(crate) fn introspection(
        tool: &'static str,
        binary: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self::IntrospectionFailed {
            tool,
            binary: binary.into(),
            reason: reason.into(),
        }
    }
}
