//! Error types for reconciliation.
//!
//! Only structural problems surface as [`Error`]. A remote command that exits
//! non-zero is not an error at this level: it is reported per entry as
//! [`ApplyResult::Failed`](crate::types::ApplyResult::Failed) and the pass
//! continues with the remaining entries.

use crate::catalog::Section;
use thiserror::Error;

/// Errors raised by the reconciliation engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A delta or probe set referenced a kind the catalog has no template for.
    ///
    /// Plan-time unknown kinds are only warnings; reaching a driver with one
    /// means the caller skipped planning, so the run is aborted.
    #[error("no {section} template registered for kind '{kind}'")]
    UnknownKind {
        /// Table the lookup was made against
        section: Section,
        /// The unregistered kind
        kind: String,
    },

    /// A template placeholder has no value in the parameter map
    #[error("parameter '{placeholder}' is referenced by the template but not supplied")]
    MissingParameter {
        /// Placeholder name without the `${}` delimiters
        placeholder: String,
    },

    /// The remote channel itself failed (not a non-zero exit status)
    #[error("remote executor failed: {0}")]
    Executor(String),
}

/// Result type for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;
