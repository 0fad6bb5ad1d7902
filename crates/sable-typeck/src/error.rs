//! Diagnostics reported by the named-type resolution engine.
//!
//! Only user-program errors become diagnostics; misuse of the API itself
//! (setting an underlying twice, mutating an instantiation) is a defect in
//! the calling component and panics instead.

use std::fmt;

use serde::Serialize;

use sable_common::Span;

/// A type error surfaced through the surrounding session.
#[derive(Clone, Debug, Serialize)]
pub enum TypeError {
    /// A cycle of named or alias declarations that never reaches a
    /// structural type. Every member of the cycle degrades to the invalid
    /// type so checking can continue.
    Cycle {
        /// Cycle members in declaration order, starting from the one that
        /// appears first in the source.
        path: Vec<String>,
        span: Span,
    },
    /// An external loader failed to produce the details of a type.
    Load {
        type_name: String,
        reason: String,
        span: Span,
    },
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::Cycle { path, .. } => {
                write!(f, "invalid recursive type: {}", path.join(" -> "))?;
                if let Some(first) = path.first() {
                    write!(f, " -> {}", first)?;
                }
                Ok(())
            }
            TypeError::Load {
                type_name, reason, ..
            } => {
                write!(f, "failed to load type `{}`: {}", type_name, reason)
            }
        }
    }
}

impl std::error::Error for TypeError {}
