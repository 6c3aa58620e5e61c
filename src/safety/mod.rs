//! Read-only guard for ad-hoc SQL.
//!
//! The agent's `query_warehouse` tool may run SQL the model wrote itself.
//! Before it reaches the warehouse, the text is parsed and anything other
//! than a single read-only query is rejected.

mod parser;

pub use parser::{ensure_read_only, ReadOnlyGuard};

use std::fmt;

/// Why a piece of SQL was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The text did not parse as BigQuery SQL.
    Unparsable(String),
    /// Nothing to run.
    Empty,
    /// More than one statement was supplied.
    MultipleStatements(usize),
    /// The statement (or a nested part of it) is not a plain query.
    NotReadOnly(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unparsable(e) => write!(f, "SQL parse error: {}", e),
            Self::Empty => write!(f, "Empty SQL statement"),
            Self::MultipleStatements(n) => {
                write!(f, "Expected a single statement, found {}", n)
            }
            Self::NotReadOnly(kind) => {
                write!(f, "Only read-only queries are allowed, found {}", kind)
            }
        }
    }
}
