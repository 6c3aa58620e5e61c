//! Filter-to-SQL compilation and row normalization.
//!
//! These are the pure parts of the gateway: no I/O, no shared state. The
//! warehouse client runs what the compiler builds, and the normalizer turns
//! its rows into JSON.

pub mod compiler;
pub mod filter;
pub mod literal;
pub mod normalize;

pub use compiler::{
    compile_select, CompiledQuery, FilterCompiler, ParamStyle, Predicate, QueryParameter,
    TableRef,
};
pub use filter::{FilterEntry, Filters, NullTest, Operator};
pub use literal::{quote_string, TypedValue};
pub use normalize::{normalize_row, normalize_rows, normalize_value, RawRow, RawValue, Row};
