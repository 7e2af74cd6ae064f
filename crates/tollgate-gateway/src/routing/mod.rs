//! Path routing: glob rules, rule selection, path rewriting and delay lookup.

pub mod glob;
mod rewriter;
pub mod router;

pub use glob::{Glob, GlobError, GlobList};
pub use rewriter::PathRewrite;
pub use router::{CompiledPathRule, PathRouter, REWRITE_ID_HEADER};
