//! File-backed mock responses matched by request shape.

pub mod definition;
pub mod matcher;
mod service;
pub mod template;

pub use definition::{MockRequestPattern, MockResponseTemplate, StaticMockDefinition};
pub use matcher::{is_subset, string_compare, PatternCache};
pub use service::{
    load_definitions, parse_definitions, StaticMockError, StaticMockService, BODIES_DIR,
    DEFINITIONS_DIR,
};
