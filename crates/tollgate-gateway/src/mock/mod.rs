//! Contract-driven mock responses.

mod engine;
pub mod security;

pub use engine::{MockEngine, MockError, MockOutcome};
