//! Tollgate: an intercepting API gateway.
//!
//! Requests are rewritten and forwarded to an upstream, answered from an API
//! contract in mock mode, or served from static mock definitions. Every
//! exchange is recorded as a transaction, validated against the contract and
//! broadcast to observers.

pub mod config;
pub mod contract;
pub mod controls;
pub mod metrics;
pub mod mock;
pub mod monitor;
pub mod problem;
pub mod proxy;
pub mod routing;
pub mod static_mock;
pub mod transaction;
pub mod transform;
