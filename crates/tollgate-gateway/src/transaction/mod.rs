//! Transaction records, storage and broadcast.

pub mod broadcast;
pub mod store;
pub mod types;

pub use broadcast::{Broadcaster, GatewayEvent};
pub use store::TransactionStore;
pub use types::{HttpRequestRecord, HttpResponseRecord, HttpTransaction};
