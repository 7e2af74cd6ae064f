//! The gateway listener and request pipeline.
//!
//! # Module Structure
//!
//! - `server` - GatewayServer and its accept loop
//! - `context` - state shared by every request
//! - `dispatch` - static mocks, mock mode or the upstream call
//! - `mock_handler` - responses from the contract mock engine
//! - `client` - upstream client with redirect and cookie handling
//! - `tls` - listener certificates and the upstream TLS config

mod client;
mod context;
mod dispatch;
pub mod headers;
mod mock_handler;
mod response_ext;
mod server;
mod tls;


pub use client::{create_http_client, ClientError, CookieJarClient, HttpClient, Transport};
pub use context::{GatewayState, StartupError};
pub use dispatch::{dispatch, handle_request};
pub use response_ext::{full_body, GatewayBody, ResponseExt};
pub use server::GatewayServer;
pub use tls::{create_tls_acceptor, TlsError};
