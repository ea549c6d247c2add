//! JSON-RPC trigger endpoint for the crank.
//!
//! a thin HTTP/1.1 server on tokio that lets an operator run a cycle on
//! demand or read the scheduler state. the scheduler's single-flight guard
//! still applies, so a manual trigger during a running cycle is skipped.
//!
//! # example
//!
//! ```no_run
//! use crank_server::{RpcServer, ServerConfig};
//! # async fn run(trigger: std::sync::Arc<dyn crank_server::CycleTrigger>) -> crank_server::Result<()> {
//! let config = ServerConfig::new().with_bind_addr("127.0.0.1:8080".parse().unwrap());
//! let (_tx, shutdown) = tokio::sync::watch::channel(false);
//! RpcServer::new(config)?.run(trigger, shutdown).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # JSON-RPC 2.0 API
//!
//! ## request format
//!
//! ```json
//! { "jsonrpc": "2.0", "id": 1, "method": "runCycle" }
//! ```
//!
//! ## response format (success)
//!
//! `runCycle` answers with the cycle report, or `{"status":"skipped"}` when a
//! cycle was already in flight. `getStatus` answers with the scheduler state.
//!
//! ```json
//! {
//!   "jsonrpc": "2.0",
//!   "id": 1,
//!   "result": { "outcome": "minted", "recipient": "...", "assetIndex": 17 }
//! }
//! ```
//!
//! ## response format (error)
//!
//! ```json
//! {
//!   "jsonrpc": "2.0",
//!   "id": 1,
//!   "error": {
//!     "code": -32601,
//!     "message": "Method not found",
//!     "data": "Method not found: sendTransaction"
//!   }
//! }
//! ```

mod config;
mod error;
mod http;
mod request;
mod server;

// public exports
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use server::{dispatch, RpcServer};

// re-export request/response types
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, Method, ParsedRequest, SkippedResult};

// re-export traits for convenience
pub use crank_traits::{CycleTrigger, TriggerOutcome};
