//! The JSON-RPC 2.0 / WebSocket surface over `conduit-core` (spec.md §4.7).
//!
//! Owns the one process-global this workspace allows: the subscriber
//! registry fanning session notifications out to connected clients. A
//! single `SubscriberRegistry` instance is constructed once in the binary's
//! `main` and shared through `RpcState`, the same way `conduit-core` shares
//! its `ProviderRegistry` rather than reaching for a `LazyLock` static.

pub mod connection;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod server;
pub mod state;
pub mod subscribers;

pub use dispatch::dispatch;
pub use error::RpcError;
pub use protocol::{RpcNotification, RpcRequest, RpcResponse};
pub use server::{run_health_server, run_ws_server};
pub use state::RpcState;
pub use subscribers::{RpcNotifier, SubscriberRegistry};
