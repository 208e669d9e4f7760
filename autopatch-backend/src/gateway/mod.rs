//! Socket channel to the web UI
//!
//! Clients send JSON-RPC style requests over `/ws` and receive every
//! broadcast scan event on the same connection.

pub mod actix_ws;
pub mod events;
pub mod methods;
pub mod protocol;

pub use events::EventBroadcaster;
pub use protocol::{EventType, GatewayEvent, RpcError, RpcRequest, RpcResponse};
