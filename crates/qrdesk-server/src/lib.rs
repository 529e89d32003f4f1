//! Printer dispatch service: live agent connections, print routing and the
//! HTTP/WebSocket surface around them.

pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod queue;
pub mod registry;
pub mod server;

pub use dispatcher::PrintDispatcher;
pub use error::ApiError;
pub use queue::DispatchQueue;
pub use registry::{ConnectionRegistry, SinkHandle};
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};

#[cfg(test)]
pub(crate) mod testing;
