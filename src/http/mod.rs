//! HTTP layer: server assembly, handlers and the error surface.

pub mod errors;
pub mod handlers;
pub mod server;

pub use server::ApiServer;
