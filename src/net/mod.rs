//! Network subsystem: HTTP server and WebSocket fan-out

pub mod server;
pub mod websocket;

pub use server::{AppState, WebServer};
pub use websocket::WsBroadcaster;
