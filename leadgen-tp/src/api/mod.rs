//! HTTP API handlers for leadgen-tp

pub mod health;
pub mod sse;
pub mod webhook;

pub use health::health_routes;
pub use sse::event_stream;
pub use webhook::{list_progressions, receive_webhook};
