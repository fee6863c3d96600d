//! HTTP request handlers for the resumable upload server.
//!
//! - `measurements`: the measurement pre-request/chunk/status routes
//! - `attachments`: the attachment pre-request/chunk/status routes
//! - `health`: liveness/readiness probes

pub mod attachments;
pub mod health;
pub mod measurements;

pub use attachments::attachment_routes;
pub use health::health_routes;
pub use measurements::measurement_routes;

