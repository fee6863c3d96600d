//! Middleware components for the resumable upload server.
//!
//! This module contains rate limiting; bearer-token authentication lives
//! at the crate root (`crate::auth`) since it doubles as a
//! `FromRequestParts` extractor handlers pull from directly.

pub mod rate_limit;

pub use rate_limit::{RateLimiter, RateLimiterLayer};

