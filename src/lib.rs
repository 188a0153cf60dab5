//! YUPlan - Course Catalog API Gateway
//!
//! This crate implements per-client admission control for the YUPlan course
//! catalog API. Each client identity gets a fixed-window request quota, and
//! clients that go idle are evicted by a background sweep to bound memory.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
