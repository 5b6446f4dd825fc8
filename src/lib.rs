//! TryOn Generation Client
//!
//! This library provides the client-side core for the TryOn virtual try-on
//! service: authenticated request handling, job submission and status polling,
//! multi-strategy result fetching, and a short-TTL cache of recently
//! generated results.

pub mod client;
pub mod config;
pub mod models;
pub mod services;

pub use client::{GenerateError, GeneratedResult, TryonClient};
pub use config::{ClientConfig, DuplicatePolicy};
