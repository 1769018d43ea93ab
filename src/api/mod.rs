// src/api/mod.rs

//! HTTP API runtime.

pub mod admin;
pub mod error;
pub mod handlers;
pub mod router;
pub mod settings;
pub mod tenants;

pub use router::http_router;
