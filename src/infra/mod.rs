//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod groq;
pub mod http;
pub mod redis;
pub mod telemetry;
