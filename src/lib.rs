//! Cache-aside chat service: a Redis-backed response cache in front of an LLM
//! completion backend, degrading to a miss or a mock answer when either side
//! is unavailable.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
