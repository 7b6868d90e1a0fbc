//! Application services layer.

pub mod chat;
pub mod error;
pub mod generation;
