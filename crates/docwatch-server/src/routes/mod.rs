//! HTTP route handlers.

pub mod collections;
pub mod documents;
pub mod health;
