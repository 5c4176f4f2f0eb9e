//! HTTP request handlers.

pub mod file_handlers;
pub mod health_handlers;
