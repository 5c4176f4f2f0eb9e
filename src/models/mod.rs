//! Core data models for the personal file store.
//!
//! These entities represent stored files and folders. They map cleanly to
//! database rows via `sqlx::FromRow` and serialize naturally as JSON via
//! `serde`.

pub mod file;
