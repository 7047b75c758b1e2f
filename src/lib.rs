// Ent Database - entity framework over a relational store

// Ent Framework - schemas, validated queries/actions, edges and relation loading
pub mod ent_framework;

// Core types and primitives
pub mod core;

// Infrastructure - database handle, SQLite binding, decorators, id generation
pub mod infrastructure;

// Domain-Driven Organization - entities organized by domain
pub mod domains;

// Reusable column groups
pub mod patterns;

// Common utilities
pub mod config;
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};
