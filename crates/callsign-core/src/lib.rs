//! Callsign Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the Callsign PBX control plane. It includes:
//!
//! - Domain models (Extension, FeatureCode, VoicemailBox, Queue, etc.)
//! - Repository traits the per-call services and document endpoint consume
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
