//! Shared types and models for the Business Onboarding platform
//!
//! This crate contains the domain model, the invitation lifecycle rules and
//! the input validation shared between the backend, the browser (via WASM),
//! and other components of the system.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
