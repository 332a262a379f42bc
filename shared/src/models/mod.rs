//! Domain models for the Business Onboarding platform

mod business;
mod invitation;
mod member;

pub use business::*;
pub use invitation::*;
pub use member::*;
