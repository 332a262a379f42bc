//! Business logic services for the Business Onboarding service

pub mod access;
pub mod email;
pub mod invitation;
pub mod onboarding;
pub mod saga;
pub mod templates;

pub use email::{EmailDispatcher, RetrySummary, SendResult};
pub use invitation::{AcceptedInvitation, InvitationService, SendOutcome, SentInvitation};
pub use onboarding::{CreatedBusiness, OnboardingService};
pub use saga::Saga;
