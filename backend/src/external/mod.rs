//! External API integrations

pub mod email;
pub mod identity;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use email::{DisabledEmailSender, EmailMessage, EmailSender, ResendClient};
pub use identity::{GoTrueClient, IdentityProvider, IdentityUser, NewIdentityUser, Session};
#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryIdentityProvider, RecordingEmailSender};
