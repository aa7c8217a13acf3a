//! Minimal application identity.
//!
//! Identity metadata is not collected here; this only records that
//! the host application declared who it is, which is what
//! [`BufferedSender`](crate::sender::BufferedSender) waits for by default.

use std::sync::OnceLock;

/// Identity declared by the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub domain_name: String,
    pub environment_name: String,
    pub party_name: String,
}

static IDENTITY: OnceLock<AppIdentity> = OnceLock::new();

/// Sets the identity. Only the first call wins; returns whether it did.
pub fn initialize(identity: AppIdentity) -> bool {
    IDENTITY.set(identity).is_ok()
}

pub fn is_initialized() -> bool {
    IDENTITY.get().is_some()
}

pub fn get() -> Option<&'static AppIdentity> {
    IDENTITY.get()
}
