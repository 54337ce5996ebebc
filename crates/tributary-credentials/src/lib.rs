//! Password and certificate management for Tributary.
//!
//! Material is reused across reconciliation passes. Passwords are generated
//! once and never rotated; certificates rotate when their issuing authority's
//! generation advances and the maintenance window is open.

pub mod certificate;
pub mod manager;
pub mod password;
pub mod secret;

pub use certificate::{service_subject, CertificateAction, CertificateState};
pub use manager::{CertificateOutcome, CredentialManager};
pub use password::PasswordGenerator;
pub use secret::PriorCredentials;
