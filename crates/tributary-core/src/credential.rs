//! Credential material and the signing capability it is issued by.

use serde::{Deserialize, Serialize};

use crate::Result;

/// A generated password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordMaterial {
    pub name: String,
    pub value: String,
}

/// A certificate bundle together with the authority generation it was issued under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateMaterial {
    pub name: String,
    /// PEM encoded private key.
    pub private_key: String,
    /// PEM encoded certificate.
    pub certificate: String,
    pub keystore: Vec<u8>,
    pub keystore_password: String,
    pub generation: u64,
}

/// Credential material owned by a single component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialMaterial {
    Password(PasswordMaterial),
    Certificate(CertificateMaterial),
}

impl CredentialMaterial {
    pub fn name(&self) -> &str {
        match self {
            CredentialMaterial::Password(p) => &p.name,
            CredentialMaterial::Certificate(c) => &c.name,
        }
    }

    pub fn as_password(&self) -> Option<&PasswordMaterial> {
        match self {
            CredentialMaterial::Password(p) => Some(p),
            CredentialMaterial::Certificate(_) => None,
        }
    }

    pub fn as_certificate(&self) -> Option<&CertificateMaterial> {
        match self {
            CredentialMaterial::Certificate(c) => Some(c),
            CredentialMaterial::Password(_) => None,
        }
    }
}

/// What a certificate is issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSubject {
    /// Name of the material, also the key prefix inside the secret.
    pub name: String,
    pub common_name: String,
    pub sans: Vec<String>,
}

/// Output of a single signing operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub private_key: String,
    pub certificate: String,
    pub keystore: Vec<u8>,
    pub keystore_password: String,
}

/// An issuing authority, backed by an adapter over real cryptography.
/// Calls are synchronous.
pub trait SigningAuthority: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Current generation. Advances whenever the authority's own key is renewed.
    fn generation(&self) -> u64;

    /// Issue a fresh certificate for `subject`.
    fn issue(&self, subject: &CertificateSubject) -> Result<IssuedCertificate>;
}
