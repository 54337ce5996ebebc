//! Credential manager: decides per pass whether material is reused or (re)issued.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use tributary_core::credential::{
    CertificateMaterial, CertificateSubject, PasswordMaterial, SigningAuthority,
};
use tributary_core::{Error, Result};

use crate::certificate::{CertificateAction, CertificateState};
use crate::password::PasswordGenerator;
use crate::secret::PriorCredentials;

/// Certificate material returned by [`CredentialManager::ensure_certificate`]
/// together with the state it ended the pass in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateOutcome {
    pub material: CertificateMaterial,
    pub state: CertificateState,
}

/// Ensures credential material exists for one component.
#[derive(Debug, Clone, Default)]
pub struct CredentialManager {
    prior: PriorCredentials,
    passwords: PasswordGenerator,
}

impl CredentialManager {
    pub fn new(prior: PriorCredentials) -> Self {
        Self {
            prior,
            passwords: PasswordGenerator::default(),
        }
    }

    pub fn with_generator(mut self, passwords: PasswordGenerator) -> Self {
        self.passwords = passwords;
        self
    }

    /// Password for every name, stored in the secret called `secret`.
    /// Existing passwords are never regenerated.
    pub fn ensure_passwords(
        &self,
        secret: &str,
        names: &[&str],
    ) -> BTreeMap<String, PasswordMaterial> {
        names
            .iter()
            .map(|name| {
                let value = match self.prior.password(secret, name) {
                    Some(existing) => existing.to_string(),
                    None => {
                        info!(secret = %secret, password = %name, "generating password");
                        self.passwords.generate()
                    }
                };
                (
                    name.to_string(),
                    PasswordMaterial {
                        name: name.to_string(),
                        value,
                    },
                )
            })
            .collect()
    }

    /// Certificate for `subject`, issued by `authority`.
    ///
    /// Prior material is reused while its generation is current. A stale
    /// certificate is reissued only when `maintenance_window_open`. When
    /// signing fails and prior material exists, the prior material is kept
    /// and the rotation is retried on the next pass.
    pub fn ensure_certificate(
        &self,
        subject: &CertificateSubject,
        authority: &dyn SigningAuthority,
        maintenance_window_open: bool,
    ) -> Result<CertificateOutcome> {
        let prior = self.prior.certificate(&subject.name);
        let generation = authority.generation();
        let state = CertificateState::of(prior, generation);

        match (state.action(maintenance_window_open), prior) {
            (CertificateAction::Keep, Some(prior)) => {
                debug!(certificate = %subject.name, generation, "certificate is current");
                Ok(CertificateOutcome {
                    material: prior.clone(),
                    state,
                })
            }
            (CertificateAction::Defer, Some(prior)) => {
                info!(
                    certificate = %subject.name,
                    issued_under = prior.generation,
                    generation,
                    "certificate is stale, deferring renewal until the maintenance window opens"
                );
                Ok(CertificateOutcome {
                    material: prior.clone(),
                    state,
                })
            }
            (CertificateAction::Reissue, Some(prior)) => {
                match self.issue(subject, authority, generation) {
                    Ok(material) => {
                        info!(certificate = %subject.name, generation, "certificate renewed");
                        Ok(CertificateOutcome {
                            material,
                            state: CertificateState::Reissued,
                        })
                    }
                    Err(e) => {
                        warn!(
                            certificate = %subject.name,
                            error = %e,
                            "certificate renewal failed, keeping the existing certificate"
                        );
                        Ok(CertificateOutcome {
                            material: prior.clone(),
                            state: CertificateState::Stale,
                        })
                    }
                }
            }
            _ => {
                let material = self.issue(subject, authority, generation)?;
                info!(certificate = %subject.name, generation, "certificate issued");
                Ok(CertificateOutcome {
                    material,
                    state: CertificateState::Issued,
                })
            }
        }
    }

    fn issue(
        &self,
        subject: &CertificateSubject,
        authority: &dyn SigningAuthority,
        generation: u64,
    ) -> Result<CertificateMaterial> {
        let issued = authority.issue(subject).map_err(|e| match e {
            Error::CertificateGeneration(_) => e,
            other => Error::CertificateGeneration(format!(
                "{} could not sign {}: {}",
                authority.name(),
                subject.name,
                other
            )),
        })?;

        Ok(CertificateMaterial {
            name: subject.name.clone(),
            private_key: issued.private_key,
            certificate: issued.certificate,
            keystore: issued.keystore,
            keystore_password: issued.keystore_password,
            generation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::service_subject;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tributary_core::credential::IssuedCertificate;

    struct TestAuthority {
        generation: u64,
        fail: bool,
        issued: AtomicU64,
    }

    impl TestAuthority {
        fn new(generation: u64) -> Self {
            Self {
                generation,
                fail: false,
                issued: AtomicU64::new(0),
            }
        }

        fn failing(generation: u64) -> Self {
            Self {
                fail: true,
                ..Self::new(generation)
            }
        }

        fn issued(&self) -> u64 {
            self.issued.load(Ordering::SeqCst)
        }
    }

    impl SigningAuthority for TestAuthority {
        fn name(&self) -> &str {
            "test-ca"
        }

        fn generation(&self) -> u64 {
            self.generation
        }

        fn issue(&self, subject: &CertificateSubject) -> Result<IssuedCertificate> {
            if self.fail {
                return Err(Error::CertificateGeneration("signer offline".into()));
            }
            let n = self.issued.fetch_add(1, Ordering::SeqCst);
            Ok(IssuedCertificate {
                private_key: format!("key-{}-{}", subject.name, n),
                certificate: format!("crt-{}-{}", subject.name, n),
                keystore: vec![n as u8],
                keystore_password: "pw".into(),
            })
        }
    }

    fn subject() -> CertificateSubject {
        service_subject("c-balancer", "ns")
    }

    fn prior_at(generation: u64) -> CertificateMaterial {
        CertificateMaterial {
            name: "c-balancer".into(),
            private_key: "old-key".into(),
            certificate: "old-crt".into(),
            keystore: vec![],
            keystore_password: "old".into(),
            generation,
        }
    }

    #[test]
    fn test_absent_certificate_is_issued() {
        let authority = TestAuthority::new(1);
        let outcome = CredentialManager::default()
            .ensure_certificate(&subject(), &authority, false)
            .unwrap();

        assert_eq!(outcome.state, CertificateState::Issued);
        assert_eq!(outcome.material.generation, 1);
        assert_eq!(authority.issued(), 1);
    }

    #[test]
    fn test_current_certificate_not_regenerated() {
        let authority = TestAuthority::new(2);
        let manager = CredentialManager::new(PriorCredentials::new().with_certificate(prior_at(2)));

        for _ in 0..3 {
            let outcome = manager.ensure_certificate(&subject(), &authority, true).unwrap();
            assert_eq!(outcome.material, prior_at(2));
        }
        assert_eq!(authority.issued(), 0);
    }

    #[test]
    fn test_stale_certificate_reissued_in_window() {
        let authority = TestAuthority::new(3);
        let manager = CredentialManager::new(PriorCredentials::new().with_certificate(prior_at(2)));

        let outcome = manager.ensure_certificate(&subject(), &authority, true).unwrap();
        assert_eq!(outcome.state, CertificateState::Reissued);
        assert_eq!(outcome.material.generation, 3);
        assert_ne!(outcome.material.certificate, "old-crt");
    }

    #[test]
    fn test_stale_certificate_kept_outside_window() {
        let authority = TestAuthority::new(3);
        let manager = CredentialManager::new(PriorCredentials::new().with_certificate(prior_at(2)));

        let outcome = manager.ensure_certificate(&subject(), &authority, false).unwrap();
        assert_eq!(outcome.state, CertificateState::Stale);
        assert_eq!(outcome.material, prior_at(2));
        assert_eq!(authority.issued(), 0);
    }

    #[test]
    fn test_signing_failure_keeps_prior_material() {
        let authority = TestAuthority::failing(3);
        let manager = CredentialManager::new(PriorCredentials::new().with_certificate(prior_at(2)));

        let outcome = manager.ensure_certificate(&subject(), &authority, true).unwrap();
        assert_eq!(outcome.material, prior_at(2));
        assert_eq!(outcome.state, CertificateState::Stale);
    }

    #[test]
    fn test_signing_failure_without_prior_is_an_error() {
        let authority = TestAuthority::failing(1);
        let result = CredentialManager::default().ensure_certificate(&subject(), &authority, true);
        assert!(matches!(result, Err(Error::CertificateGeneration(_))));
    }

    #[test]
    fn test_passwords_reused() {
        let manager =
            CredentialManager::new(PriorCredentials::new().with_password("c-api", "admin", "kept"));
        let passwords = manager.ensure_passwords("c-api", &["admin", "user"]);

        assert_eq!(passwords["admin"].value, "kept");
        assert_eq!(passwords["user"].value.len(), 16);
    }

    #[test]
    fn test_passwords_of_other_secret_not_reused() {
        let manager = CredentialManager::new(
            PriorCredentials::new().with_password("other-api", "admin", "foreign"),
        )
        .with_generator(PasswordGenerator::new(32));
        let passwords = manager.ensure_passwords("c-api", &["admin"]);

        assert_ne!(passwords["admin"].value, "foreign");
        assert_eq!(passwords["admin"].value.len(), 32);
    }
}
