//! Certificate lifecycle.
//!
//! Each certificate moves through `Absent -> Issued -> Stale -> Reissued -> Issued`.
//! A certificate becomes stale when its issuing authority's generation moves
//! past the generation it was issued under. A stale certificate is only
//! reissued while the maintenance window is open; until then it keeps being
//! served as-is.

use serde::Serialize;
use tributary_core::credential::{CertificateMaterial, CertificateSubject};

/// Lifecycle state of one certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CertificateState {
    Absent,
    Issued,
    Stale,
    Reissued,
}

/// What a reconciliation pass does with a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateAction {
    /// No prior material: issue one.
    Issue,
    /// Prior material is current.
    Keep,
    /// Prior material is stale but the window is closed.
    Defer,
    /// Prior material is stale and the window is open.
    Reissue,
}

impl CertificateState {
    /// State of `prior` against the authority's current generation.
    pub fn of(prior: Option<&CertificateMaterial>, authority_generation: u64) -> Self {
        match prior {
            None => CertificateState::Absent,
            Some(material) if authority_generation > material.generation => {
                CertificateState::Stale
            }
            Some(_) => CertificateState::Issued,
        }
    }

    /// Action to take from this state.
    pub fn action(self, maintenance_window_open: bool) -> CertificateAction {
        match self {
            CertificateState::Absent => CertificateAction::Issue,
            CertificateState::Issued | CertificateState::Reissued => CertificateAction::Keep,
            CertificateState::Stale if maintenance_window_open => CertificateAction::Reissue,
            CertificateState::Stale => CertificateAction::Defer,
        }
    }
}

/// Subject of a certificate for an in-cluster service, valid for every DNS
/// form the service can be reached under.
pub fn service_subject(name: &str, namespace: &str) -> CertificateSubject {
    CertificateSubject {
        name: name.to_string(),
        common_name: name.to_string(),
        sans: vec![
            name.to_string(),
            format!("{}.{}", name, namespace),
            format!("{}.{}.svc", name, namespace),
            format!("{}.{}.svc.cluster.local", name, namespace),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(generation: u64) -> CertificateMaterial {
        CertificateMaterial {
            name: "c-balancer".into(),
            private_key: "key".into(),
            certificate: "crt".into(),
            keystore: b"ks".to_vec(),
            keystore_password: "pw".into(),
            generation,
        }
    }

    #[test]
    fn test_state_transitions() {
        assert_eq!(CertificateState::of(None, 3), CertificateState::Absent);
        assert_eq!(
            CertificateState::of(Some(&material(3)), 3),
            CertificateState::Issued
        );
        assert_eq!(
            CertificateState::of(Some(&material(2)), 3),
            CertificateState::Stale
        );
    }

    #[test]
    fn test_stale_only_reissued_in_window() {
        assert_eq!(
            CertificateState::Stale.action(true),
            CertificateAction::Reissue
        );
        assert_eq!(
            CertificateState::Stale.action(false),
            CertificateAction::Defer
        );
        assert_eq!(CertificateState::Issued.action(true), CertificateAction::Keep);
        assert_eq!(CertificateState::Absent.action(false), CertificateAction::Issue);
    }

    #[test]
    fn test_service_subject_sans() {
        let subject = service_subject("c-balancer", "kafka");
        assert_eq!(subject.sans.len(), 4);
        assert_eq!(subject.sans[3], "c-balancer.kafka.svc.cluster.local");
    }
}
