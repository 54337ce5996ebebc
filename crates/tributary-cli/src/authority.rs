//! In-memory signing authority backed by rcgen.

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue, IsCa, Issuer,
    KeyPair, KeyUsagePurpose, SanType, string::Ia5String,
};
use tributary_core::credential::{CertificateSubject, IssuedCertificate, SigningAuthority};
use tributary_core::{Error, Result};
use tributary_credentials::PasswordGenerator;

/// A self-signed cluster CA created for one CLI invocation.
pub struct LocalAuthority {
    generation: u64,
    ca_key_pem: String,
    ca_cert_pem: String,
    passwords: PasswordGenerator,
}

impl LocalAuthority {
    pub fn new(common_name: &str, generation: u64) -> Result<Self> {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(common_name.to_string()),
        );
        dn.push(
            DnType::OrganizationName,
            DnValue::Utf8String("tributary".to_string()),
        );
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

        let key = KeyPair::generate().map_err(signing_error)?;
        let cert = params.self_signed(&key).map_err(signing_error)?;

        Ok(Self {
            generation,
            ca_key_pem: key.serialize_pem(),
            ca_cert_pem: cert.pem(),
            passwords: PasswordGenerator::default(),
        })
    }
}

fn signing_error(e: rcgen::Error) -> Error {
    Error::CertificateGeneration(e.to_string())
}

impl SigningAuthority for LocalAuthority {
    fn name(&self) -> &str {
        "local-ca"
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn issue(&self, subject: &CertificateSubject) -> Result<IssuedCertificate> {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(subject.common_name.clone()),
        );
        params.distinguished_name = dn;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            rcgen::ExtendedKeyUsagePurpose::ServerAuth,
            rcgen::ExtendedKeyUsagePurpose::ClientAuth,
        ];
        params.subject_alt_names = subject
            .sans
            .iter()
            .map(|san| {
                Ia5String::try_from(san.clone())
                    .map(SanType::DnsName)
                    .map_err(|e| {
                        Error::CertificateGeneration(format!("invalid DNS name '{}': {}", san, e))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let key = KeyPair::generate().map_err(signing_error)?;
        let ca_key = KeyPair::from_pem(&self.ca_key_pem).map_err(signing_error)?;
        let issuer = Issuer::from_ca_cert_pem(&self.ca_cert_pem, &ca_key).map_err(signing_error)?;
        let cert = params.signed_by(&key, &issuer).map_err(signing_error)?;

        let private_key = key.serialize_pem();
        let certificate = cert.pem();
        // PEM bundle in the keystore slot.
        let keystore = format!("{}{}", certificate, private_key).into_bytes();

        Ok(IssuedCertificate {
            private_key,
            certificate,
            keystore,
            keystore_password: self.passwords.generate(),
        })
    }
}
