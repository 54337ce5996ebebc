//! Secret layouts for credential material, and recovery of prior material
//! from previously applied secrets.

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use tracing::warn;
use tributary_core::credential::{CertificateMaterial, PasswordMaterial};

/// Annotation carrying the authority generation a certificate was issued under.
pub const GENERATION_ANNOTATION: &str = "tributary.io/ca-cert-generation";

pub const API_ADMIN_PASSWORD_KEY: &str = "balancer.apiAdminPassword";
pub const API_USER_PASSWORD_KEY: &str = "balancer.apiUserPassword";
pub const API_AUTH_FILE_KEY: &str = "balancer.apiAuthFile";

pub const API_ADMIN_NAME: &str = "admin";
pub const API_USER_NAME: &str = "user";

/// One line of an authentication file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub roles: &'a [&'a str],
}

/// Render an authentication file: `username: password,ROLE` per line.
pub fn auth_file(principals: &[Principal<'_>]) -> String {
    let mut out = String::new();
    for principal in principals {
        out.push_str(principal.username);
        out.push_str(": ");
        out.push_str(principal.password);
        for role in principal.roles {
            out.push(',');
            out.push_str(role);
        }
        out.push('\n');
    }
    out
}

fn bytes(value: &str) -> ByteString {
    ByteString(value.as_bytes().to_vec())
}

/// Secret holding the admin and user API passwords and the auth file.
pub fn api_secret(metadata: ObjectMeta, admin: &PasswordMaterial, user: &PasswordMaterial) -> Secret {
    let auth = auth_file(&[
        Principal {
            username: API_ADMIN_NAME,
            password: &admin.value,
            roles: &["ADMIN"],
        },
        Principal {
            username: API_USER_NAME,
            password: &user.value,
            roles: &["USER"],
        },
    ]);

    let mut data = BTreeMap::new();
    data.insert(API_ADMIN_PASSWORD_KEY.to_string(), bytes(&admin.value));
    data.insert(API_USER_PASSWORD_KEY.to_string(), bytes(&user.value));
    data.insert(API_AUTH_FILE_KEY.to_string(), bytes(&auth));

    Secret {
        metadata,
        data: Some(data),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

/// Secret holding a certificate bundle, annotated with its generation.
pub fn certificate_secret(mut metadata: ObjectMeta, material: &CertificateMaterial) -> Secret {
    let name = &material.name;
    let mut data = BTreeMap::new();
    data.insert(format!("{}.key", name), bytes(&material.private_key));
    data.insert(format!("{}.crt", name), bytes(&material.certificate));
    data.insert(format!("{}.p12", name), ByteString(material.keystore.clone()));
    data.insert(format!("{}.password", name), bytes(&material.keystore_password));

    metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(
            GENERATION_ANNOTATION.to_string(),
            material.generation.to_string(),
        );

    Secret {
        metadata,
        data: Some(data),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

/// Material found in previously applied secrets.
///
/// Passwords are kept per owning secret, so two components sharing one
/// state never see each other's passwords.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriorCredentials {
    passwords: BTreeMap<String, BTreeMap<String, String>>,
    certificates: BTreeMap<String, CertificateMaterial>,
}

impl PriorCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recover material from secrets. Secrets carrying the generation
    /// annotation are read as certificate bundles, all others as passwords.
    pub fn from_secrets<'a>(secrets: impl IntoIterator<Item = &'a Secret>) -> Self {
        let mut prior = Self::default();
        for secret in secrets {
            let Some(data) = &secret.data else {
                continue;
            };
            let generation = secret
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(GENERATION_ANNOTATION));

            match generation {
                Some(generation) => {
                    let Ok(generation) = generation.parse::<u64>() else {
                        warn!(
                            secret = ?secret.metadata.name,
                            "certificate secret has an unreadable generation, ignoring it"
                        );
                        continue;
                    };
                    for material in read_certificates(data, generation) {
                        prior.certificates.insert(material.name.clone(), material);
                    }
                }
                None => {
                    let Some(owner) = secret.metadata.name.as_deref() else {
                        warn!("password secret has no name, ignoring it");
                        continue;
                    };
                    let passwords = prior.passwords.entry(owner.to_string()).or_default();
                    for (key, value) in data {
                        if let Ok(value) = String::from_utf8(value.0.clone()) {
                            passwords.insert(key.clone(), value);
                        }
                    }
                }
            }
        }
        prior
    }

    pub fn with_password(
        mut self,
        secret: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.passwords
            .entry(secret.into())
            .or_default()
            .insert(name.into(), value.into());
        self
    }

    pub fn with_certificate(mut self, material: CertificateMaterial) -> Self {
        self.certificates.insert(material.name.clone(), material);
        self
    }

    /// Password `name` stored in the secret called `secret`.
    pub fn password(&self, secret: &str, name: &str) -> Option<&str> {
        self.passwords
            .get(secret)
            .and_then(|p| p.get(name))
            .map(String::as_str)
    }

    pub fn certificate(&self, name: &str) -> Option<&CertificateMaterial> {
        self.certificates.get(name)
    }
}

fn read_certificates(
    data: &BTreeMap<String, ByteString>,
    generation: u64,
) -> Vec<CertificateMaterial> {
    let text = |key: String| {
        data.get(&key)
            .and_then(|v| String::from_utf8(v.0.clone()).ok())
    };

    data.keys()
        .filter_map(|key| key.strip_suffix(".crt"))
        .filter_map(|name| {
            Some(CertificateMaterial {
                name: name.to_string(),
                private_key: text(format!("{}.key", name))?,
                certificate: text(format!("{}.crt", name))?,
                keystore: data
                    .get(&format!("{}.p12", name))
                    .map(|v| v.0.clone())
                    .unwrap_or_default(),
                keystore_password: text(format!("{}.password", name)).unwrap_or_default(),
                generation,
            })
        })
        .collect()
}
