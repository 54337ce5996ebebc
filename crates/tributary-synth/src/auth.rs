//! Client TLS and authentication wiring for components that connect to the
//! streaming platform.

use k8s_openapi::api::core::v1::{EnvVar, Volume, VolumeMount};
use std::collections::BTreeSet;
use tributary_core::spec::{ClientAuthentication, ClientTls};

use crate::model::secret_volume;
use crate::overlay::env;

/// How variable names are formed: `<prefix><NAME><suffix>`.
#[derive(Debug, Clone, Copy)]
pub struct EnvNaming<'a> {
    pub prefix: &'a str,
    pub suffix: &'a str,
}

impl EnvNaming<'_> {
    fn name(&self, base: &str) -> String {
        format!("{}{}{}", self.prefix, base, self.suffix)
    }
}

/// Where secrets are mounted.
#[derive(Debug, Clone, Copy)]
pub struct MountLayout<'a> {
    /// Prefix of volume names, keeps them unique across clients.
    pub volume_prefix: &'a str,
    pub certs_path: &'a str,
    pub passwords_path: &'a str,
}

/// TLS and authentication settings of one client.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientSecurity<'a> {
    pub tls: Option<&'a ClientTls>,
    pub authentication: Option<&'a ClientAuthentication>,
}

impl ClientSecurity<'_> {
    pub fn env(&self, naming: EnvNaming<'_>) -> Vec<EnvVar> {
        let mut vars = Vec::new();

        if let Some(tls) = self.tls {
            vars.push(env(&naming.name("TLS"), "true"));
            if !tls.trusted_certificates.is_empty() {
                let certs: Vec<String> = tls
                    .trusted_certificates
                    .iter()
                    .map(|c| format!("{}/{}", c.secret_name, c.certificate))
                    .collect();
                vars.push(env(&naming.name("TRUSTED_CERTS"), certs.join(";")));
            }
        }

        match self.authentication {
            Some(ClientAuthentication::Tls {
                certificate_and_key,
            }) => {
                vars.push(env(
                    &naming.name("TLS_AUTH_CERT"),
                    format!(
                        "{}/{}",
                        certificate_and_key.secret_name, certificate_and_key.certificate
                    ),
                ));
                vars.push(env(
                    &naming.name("TLS_AUTH_KEY"),
                    format!(
                        "{}/{}",
                        certificate_and_key.secret_name, certificate_and_key.key
                    ),
                ));
            }
            Some(ClientAuthentication::ScramSha512 {
                username,
                password_secret,
            }) => {
                vars.push(env(&naming.name("SASL_MECHANISM"), "scram-sha-512"));
                vars.push(env(&naming.name("SASL_USERNAME"), username.clone()));
                vars.push(env(
                    &naming.name("SASL_PASSWORD_FILE"),
                    format!("{}/{}", password_secret.secret_name, password_secret.password),
                ));
            }
            Some(ClientAuthentication::Plain {
                username,
                password_secret,
            }) => {
                vars.push(env(&naming.name("SASL_MECHANISM"), "plain"));
                vars.push(env(&naming.name("SASL_USERNAME"), username.clone()));
                vars.push(env(
                    &naming.name("SASL_PASSWORD_FILE"),
                    format!("{}/{}", password_secret.secret_name, password_secret.password),
                ));
            }
            None => {}
        }

        vars
    }

    fn cert_secrets(&self) -> BTreeSet<&str> {
        let mut secrets: BTreeSet<&str> = self
            .tls
            .map(|t| {
                t.trusted_certificates
                    .iter()
                    .map(|c| c.secret_name.as_str())
                    .collect()
            })
            .unwrap_or_default();
        if let Some(ClientAuthentication::Tls {
            certificate_and_key,
        }) = self.authentication
        {
            secrets.insert(&certificate_and_key.secret_name);
        }
        secrets
    }

    fn password_secret(&self) -> Option<&str> {
        match self.authentication {
            Some(ClientAuthentication::ScramSha512 {
                password_secret, ..
            })
            | Some(ClientAuthentication::Plain {
                password_secret, ..
            }) => Some(password_secret.secret_name.as_str()),
            _ => None,
        }
    }

    /// Secret volumes and their mounts. Each secret is mounted once.
    pub fn volumes(&self, layout: MountLayout<'_>) -> (Vec<Volume>, Vec<VolumeMount>) {
        let mut volumes = Vec::new();
        let mut mounts = Vec::new();

        let cert_secrets = self.cert_secrets();
        let password_secret = self.password_secret();
        let all = cert_secrets
            .iter()
            .map(|s| (*s, layout.certs_path))
            .chain(password_secret.map(|s| (s, layout.passwords_path)));

        for (secret, base_path) in all {
            let name = format!("{}-{}", layout.volume_prefix, secret);
            volumes.push(secret_volume(&name, secret));
            mounts.push(VolumeMount {
                name,
                mount_path: format!("{}/{}", base_path, secret),
                ..Default::default()
            });
        }

        (volumes, mounts)
    }
}
