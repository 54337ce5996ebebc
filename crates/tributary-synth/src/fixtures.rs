//! Specs shared by the unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tributary_core::context::ClusterContext;
use tributary_core::credential::{
    CertificateMaterial, CertificateSubject, CredentialMaterial, IssuedCertificate,
    PasswordMaterial, SigningAuthority,
};
use tributary_core::Result;
use tributary_core::spec::{
    Artifact, ArtifactKind, BalancerSpec, BridgeHttp, BridgeSpec, BuildOutputSpec, BuildSpec,
    ComponentDetails, ComponentSpec, MirrorConsumer, MirrorProducer, MirrorSpec, Plugin,
};
use tributary_credentials::secret::{API_ADMIN_PASSWORD_KEY, API_USER_PASSWORD_KEY};

pub const CLUSTER: &str = "my-cluster";

pub fn context() -> ClusterContext {
    ClusterContext::new("kafka")
}

pub fn spec(component: ComponentDetails) -> ComponentSpec {
    ComponentSpec {
        cluster: CLUSTER.into(),
        replicas: None,
        image: None,
        version: None,
        config: BTreeMap::new(),
        resources: None,
        logging: None,
        jvm_options: None,
        metrics_enabled: false,
        liveness_probe: None,
        readiness_probe: None,
        rack: None,
        tracing: None,
        template: Default::default(),
        component,
    }
}

pub fn balancer() -> ComponentSpec {
    spec(ComponentDetails::Balancer(BalancerSpec::default()))
}

pub fn bridge() -> ComponentSpec {
    spec(ComponentDetails::Bridge(BridgeSpec {
        bootstrap_servers: "my-cluster-kafka-bootstrap:9092".into(),
        http: Some(BridgeHttp {
            port: 8080,
            cors: None,
        }),
        admin_client: None,
        consumer: None,
        producer: None,
        tls: None,
        authentication: None,
        client_rack_init_image: None,
    }))
}

pub fn mirror() -> ComponentSpec {
    spec(ComponentDetails::Mirror(MirrorSpec {
        include: Some("orders.*".into()),
        whitelist: None,
        consumer: MirrorConsumer {
            bootstrap_servers: "source:9092".into(),
            group_id: "mirror".into(),
            num_streams: None,
            offset_commit_interval: None,
            config: BTreeMap::new(),
            tls: None,
            authentication: None,
        },
        producer: MirrorProducer {
            bootstrap_servers: "target:9092".into(),
            abort_on_send_failure: None,
            config: BTreeMap::new(),
            tls: None,
            authentication: None,
        },
    }))
}

pub fn build() -> ComponentSpec {
    spec(ComponentDetails::Build(BuildSpec {
        plugins: Some(vec![Plugin {
            name: "echo".into(),
            artifacts: Some(vec![Artifact {
                kind: ArtifactKind::Jar,
                url: "https://example.com/echo.jar".into(),
                sha512sum: None,
                file_name: None,
            }]),
        }]),
        output: BuildOutputSpec::RegistryPush {
            image: "registry.example.com/connect:latest".into(),
            push_secret: Some("push".into()),
            additional_options: Vec::new(),
        },
    }))
}

/// Credential material of the balancer of [`CLUSTER`].
pub fn balancer_credentials() -> Vec<CredentialMaterial> {
    vec![
        CredentialMaterial::Password(PasswordMaterial {
            name: API_ADMIN_PASSWORD_KEY.into(),
            value: "admin-secret".into(),
        }),
        CredentialMaterial::Password(PasswordMaterial {
            name: API_USER_PASSWORD_KEY.into(),
            value: "user-secret".into(),
        }),
        CredentialMaterial::Certificate(CertificateMaterial {
            name: format!("{}-balancer", CLUSTER),
            private_key: "key".into(),
            certificate: "crt".into(),
            keystore: b"store".to_vec(),
            keystore_password: "pw".into(),
            generation: 1,
        }),
    ]
}

/// Signing authority with a fixed generation that counts what it issues.
pub struct FixedAuthority {
    generation: u64,
    issued: AtomicU64,
}

impl FixedAuthority {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            issued: AtomicU64::new(0),
        }
    }

    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }
}

impl SigningAuthority for FixedAuthority {
    fn name(&self) -> &str {
        "fixed-ca"
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn issue(&self, subject: &CertificateSubject) -> Result<IssuedCertificate> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(IssuedCertificate {
            private_key: format!("key-{}-{}", subject.name, n),
            certificate: format!("crt-{}-{}", subject.name, n),
            keystore: vec![n as u8],
            keystore_password: "pw".into(),
        })
    }
}
